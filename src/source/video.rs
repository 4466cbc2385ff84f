//! Video source backed by the system `ffprobe` / `ffmpeg` binaries.
//!
//! Frames are streamed from an `ffmpeg` child process writing raw RGBA to a
//! pipe, one `width * height * 4` chunk per frame, so only the current frame
//! is ever held in memory.

use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use image::RgbaImage;

use crate::error::{FlipError, Result};
use crate::geometry::PixelSize;
use crate::source::{FrameSource, MediaKind, MediaProbe};

const TRANSCODED_FILE_NAME: &str = "transcoded.mkv";

#[derive(Debug, Clone)]
struct VideoInfo {
    path: PathBuf,
    width: u32,
    height: u32,
    fps: f64,
    duration_sec: f64,
}

impl VideoInfo {
    fn frame_count(&self) -> usize {
        (self.duration_sec * self.fps).max(0.0) as usize
    }
}

pub(crate) fn probe(path: &Path) -> Result<MediaProbe> {
    let info = ffprobe(path)?;
    Ok(MediaProbe {
        path: info.path,
        kind: MediaKind::Video,
        size: PixelSize::new(info.width, info.height),
        frame_rate: info.fps,
    })
}

#[derive(serde::Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
    nb_frames: Option<String>,
}

#[derive(serde::Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(serde::Deserialize)]
struct ProbeOut {
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

fn ffprobe(path: &Path) -> Result<VideoInfo> {
    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| FlipError::decode(format!("failed to run ffprobe (is it on PATH?): {e}")))?;
    if !out.status.success() {
        return Err(FlipError::decode(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    parse_probe(path, &out.stdout)
}

fn parse_probe(path: &Path, json: &[u8]) -> Result<VideoInfo> {
    let parsed: ProbeOut = serde_json::from_slice(json)
        .map_err(|e| FlipError::decode(format!("ffprobe json parse failed: {e}")))?;
    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| {
            FlipError::decode(format!("no video stream found in '{}'", path.display()))
        })?;
    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(FlipError::decode("missing video dimensions from ffprobe")),
    };
    let fps = parse_ff_ratio(stream.r_frame_rate.as_deref().unwrap_or("0/1"))
        .ok_or_else(|| FlipError::decode("invalid video r_frame_rate"))?;

    // Container duration first, then the stream's own, then its frame count.
    let seconds = |s: Option<&String>| s.and_then(|s| s.parse::<f64>().ok()).filter(|d| *d > 0.0);
    let duration_sec = seconds(parsed.format.as_ref().and_then(|f| f.duration.as_ref()))
        .or_else(|| seconds(stream.duration.as_ref()))
        .or_else(|| {
            let frames = stream.nb_frames.as_ref()?.parse::<u64>().ok()?;
            (frames > 0 && fps > 0.0).then(|| frames as f64 / fps)
        })
        .ok_or_else(|| {
            FlipError::decode(format!(
                "ffprobe reports no duration or frame count for '{}'",
                path.display()
            ))
        })?;

    Ok(VideoInfo {
        path: path.to_path_buf(),
        width,
        height,
        fps,
        duration_sec,
    })
}

/// Parse an ffmpeg rational such as `30000/1001`.
fn parse_ff_ratio(s: &str) -> Option<f64> {
    let mut parts = s.split('/');
    let num = parts.next()?.trim().parse::<u32>().ok()?;
    let den = match parts.next() {
        Some(d) => d.trim().parse::<u32>().ok()?,
        None => 1,
    };
    if den == 0 {
        return None;
    }
    Some(f64::from(num) / f64::from(den))
}

/// Re-encode `info` at `fps` into `scratch_dir`. The output is lossless so
/// the only change is the frame timing.
fn transcode(info: &VideoInfo, fps: u32, scratch_dir: &Path) -> Result<PathBuf> {
    let out_path = scratch_dir.join(TRANSCODED_FILE_NAME);
    log::info!(
        "Transcoding from {:.3} fps to {fps} fps ...",
        info.fps
    );
    log::debug!("transcode target: {}", out_path.display());

    let out = Command::new("ffmpeg")
        .args(["-v", "error", "-y", "-i"])
        .arg(&info.path)
        .args(["-an", "-r", &fps.to_string(), "-c:v", "ffv1"])
        .arg(&out_path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            FlipError::transcode(format!("failed to run ffmpeg (is it on PATH?): {e}"))
        })?;
    if !out.status.success() {
        return Err(FlipError::transcode(format!(
            "ffmpeg could not re-encode '{}' at {fps} fps: {}",
            info.path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    Ok(out_path)
}

pub struct VideoSource {
    info: VideoInfo,
    frame_count: usize,
    yielded: usize,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    /// Collects ffmpeg's stderr so a chatty decoder cannot block on a full pipe.
    stderr: Option<JoinHandle<String>>,
}

impl VideoSource {
    /// Probe `probe.path` again and start decoding, transcoding first when
    /// `target_fps` is non-zero and differs from the native rate.
    pub fn open(probe: &MediaProbe, target_fps: u32, scratch_dir: &Path) -> Result<Self> {
        let mut info = ffprobe(&probe.path)?;
        if target_fps > 0 && (info.fps - f64::from(target_fps)).abs() > 1e-3 {
            let transcoded = transcode(&info, target_fps, scratch_dir)?;
            info = ffprobe(&transcoded).map_err(|e| FlipError::transcode(e.to_string()))?;
        }
        let frame_count = info.frame_count();

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(&info.path)
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                FlipError::decode(format!("failed to spawn ffmpeg (is it on PATH?): {e}"))
            })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FlipError::decode("failed to open ffmpeg stdout"))?;
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        Ok(Self {
            info,
            frame_count,
            yielded: 0,
            child: Some(child),
            stdout: Some(BufReader::new(stdout)),
            stderr,
        })
    }

    /// Join the stderr reader; empty if it was already joined.
    fn stderr_text(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }

    fn frame_len(&self) -> usize {
        self.info.width as usize * self.info.height as usize * 4
    }

    /// Stop the decoder. `complete` is true when the pipe reached EOF on its
    /// own, in which case ffmpeg's exit status is checked.
    fn close(&mut self, complete: bool) -> Result<()> {
        drop(self.stdout.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if !complete {
            let _ = child.kill();
            let _ = child.wait();
            self.stderr_text();
            return Ok(());
        }
        let status = child
            .wait()
            .map_err(|e| FlipError::decode(format!("failed to wait for ffmpeg: {e}")))?;
        let stderr = self.stderr_text();
        if !status.success() {
            return Err(FlipError::decode(format!(
                "ffmpeg decode failed for '{}': {}",
                self.info.path.display(),
                stderr.trim()
            )));
        }
        if self.yielded < self.frame_count {
            log::warn!(
                "'{}' ended after {} of {} expected frames",
                self.info.path.display(),
                self.yielded,
                self.frame_count
            );
        }
        Ok(())
    }
}

impl FrameSource for VideoSource {
    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn frame_rate(&self) -> f64 {
        self.info.fps
    }

    fn native_size(&self) -> PixelSize {
        PixelSize::new(self.info.width, self.info.height)
    }

    fn next_frame(&mut self) -> Result<Option<RgbaImage>> {
        if self.yielded >= self.frame_count {
            self.close(false)?;
            return Ok(None);
        }
        let len = self.frame_len();
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; len];
        match stdout.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.close(true)?;
                return Ok(None);
            }
            Err(e) => {
                return Err(FlipError::decode(format!(
                    "reading frames from ffmpeg failed: {e}"
                )))
            }
        }

        self.yielded += 1;
        let frame = RgbaImage::from_raw(self.info.width, self.info.height, buf)
            .ok_or_else(|| FlipError::decode("decoded frame has an unexpected size"))?;
        Ok(Some(frame))
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        let _ = self.close(false);
    }
}
