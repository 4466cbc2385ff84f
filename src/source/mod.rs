//! Frame sources – a uniform, forward-only view over decoded frames of a
//! video or an animated GIF.
//!
//! Opening a source is split in two: [`probe_source`] only reads headers so
//! the page geometry can be validated first, and [`open_source`] prepares
//! the actual frame stream (which may transcode a video into the scratch
//! directory).

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::error::{FlipError, Result};
use crate::geometry::PixelSize;

pub mod gif;
pub mod memory;
pub mod video;

pub use self::gif::GifSource;
pub use self::memory::MemorySource;
pub use self::video::VideoSource;

/// Sequential access to the decoded frames of one medium.
///
/// The stream is single-pass: once [`FrameSource::next_frame`] has returned
/// `Ok(None)` the source is exhausted and must be reopened for another pass.
pub trait FrameSource {
    /// Number of frames the stream will yield.
    fn frame_count(&self) -> usize;

    /// Frames per second; `0.0` when the medium has no meaningful rate.
    fn frame_rate(&self) -> f64;

    fn native_size(&self) -> PixelSize;

    /// Next frame at native resolution, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbaImage>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    AnimatedGif,
}

/// Header-level facts about a source file.
#[derive(Debug, Clone)]
pub struct MediaProbe {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub size: PixelSize,
    /// Native frame rate; `0.0` for GIFs.
    pub frame_rate: f64,
}

impl MediaProbe {
    pub fn aspect_ratio(&self) -> f32 {
        self.size.aspect_ratio()
    }
}

/// Decide whether `path` is an animated GIF or a video.
///
/// The file magic wins; the `.gif` extension is only consulted when the
/// header cannot be read.
pub fn detect_kind(path: &Path) -> MediaKind {
    let mut magic = [0u8; 6];
    let sniffed = File::open(path).and_then(|mut f| f.read_exact(&mut magic));
    match sniffed {
        Ok(()) if &magic == b"GIF87a" || &magic == b"GIF89a" => MediaKind::AnimatedGif,
        Ok(()) => MediaKind::Video,
        Err(_) => {
            let is_gif = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("gif"));
            if is_gif {
                MediaKind::AnimatedGif
            } else {
                MediaKind::Video
            }
        }
    }
}

/// Read the source's size and native rate without decoding any frame.
pub fn probe_source(path: &Path) -> Result<MediaProbe> {
    if !path.is_file() {
        return Err(FlipError::decode(format!(
            "source '{}' does not exist or is not a file",
            path.display()
        )));
    }
    match detect_kind(path) {
        MediaKind::AnimatedGif => gif::probe(path),
        MediaKind::Video => video::probe(path),
    }
}

/// Open the frame stream for a probed source.
///
/// Videos whose native rate differs from `target_fps` are transcoded into
/// `scratch_dir` first; the caller owns that directory and its cleanup.
pub fn open_source(
    probe: &MediaProbe,
    target_fps: u32,
    scratch_dir: &Path,
) -> Result<Box<dyn FrameSource>> {
    match probe.kind {
        MediaKind::AnimatedGif => Ok(Box::new(GifSource::open(&probe.path)?)),
        MediaKind::Video => Ok(Box::new(VideoSource::open(probe, target_fps, scratch_dir)?)),
    }
}
