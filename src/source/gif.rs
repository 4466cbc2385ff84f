//! Animated GIF source.
//!
//! GIF frames are stored as deltas: each one only covers a sub-rectangle of
//! the logical screen and may leave pixels transparent. This source keeps a
//! running composite canvas and yields a snapshot of it after every frame,
//! so consumers always see the fully reconstructed picture.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ::gif::{ColorOutput, DecodeOptions, Decoder, DisposalMethod};
use image::{Rgba, RgbaImage};

use crate::error::{FlipError, Result};
use crate::geometry::PixelSize;
use crate::source::{FrameSource, MediaKind, MediaProbe};

/// Read the logical screen size without decoding frames.
pub(crate) fn probe(path: &Path) -> Result<MediaProbe> {
    let decoder = open_decoder(path)?;
    let size = PixelSize::new(u32::from(decoder.width()), u32::from(decoder.height()));
    if size.width == 0 || size.height == 0 {
        return Err(FlipError::decode(format!(
            "'{}' has an empty logical screen",
            path.display()
        )));
    }
    Ok(MediaProbe {
        path: path.to_path_buf(),
        kind: MediaKind::AnimatedGif,
        size,
        frame_rate: 0.0,
    })
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let file = File::open(path).map_err(|e| FlipError::io(path, e))?;
    let mut options = DecodeOptions::new();
    options.set_color_output(ColorOutput::RGBA);
    options
        .read_info(BufReader::new(file))
        .map_err(|e| FlipError::decode(format!("'{}': {e}", path.display())))
}

/// What to do to the canvas before the next frame is drawn.
enum PendingDisposal {
    ClearRect {
        left: u32,
        top: u32,
        width: u32,
        height: u32,
    },
    Restore(RgbaImage),
}

pub struct GifSource {
    path: PathBuf,
    decoder: Decoder<BufReader<File>>,
    frame_count: usize,
    size: PixelSize,
    background: Rgba<u8>,
    canvas: RgbaImage,
    pending: Option<PendingDisposal>,
}

impl GifSource {
    pub fn open(path: &Path) -> Result<Self> {
        let frame_count = count_frames(path)?;
        let decoder = open_decoder(path)?;
        let size = PixelSize::new(u32::from(decoder.width()), u32::from(decoder.height()));
        let background = background_color(&decoder);
        log::debug!(
            "GIF '{}': {}x{}, {frame_count} frames, background {:?}",
            path.display(),
            size.width,
            size.height,
            background.0
        );
        Ok(Self {
            path: path.to_path_buf(),
            decoder,
            frame_count,
            size,
            background,
            canvas: RgbaImage::from_pixel(size.width, size.height, background),
            pending: None,
        })
    }

    fn apply_pending_disposal(&mut self) {
        match self.pending.take() {
            Some(PendingDisposal::ClearRect {
                left,
                top,
                width,
                height,
            }) => {
                for y in top..(top + height).min(self.size.height) {
                    for x in left..(left + width).min(self.size.width) {
                        self.canvas.put_pixel(x, y, self.background);
                    }
                }
            }
            Some(PendingDisposal::Restore(previous)) => self.canvas = previous,
            None => {}
        }
    }
}

fn count_frames(path: &Path) -> Result<usize> {
    let mut decoder = open_decoder(path)?;
    let mut count = 0;
    while decoder
        .read_next_frame()
        .map_err(|e| FlipError::decode(format!("'{}': {e}", path.display())))?
        .is_some()
    {
        count += 1;
    }
    Ok(count)
}

fn background_color<R: std::io::Read>(decoder: &Decoder<R>) -> Rgba<u8> {
    let rgb = decoder.bg_color().and_then(|index| {
        decoder
            .global_palette()
            .and_then(|palette| palette.get(index * 3..index * 3 + 3))
    });
    match rgb {
        Some(&[r, g, b]) => Rgba([r, g, b, 255]),
        _ => Rgba([0, 0, 0, 0]),
    }
}

impl FrameSource for GifSource {
    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn frame_rate(&self) -> f64 {
        0.0
    }

    fn native_size(&self) -> PixelSize {
        self.size
    }

    fn next_frame(&mut self) -> Result<Option<RgbaImage>> {
        self.apply_pending_disposal();

        let frame = match self.decoder.read_next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(e) => {
                return Err(FlipError::decode(format!("'{}': {e}", self.path.display())))
            }
        };

        let left = u32::from(frame.left);
        let top = u32::from(frame.top);
        let width = u32::from(frame.width);
        let height = u32::from(frame.height);

        self.pending = match frame.dispose {
            DisposalMethod::Background => Some(PendingDisposal::ClearRect {
                left,
                top,
                width,
                height,
            }),
            DisposalMethod::Previous => Some(PendingDisposal::Restore(self.canvas.clone())),
            DisposalMethod::Any | DisposalMethod::Keep => None,
        };

        let rgba: &[u8] = &frame.buffer;
        for (i, px) in rgba.chunks_exact(4).enumerate() {
            if px[3] == 0 {
                continue;
            }
            let x = left + (i as u32 % width.max(1));
            let y = top + (i as u32 / width.max(1));
            if x < self.size.width && y < self.size.height {
                self.canvas.put_pixel(x, y, Rgba([px[0], px[1], px[2], px[3]]));
            }
        }

        Ok(Some(self.canvas.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use ::gif::{Encoder, Frame};

    use super::*;

    // black, red, green, blue
    const PALETTE: [u8; 12] = [0, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 255];
    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    struct Delta {
        left: u16,
        top: u16,
        width: u16,
        height: u16,
        index: u8,
        dispose: DisposalMethod,
        transparent: Option<u8>,
        pixels: Option<Vec<u8>>,
    }

    fn delta(left: u16, top: u16, width: u16, height: u16, index: u8) -> Delta {
        Delta {
            left,
            top,
            width,
            height,
            index,
            dispose: DisposalMethod::Keep,
            transparent: None,
            pixels: None,
        }
    }

    fn write_gif(path: &Path, deltas: &[Delta]) {
        let mut file = File::create(path).unwrap();
        let mut encoder = Encoder::new(&mut file, 4, 4, &PALETTE).unwrap();
        for d in deltas {
            let pixels = d
                .pixels
                .clone()
                .unwrap_or_else(|| vec![d.index; usize::from(d.width) * usize::from(d.height)]);
            let frame = Frame {
                left: d.left,
                top: d.top,
                width: d.width,
                height: d.height,
                dispose: d.dispose,
                transparent: d.transparent,
                delay: 10,
                buffer: Cow::Owned(pixels),
                ..Frame::default()
            };
            encoder.write_frame(&frame).unwrap();
        }
    }

    fn drain(src: &mut GifSource) -> Vec<RgbaImage> {
        let mut out = Vec::new();
        while let Some(frame) = src.next_frame().unwrap() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn deltas_are_composited_onto_the_running_canvas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anim.gif");
        write_gif(
            &path,
            &[
                delta(0, 0, 4, 4, 1),
                delta(1, 1, 2, 2, 2),
                delta(0, 0, 1, 1, 3),
            ],
        );

        let probe = probe(&path).unwrap();
        assert_eq!(probe.size, PixelSize::new(4, 4));
        assert_eq!(probe.frame_rate, 0.0);

        let mut src = GifSource::open(&path).unwrap();
        assert_eq!(src.frame_count(), 3);
        assert_eq!(src.frame_rate(), 0.0);
        let frames = drain(&mut src);
        assert_eq!(frames.len(), 3);

        assert_eq!(frames[0].get_pixel(1, 1), &RED);
        assert_eq!(frames[1].get_pixel(1, 1), &GREEN);
        assert_eq!(frames[1].get_pixel(0, 0), &RED);
        assert_eq!(frames[2].get_pixel(0, 0), &BLUE);
        assert_eq!(frames[2].get_pixel(2, 2), &GREEN);
        assert_eq!(frames[2].get_pixel(3, 3), &RED);
    }

    #[test]
    fn transparent_pixels_keep_the_canvas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("holes.gif");
        let mut holes = delta(2, 0, 2, 1, 0);
        holes.transparent = Some(3);
        holes.pixels = Some(vec![3, 2]);
        write_gif(&path, &[delta(0, 0, 4, 4, 1), holes]);

        let frames = drain(&mut GifSource::open(&path).unwrap());
        assert_eq!(frames[1].get_pixel(2, 0), &RED);
        assert_eq!(frames[1].get_pixel(3, 0), &GREEN);
    }

    #[test]
    fn background_disposal_clears_the_frame_rect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bg.gif");
        let mut cleared = delta(1, 1, 2, 2, 2);
        cleared.dispose = DisposalMethod::Background;
        write_gif(&path, &[delta(0, 0, 4, 4, 1), cleared, delta(0, 0, 1, 1, 3)]);

        let mut src = GifSource::open(&path).unwrap();
        let background = src.background;
        let frames = drain(&mut src);
        assert_eq!(frames[1].get_pixel(1, 1), &GREEN);
        assert_eq!(frames[2].get_pixel(1, 1), &background);
        assert_eq!(frames[2].get_pixel(0, 0), &BLUE);
        assert_eq!(frames[2].get_pixel(3, 3), &RED);
    }

    #[test]
    fn previous_disposal_restores_the_canvas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prev.gif");
        let mut temporary = delta(1, 1, 2, 2, 2);
        temporary.dispose = DisposalMethod::Previous;
        write_gif(&path, &[delta(0, 0, 4, 4, 1), temporary, delta(0, 0, 1, 1, 3)]);

        let frames = drain(&mut GifSource::open(&path).unwrap());
        assert_eq!(frames[1].get_pixel(2, 2), &GREEN);
        assert_eq!(frames[2].get_pixel(2, 2), &RED);
        assert_eq!(frames[2].get_pixel(0, 0), &BLUE);
    }

    #[test]
    fn exhausted_source_keeps_returning_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.gif");
        write_gif(&path, &[delta(0, 0, 4, 4, 2)]);

        let mut src = GifSource::open(&path).unwrap();
        assert!(src.next_frame().unwrap().is_some());
        assert!(src.next_frame().unwrap().is_none());
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.gif");
        std::fs::write(&path, b"GIF89a\x04\x00").unwrap();
        assert!(matches!(probe(&path), Err(FlipError::Decode(_))));
    }
}
