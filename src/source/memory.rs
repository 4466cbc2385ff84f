//! Frame source over decoded images already held in memory.

use std::collections::VecDeque;

use image::RgbaImage;

use crate::error::{FlipError, Result};
use crate::geometry::PixelSize;
use crate::source::FrameSource;

/// Frames already decoded into memory, e.g. rendered by the caller.
pub struct MemorySource {
    frames: VecDeque<RgbaImage>,
    frame_count: usize,
    frame_rate: f64,
    size: PixelSize,
}

impl MemorySource {
    /// All frames must share one size; an empty sequence is allowed.
    pub fn new(frames: Vec<RgbaImage>, frame_rate: f64) -> Result<Self> {
        let size = frames
            .first()
            .map(|f| PixelSize::new(f.width(), f.height()))
            .unwrap_or_default();
        if let Some((i, f)) = frames
            .iter()
            .enumerate()
            .find(|(_, f)| f.width() != size.width || f.height() != size.height)
        {
            return Err(FlipError::decode(format!(
                "frame {i} is {}x{}, expected {}x{}",
                f.width(),
                f.height(),
                size.width,
                size.height
            )));
        }
        Ok(Self {
            frame_count: frames.len(),
            frames: frames.into(),
            frame_rate,
            size,
        })
    }
}

impl FrameSource for MemorySource {
    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn native_size(&self) -> PixelSize {
        self.size
    }

    fn next_frame(&mut self) -> Result<Option<RgbaImage>> {
        Ok(self.frames.pop_front())
    }
}
