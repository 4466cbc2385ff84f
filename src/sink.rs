//! Document sink – the drawing surface the pagination engine writes to.

use image::RgbImage;

use crate::error::{FlipError, Result};
use crate::geometry::{Point, Size};
use crate::placement::{FlipbookLayout, PageLayout, PlacementCommand};

/// Receives placement commands in emission order. Coordinates are
/// millimetres from the top-left corner of the current page.
pub trait DocumentSink {
    /// Start a new page; every following command lands on it.
    fn begin_page(&mut self) -> Result<()>;

    fn place_image(&mut self, image: &RgbImage, at: Point, size: Size) -> Result<()>;

    /// Draw `text` with its baseline anchored at `at`, rotated
    /// counter-clockwise by `rotation_deg`. Rotation does not carry over to
    /// later commands.
    fn place_label(&mut self, text: &str, at: Point, rotation_deg: f32) -> Result<()>;

    fn draw_line(&mut self, from: Point, to: Point) -> Result<()>;
}

/// Sink that keeps a [`FlipbookLayout`] of every command instead of
/// rendering anything.
#[derive(Debug, Clone)]
pub struct RecordingSink {
    layout: FlipbookLayout,
}

impl RecordingSink {
    pub fn new(page_size: Size) -> Self {
        Self {
            layout: FlipbookLayout::new(page_size.width, page_size.height),
        }
    }

    pub fn layout(&self) -> &FlipbookLayout {
        &self.layout
    }

    pub fn into_layout(self) -> FlipbookLayout {
        self.layout
    }

    fn push(&mut self, command: PlacementCommand) -> Result<()> {
        let page = self
            .layout
            .pages
            .last_mut()
            .ok_or_else(|| FlipError::render("command issued before the first page"))?;
        page.commands.push(command);
        Ok(())
    }
}

impl DocumentSink for RecordingSink {
    fn begin_page(&mut self) -> Result<()> {
        let index = self.layout.pages.len();
        self.layout.pages.push(PageLayout::new(index));
        Ok(())
    }

    fn place_image(&mut self, image: &RgbImage, at: Point, size: Size) -> Result<()> {
        self.push(PlacementCommand::Image {
            x: at.x,
            y: at.y,
            width: size.width,
            height: size.height,
            px_width: image.width(),
            px_height: image.height(),
        })
    }

    fn place_label(&mut self, text: &str, at: Point, rotation_deg: f32) -> Result<()> {
        self.push(PlacementCommand::Label {
            text: text.to_string(),
            x: at.x,
            y: at.y,
            rotation: rotation_deg,
        })
    }

    fn draw_line(&mut self, from: Point, to: Point) -> Result<()> {
        self.push(PlacementCommand::Line {
            x1: from.x,
            y1: from.y,
            x2: to.x,
            y2: to.y,
        })
    }
}
