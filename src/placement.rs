//! Placement record – a serialisable trace of everything the pagination
//! engine asked a document sink to draw, page by page. Pixel data is not
//! retained; image commands carry only geometry.

use serde::{Deserialize, Serialize};

/// A complete flip-book layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlipbookLayout {
    #[serde(default = "FlipbookLayout::default_title")]
    pub title: String,
    pub page_width_mm: f32,
    pub page_height_mm: f32,
    pub pages: Vec<PageLayout>,
}

/// Everything drawn on one page, in emission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_index: usize,
    pub commands: Vec<PlacementCommand>,
}

/// One drawing instruction. Coordinates are millimetres from the page's
/// top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlacementCommand {
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        px_width: u32,
        px_height: u32,
    },
    Label {
        text: String,
        x: f32,
        y: f32,
        /// Counter-clockwise, degrees.
        rotation: f32,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    },
}

impl FlipbookLayout {
    pub fn new(page_width_mm: f32, page_height_mm: f32) -> Self {
        Self {
            title: Self::default_title(),
            page_width_mm,
            page_height_mm,
            pages: Vec::new(),
        }
    }

    fn default_title() -> String {
        "Flip-book".to_string()
    }

    pub fn images(&self) -> impl Iterator<Item = &PlacementCommand> {
        self.pages
            .iter()
            .flat_map(|p| p.commands.iter())
            .filter(|c| matches!(c, PlacementCommand::Image { .. }))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.pages
            .iter()
            .flat_map(|p| p.commands.iter())
            .filter_map(|c| match c {
                PlacementCommand::Label { text, .. } => Some(text.as_str()),
                _ => None,
            })
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| e.to_string())
    }
}

impl PageLayout {
    pub fn new(page_index: usize) -> Self {
        Self {
            page_index,
            commands: Vec::new(),
        }
    }

    pub fn image_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, PlacementCommand::Image { .. }))
            .count()
    }

    pub fn line_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, PlacementCommand::Line { .. }))
            .count()
    }
}
