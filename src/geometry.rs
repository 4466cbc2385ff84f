//! Geometry planner – derives the tile grid for a flip-book page.
//!
//! All physical quantities are millimetres with the origin at the top-left
//! corner of a landscape page. [`plan_tiling`] is pure: identical inputs
//! always produce an identical [`TilingPlan`].

use serde::{Deserialize, Serialize};

use crate::error::{FlipError, Result};

pub const MM_PER_INCH: f32 = 25.4;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height; `0.0` for a degenerate size.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margin {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Margin {
    pub const fn new(top: f32, right: f32, bottom: f32, left: f32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    pub const fn uniform(v: f32) -> Self {
        Self::new(v, v, v, v)
    }
}

impl Default for Margin {
    fn default() -> Self {
        Self::uniform(10.0)
    }
}

/// A named paper size. Extents are landscape (width ≥ height).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PaperFormat {
    pub name: &'static str,
    pub size: Size,
}

pub const PAPER_FORMATS: &[PaperFormat] = &[
    PaperFormat {
        name: "a5",
        size: Size::new(210.0, 148.0),
    },
    PaperFormat {
        name: "a4",
        size: Size::new(297.0, 210.0),
    },
    PaperFormat {
        name: "a3",
        size: Size::new(420.0, 297.0),
    },
    PaperFormat {
        name: "letter",
        size: Size::new(279.4, 215.9),
    },
    PaperFormat {
        name: "legal",
        size: Size::new(355.6, 215.9),
    },
];

impl PaperFormat {
    /// Case-insensitive catalog lookup.
    pub fn lookup(key: &str) -> Result<PaperFormat> {
        PAPER_FORMATS
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(key.trim()))
            .copied()
            .ok_or_else(|| {
                FlipError::config(format!(
                    "unknown paper format '{key}' (expected one of: {})",
                    Self::names().join(", ")
                ))
            })
    }

    pub fn names() -> Vec<&'static str> {
        PAPER_FORMATS.iter().map(|p| p.name).collect()
    }
}

/// User-facing layout parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutParams {
    /// Paper catalog key, e.g. `"a4"`.
    pub paper: String,
    pub margins: Margin,
    /// Physical frame height; the frame width follows from the aspect ratio.
    pub frame_height_mm: f32,
    /// Binding strip reserved to the left of every frame.
    pub offset_mm: f32,
    pub dpi: u32,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            paper: "a4".to_string(),
            margins: Margin::default(),
            frame_height_mm: 30.0,
            offset_mm: 15.0,
            dpi: 200,
        }
    }
}

impl LayoutParams {
    /// Checks every parameter that does not depend on the source media.
    pub fn validate(&self) -> Result<()> {
        self.printable_area().map(|_| ())
    }

    fn printable_area(&self) -> Result<(PaperFormat, Size)> {
        let paper = PaperFormat::lookup(&self.paper)?;
        let m = &self.margins;
        if [m.top, m.right, m.bottom, m.left]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(FlipError::config(format!(
                "margins must be finite and non-negative, got {m:?}"
            )));
        }
        let printable = Size::new(
            paper.size.width - m.left - m.right,
            paper.size.height - m.top - m.bottom,
        );
        if printable.width <= 0.0 || printable.height <= 0.0 {
            return Err(FlipError::config(format!(
                "margins leave no printable area on {} paper ({:.1}mm x {:.1}mm)",
                paper.name, printable.width, printable.height
            )));
        }
        if !self.frame_height_mm.is_finite() || self.frame_height_mm <= 0.0 {
            return Err(FlipError::config(format!(
                "frame height must be positive, got {}mm",
                self.frame_height_mm
            )));
        }
        if !self.offset_mm.is_finite() || self.offset_mm < 0.0 {
            return Err(FlipError::config(format!(
                "offset must be non-negative, got {}mm",
                self.offset_mm
            )));
        }
        if self.dpi == 0 {
            return Err(FlipError::config("dpi must be non-zero"));
        }
        Ok((paper, printable))
    }
}

/// Static page layout computed once per run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TilingPlan {
    pub paper: PaperFormat,
    /// Pixel size frames are resampled to before placement.
    pub frame_px: PixelSize,
    pub frame_mm: Size,
    /// Frame plus offset; the grid pitch.
    pub cell_mm: Size,
    pub offset_mm: f32,
    /// Tiles per row.
    pub nx: usize,
    /// Tiles per column.
    pub ny: usize,
    pub origin: Point,
    pub far_corner: Point,
}

impl TilingPlan {
    pub fn frames_per_page(&self) -> usize {
        self.nx * self.ny
    }

    /// Top-left corner of the cell at `(column, row)`.
    pub fn cell_origin(&self, column: usize, row: usize) -> Point {
        Point::new(
            self.origin.x + column as f32 * self.cell_mm.width,
            self.origin.y + row as f32 * self.cell_mm.height,
        )
    }

    /// Number of pages needed for `frames` frames (at least one).
    pub fn page_count(&self, frames: usize) -> usize {
        frames.div_ceil(self.frames_per_page()).max(1)
    }
}

/// Compute the tile grid for frames of the given aspect ratio (width / height).
pub fn plan_tiling(params: &LayoutParams, aspect_ratio: f32) -> Result<TilingPlan> {
    let (paper, printable) = params.printable_area()?;
    if !aspect_ratio.is_finite() || aspect_ratio <= 0.0 {
        return Err(FlipError::config(format!(
            "source aspect ratio must be positive, got {aspect_ratio}"
        )));
    }

    let height = params.frame_height_mm;
    let frame_mm = Size::new(height * aspect_ratio, height);
    let cell_mm = Size::new(params.offset_mm + frame_mm.width, frame_mm.height);
    let frame_px = PixelSize::new(
        mm_to_px(frame_mm.width, params.dpi),
        mm_to_px(frame_mm.height, params.dpi),
    );

    let nx = fit_count(printable.width, cell_mm.width);
    let ny = fit_count(printable.height, cell_mm.height);
    if nx == 0 || ny == 0 {
        return Err(FlipError::config(format!(
            "a {:.2}mm x {:.2}mm tile does not fit the {:.1}mm x {:.1}mm printable area of {} paper",
            cell_mm.width, cell_mm.height, printable.width, printable.height, paper.name
        )));
    }

    let origin = Point::new(params.margins.left, params.margins.top);
    let far_corner = Point::new(
        origin.x + nx as f32 * cell_mm.width,
        origin.y + ny as f32 * cell_mm.height,
    );

    Ok(TilingPlan {
        paper,
        frame_px,
        frame_mm,
        cell_mm,
        offset_mm: params.offset_mm,
        nx,
        ny,
        origin,
        far_corner,
    })
}

/// Slack for spans that are an exact multiple of the pitch but come out a
/// hair short after `f32` subtraction (e.g. 215.9 - 2 * 10 on letter).
const FIT_TOLERANCE_MM: f64 = 1e-3;

/// Whole number of `pitch`-sized tiles that fit into `span`.
fn fit_count(span: f32, pitch: f32) -> usize {
    ((f64::from(span) + FIT_TOLERANCE_MM) / f64::from(pitch)).floor() as usize
}

fn mm_to_px(mm: f32, dpi: u32) -> u32 {
    ((mm / MM_PER_INCH * dpi as f32).round() as u32).max(1)
}
