//! Pagination – walks the frame stream once and tiles it onto pages.
//!
//! Tiles fill each page in row-major order: left to right, then top to
//! bottom. When a page holds `nx * ny` tiles the next frame starts a new
//! page. Cut guides for a page are drawn exactly once, after its last tile.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage, RgbaImage};

use crate::error::Result;
use crate::geometry::{Point, TilingPlan};
use crate::sink::DocumentSink;

/// Distance of a frame label's anchor above the bottom of its tile.
const LABEL_RAISE_MM: f32 = 2.0;
const LABEL_ROTATION_DEG: f32 = 90.0;

/// Where one frame ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlacement {
    /// Running frame index across the whole run.
    pub index: usize,
    pub page: usize,
    pub column: usize,
    pub row: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationSummary {
    pub frames: usize,
    pub pages: usize,
}

/// Pagination state machine. Create with [`Paginator::start`], feed frames
/// with [`Paginator::place`] and close with [`Paginator::finish`].
pub struct Paginator<'a, S: DocumentSink> {
    plan: &'a TilingPlan,
    sink: &'a mut S,
    /// Cell of the last placed tile on the current page; `None` until the
    /// first frame.
    cursor: Option<(usize, usize)>,
    page: usize,
    next_index: usize,
}

impl<'a, S: DocumentSink> Paginator<'a, S> {
    /// Opens the first page on `sink`.
    pub fn start(plan: &'a TilingPlan, sink: &'a mut S) -> Result<Self> {
        sink.begin_page()?;
        Ok(Self {
            plan,
            sink,
            cursor: None,
            page: 0,
            next_index: 0,
        })
    }

    /// Resample `frame` and place it in the next free tile.
    pub fn place(&mut self, frame: &RgbaImage) -> Result<TilePlacement> {
        let (column, row) = self.advance()?;
        let image = prepare_frame(frame, self.plan);

        let plan = self.plan;
        let cell = plan.cell_origin(column, row);
        self.sink.place_image(
            &image,
            Point::new(cell.x + plan.offset_mm, cell.y),
            plan.frame_mm,
        )?;
        if plan.offset_mm > 0.0 {
            self.sink.place_label(
                &self.next_index.to_string(),
                Point::new(cell.x, cell.y + plan.frame_mm.height - LABEL_RAISE_MM),
                LABEL_ROTATION_DEG,
            )?;
        }

        let placed = TilePlacement {
            index: self.next_index,
            page: self.page,
            column,
            row,
        };
        self.next_index += 1;
        Ok(placed)
    }

    /// Draw the guides of a partially filled trailing page.
    pub fn finish(self) -> Result<PaginationSummary> {
        if self.cursor.is_some() {
            draw_raster(self.plan, self.sink)?;
        }
        Ok(PaginationSummary {
            frames: self.next_index,
            pages: self.page + 1,
        })
    }

    pub fn frames_placed(&self) -> usize {
        self.next_index
    }

    /// Move the cursor to the next cell, breaking the page when it is full.
    fn advance(&mut self) -> Result<(usize, usize)> {
        let next = match self.cursor {
            None => (0, 0),
            Some((column, row)) if column + 1 < self.plan.nx => (column + 1, row),
            Some((_, row)) if row + 1 < self.plan.ny => (0, row + 1),
            Some(_) => {
                draw_raster(self.plan, &mut *self.sink)?;
                self.sink.begin_page()?;
                self.page += 1;
                log::debug!("page {} full, starting page {}", self.page, self.page + 1);
                (0, 0)
            }
        };
        self.cursor = Some(next);
        Ok(next)
    }
}

/// Resample to the planned pixel size and flatten transparency onto white.
fn prepare_frame(frame: &RgbaImage, plan: &TilingPlan) -> RgbImage {
    let resized = if frame.dimensions() == (plan.frame_px.width, plan.frame_px.height) {
        frame.clone()
    } else {
        imageops::resize(
            frame,
            plan.frame_px.width,
            plan.frame_px.height,
            FilterType::Triangle,
        )
    };
    RgbImage::from_fn(resized.width(), resized.height(), |x, y| {
        let [r, g, b, a] = resized.get_pixel(x, y).0;
        let a = u16::from(a);
        let over_white = |c: u8| ((u16::from(c) * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([over_white(r), over_white(g), over_white(b)])
    })
}

/// Cut and binding guides for one page: `nx + 1` vertical cut lines (each but
/// the last followed by a binding line when there is an offset) and `ny + 1`
/// horizontal cut lines, all spanning the tile grid.
pub fn draw_raster<S: DocumentSink + ?Sized>(plan: &TilingPlan, sink: &mut S) -> Result<()> {
    let (x0, y0) = (plan.origin.x, plan.origin.y);
    let (x1, y1) = (plan.far_corner.x, plan.far_corner.y);

    for k in 0..=plan.nx {
        let x = x0 + k as f32 * plan.cell_mm.width;
        sink.draw_line(Point::new(x, y0), Point::new(x, y1))?;
        if plan.offset_mm > 0.0 && k != plan.nx {
            let xo = x + plan.offset_mm;
            sink.draw_line(Point::new(xo, y0), Point::new(xo, y1))?;
        }
    }
    for k in 0..=plan.ny {
        let y = y0 + k as f32 * plan.cell_mm.height;
        sink.draw_line(Point::new(x0, y), Point::new(x1, y))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlipError;
    use crate::geometry::{plan_tiling, LayoutParams, Size};
    use crate::placement::PlacementCommand;
    use crate::sink::RecordingSink;
    use crate::source::{FrameSource, MemorySource};

    fn plan(offset_mm: f32) -> TilingPlan {
        let params = LayoutParams {
            offset_mm,
            dpi: 20,
            ..LayoutParams::default()
        };
        plan_tiling(&params, 16.0 / 9.0).unwrap()
    }

    fn frames(n: usize) -> Vec<RgbaImage> {
        (0..n).map(|_| RgbaImage::new(16, 9)).collect()
    }

    fn run(plan: &TilingPlan, n: usize) -> (RecordingSink, Vec<TilePlacement>, PaginationSummary) {
        let mut sink = RecordingSink::new(plan.paper.size);
        let mut source = MemorySource::new(frames(n), 10.0).unwrap();
        let mut placements = Vec::new();
        let mut paginator = Paginator::start(plan, &mut sink).unwrap();
        while let Some(frame) = source.next_frame().unwrap() {
            placements.push(paginator.place(&frame).unwrap());
        }
        let summary = paginator.finish().unwrap();
        (sink, placements, summary)
    }

    fn lines_per_page(plan: &TilingPlan) -> usize {
        let binding = if plan.offset_mm > 0.0 { plan.nx } else { 0 };
        (plan.nx + 1) + binding + (plan.ny + 1)
    }

    #[test]
    fn fills_pages_row_major() {
        let plan = plan(15.0);
        assert_eq!((plan.nx, plan.ny), (4, 6));
        let (_, placements, summary) = run(&plan, 50);

        assert_eq!(summary, PaginationSummary { frames: 50, pages: 3 });
        assert_eq!(placements[0], TilePlacement { index: 0, page: 0, column: 0, row: 0 });
        assert_eq!(placements[3], TilePlacement { index: 3, page: 0, column: 3, row: 0 });
        assert_eq!(placements[4], TilePlacement { index: 4, page: 0, column: 0, row: 1 });
        assert_eq!(placements[23], TilePlacement { index: 23, page: 0, column: 3, row: 5 });
        assert_eq!(placements[24], TilePlacement { index: 24, page: 1, column: 0, row: 0 });
        assert_eq!(placements[49], TilePlacement { index: 49, page: 2, column: 1, row: 0 });
        for (i, p) in placements.iter().enumerate() {
            assert_eq!(p.index, i);
        }
    }

    #[test]
    fn each_page_gets_its_guides_exactly_once() {
        let plan = plan(15.0);
        let (sink, _, _) = run(&plan, 50);
        let layout = sink.into_layout();

        assert_eq!(layout.pages.len(), 3);
        let images: Vec<_> = layout.pages.iter().map(|p| p.image_count()).collect();
        assert_eq!(images, vec![24, 24, 2]);
        for page in &layout.pages {
            assert_eq!(page.line_count(), lines_per_page(&plan));
            // guides come after the page's last tile
            assert!(matches!(
                page.commands.last(),
                Some(PlacementCommand::Line { .. })
            ));
        }
    }

    #[test]
    fn exactly_full_page_does_not_open_another() {
        let plan = plan(15.0);
        let (sink, _, summary) = run(&plan, plan.frames_per_page());
        assert_eq!(summary.pages, 1);
        let layout = sink.into_layout();
        assert_eq!(layout.pages.len(), 1);
        assert_eq!(layout.pages[0].line_count(), lines_per_page(&plan));
    }

    #[test]
    fn no_frames_leaves_one_blank_page() {
        let plan = plan(15.0);
        let (sink, _, summary) = run(&plan, 0);
        assert_eq!(summary, PaginationSummary { frames: 0, pages: 1 });
        let layout = sink.into_layout();
        assert_eq!(layout.pages.len(), 1);
        assert!(layout.pages[0].commands.is_empty());
    }

    #[test]
    fn images_sit_right_of_the_binding_strip() {
        let plan = plan(15.0);
        let (sink, _, _) = run(&plan, 6);
        let layout = sink.into_layout();
        let positions: Vec<(f32, f32)> = layout
            .images()
            .map(|c| match c {
                PlacementCommand::Image { x, y, width, height, px_width, px_height } => {
                    assert_eq!((*width, *height), (plan.frame_mm.width, plan.frame_mm.height));
                    assert_eq!((*px_width, *px_height), (plan.frame_px.width, plan.frame_px.height));
                    (*x, *y)
                }
                _ => unreachable!(),
            })
            .collect();
        let cell = plan.cell_mm;
        assert_eq!(positions[0], (10.0 + 15.0, 10.0));
        assert!((positions[1].0 - (10.0 + cell.width + 15.0)).abs() < 1e-4);
        assert_eq!(positions[4].1, 10.0 + cell.height);
    }

    #[test]
    fn labels_number_every_frame_in_order() {
        let plan = plan(15.0);
        let (sink, _, _) = run(&plan, 30);
        let layout = sink.into_layout();
        let labels: Vec<String> = layout.labels().map(str::to_string).collect();
        let expected: Vec<String> = (0..30).map(|i| i.to_string()).collect();
        assert_eq!(labels, expected);

        let first_label = layout.pages[0]
            .commands
            .iter()
            .find(|c| matches!(c, PlacementCommand::Label { .. }))
            .unwrap();
        assert_eq!(
            first_label,
            &PlacementCommand::Label {
                text: "0".into(),
                x: 10.0,
                y: 10.0 + 30.0 - 2.0,
                rotation: 90.0,
            }
        );
    }

    #[test]
    fn zero_offset_means_no_labels_and_no_binding_lines() {
        let plan = plan(0.0);
        let (sink, _, _) = run(&plan, 3);
        let layout = sink.into_layout();
        assert_eq!(layout.labels().count(), 0);
        assert_eq!(layout.pages[0].line_count(), (plan.nx + 1) + (plan.ny + 1));
    }

    #[test]
    fn raster_spans_the_tile_grid() {
        let plan = plan(15.0);
        let mut sink = RecordingSink::new(Size::new(297.0, 210.0));
        sink.begin_page().unwrap();
        draw_raster(&plan, &mut sink).unwrap();
        let cmds = &sink.layout().pages[0].commands;
        assert_eq!(
            cmds[0],
            PlacementCommand::Line { x1: 10.0, y1: 10.0, x2: 10.0, y2: plan.far_corner.y }
        );
        assert_eq!(
            cmds[1],
            PlacementCommand::Line { x1: 25.0, y1: 10.0, x2: 25.0, y2: plan.far_corner.y }
        );
        assert_eq!(
            cmds.last().unwrap(),
            &PlacementCommand::Line {
                x1: 10.0,
                y1: plan.far_corner.y,
                x2: plan.far_corner.x,
                y2: plan.far_corner.y,
            }
        );
    }

    #[test]
    fn transparent_pixels_flatten_to_white() {
        let plan = plan(15.0);
        let clear = RgbaImage::new(plan.frame_px.width, plan.frame_px.height);
        let flat = prepare_frame(&clear, &plan);
        assert_eq!(flat.get_pixel(0, 0), &Rgb([255, 255, 255]));

        let red = RgbaImage::from_pixel(4, 4, image::Rgba([255, 0, 0, 255]));
        let flat = prepare_frame(&red, &plan);
        assert_eq!(flat.dimensions(), (plan.frame_px.width, plan.frame_px.height));
        let [r, g, b] = flat.get_pixel(1, 1).0;
        assert!(r > 250 && g < 5 && b < 5);
    }

    struct FailingSink;

    impl DocumentSink for FailingSink {
        fn begin_page(&mut self) -> Result<()> {
            Ok(())
        }
        fn place_image(&mut self, _: &RgbImage, _: Point, _: Size) -> Result<()> {
            Err(FlipError::render("sink full"))
        }
        fn place_label(&mut self, _: &str, _: Point, _: f32) -> Result<()> {
            Ok(())
        }
        fn draw_line(&mut self, _: Point, _: Point) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_errors_propagate() {
        let plan = plan(15.0);
        let mut sink = FailingSink;
        let mut paginator = Paginator::start(&plan, &mut sink).unwrap();
        let err = paginator.place(&RgbaImage::new(16, 9)).unwrap_err();
        assert!(matches!(err, FlipError::Render(_)));
    }
}
