//! PDF sink – turns placement commands into PDF pages using `printpdf`
//! (v0.8 ops-based API).

use std::io::Cursor;

use image::{ImageFormat, RgbImage};
use printpdf::{
    BuiltinFont, Color, Line, LinePoint, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions,
    PdfWarnMsg, Point as PdfPoint, Pt, RawImage, Rgb, TextItem, TextMatrix, XObjectTransform,
};

use crate::error::{FlipError, Result};
use crate::geometry::{Point, Size, MM_PER_INCH};
use crate::sink::DocumentSink;

const PT_PER_MM: f32 = 72.0 / MM_PER_INCH;

/// Guide line colour (mid grey) and width.
const LINE_GREY: f32 = 128.0 / 255.0;
const LINE_WIDTH_MM: f32 = 0.1;

const LABEL_FONT: BuiltinFont = BuiltinFont::Helvetica;
const LABEL_FONT_SIZE_PT: f32 = 12.0;
/// Labels are drawn this far to the right of their anchor so the number
/// sits inside the binding strip rather than on the cut line.
const LABEL_BASELINE_SHIFT_MM: f32 = 5.0;

fn pt(mm: f32) -> Pt {
    Pt(mm * PT_PER_MM)
}

/// Metadata embedded in the PDF info dictionary.
#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub title: String,
    pub author: String,
    pub creator: String,
    pub keywords: Vec<String>,
}

impl Default for DocumentInfo {
    fn default() -> Self {
        Self {
            title: "Flip-book".to_string(),
            author: String::new(),
            creator: "flipforge".to_string(),
            keywords: vec![
                "flip-book".to_string(),
                "video".to_string(),
                "animated GIF".to_string(),
            ],
        }
    }
}

/// Document sink that builds a PDF in memory.
pub struct PdfSink {
    doc: PdfDocument,
    page_size: Size,
    pages: Vec<PdfPage>,
    /// Ops of the page currently being drawn.
    ops: Option<Vec<Op>>,
    warnings: Vec<PdfWarnMsg>,
}

impl PdfSink {
    /// `page_size` is in millimetres, already in landscape orientation.
    pub fn new(page_size: Size, info: &DocumentInfo) -> Self {
        let mut doc = PdfDocument::new(&info.title);
        doc.metadata.info.author = info.author.clone();
        doc.metadata.info.creator = info.creator.clone();
        doc.metadata.info.keywords = info.keywords.clone();
        Self {
            doc,
            page_size,
            pages: Vec::new(),
            ops: None,
            warnings: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len() + usize::from(self.ops.is_some())
    }

    /// Finish the last page and serialise the document.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.flush_page();
        if self.pages.is_empty() {
            let blank = self.empty_page(Vec::new());
            self.pages.push(blank);
        }
        let pages = std::mem::take(&mut self.pages);
        self.doc.with_pages(pages);
        let bytes = self.doc.save(&PdfSaveOptions::default(), &mut self.warnings);
        for w in &self.warnings {
            log::debug!("printpdf: {w:?}");
        }
        bytes
    }

    fn empty_page(&self, ops: Vec<Op>) -> PdfPage {
        PdfPage::new(Mm(self.page_size.width), Mm(self.page_size.height), ops)
    }

    fn flush_page(&mut self) {
        if let Some(ops) = self.ops.take() {
            let page = self.empty_page(ops);
            self.pages.push(page);
        }
    }

    fn current_ops(&mut self) -> Result<&mut Vec<Op>> {
        self.ops
            .as_mut()
            .ok_or_else(|| FlipError::render("drawing command issued before the first page"))
    }

    /// Top-left based millimetres to PDF's bottom-left based points.
    fn to_pdf(&self, p: Point) -> PdfPoint {
        PdfPoint {
            x: pt(p.x),
            y: pt(self.page_size.height - p.y),
        }
    }
}

impl DocumentSink for PdfSink {
    fn begin_page(&mut self) -> Result<()> {
        self.flush_page();
        let grey = Color::Rgb(Rgb {
            r: LINE_GREY,
            g: LINE_GREY,
            b: LINE_GREY,
            icc_profile: None,
        });
        self.ops = Some(vec![
            Op::SetOutlineColor { col: grey },
            Op::SetOutlineThickness {
                pt: pt(LINE_WIDTH_MM),
            },
        ]);
        Ok(())
    }

    fn place_image(&mut self, image: &RgbImage, at: Point, size: Size) -> Result<()> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        let raw = RawImage::decode_from_bytes(&png, &mut self.warnings)
            .map_err(|e| FlipError::render(format!("PDF image encode error: {e}")))?;
        let xobj_id = self.doc.add_image(&raw);

        // At dpi=72 printpdf renders 1 px = 1 pt, so scale = desired_pt / px.
        let scale_x = pt(size.width).0 / image.width().max(1) as f32;
        let scale_y = pt(size.height).0 / image.height().max(1) as f32;
        let bottom_left = self.to_pdf(Point::new(at.x, at.y + size.height));

        self.current_ops()?.push(Op::UseXobject {
            id: xobj_id,
            transform: XObjectTransform {
                translate_x: Some(bottom_left.x),
                translate_y: Some(bottom_left.y),
                dpi: Some(72.0),
                scale_x: Some(scale_x),
                scale_y: Some(scale_y),
                rotate: None,
            },
        });
        Ok(())
    }

    fn place_label(&mut self, text: &str, at: Point, rotation_deg: f32) -> Result<()> {
        let origin = self.to_pdf(Point::new(at.x + LABEL_BASELINE_SHIFT_MM, at.y));
        let ops = self.current_ops()?;
        ops.push(Op::StartTextSection);
        ops.push(Op::SetTextMatrix {
            matrix: TextMatrix::TranslateRotate(origin.x, origin.y, rotation_deg),
        });
        ops.push(Op::SetFontSizeBuiltinFont {
            size: Pt(LABEL_FONT_SIZE_PT),
            font: LABEL_FONT,
        });
        ops.push(Op::SetFillColor {
            col: Color::Rgb(Rgb {
                r: 0.0,
                g: 0.0,
                b: 0.0,
                icc_profile: None,
            }),
        });
        ops.push(Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text(text.to_string())],
            font: LABEL_FONT,
        });
        ops.push(Op::EndTextSection);
        Ok(())
    }

    fn draw_line(&mut self, from: Point, to: Point) -> Result<()> {
        let points = vec![
            LinePoint {
                p: self.to_pdf(from),
                bezier: false,
            },
            LinePoint {
                p: self.to_pdf(to),
                bezier: false,
            },
        ];
        self.current_ops()?.push(Op::DrawLine {
            line: Line {
                points,
                is_closed: false,
            },
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a4() -> Size {
        Size::new(297.0, 210.0)
    }

    #[test]
    fn empty_document_still_has_a_page() {
        let sink = PdfSink::new(a4(), &DocumentInfo::default());
        let bytes = sink.into_bytes();
        assert!(bytes.len() > 100, "PDF should have content");
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn renders_images_labels_and_lines() {
        let mut sink = PdfSink::new(a4(), &DocumentInfo::default());
        sink.begin_page().unwrap();
        let frame = RgbImage::from_pixel(8, 6, image::Rgb([200, 10, 10]));
        sink.place_image(&frame, Point::new(25.0, 10.0), Size::new(40.0, 30.0))
            .unwrap();
        sink.place_label("0", Point::new(10.0, 38.0), 90.0).unwrap();
        sink.draw_line(Point::new(10.0, 10.0), Point::new(10.0, 40.0))
            .unwrap();
        sink.begin_page().unwrap();
        assert_eq!(sink.page_count(), 2);

        let bytes = sink.into_bytes();
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn drawing_without_a_page_fails() {
        let mut sink = PdfSink::new(a4(), &DocumentInfo::default());
        let err = sink
            .draw_line(Point::new(0.0, 0.0), Point::new(1.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, FlipError::Render(_)));
    }

    #[test]
    fn millimetres_map_to_bottom_left_points() {
        let sink = PdfSink::new(a4(), &DocumentInfo::default());
        let p = sink.to_pdf(Point::new(25.4, 210.0));
        assert!((p.x.0 - 72.0).abs() < 1e-3);
        assert!(p.y.0.abs() < 1e-3);
    }
}
