//! Pipeline – ties together probing, planning, decoding, pagination and PDF
//! rendering into a single call.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{FlipError, Result};
use crate::geometry::{plan_tiling, LayoutParams, TilingPlan};
use crate::pagination::{PaginationSummary, Paginator};
use crate::placement::FlipbookLayout;
use crate::render::{DocumentInfo, PdfSink};
use crate::sink::{DocumentSink, RecordingSink};
use crate::source::{open_source, probe_source, FrameSource, MediaProbe};

const PROGRESS_BAR_WIDTH: usize = 30;

/// Configuration for one flip-book run.
#[derive(Debug, Clone)]
pub struct FlipbookConfig {
    pub source: PathBuf,
    pub output: PathBuf,
    pub layout: LayoutParams,
    /// Target frame rate for video sources; `0` keeps the native rate.
    pub fps: u32,
    /// 0 = silent, ≥ 1 draws a progress bar on stderr.
    pub verbosity: u8,
    pub title: String,
    pub author: String,
    /// Directory the per-run scratch directory is created in; `None` uses
    /// the system temp directory.
    pub scratch_root: Option<PathBuf>,
}

impl Default for FlipbookConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            output: PathBuf::from("flip-book.pdf"),
            layout: LayoutParams::default(),
            fps: 10,
            verbosity: 1,
            title: "Flip-book".to_string(),
            author: String::new(),
            scratch_root: None,
        }
    }
}

impl FlipbookConfig {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Parameter checks that need neither the source nor the filesystem.
    pub fn validate(&self) -> Result<()> {
        self.layout.validate()?;
        if self.output.as_os_str().is_empty() {
            return Err(FlipError::config("output path must not be empty"));
        }
        Ok(())
    }

    fn document_info(&self) -> DocumentInfo {
        DocumentInfo {
            title: self.title.clone(),
            author: self.author.clone(),
            ..DocumentInfo::default()
        }
    }
}

/// What a successful [`process`] produced.
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub plan: TilingPlan,
    pub frames: usize,
    pub pages: usize,
    pub output: PathBuf,
    pub bytes: usize,
}

/// Full pipeline: source file → flip-book PDF on disk.
///
/// Transient files (a transcoded video) live in a scratch directory that is
/// removed when this function returns, whether it succeeds or fails.
pub fn process(config: &FlipbookConfig) -> Result<ProcessReport> {
    let (probe, plan) = prepare(config)?;

    let mut sink = PdfSink::new(plan.paper.size, &config.document_info());
    let summary = with_scratch(config.scratch_root.as_deref(), |scratch| {
        let mut source = open_source(&probe, config.fps, scratch)?;
        paginate_source(source.as_mut(), &plan, &mut sink, config.verbosity)
    })?;

    log::info!("Generating PDF ({} pages) ...", sink.page_count());
    let bytes = sink.into_bytes();
    write_output(&config.output, &bytes)?;
    log::info!(
        "Wrote '{}' ({} bytes, {} page{})",
        config.output.display(),
        bytes.len(),
        summary.pages,
        if summary.pages == 1 { "" } else { "s" }
    );

    Ok(ProcessReport {
        plan,
        frames: summary.frames,
        pages: summary.pages,
        output: config.output.clone(),
        bytes: bytes.len(),
    })
}

/// Lay the flip-book out without rendering or writing anything.
pub fn dry_run(config: &FlipbookConfig) -> Result<FlipbookLayout> {
    let (probe, plan) = prepare(config)?;
    let mut sink = RecordingSink::new(plan.paper.size);
    with_scratch(config.scratch_root.as_deref(), |scratch| {
        let mut source = open_source(&probe, config.fps, scratch)?;
        paginate_source(source.as_mut(), &plan, &mut sink, config.verbosity)
    })?;
    let mut layout = sink.into_layout();
    layout.title = config.title.clone();
    Ok(layout)
}

/// Validate, probe and plan. Nothing is decoded and no file is created.
fn prepare(config: &FlipbookConfig) -> Result<(MediaProbe, TilingPlan)> {
    config.validate()?;
    log::info!("Opening {} ...", config.source.display());
    let probe = probe_source(&config.source)?;
    let plan = plan_tiling(&config.layout, probe.aspect_ratio())?;
    log::info!(
        "Input:  {:.3} fps, {}x{} from: {}",
        probe.frame_rate,
        probe.size.width,
        probe.size.height,
        probe.path.display()
    );
    log::info!(
        "Output: {}dpi, {}x{}, {:.2}mm x {:.2}mm, {}x{} tiles on {}",
        config.layout.dpi,
        plan.frame_px.width,
        plan.frame_px.height,
        plan.frame_mm.width,
        plan.frame_mm.height,
        plan.nx,
        plan.ny,
        plan.paper.name
    );
    Ok((probe, plan))
}

/// Run `f` with a fresh scratch directory that is deleted afterwards.
fn with_scratch<T>(root: Option<&Path>, f: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
    let root = root.map_or_else(std::env::temp_dir, Path::to_path_buf);
    let scratch = tempfile::Builder::new()
        .prefix("flipforge-")
        .tempdir_in(&root)
        .map_err(|e| FlipError::io(&root, e))?;
    log::debug!("scratch directory: {}", scratch.path().display());
    let result = f(scratch.path());
    if let Err(e) = scratch.close() {
        log::warn!("could not remove scratch directory: {e}");
    }
    result
}

/// Feed every frame of `source` through a [`Paginator`] into `sink`.
pub fn paginate_source<S: DocumentSink>(
    source: &mut dyn FrameSource,
    plan: &TilingPlan,
    sink: &mut S,
    verbosity: u8,
) -> Result<PaginationSummary> {
    let total = source.frame_count();
    log::info!(
        "{total} frames at {:.3} fps, {} per page, {} page{}",
        source.frame_rate(),
        plan.frames_per_page(),
        plan.page_count(total),
        if plan.page_count(total) == 1 { "" } else { "s" }
    );
    let mut progress = Progress::new(total, verbosity);
    let mut paginator = Paginator::start(plan, sink)?;
    while let Some(frame) = source.next_frame()? {
        paginator.place(&frame)?;
        progress.update(paginator.frames_placed());
    }
    progress.finish();
    paginator.finish()
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| FlipError::io(parent, e))?;
        }
    }
    fs::write(path, bytes).map_err(|e| FlipError::io(path, e))
}

/// Console progress bar, redrawn in place on stderr.
struct Progress {
    total: usize,
    enabled: bool,
    drawn: bool,
}

impl Progress {
    fn new(total: usize, verbosity: u8) -> Self {
        Self {
            total,
            enabled: verbosity > 0,
            drawn: false,
        }
    }

    fn update(&mut self, done: usize) {
        if !self.enabled {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r{}", progress_line(done, self.total));
        let _ = stderr.flush();
        self.drawn = true;
    }

    fn finish(&mut self) {
        if self.drawn {
            eprintln!();
        }
    }
}

fn progress_line(done: usize, total: usize) -> String {
    let ready = if total == 0 {
        1.0
    } else {
        (done as f64 / total as f64).min(1.0)
    };
    let filled = (PROGRESS_BAR_WIDTH as f64 * ready) as usize;
    format!(
        "Processing frames |{:<width$}| {}%",
        "X".repeat(filled),
        (100.0 * ready) as usize,
        width = PROGRESS_BAR_WIDTH
    )
}
