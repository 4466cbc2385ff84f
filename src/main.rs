//! flipforge – command-line flip-book generator.
//!
//! Usage:
//!   flipforge <video-or-gif> [--out flip-book.pdf] [--paper a4] [--height 30]
//!             [--offset 15] [--dpi 200] [--fps 10] [-v [LEVEL]]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use flip_forge::geometry::{LayoutParams, Margin};
use flip_forge::pipeline::{dry_run, process, FlipbookConfig};

#[derive(Parser, Debug)]
#[command(name = "flipforge", version, about = "Generate flip-books from videos and animated GIFs.")]
struct Cli {
    /// Video or animated GIF to process.
    #[arg(required_unless_present = "phena")]
    source: Option<PathBuf>,

    /// PDF file to write to.
    #[arg(long, default_value = "flip-book.pdf")]
    out: PathBuf,

    /// Height of each flip-book frame [mm].
    #[arg(long, default_value_t = 30.0)]
    height: f32,

    /// Paper size (a5, a4, a3, letter, legal).
    #[arg(long, default_value = "a4")]
    paper: String,

    /// Binding margin left of each frame [mm].
    #[arg(long, default_value_t = 15.0)]
    offset: f32,

    /// Page margin on all four sides [mm].
    #[arg(long, default_value_t = 10.0)]
    margin: f32,

    /// Resolution frames are resampled to.
    #[arg(long, default_value_t = 200)]
    dpi: u32,

    /// Frames per second to sample videos at.
    #[arg(long, default_value_t = 10)]
    fps: u32,

    /// Document title embedded in the PDF metadata.
    #[arg(long, default_value = "Flip-book")]
    title: String,

    /// Document author embedded in the PDF metadata.
    #[arg(long, default_value = "")]
    author: String,

    /// Print the page layout as JSON instead of writing a PDF.
    #[arg(long)]
    dry_run: bool,

    /// Create a PDF for a phenakistoscope (not supported yet).
    #[arg(long)]
    phena: bool,

    /// Verbosity level (0 = silent).
    #[arg(
        short = 'v',
        value_name = "LEVEL",
        num_args = 0..=1,
        default_value_t = 1,
        default_missing_value = "1"
    )]
    verbosity: u8,
}

impl Cli {
    fn into_config(self, source: PathBuf) -> FlipbookConfig {
        FlipbookConfig {
            source,
            output: self.out,
            layout: LayoutParams {
                paper: self.paper,
                margins: Margin::uniform(self.margin),
                frame_height_mm: self.height,
                offset_mm: self.offset,
                dpi: self.dpi,
            },
            fps: self.fps,
            verbosity: self.verbosity,
            title: self.title,
            author: self.author,
            scratch_root: None,
        }
    }
}

fn log_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "off",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.phena {
        eprintln!("Phenakistoscope not supported yet.");
        return ExitCode::FAILURE;
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(cli.verbosity)),
    )
    .format_target(false)
    .format_timestamp(None)
    .init();

    let Some(source) = cli.source.clone() else {
        eprintln!("Error: no source file specified.");
        return ExitCode::FAILURE;
    };
    let dry = cli.dry_run;
    let config = cli.into_config(source);

    let outcome = if dry {
        dry_run(&config).map(|layout| println!("{}", layout.to_json()))
    } else {
        process(&config).map(|report| {
            log::info!(
                "{} frames on {} page{} ({}x{} per page)",
                report.frames,
                report.pages,
                if report.pages == 1 { "" } else { "s" },
                report.plan.nx,
                report.plan.ny
            );
        })
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let cli = Cli::try_parse_from(["flipforge", "clip.mp4"]).unwrap();
        assert_eq!(cli.out, PathBuf::from("flip-book.pdf"));
        assert_eq!(cli.height, 30.0);
        assert_eq!(cli.paper, "a4");
        assert_eq!(cli.offset, 15.0);
        assert_eq!(cli.dpi, 200);
        assert_eq!(cli.fps, 10);
        assert_eq!(cli.verbosity, 1);
        assert!(!cli.phena);
    }

    #[test]
    fn verbosity_value_is_optional() {
        let bare = Cli::try_parse_from(["flipforge", "clip.gif", "-v"]).unwrap();
        assert_eq!(bare.verbosity, 1);
        let silent = Cli::try_parse_from(["flipforge", "clip.gif", "-v", "0"]).unwrap();
        assert_eq!(silent.verbosity, 0);
        assert_eq!(log_filter(0), "off");
        assert_eq!(log_filter(5), "trace");
    }

    #[test]
    fn phena_needs_no_source() {
        let cli = Cli::try_parse_from(["flipforge", "--phena"]).unwrap();
        assert!(cli.phena);
        assert!(cli.source.is_none());
        assert!(Cli::try_parse_from(["flipforge"]).is_err());
    }

    #[test]
    fn config_carries_layout_options() {
        let cli = Cli::try_parse_from([
            "flipforge", "in.gif", "--paper", "letter", "--margin", "5", "--height", "25",
        ])
        .unwrap();
        let config = cli.into_config(PathBuf::from("in.gif"));
        assert_eq!(config.layout.paper, "letter");
        assert_eq!(config.layout.margins, Margin::uniform(5.0));
        assert_eq!(config.layout.frame_height_mm, 25.0);
    }

    #[test]
    fn author_reaches_the_document_metadata() {
        let cli = Cli::try_parse_from(["flipforge", "in.gif", "--author", "Jane Roe"]).unwrap();
        let config = cli.into_config(PathBuf::from("in.gif"));
        assert_eq!(config.author, "Jane Roe");

        let unset = Cli::try_parse_from(["flipforge", "in.gif"]).unwrap();
        assert_eq!(unset.into_config(PathBuf::from("in.gif")).author, "");
    }
}
