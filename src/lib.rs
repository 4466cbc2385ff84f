//! # flip-forge – printable flip-books from videos and animated GIFs
//!
//! The pipeline stages are:
//!
//! 1. **Probe** – read the source's size and frame rate ([`source`])
//! 2. **Plan** – derive the tile grid for the chosen paper ([`geometry`])
//! 3. **Decode** – stream frames, compositing GIF deltas ([`source`])
//! 4. **Paginate** – assign frames to page cells and draw cut guides ([`pagination`])
//! 5. **Render** – emit PDF bytes via printpdf ([`render`])
//!
//! [`pipeline::process`] runs all of them.

pub mod error;
pub mod geometry;
pub mod pagination;
pub mod pipeline;
pub mod placement;
pub mod render;
pub mod sink;
pub mod source;

// Re-exports for convenience
pub use error::{FlipError, Result};
pub use geometry::{plan_tiling, LayoutParams, Margin, TilingPlan};
pub use pipeline::{dry_run, process, FlipbookConfig, ProcessReport};
