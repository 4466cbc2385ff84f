//! Error type shared by every stage of the flip-book pipeline.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, FlipError>;

#[derive(thiserror::Error, Debug)]
pub enum FlipError {
    /// Invalid layout or command-line parameters. Always raised before any
    /// frame is decoded or any temporary file is created.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("transcode error: {0}")]
    Transcode(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("i/o error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl FlipError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn transcode(msg: impl Into<String>) -> Self {
        Self::Transcode(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors caused by bad parameters rather than bad media or I/O.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
