use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io;

#[derive(Debug)]
pub enum ApngError {
    IoError(io::Error),
    NotPng,
    Malformed(String),
    UnsupportedFormat(String),
    FrameOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        canvas_width: u32,
        canvas_height: u32,
    },
    Pipeline(String),
    EmptyResult,
}

impl Error for ApngError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ApngError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for ApngError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ApngError::IoError(err) => write!(f, "I/O error: {}", err),
            ApngError::NotPng => write!(f, "Stream does not start with a PNG signature"),
            ApngError::Malformed(msg) => write!(f, "Malformed stream: {}", msg),
            ApngError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            ApngError::FrameOutOfBounds {
                x,
                y,
                width,
                height,
                canvas_width,
                canvas_height,
            } => {
                write!(
                    f,
                    "Frame region {}x{} at ({}, {}) exceeds the {}x{} canvas",
                    width, height, x, y, canvas_width, canvas_height
                )
            }
            ApngError::Pipeline(msg) => write!(f, "Pixel pipeline error: {}", msg),
            ApngError::EmptyResult => write!(f, "Stream produced no frames"),
        }
    }
}

impl From<io::Error> for ApngError {
    fn from(error: io::Error) -> Self {
        ApngError::IoError(error)
    }
}

// Result type alias for decoder operations
pub type ApngResult<T> = Result<T, ApngError>;
