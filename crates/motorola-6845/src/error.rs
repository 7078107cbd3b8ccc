//! Controller construction errors.

use std::fmt;
use std::io;

/// Failure to build a [`Palette`](crate::Palette).
#[derive(Debug)]
pub enum PaletteError {
    Io(io::Error),
    /// A line is not `RR GG BB [dither]` in hex.
    Syntax { line: usize, reason: String },
    TooFewEntries { found: usize, required: usize },
}

impl fmt::Display for PaletteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "cannot read palette: {e}"),
            Self::Syntax { line, reason } => write!(f, "palette line {line}: {reason}"),
            Self::TooFewEntries { found, required } => {
                write!(f, "palette has {found} entries, need {required}")
            }
        }
    }
}

impl std::error::Error for PaletteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PaletteError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// The controller could not be created with the given configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Frame buffer line width outside `1..=max` columns.
    Columns { requested: usize, max: usize },
    Palette(PaletteError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Columns { requested, max } => {
                write!(f, "unsupported line width of {requested} columns (1-{max})")
            }
            Self::Palette(e) => write!(f, "invalid palette: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Palette(e) => Some(e),
            Self::Columns { .. } => None,
        }
    }
}

impl From<PaletteError> for ConfigError {
    fn from(e: PaletteError) -> Self {
        Self::Palette(e)
    }
}
