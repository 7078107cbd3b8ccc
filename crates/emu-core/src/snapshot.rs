//! Snapshot module codec.
//!
//! A snapshot is a sequence of modules, one per chip. Each module is a
//! named, versioned block:
//!
//! | Offset | Size | Field                                      |
//! |--------|------|--------------------------------------------|
//! | 0      | 16   | Name, ASCII, zero padded                   |
//! | 16     | 1    | Major version                              |
//! | 17     | 1    | Minor version                              |
//! | 18     | 4    | Total size including this header (LE)      |
//! | 22     | n    | Body                                       |
//!
//! Multi-byte body fields are little-endian. The name and major version are
//! the compatibility contract: readers reject a major version they do not
//! know instead of guessing at the layout. Minor versions only append fields.

use std::fmt;
use std::io::{self, Read, Write};

/// Length of the zero-padded module name.
pub const MODULE_NAME_LEN: usize = 16;

/// Header size: name, major, minor, size.
pub const MODULE_HEADER_LEN: usize = MODULE_NAME_LEN + 2 + 4;

/// Errors from reading or writing a snapshot module.
#[derive(Debug)]
pub enum SnapshotError {
    /// The underlying stream failed.
    Io(io::Error),
    /// The next module in the stream has a different name.
    WrongModule { expected: String, found: String },
    /// The module's major version is not the one this reader understands.
    UnsupportedMajor {
        module: String,
        expected: u8,
        found: u8,
    },
    /// The stream or module body ended early.
    Truncated { module: String },
    /// The body decoded but its contents are inconsistent.
    Corrupt { module: String, reason: String },
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "snapshot I/O error: {e}"),
            Self::WrongModule { expected, found } => {
                write!(f, "expected snapshot module {expected:?}, found {found:?}")
            }
            Self::UnsupportedMajor {
                module,
                expected,
                found,
            } => write!(
                f,
                "snapshot module {module:?} has major version {found}, expected {expected}"
            ),
            Self::Truncated { module } => write!(f, "snapshot module {module:?} is truncated"),
            Self::Corrupt { module, reason } => {
                write!(f, "snapshot module {module:?} is corrupt: {reason}")
            }
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SnapshotError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Builds one module body, then emits header and body together.
#[derive(Debug, Clone)]
pub struct ModuleWriter {
    name: String,
    major: u8,
    minor: u8,
    body: Vec<u8>,
}

impl ModuleWriter {
    /// Names longer than [`MODULE_NAME_LEN`] bytes are cut.
    #[must_use]
    pub fn new(name: &str, major: u8, minor: u8) -> Self {
        debug_assert!(name.len() <= MODULE_NAME_LEN, "module name too long: {name}");
        Self {
            name: name.to_string(),
            major,
            minor,
            body: Vec::new(),
        }
    }

    pub fn write_byte(&mut self, value: u8) {
        self.body.push(value);
    }

    pub fn write_word(&mut self, value: u16) {
        self.body.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_dword(&mut self, value: u32) {
        self.body.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Write the finished module to `out`.
    pub fn finish<W: Write>(self, out: &mut W) -> Result<(), SnapshotError> {
        let mut name = [0u8; MODULE_NAME_LEN];
        let len = self.name.len().min(MODULE_NAME_LEN);
        name[..len].copy_from_slice(&self.name.as_bytes()[..len]);

        let size = u32::try_from(MODULE_HEADER_LEN + self.body.len()).map_err(|_| {
            SnapshotError::Corrupt {
                module: self.name.clone(),
                reason: "body exceeds 4 GiB".to_string(),
            }
        })?;

        out.write_all(&name)?;
        out.write_all(&[self.major, self.minor])?;
        out.write_all(&size.to_le_bytes())?;
        out.write_all(&self.body)?;
        Ok(())
    }
}

/// One module read from a stream, with a cursor over its body.
#[derive(Debug, Clone)]
pub struct ModuleReader {
    name: String,
    major: u8,
    minor: u8,
    body: Vec<u8>,
    pos: usize,
}

impl ModuleReader {
    /// Read the next module from `input` and check that it is `expected`.
    pub fn open<R: Read>(input: &mut R, expected: &str) -> Result<Self, SnapshotError> {
        let truncated = |e: io::Error| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                SnapshotError::Truncated {
                    module: expected.to_string(),
                }
            } else {
                SnapshotError::Io(e)
            }
        };

        let mut header = [0u8; MODULE_HEADER_LEN];
        input.read_exact(&mut header).map_err(truncated)?;

        let name_end = header[..MODULE_NAME_LEN]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MODULE_NAME_LEN);
        let found = String::from_utf8_lossy(&header[..name_end]).into_owned();
        if found != expected {
            return Err(SnapshotError::WrongModule {
                expected: expected.to_string(),
                found,
            });
        }

        let major = header[MODULE_NAME_LEN];
        let minor = header[MODULE_NAME_LEN + 1];
        let mut size = [0u8; 4];
        size.copy_from_slice(&header[MODULE_NAME_LEN + 2..]);
        let size = u32::from_le_bytes(size) as usize;
        let Some(body_len) = size.checked_sub(MODULE_HEADER_LEN) else {
            return Err(SnapshotError::Corrupt {
                module: found,
                reason: format!("size field {size} is smaller than the header"),
            });
        };

        // The size field is untrusted; only allocate what actually arrives.
        let mut body = Vec::new();
        input.by_ref().take(body_len as u64).read_to_end(&mut body)?;
        if body.len() < body_len {
            return Err(SnapshotError::Truncated { module: found });
        }

        Ok(Self {
            name: found,
            major,
            minor,
            body,
            pos: 0,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn major(&self) -> u8 {
        self.major
    }

    #[must_use]
    pub fn minor(&self) -> u8 {
        self.minor
    }

    /// Fail unless the module's major version is exactly `major`.
    pub fn require_major(&self, major: u8) -> Result<(), SnapshotError> {
        if self.major == major {
            Ok(())
        } else {
            Err(SnapshotError::UnsupportedMajor {
                module: self.name.clone(),
                expected: major,
                found: self.major,
            })
        }
    }

    /// Body bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.body.len() - self.pos
    }

    pub fn read_byte(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_word(&mut self) -> Result<u16, SnapshotError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_dword(&mut self) -> Result<u32, SnapshotError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_bytes(&mut self, out: &mut [u8]) -> Result<(), SnapshotError> {
        let bytes = self.take(out.len())?;
        out.copy_from_slice(bytes);
        Ok(())
    }

    /// Build a [`SnapshotError::Corrupt`] naming this module.
    #[must_use]
    pub fn corrupt(&self, reason: impl Into<String>) -> SnapshotError {
        SnapshotError::Corrupt {
            module: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn take(&mut self, len: usize) -> Result<&[u8], SnapshotError> {
        if self.remaining() < len {
            return Err(SnapshotError::Truncated {
                module: self.name.clone(),
            });
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.body[start..self.pos])
    }
}
