use std::fmt;
use std::io;

use crate::response::Code;

/// Everything that can go wrong while servicing one control connection.
///
/// `Protocol` variants are reportable: the caller turns them into a numbered
/// reply and keeps the session alive. `Fatal` means the control channel (or
/// the process, at startup) cannot continue.
#[derive(Debug)]
pub enum FtpError {
    Protocol { code: Code, message: String },
    Fatal(io::Error),
}

impl FtpError {
    pub fn protocol(code: Code, message: impl Into<String>) -> Self {
        FtpError::Protocol {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FtpError::Protocol { code, message } => write!(f, "{} {}", code, message),
            FtpError::Fatal(e) => write!(f, "fatal: {}", e),
        }
    }
}

impl std::error::Error for FtpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FtpError::Fatal(e) => Some(e),
            FtpError::Protocol { .. } => None,
        }
    }
}

impl From<io::Error> for FtpError {
    fn from(e: io::Error) -> Self {
        FtpError::Fatal(e)
    }
}
