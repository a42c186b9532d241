use std::fmt;

/// Three-digit reply codes this protocol subset actually emits.
///
/// The full RFC defines many more (227 EPSV, 332 ACCT, ...); this crate only
/// implements USER/PASS/PORT/STOR/RETR/LIST/CWD/PWD/QUIT, so only the codes
/// those commands can produce are listed here.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum Code {
    FileStatusOk = 150,
    Ok = 200,
    CommandNotImplemented = 202,
    ServiceReadyForNewUser = 220,
    ServiceClosing = 221,
    ClosingDataConnection = 226,
    UserLoggedIn = 230,
    PathNameCreated = 257,
    UserNameOkPasswordNeeded = 331,
    CannotOpenDataConnection = 425,
    InvalidParametersOrArguments = 501,
    BadSequenceOfCommands = 503,
    NotLoggedIn = 530,
    FileUnavailable = 550,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u16)
    }
}

impl Code {
    /// Parses the three leading ASCII digits of a reply line, as read by the client.
    pub fn from_bytes(bytes: [u8; 3]) -> Option<Self> {
        let s = std::str::from_utf8(&bytes).ok()?;
        let n: u16 = s.parse().ok()?;
        Some(match n {
            150 => Code::FileStatusOk,
            200 => Code::Ok,
            202 => Code::CommandNotImplemented,
            220 => Code::ServiceReadyForNewUser,
            221 => Code::ServiceClosing,
            226 => Code::ClosingDataConnection,
            230 => Code::UserLoggedIn,
            257 => Code::PathNameCreated,
            331 => Code::UserNameOkPasswordNeeded,
            425 => Code::CannotOpenDataConnection,
            501 => Code::InvalidParametersOrArguments,
            503 => Code::BadSequenceOfCommands,
            530 => Code::NotLoggedIn,
            550 => Code::FileUnavailable,
            _ => return None,
        })
    }
}
