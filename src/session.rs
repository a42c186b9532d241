use std::io::{self, BufRead, BufReader};
use std::net::{Ipv4Addr, SocketAddrV4, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::codec::{self, ControlWriter};
use crate::credentials::CredentialStore;
use crate::error::FtpError;
use crate::response::Code;
use crate::sandbox;
use crate::transfer::{self, TransferKind};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub type SessionId = u64;

/// Authentication phase of one control connection, per §3/§4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NeedUser,
    NeedPass,
    Authenticated,
}

/// One control connection's full state: the phase/identity/current_dir/
/// pending_data_endpoint tuple from §3, plus the I/O handles to drive it.
pub struct Session {
    id: SessionId,
    reader: BufReader<TcpStream>,
    writer: ControlWriter,
    credentials: Arc<CredentialStore>,
    phase: Phase,
    username: Option<String>,
    current_dir: PathBuf,
    user_root: PathBuf,
    pending_data_endpoint: Option<SocketAddrV4>,
}

impl Session {
    pub fn new(stream: TcpStream, credentials: Arc<CredentialStore>) -> io::Result<Self> {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let reader = BufReader::new(stream.try_clone()?);
        let writer = ControlWriter::new(stream);

        let session = Self {
            id,
            reader,
            writer,
            credentials,
            phase: Phase::NeedUser,
            username: None,
            current_dir: PathBuf::new(),
            user_root: PathBuf::new(),
            pending_data_endpoint: None,
        };

        session
            .writer
            .send_line(&format!("{} Service ready for new user.", Code::ServiceReadyForNewUser))?;

        Ok(session)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Reads and dispatches commands until QUIT or the peer closes.
    pub fn run(&mut self) {
        loop {
            let line = match codec::recv_line(&mut self.reader) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("session {}: peer closed control connection", self.id);
                    return;
                }
                Err(e) => {
                    warn!("session {}: control read failed: {}", self.id, e);
                    return;
                }
            };

            if line.is_empty() {
                continue;
            }

            match self.dispatch(&line) {
                Ok(Continue::Keep) => {}
                Ok(Continue::Quit) => {
                    info!("session {}: closed by QUIT", self.id);
                    return;
                }
                Err(e) => {
                    warn!("session {}: fatal error handling {:?}: {}", self.id, line, e);
                    return;
                }
            }
        }
    }

    fn reply(&self, code: Code, message: &str) -> Result<(), FtpError> {
        self.writer
            .send_line(&format!("{} {}", code, message))
            .map_err(FtpError::from)
    }

    fn is_authenticated(&self) -> bool {
        self.phase == Phase::Authenticated
    }

    fn dispatch(&mut self, line: &str) -> Result<Continue, FtpError> {
        let (cmd, arg) = match line.split_once(' ') {
            Some((cmd, rest)) => (cmd, rest.trim_start()),
            None => (line, ""),
        };

        debug!("session {}: command {:?} arg {:?}", self.id, cmd, arg);

        let outcome = match cmd {
            "USER" => self.handle_user(arg),
            "PASS" => self.handle_pass(arg),
            "PORT" => self.handle_port(arg),
            "STOR" => self.handle_stor(arg),
            "RETR" => self.handle_retr(arg),
            "LIST" => self.handle_list(),
            "CWD" => self.handle_cwd(arg),
            "PWD" => self.handle_pwd(),
            "QUIT" => return self.handle_quit(),
            _ => self.reply(Code::CommandNotImplemented, "Command not implemented."),
        };

        match outcome {
            Ok(()) => Ok(Continue::Keep),
            Err(e) => Err(e),
        }
    }

    fn handle_user(&mut self, arg: &str) -> Result<(), FtpError> {
        if self.phase != Phase::NeedUser {
            return self.reply(Code::BadSequenceOfCommands, "Bad sequence of commands.");
        }
        if arg.is_empty() {
            return self.reply(Code::NotLoggedIn, "Username may not be empty.");
        }
        if !self.credentials.contains(arg) {
            self.phase = Phase::NeedUser;
            self.username = None;
            return self.reply(Code::NotLoggedIn, "User does not exist.");
        }

        self.username = Some(arg.to_owned());
        self.phase = Phase::NeedPass;
        self.reply(Code::UserNameOkPasswordNeeded, "Username OK, need password.")
    }

    fn handle_pass(&mut self, arg: &str) -> Result<(), FtpError> {
        if self.phase != Phase::NeedPass {
            return self.reply(Code::BadSequenceOfCommands, "Bad sequence of commands.");
        }

        let username = self.username.clone().expect("NeedPass implies identity bound");
        if self.credentials.authenticate(&username, arg) {
            let root = self.credentials.user_root(&username);
            // Canonicalize up front so current_dir is always in the same
            // (resolved) form CWD produces, keeping the §3 prefix invariant
            // meaningful from the very first command after login.
            let canonical_root = root.canonicalize().unwrap_or(root);
            self.phase = Phase::Authenticated;
            self.user_root = canonical_root.clone();
            self.current_dir = canonical_root;
            self.reply(Code::UserLoggedIn, "User logged in, proceed.")
        } else {
            self.phase = Phase::NeedUser;
            self.username = None;
            self.reply(Code::NotLoggedIn, "Incorrect password.")
        }
    }

    fn handle_port(&mut self, arg: &str) -> Result<(), FtpError> {
        if !self.is_authenticated() {
            return self.reply(Code::NotLoggedIn, "Not logged in.");
        }

        match parse_port_argument(arg) {
            Some(endpoint) => {
                self.pending_data_endpoint = Some(endpoint);
                self.reply(Code::Ok, "Changed port.")
            }
            None => self.reply(Code::InvalidParametersOrArguments, "Syntax error in parameters."),
        }
    }

    fn handle_stor(&mut self, arg: &str) -> Result<(), FtpError> {
        if !self.is_authenticated() {
            return self.reply(Code::NotLoggedIn, "Not logged in.");
        }
        let Some(endpoint) = self.pending_data_endpoint.take() else {
            return self.reply(Code::BadSequenceOfCommands, "Bad sequence of commands.");
        };

        let dest = match sandbox::file_path_in_current_dir(&self.current_dir, arg) {
            Ok(path) => path,
            Err(e) => return self.reply_protocol(e),
        };

        self.reply(Code::FileStatusOk, "File status okay; about to open data connection.")?;
        transfer::spawn(self.writer.clone(), endpoint, TransferKind::Stor(dest));
        Ok(())
    }

    fn handle_retr(&mut self, arg: &str) -> Result<(), FtpError> {
        if !self.is_authenticated() {
            return self.reply(Code::NotLoggedIn, "Not logged in.");
        }
        let Some(endpoint) = self.pending_data_endpoint.take() else {
            return self.reply(Code::BadSequenceOfCommands, "Bad sequence of commands.");
        };

        let source = match sandbox::file_path_in_current_dir(&self.current_dir, arg) {
            Ok(path) => path,
            Err(e) => return self.reply_protocol(e),
        };

        if !source.is_file() {
            return self.reply(Code::FileUnavailable, "No such file or directory.");
        }

        self.reply(Code::FileStatusOk, "File status okay; about to open data connection.")?;
        transfer::spawn(self.writer.clone(), endpoint, TransferKind::Retr(source));
        Ok(())
    }

    fn handle_list(&mut self) -> Result<(), FtpError> {
        if !self.is_authenticated() {
            return self.reply(Code::NotLoggedIn, "Not logged in.");
        }
        let Some(endpoint) = self.pending_data_endpoint.take() else {
            return self.reply(Code::BadSequenceOfCommands, "Bad sequence of commands.");
        };

        let listing = match list_directory(&self.current_dir) {
            Ok(listing) => listing,
            Err(e) => {
                warn!("session {}: failed to read {:?}: {}", self.id, self.current_dir, e);
                return self.reply(Code::FileUnavailable, "No such file or directory.");
            }
        };

        self.reply(Code::FileStatusOk, "File status okay; about to open data connection.")?;
        transfer::spawn(self.writer.clone(), endpoint, TransferKind::List(listing));
        Ok(())
    }

    fn handle_cwd(&mut self, arg: &str) -> Result<(), FtpError> {
        if !self.is_authenticated() {
            return self.reply(Code::NotLoggedIn, "Not logged in.");
        }

        match sandbox::resolve_directory(&self.current_dir, &self.user_root, arg) {
            Ok(dir) => {
                self.current_dir = dir;
                let rel = sandbox::relative_to_users_root(self.credentials.users_root(), &self.current_dir);
                self.reply(Code::Ok, &format!("/Users/{}", rel))
            }
            Err(e) => self.reply_protocol(e),
        }
    }

    fn handle_pwd(&mut self) -> Result<(), FtpError> {
        if !self.is_authenticated() {
            return self.reply(Code::NotLoggedIn, "Not logged in.");
        }
        let rel = sandbox::relative_to_users_root(self.credentials.users_root(), &self.current_dir);
        self.reply(Code::PathNameCreated, &format!("/Users/{}", rel))
    }

    fn handle_quit(&mut self) -> Result<Continue, FtpError> {
        self.reply(Code::ServiceClosing, "Service closing control connection.")?;
        Ok(Continue::Quit)
    }

    fn reply_protocol(&self, err: FtpError) -> Result<(), FtpError> {
        match err {
            FtpError::Protocol { code, message } => self.reply(code, &message),
            fatal @ FtpError::Fatal(_) => Err(fatal),
        }
    }
}

enum Continue {
    Keep,
    Quit,
}

/// Parses `h1,h2,h3,h4,p1,p2` into an IPv4 socket address, per §6.
///
/// Each token must be a decimal integer in `[0, 255]`; anything else
/// (wrong arity, non-numeric, out-of-range) is rejected rather than
/// clamped, per the §9 resolution.
fn parse_port_argument(arg: &str) -> Option<SocketAddrV4> {
    let parts: Vec<&str> = arg.split(',').collect();
    if parts.len() != 6 {
        return None;
    }
    let mut octets = [0u8; 6];
    for (slot, part) in octets.iter_mut().zip(parts.iter()) {
        *slot = part.trim().parse::<u8>().ok()?;
    }
    let ip = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
    let port = (octets[4] as u16) * 256 + octets[5] as u16;
    Some(SocketAddrV4::new(ip, port))
}

/// Enumerates `dir`, skipping `.` and `..` but keeping every other entry
/// including other dot-files, per the §9 resolution. Names are joined with
/// `\n`; no trailing newline is appended.
fn list_directory(dir: &std::path::Path) -> io::Result<String> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == "." || name == ".." {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names.join("\n"))
}
