use std::fs;
use std::io::{self, Write};
use std::net::{SocketAddr, SocketAddrV4, TcpStream};
use std::path::PathBuf;
use std::thread;

use log::{debug, warn};

use crate::codec::{self, ControlWriter};
use crate::response::Code;

/// What a data-transfer worker (C6) moves once it has dialed the client's
/// announced endpoint.
pub enum TransferKind {
    Retr(PathBuf),
    Stor(PathBuf),
    List(String),
}

/// Spawns the worker thread for one LIST/STOR/RETR transfer.
///
/// The worker owns the dialed data connection for its entire lifetime,
/// shares nothing with the session thread but `writer` (itself internally
/// serialized, see [`ControlWriter`]), and always emits exactly one final
/// control reply — `226` on success or `425` if the dial or the transfer
/// itself fails. The session thread that called this has already sent the
/// preceding `150` and returns immediately to its read loop; it does not
/// join this thread.
pub fn spawn(writer: ControlWriter, endpoint: SocketAddrV4, kind: TransferKind) {
    thread::spawn(move || run(writer, endpoint, kind));
}

fn run(writer: ControlWriter, endpoint: SocketAddrV4, kind: TransferKind) {
    let mut data_stream = match TcpStream::connect(SocketAddr::V4(endpoint)) {
        Ok(s) => s,
        Err(e) => {
            warn!("failed to dial data endpoint {}: {}", endpoint, e);
            let _ = writer.send_line(&format!("{} Cannot open data connection.", Code::CannotOpenDataConnection));
            return;
        }
    };

    let result = perform(&mut data_stream, &kind);
    let _ = data_stream.shutdown(std::net::Shutdown::Both);

    match result {
        Ok(bytes) => {
            debug!("transfer of {} bytes to/from {} complete", bytes, endpoint);
            let _ = writer.send_line(&format!("{} Transfer complete.", Code::ClosingDataConnection));
        }
        Err(e) => {
            warn!("transfer with {} failed: {}", endpoint, e);
            // No dedicated "transfer aborted mid-stream" code survived the
            // trim from the teacher's full reply-code table (§6 only
            // defines 425 for the dial itself); reusing it here is the
            // pragmatic fallback for any post-dial failure.
            let _ = writer.send_line(&format!("{} Cannot open data connection.", Code::CannotOpenDataConnection));
        }
    }
}

fn perform(data_stream: &mut TcpStream, kind: &TransferKind) -> io::Result<u64> {
    match kind {
        TransferKind::Retr(path) => {
            let mut file = fs::File::open(path)?;
            codec::send_bytes(data_stream, &mut file)
        }
        TransferKind::Stor(path) => codec::recv_bytes_to_file(data_stream, path),
        TransferKind::List(listing) => {
            data_stream.write_all(listing.as_bytes())?;
            Ok(listing.len() as u64)
        }
    }
}
