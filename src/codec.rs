use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Chunk size for data-channel streaming, per §4.1.
const CHUNK: usize = 1024;

/// Writes a control-channel reply line, CRLF-terminated.
///
/// The wire format does not require a trailing newline on receipt, but every
/// reply this server emits includes one for compatibility with ordinary FTP
/// clients.
pub fn send_line(writer: &mut impl Write, line: &str) -> io::Result<()> {
    write!(writer, "{}\r\n", line)?;
    writer.flush()
}

/// Reads the next LF-delimited line off the control channel.
///
/// Returns `Ok(None)` on a clean EOF (peer closed). Tolerates a missing or
/// present trailing CR. A single underlying `read` may deliver more than one
/// line's worth of bytes; `BufRead::read_line` already buffers the remainder
/// for the next call, so callers never need to re-parse a batch themselves.
pub fn recv_line(reader: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut buf = String::new();
    let n = reader.read_line(&mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    while buf.ends_with('\n') || buf.ends_with('\r') {
        buf.pop();
    }
    Ok(Some(buf))
}

/// Streams all bytes from `source` to `sink` in 1 KiB chunks until `source`
/// reaches EOF. Used for RETR (file -> data socket) and LIST (listing text ->
/// data socket).
pub fn send_bytes(sink: &mut impl Write, source: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; CHUNK];
    let mut total = 0u64;
    loop {
        let n = source.read(&mut buf)?;
        if n == 0 {
            break;
        }
        sink.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok(total)
}

/// Streams all bytes from `source` into the file at `path` in 1 KiB chunks
/// until `source` reaches EOF (the client closing the data socket signals
/// completion, per §4.1/§4.5 STOR semantics). Used for STOR.
pub fn recv_bytes_to_file(source: &mut impl Read, path: &Path) -> io::Result<u64> {
    let mut file = fs::File::create(path)?;
    send_bytes(&mut file, source)
}

/// A control-channel writer shared between a session's own thread and any
/// data-transfer worker thread it spawns, so the `150`/`226` reply pair (and
/// any error reply in between) stays ordered with respect to the rest of
/// that session's replies even though two threads may write to it.
#[derive(Clone)]
pub struct ControlWriter(Arc<Mutex<TcpStream>>);

impl ControlWriter {
    pub fn new(stream: TcpStream) -> Self {
        Self(Arc::new(Mutex::new(stream)))
    }

    pub fn send_line(&self, line: &str) -> io::Result<()> {
        let mut guard = self.0.lock().unwrap_or_else(|poison| poison.into_inner());
        self::send_line(&mut *guard, line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn recv_line_strips_crlf_and_bare_lf() {
        let mut r = Cursor::new(b"USER alice\r\nPASS wonderland\n".to_vec());
        assert_eq!(recv_line(&mut r).unwrap(), Some("USER alice".to_owned()));
        assert_eq!(recv_line(&mut r).unwrap(), Some("PASS wonderland".to_owned()));
        assert_eq!(recv_line(&mut r).unwrap(), None);
    }

    #[test]
    fn recv_line_handles_multiple_commands_in_one_buffer() {
        let mut r = Cursor::new(b"QUIT\r\nPWD\r\n".to_vec());
        assert_eq!(recv_line(&mut r).unwrap(), Some("QUIT".to_owned()));
        assert_eq!(recv_line(&mut r).unwrap(), Some("PWD".to_owned()));
    }

    #[test]
    fn send_bytes_roundtrips_various_sizes() {
        for n in [0usize, 1, 1023, 1024, 1025, 1 << 20] {
            let data = vec![7u8; n];
            let mut out = Vec::new();
            let written = send_bytes(&mut out, &mut Cursor::new(data.clone())).unwrap();
            assert_eq!(written as usize, n);
            assert_eq!(out, data);
        }
    }
}
