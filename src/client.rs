use std::{
    fs,
    io::{self, stdin, stdout, BufRead, BufReader, Read, Stdin, Stdout, Write},
    net::{IpAddr, Shutdown, TcpListener, TcpStream},
    path::Path,
};

use ftp::Code;
use log::{debug, info, warn};

struct FtpConnection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    code: [u8; 3],
    message: String,
    stdout: Stdout,
}

impl FtpConnection {
    pub fn new(connection: TcpStream) -> io::Result<Self> {
        let reader = BufReader::new(connection.try_clone()?);
        let writer = connection;

        let stdout = stdout();

        Ok(Self {
            reader,
            writer,
            code: [0; 3],
            message: String::new(),
            stdout,
        })
    }

    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)
    }

    fn send_command(&mut self, cmd: &str) -> io::Result<()> {
        self.write(cmd.as_bytes())?;
        self.write(b"\r\n")
    }

    pub fn wait_until_code(&mut self, response_code: Code) -> io::Result<()> {
        while self.read_cmd()? {
            if Code::from_bytes(self.code) == Some(response_code) {
                break;
            }
        }

        Ok(())
    }

    /// Returns true if it did not quit
    pub fn read_cmd(&mut self) -> io::Result<bool> {
        self.reader.read_exact(&mut self.code)?;

        let mut space_or_dash = [0];

        self.reader.read_exact(&mut space_or_dash)?;

        self.reader.read_line(&mut self.message)?;

        if space_or_dash == [b'-'] {
            let prefix = &self
                .code
                .iter()
                .map(|b| char::from(*b))
                .chain(std::iter::once(' '))
                .collect::<String>();

            loop {
                let message_len = self.message.len();
                self.reader.read_line(&mut self.message)?;
                if self.message[message_len..].starts_with(prefix) {
                    break;
                }
            }
        }

        self.stdout.write(&self.code)?;
        self.stdout.write(&space_or_dash)?;
        self.stdout.write(self.message.as_bytes())?;

        self.stdout.flush()?;

        self.message.clear();

        let code = match Code::from_bytes(self.code) {
            Some(c) => c,
            None => return Ok(true),
        };

        Ok(match code {
            Code::ServiceClosing => false,
            _ => true,
        })
    }

    pub fn write_stdout(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stdout.write(bytes)?;
        self.stdout.flush()
    }

    pub fn prompt_login(&mut self, stdin: &mut BufReader<Stdin>) -> io::Result<()> {
        loop {
            self.write_stdout(b"User (127.0.0.1:(none)): ")?;

            let mut username = String::new();
            stdin.read_line(&mut username)?;

            self.write(b"USER ")?;
            self.write(username.trim().as_bytes())?;
            self.write(b"\r\n")?;

            self.read_cmd()?;

            match Code::from_bytes(self.code) {
                Some(Code::UserNameOkPasswordNeeded) => {}
                _ => continue,
            }

            self.write_stdout(b"Password: ")?;

            let mut password = String::new();
            stdin.read_line(&mut password)?;
            self.write(b"PASS ")?;
            self.write(password.trim().as_bytes())?;
            self.write(b"\r\n")?;

            self.read_cmd()?;

            match Code::from_bytes(self.code) {
                Some(Code::UserLoggedIn) => break,
                _ => continue,
            }
        }

        Ok(())
    }

    /// Opens a listener on the next free loopback port and announces it to
    /// the server with `PORT` — the active-mode handshake this protocol
    /// uses: the client always listens, the server always dials in.
    fn announce_data_port(&mut self) -> io::Result<TcpListener> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let octets = match addr.ip() {
            IpAddr::V4(v4) => v4.octets(),
            IpAddr::V6(_) => unreachable!("bound to an IPv4 loopback address"),
        };
        let port = addr.port();
        debug!("listening for data connection on {}", addr);

        self.send_command(&format!(
            "PORT {},{},{},{},{},{}",
            octets[0],
            octets[1],
            octets[2],
            octets[3],
            port >> 8,
            port & 0xFF
        ))?;
        self.read_cmd()?;

        Ok(listener)
    }

    /// `RETR`: downloads `remote_name` from the server's current directory
    /// into `local_path`.
    fn retrieve(&mut self, remote_name: &str, local_path: &Path) -> io::Result<()> {
        let listener = self.announce_data_port()?;
        self.send_command(&format!("RETR {}", remote_name))?;
        self.read_cmd()?;

        let (mut data_stream, _) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("server never dialed back for RETR {:?}: {}", remote_name, e);
                return Err(e);
            }
        };
        let mut file = fs::File::create(local_path)?;
        let n = io::copy(&mut data_stream, &mut file)?;

        self.read_cmd()?;
        info!("retrieved {} ({} bytes) into {:?}", remote_name, n, local_path);
        Ok(())
    }

    /// `STOR`: uploads `local_path` to the server's current directory as
    /// `remote_name`.
    fn store(&mut self, local_path: &Path, remote_name: &str) -> io::Result<()> {
        let listener = self.announce_data_port()?;
        self.send_command(&format!("STOR {}", remote_name))?;
        self.read_cmd()?;

        let (mut data_stream, _) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("server never dialed back for STOR {:?}: {}", remote_name, e);
                return Err(e);
            }
        };
        let mut file = fs::File::open(local_path)?;
        let n = io::copy(&mut file, &mut data_stream)?;
        data_stream.shutdown(Shutdown::Write)?;

        self.read_cmd()?;
        info!("stored {:?} as {} ({} bytes)", local_path, remote_name, n);
        Ok(())
    }

    /// `LIST`: prints the server's current directory listing.
    fn list(&mut self) -> io::Result<()> {
        let listener = self.announce_data_port()?;
        self.send_command("LIST")?;
        self.read_cmd()?;

        let (mut data_stream, _) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("server never dialed back for LIST: {}", e);
                return Err(e);
            }
        };
        let mut buf = Vec::new();
        data_stream.read_to_end(&mut buf)?;
        self.write_stdout(&buf)?;
        self.write_stdout(b"\n")?;

        self.read_cmd()?;
        Ok(())
    }
}

/// Dispatches one line from the interactive prompt. `get`/`put`/`ls` drive
/// the data-connection handshake locally; everything else is forwarded
/// verbatim to the control channel, matching the teacher's passthrough for
/// commands this client has no special handling for.
fn dispatch_local_command(connection: &mut FtpConnection, line: &str) -> io::Result<()> {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("get") => {
            let remote = parts.next().unwrap_or_default();
            let local = parts.next().unwrap_or(remote);
            connection.retrieve(remote, Path::new(local))
        }
        Some("put") => {
            let local = parts.next().unwrap_or_default();
            let remote = parts.next().unwrap_or(local);
            connection.store(Path::new(local), remote)
        }
        Some("ls") | Some("list") => connection.list(),
        _ => {
            connection.write(line.as_bytes())?;
            connection.write(b"\r\n")?;
            connection.read_cmd().map(|_| ())
        }
    }
}

fn main() -> io::Result<()> {
    env_logger::init();

    let addr = match std::env::args().nth(1) {
        Some(addr) => addr,
        None => {
            eprintln!("Missing argument: IP");
            std::process::exit(1);
        }
    };

    let stream = match TcpStream::connect((addr.as_str(), 2121)) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("failed to connect to {}:2121: {}", addr, e);
            return Err(e);
        }
    };
    info!("connected to {}:2121", addr);
    let mut connection = FtpConnection::new(stream)?;

    connection.wait_until_code(Code::ServiceReadyForNewUser)?;

    let mut stdin = BufReader::new(stdin());

    connection.prompt_login(&mut stdin)?;
    info!("logged in");

    loop {
        connection.write_stdout(b"ftp> ")?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("quit") {
            connection.write(b"QUIT\r\n")?;
            connection.read_cmd()?;
            info!("session closed by quit");
            break;
        }

        if let Err(e) = dispatch_local_command(&mut connection, line) {
            warn!("command {:?} failed: {}", line, e);
            return Err(e);
        }
    }

    Ok(())
}
