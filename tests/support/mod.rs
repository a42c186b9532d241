use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use ftp::{CredentialStore, Server};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn tempdir(label: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("ftp-it-{}-{}-{}", std::process::id(), label, n));
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// A real server bound to an ephemeral loopback port, running on its own
/// accept thread for the lifetime of the test. Each test gets its own
/// `base_root`, so fixtures never collide across tests.
pub struct TestServer {
    base_root: PathBuf,
    addr: SocketAddr,
}

impl TestServer {
    pub fn start(users: &[(&str, &str)]) -> Self {
        let base_root = tempdir("server");
        let body: String = users.iter().map(|(u, p)| format!("{} {}\n", u, p)).collect();
        fs::write(base_root.join("users.txt"), body).unwrap();

        let credentials = CredentialStore::load(&base_root).unwrap();
        let server = Server::bind("127.0.0.1:0", credentials).unwrap();
        let addr = server.local_addr().unwrap();

        thread::spawn(move || {
            let _ = server.run();
        });

        Self { base_root, addr }
    }

    pub fn connect(&self) -> TestClient {
        TestClient::connect(self.addr)
    }

    /// Path to a file under a given user's storage root, for setting up or
    /// inspecting fixtures directly on disk.
    pub fn user_path(&self, username: &str, relative: &str) -> PathBuf {
        self.base_root.join("users").join(username).join(relative)
    }
}

/// A raw control-channel client, speaking the wire protocol directly rather
/// than going through the interactive client binary, so tests can assert on
/// exact reply codes and sequencing.
pub struct TestClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl TestClient {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        let mut client = Self { reader, writer: stream };

        let greeting = client.recv_line();
        assert!(greeting.starts_with("220 "), "unexpected greeting: {:?}", greeting);
        client
    }

    pub fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).unwrap();
        self.writer.write_all(b"\r\n").unwrap();
    }

    /// Writes raw bytes directly, for exercising framing of multiple
    /// commands delivered in a single underlying `write`/`read` pair.
    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).unwrap();
    }

    pub fn recv_line(&mut self) -> String {
        let mut buf = String::new();
        self.reader.read_line(&mut buf).unwrap();
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        buf
    }

    pub fn recv_code(&mut self) -> String {
        let line = self.recv_line();
        line.get(..3).unwrap_or_default().to_owned()
    }

    pub fn login(&mut self, username: &str, password: &str) {
        self.send(&format!("USER {}", username));
        assert_eq!(self.recv_code(), "331");
        self.send(&format!("PASS {}", password));
        assert_eq!(self.recv_code(), "230");
    }

    /// Opens a loopback listener and announces it to the server with `PORT`,
    /// per the active-mode handshake: the client always listens, the server
    /// always dials in for the data phase that follows.
    pub fn open_data_port(&mut self) -> TcpListener {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = match listener.local_addr().unwrap() {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => unreachable!("bound to an IPv4 loopback address"),
        };
        let octets = addr.ip().octets();
        let port = addr.port();

        self.send(&format!(
            "PORT {},{},{},{},{},{}",
            octets[0],
            octets[1],
            octets[2],
            octets[3],
            port >> 8,
            port & 0xFF
        ));
        assert_eq!(self.recv_code(), "200");
        listener
    }
}
