use std::collections::HashSet;
use std::io;
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, error, info};

use crate::credentials::CredentialStore;
use crate::session::{Session, SessionId};

/// Owns the control listen socket and the set of live sessions (C7).
///
/// Accepting happens on the thread that calls [`Server::run`]; each accepted
/// connection gets its own session thread, so a transfer in flight on one
/// connection never stalls the accept loop or any other session. The
/// registry below replaces the reference implementation's singly linked
/// session list (O(N) lookup, manual unlinking) with O(1) insert/remove;
/// sessions otherwise own their state exclusively and never consult it.
pub struct Server {
    listener: TcpListener,
    credentials: Arc<CredentialStore>,
    sessions: Mutex<HashSet<SessionId>>,
}

impl Server {
    pub fn bind<A: ToSocketAddrs>(addr: A, credentials: CredentialStore) -> io::Result<Arc<Self>> {
        let listener = TcpListener::bind(addr)?;
        info!("listening on {}", listener.local_addr()?);
        Ok(Arc::new(Self {
            listener,
            credentials: Arc::new(credentials),
            sessions: Mutex::new(HashSet::new()),
        }))
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub fn run(self: &Arc<Self>) -> io::Result<()> {
        for stream in self.listener.incoming() {
            let stream = stream?;
            let server = Arc::clone(self);
            thread::spawn(move || server.handle_connection(stream));
        }
        Ok(())
    }

    fn handle_connection(self: Arc<Self>, stream: TcpStream) {
        let peer = stream.peer_addr().ok();
        let mut session = match Session::new(stream, Arc::clone(&self.credentials)) {
            Ok(session) => session,
            Err(e) => {
                error!("failed to initialize session for {:?}: {}", peer, e);
                return;
            }
        };

        let id = session.id();
        self.sessions.lock().unwrap_or_else(|p| p.into_inner()).insert(id);
        info!("session {}: accepted from {:?}", id, peer);

        session.run();

        self.sessions.lock().unwrap_or_else(|p| p.into_inner()).remove(&id);
        debug!("session {}: removed from registry", id);
    }
}
