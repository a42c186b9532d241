use std::path::PathBuf;
use std::process::ExitCode;

use ftp::{CredentialStore, Server};
use log::error;

const DEFAULT_ADDR: &str = "127.0.0.1:2121";

fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| DEFAULT_ADDR.to_owned());
    let base_root = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("server"));

    let credentials = match CredentialStore::load(&base_root) {
        Ok(store) => store,
        Err(e) => {
            error!("failed to load credentials from {:?}: {}", base_root, e);
            return ExitCode::FAILURE;
        }
    };

    let server = match Server::bind(&addr, credentials) {
        Ok(server) => server,
        Err(e) => {
            error!("failed to bind {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run() {
        error!("server loop exited: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
