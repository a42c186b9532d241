mod codec;
mod credentials;
mod error;
mod response;
mod sandbox;
mod server;
mod session;
mod transfer;

pub use credentials::{CredentialStore, Users};
pub use error::FtpError;
pub use response::Code;
pub use server::Server;
pub use session::Session;
