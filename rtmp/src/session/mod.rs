#[cfg(test)]
mod session_test;

mod client;
mod server;

pub use client::{ClientSession, ServerInfo};
pub use server::ServerSession;

/// FMS compatibility version advertised in connect responses.
pub const SIG_FMS_VERSION: &str = "3,5,3,888";
/// Server identity advertised in the connect response data array.
pub const SIG_SERVER: &str = "sluice";
pub const SIG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The default stream id answered to createStream.
pub const DEFAULT_STREAM_ID: u32 = 1;

/// How long a redirected client gets to answer before the redirect is
/// treated as ignored.
pub const REDIRECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);
