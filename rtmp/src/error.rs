use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("fresh chunk stream cid={cid} expects fmt=0, got fmt={fmt}")]
    ChunkStart { fmt: u8, cid: u32 },
    #[error("chunk stream cid={0} has a partial message, fmt must not be 0")]
    ChunkRestart(u32),
    #[error("message payload length changed from {cached} to {got} mid-message")]
    PayloadLengthChanged { cached: u32, got: u32 },
    #[error("chunk size {0} below minimum 128")]
    ChunkSizeTooSmall(u32),
    #[error("proxy preamble length {0} exceeds 1024")]
    ProxyExceed(u16),
    #[error("no pending request for transaction id {0}")]
    NoRequest(f64),
    #[error("handshake version {0:#04x} is not RTMP plain text")]
    HandshakeVersion(u8),
    #[error("complex handshake digest mismatch")]
    DigestMismatch,
    #[error("createStream recursion depth exceeded")]
    CreateStreamDepth,
    #[error("connect requires a tcUrl property")]
    ConnectMissingTcUrl,
    #[error("tcUrl {0:?} cannot be parsed")]
    InvalidTcUrl(String),
    #[error("expected {expected} packet, connection sent something else")]
    UnexpectedPacket { expected: &'static str },
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("operation timed out")]
    Timeout,
    #[error("AMF decode: {0}")]
    Amf(#[from] amf::Error),
    #[error("FLV: {0}")]
    Flv(#[from] flv::Error),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error closes the connection (protocol violations do;
    /// per-frame errors do not).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::NoRequest(_))
    }
}
