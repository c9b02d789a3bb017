use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("stream {0} is already being published")]
    SourceBusy(String),
    #[error("hook {url} rejected the request with code {code}")]
    HookRejected { url: String, code: i64 },
    #[error("hook {url} returned a malformed body")]
    HookMalformed { url: String },
    #[error("hook transport: {0}")]
    HookTransport(#[from] reqwest::Error),
    #[error("RTMP: {0}")]
    Rtmp(#[from] rtmp::Error),
    #[error("FLV: {0}")]
    Flv(#[from] flv::Error),
    #[error("RTP: {0}")]
    Rtp(#[from] rtp::Error),
    #[error("MPEG-TS: {0}")]
    Mpegts(#[from] mpegts::Error),
    #[error("AMF: {0}")]
    Amf(#[from] amf::Error),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}
