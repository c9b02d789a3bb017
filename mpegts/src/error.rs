use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("TS packet must be 188 bytes, got {0}")]
    InvalidPacketSize(usize),
    #[error("TS sync byte missing, got {0:#04x}")]
    SyncByteMissing(u8),
    #[error("PES start code missing")]
    PesStartCodeMissing,
    #[error("buffer too short for {0}")]
    ShortBuffer(&'static str),
    #[error("ADTS syncword missing")]
    AdtsSyncMissing,
    #[error("ADTS frame length {0} is shorter than its header")]
    AdtsFrameTooShort(usize),
    #[error("unsupported stream type {0:#04x}")]
    UnsupportedStreamType(u8),
    #[error("FLV: {0}")]
    Flv(#[from] flv::Error),
}
