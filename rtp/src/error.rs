use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("packet is not large enough")]
    ErrShortPacket,
    #[error("buffer too small")]
    ErrBufferTooSmall,
    #[error("RTP header size insufficient")]
    ErrHeaderSizeInsufficient,
    #[error("header extension id must be between 1 and 14 for one-byte extensions")]
    ErrOneByteHeaderIdRange,
    #[error("header extension payload must be 16 bytes or less for one-byte extensions")]
    ErrOneByteHeaderSize,
    #[error("aggregation declared size({0}) is larger than buffer({1})")]
    StapSizeLargerThanBuffer(usize, usize),
    #[error("NALU type {0} is not handled")]
    NaluTypeIsNotHandled(u8),
    #[error("access unit is empty")]
    EmptyAccessUnit,
    #[error("AAC frame of {0} bytes exceeds the 13-bit AU size field")]
    AacFrameTooLarge(usize),
    #[error("mtu {0} cannot carry a fragmentation unit")]
    MtuTooSmall(usize),
}
