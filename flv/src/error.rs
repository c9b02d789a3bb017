use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("buffer too short for FLV tag")]
    ErrShortBuffer,
    #[error("FLV tag type {0:#04x} is not audio/video/script")]
    InvalidTagType(u8),
    #[error("previous-tag-size field {got} does not match tag length {expect}")]
    PreviousTagSizeMismatch { got: u32, expect: u32 },
    #[error("NALU length {0} exceeds remaining payload {1}")]
    NaluLengthOverrun(usize, usize),
    #[error("empty NALU")]
    EmptyNalu,
}
