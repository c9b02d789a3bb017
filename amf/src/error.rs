use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("buffer too short for AMF0 value")]
    ErrShortBuffer,
    #[error("AMF0 marker {0:#04x} is not supported")]
    UnsupportedMarker(u8),
    #[error("expected AMF0 marker {expected:#04x}, got {got:#04x}")]
    UnexpectedMarker { expected: u8, got: u8 },
    #[error("AMF0 string is not valid UTF-8")]
    InvalidUtf8,
    #[error("AMF0 object property name is empty")]
    EmptyPropertyName,
    #[error("AMF0 value is not a {0}")]
    WrongType(&'static str),
}
