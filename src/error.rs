#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No protocols were registered with the builder.
    #[error("parser table is empty")]
    EmptyParserTable,

    /// The parser was given an empty name.
    #[error("parser name is empty")]
    EmptyName,

    /// The message buffer cannot hold the smallest frame of every
    /// registered protocol.
    #[error("buffer too small: {actual} bytes, minimum {minimum}")]
    BufferTooSmall { actual: usize, minimum: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
