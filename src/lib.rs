#![doc = include_str!("../README.md")]

mod error;
mod frame;
mod parser;
mod protocols;

pub mod checksum;
pub mod diagnostics;

pub use error::{Error, Result};
pub use frame::{Details, Frame, SentenceName, UnicoreHeader};
pub use parser::{
    BadCrcCallback, EomCallback, InvalidDataCallback, Parser, ParserBuilder,
    MINIMUM_BUFFER_LENGTH,
};
pub use protocols::Protocol;
