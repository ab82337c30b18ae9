//! Reading catalog exports: encodings, delimited layouts and cell values.

pub mod delimited;
pub mod encoding;
pub mod values;

pub use delimited::{DelimitedReader, Record, WrappedReader, WrappedRow};
pub use encoding::{decode, detect_encoding, read_text, TextEncoding};
