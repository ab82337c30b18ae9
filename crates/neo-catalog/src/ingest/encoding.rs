//! Text encoding detection for CSV exports.
//!
//! Spreadsheet tools on Windows routinely save "CSV" as UTF-16, with or
//! without a byte-order mark.

use crate::error::Result;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use std::path::Path;

/// Bytes inspected when sniffing.
const SNIFF_LEN: usize = 4096;

/// Encoding of a text file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16Be,
}

impl TextEncoding {
    fn encoding(self) -> &'static Encoding {
        match self {
            TextEncoding::Utf8 | TextEncoding::Utf8Bom => UTF_8,
            TextEncoding::Utf16Le => UTF_16LE,
            TextEncoding::Utf16Be => UTF_16BE,
        }
    }
}

/// Detect the encoding from a BOM, falling back to a NUL-byte check for
/// BOM-less UTF-16 (assumed little-endian).
pub fn detect_encoding(bytes: &[u8]) -> TextEncoding {
    if let Some((enc, _)) = Encoding::for_bom(bytes) {
        if enc == UTF_16LE {
            return TextEncoding::Utf16Le;
        }
        if enc == UTF_16BE {
            return TextEncoding::Utf16Be;
        }
        return TextEncoding::Utf8Bom;
    }

    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
    if head.contains(&0) {
        TextEncoding::Utf16Le
    } else {
        TextEncoding::Utf8
    }
}

/// Decode bytes to a string, dropping any BOM. Malformed sequences are
/// replaced rather than rejected.
pub fn decode(bytes: &[u8]) -> String {
    let encoding = detect_encoding(bytes).encoding();
    let (text, _had_errors) = encoding.decode_with_bom_removal(bytes);
    text.trim_start_matches('\u{feff}').to_string()
}

/// Read and decode a text file.
pub fn read_text<P: AsRef<Path>>(path: P) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(decode(&bytes))
}
