//! Delimited-text readers for JPL/MPC catalog exports.
//!
//! The exports this crate ingests are produced by several tools, so the
//! delimiter, the header and even the quoting vary between files. Two
//! readers cover what is seen in practice:
//!
//! - [`DelimitedReader`]: a header line plus one record per line, with the
//!   delimiter detected from the header (or sniffed from the first lines).
//!   A quoted field may span line breaks.
//! - [`WrappedReader`]: comma-separated rows where each whole row may be
//!   wrapped in a single pair of quotes (MPCORB exports from spreadsheets).

use super::values::{self, norm_text};
use crate::error::{CatalogError, Result};
use chrono::NaiveDate;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Candidate delimiters, in detection priority order.
pub const CANDIDATE_DELIMITERS: [char; 4] = ['\t', ';', ',', '|'];

/// Lines examined when sniffing a delimiter.
const SNIFF_LINES: usize = 5;

/// Header keys that identify a JPL small-body export.
pub const KEY_COLUMNS: [&str; 2] = ["id", "spkid"];

/// Return the first line containing non-whitespace, without its line ending.
pub fn first_non_blank_line(text: &str) -> Option<&str> {
    text.lines()
        .map(|l| l.trim_end_matches('\r'))
        .find(|l| !l.trim().is_empty())
}

/// Split a line on `delim`, honoring double-quoted fields and `""` escapes.
pub fn split_fields(line: &str, delim: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut at_field_start = true;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
            continue;
        }

        if c == delim {
            fields.push(std::mem::take(&mut current));
            at_field_start = true;
        } else if c == '"' && at_field_start {
            in_quotes = true;
            at_field_start = false;
        } else {
            current.push(c);
            at_field_start = false;
        }
    }
    fields.push(current);
    fields
}

/// Comma split that unwraps rows quoted as a single field.
pub fn split_wrapped(line: &str) -> Vec<String> {
    let fields = split_fields(line, ',');
    if fields.len() == 1 && fields[0].contains(',') {
        return split_fields(&fields[0], ',');
    }
    fields
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase().trim_start_matches('\u{feff}').to_string()
}

/// Split a header line and normalize each name (trimmed, lowercase, no BOM).
pub fn normalize_header(line: &str, delim: char) -> Vec<String> {
    split_fields(line, delim)
        .iter()
        .map(|c| normalize_name(c))
        .collect()
}

/// Rename repeated header names so every column stays addressable.
///
/// Merged NEO+MPCORB exports carry two `epoch` columns; the second one is the
/// packed MPC epoch and becomes `epoch_mpc`. Other repeats become
/// `<name>_dup<N>`.
pub fn dedupe_header(fields: Vec<String>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    fields
        .into_iter()
        .map(|name| {
            let count = counts.entry(name.clone()).or_insert(0);
            *count += 1;
            match *count {
                1 => name,
                _ if name == "epoch" => "epoch_mpc".to_string(),
                n => format!("{}_dup{}", name, n),
            }
        })
        .collect()
}

fn has_key_columns(header: &[String]) -> bool {
    KEY_COLUMNS
        .iter()
        .all(|key| header.iter().any(|h| h == key))
}

/// Find the delimiter whose split of the header exposes the key columns.
pub fn detect_header_delimiter(header_line: &str) -> Option<(char, Vec<String>)> {
    CANDIDATE_DELIMITERS.iter().find_map(|&delim| {
        let cols = normalize_header(header_line, delim);
        has_key_columns(&cols).then_some((delim, cols))
    })
}

/// Guess a delimiter from the first non-blank lines of a file.
pub fn sniff_delimiter(text: &str) -> char {
    let lines: Vec<&str> = text
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();

    let Some(first) = lines.first() else {
        return ';';
    };

    let count = |s: &str, c: char| s.matches(c).count();
    if first.contains(';') && count(first, ';') >= count(first, ',') {
        return ';';
    }
    if first.contains('\t') {
        return '\t';
    }
    if first.contains(',') {
        return ',';
    }

    let joined = lines.join("\n");
    let mut best = ';';
    let mut best_count = 0;
    for delim in [';', ',', '\t', '|'] {
        let n = count(&joined, delim);
        if n > best_count {
            best = delim;
            best_count = n;
        }
    }
    best
}

/// One data row keyed by header name.
#[derive(Debug, Clone)]
pub struct Record {
    /// 1-based record number (header counts as line 1 when present).
    pub line: usize,
    header: Arc<Vec<String>>,
    values: Vec<String>,
}

impl Record {
    /// Build a record; missing trailing values read as absent.
    pub fn new(line: usize, header: Arc<Vec<String>>, values: Vec<String>) -> Self {
        Self { line, header, values }
    }

    /// Raw value for a column. When a name repeats, the last column wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.header
            .iter()
            .enumerate()
            .rev()
            .find(|(_, name)| name.as_str() == key)
            .and_then(|(idx, _)| self.values.get(idx))
            .map(String::as_str)
    }

    /// Raw value or an empty string.
    pub fn raw(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    /// Trimmed text, or none when blank/`NULL`.
    pub fn text(&self, key: &str) -> Option<String> {
        norm_text(self.raw(key))
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        values::parse_float(self.raw(key))
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        values::parse_int(self.raw(key))
    }

    pub fn date(&self, key: &str) -> Option<NaiveDate> {
        values::parse_date(self.raw(key))
    }

    /// First column among `keys` holding a float.
    pub fn first_float(&self, keys: &[&str]) -> Option<f64> {
        keys.iter().find_map(|k| self.float(k))
    }

    /// Compact `key=value` rendering used in load error logs.
    pub fn describe(&self) -> String {
        let pairs: Vec<String> = self
            .header
            .iter()
            .zip(self.values.iter())
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{{{}}}", pairs.join(", "))
    }
}

/// Whether a quoted field is still open at the end of `line`.
///
/// Follows the same quoting rules as [`split_fields`]; `in_quotes` is the
/// state carried over from the previous physical line.
fn ends_in_quotes(line: &str, delim: char, mut in_quotes: bool) -> bool {
    let mut at_field_start = !in_quotes;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
        } else if c == delim {
            at_field_start = true;
        } else {
            in_quotes = c == '"' && at_field_start;
            at_field_start = false;
        }
    }
    in_quotes
}

/// Non-blank records of a body. A quoted field may span line breaks; its
/// physical lines are joined back with `\n`, blank ones included.
struct DataLines<'a> {
    lines: std::str::Lines<'a>,
    delim: char,
}

impl<'a> Iterator for DataLines<'a> {
    type Item = Cow<'a, str>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self
            .lines
            .by_ref()
            .map(|l| l.trim_end_matches('\r'))
            .find(|l| !l.trim().is_empty())?;
        if !ends_in_quotes(first, self.delim, false) {
            return Some(Cow::Borrowed(first));
        }

        // An unterminated quote runs to the end of the file.
        let mut joined = first.to_string();
        for line in self.lines.by_ref() {
            let line = line.trim_end_matches('\r');
            joined.push('\n');
            joined.push_str(line);
            if !ends_in_quotes(line, self.delim, true) {
                break;
            }
        }
        Some(Cow::Owned(joined))
    }
}

fn data_lines(body: &str, delim: char) -> DataLines<'_> {
    DataLines {
        lines: body.lines(),
        delim,
    }
}

/// Return the text following the first non-blank line.
fn after_first_non_blank(text: &str) -> &str {
    let mut offset = 0;
    for segment in text.split_inclusive('\n') {
        offset += segment.len();
        if !segment.trim().is_empty() {
            return &text[offset..];
        }
    }
    ""
}

/// Header-driven reader for NEO and merged NEO+MPCORB exports.
#[derive(Debug)]
pub struct DelimitedReader<'a> {
    header: Arc<Vec<String>>,
    delimiter: char,
    has_header: bool,
    body: &'a str,
}

impl<'a> DelimitedReader<'a> {
    /// Open a catalog export.
    ///
    /// The delimiter is the one whose header split exposes `id` and `spkid`;
    /// failing that it is sniffed. When the header still lacks the key
    /// columns, the file is assumed to be headerless and `fallback_header`
    /// is used, with the first line read as data.
    pub fn open(text: &'a str, fallback_header: &[&str], dedupe: bool) -> Result<Self> {
        let header_line = first_non_blank_line(text).ok_or_else(|| CatalogError::Parse {
            line: 1,
            message: "file is empty or has no readable header".to_string(),
        })?;

        let (delimiter, mut header) = match detect_header_delimiter(header_line) {
            Some(found) => found,
            None => {
                let delim = sniff_delimiter(text);
                (delim, normalize_header(header_line, delim))
            }
        };

        let has_header = has_key_columns(&header);
        if !has_header {
            let preview: String = header_line.chars().take(200).collect();
            warn!(
                "Header not recognized, using the built-in column layout (first line: {})",
                preview
            );
            header = fallback_header.iter().map(|s| s.to_string()).collect();
        }
        if dedupe {
            header = dedupe_header(header);
        }

        let body = if has_header {
            after_first_non_blank(text)
        } else {
            text
        };

        Ok(Self {
            header: Arc::new(header),
            delimiter,
            has_header,
            body,
        })
    }

    /// Open a file whose delimiter is `;` or `,`, whichever occurs more in the
    /// header line (ties go to `;`). The first non-blank line is always the
    /// header.
    pub fn open_semicolon_or_comma(text: &'a str, dedupe: bool) -> Result<Self> {
        let header_line = first_non_blank_line(text).ok_or_else(|| CatalogError::Parse {
            line: 1,
            message: "file is empty or has no header".to_string(),
        })?;
        let delimiter = if header_line.matches(';').count() >= header_line.matches(',').count() {
            ';'
        } else {
            ','
        };
        let mut header = normalize_header(header_line, delimiter);
        if dedupe {
            header = dedupe_header(header);
        }
        Ok(Self {
            header: Arc::new(header),
            delimiter,
            has_header: true,
            body: after_first_non_blank(text),
        })
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn has_header(&self) -> bool {
        self.has_header
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Iterate data records. Numbering starts at 2 after a header line and
    /// at 1 for headerless files.
    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        let start = if self.has_header { 2 } else { 1 };
        data_lines(self.body, self.delimiter)
            .enumerate()
            .map(move |(idx, line)| {
                Record::new(
                    start + idx,
                    Arc::clone(&self.header),
                    split_fields(&line, self.delimiter),
                )
            })
    }
}

/// A row from a [`WrappedReader`].
#[derive(Debug, Clone)]
pub enum WrappedRow {
    Record(Record),
    /// Field count did not match the header; carries the raw line.
    Bad(String),
}

/// Reader for comma-separated exports with optionally row-wrapped quoting.
#[derive(Debug)]
pub struct WrappedReader<'a> {
    header: Arc<Vec<String>>,
    body: &'a str,
}

impl<'a> WrappedReader<'a> {
    /// Open the export; `None` when it has no usable header.
    pub fn open(text: &'a str) -> Option<Self> {
        let header_line = first_non_blank_line(text)?;
        let header: Vec<String> = split_wrapped(header_line)
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        if header.iter().all(|h| h.is_empty()) {
            return None;
        }
        Some(Self {
            header: Arc::new(header),
            body: after_first_non_blank(text),
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> impl Iterator<Item = WrappedRow> + '_ {
        data_lines(self.body, ',').enumerate().map(move |(idx, line)| {
            let values = split_wrapped(&line);
            if values.len() != self.header.len() {
                WrappedRow::Bad(line.into_owned())
            } else {
                WrappedRow::Record(Record::new(idx + 2, Arc::clone(&self.header), values))
            }
        })
    }
}
