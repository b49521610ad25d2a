//! Tune-level parsing of ABC music notation.
//!
//! A file is decoded, split into one segment per tune and each segment's
//! header block is reduced to a [`TuneRecord`]. Nothing in here performs I/O.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

mod header;
mod source;
mod split;

pub use header::extract_tune;
pub use source::{decode_source, normalize_line_endings, DecodePolicy, ParseError};
pub use split::{split_tunes, Segment, Segments};

/// Structured metadata for a single tune.
///
/// Fields missing from the tune's header block are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuneRecord {
    pub book_number: i32,
    pub reference_number: String,
    pub title: String,
    #[serde(rename = "type")]
    pub tune_type: String,
    pub meter: String,
    pub key_signature: String,
    /// Verbatim text of the tune, headers and body.
    pub abc_notation: String,
    pub file_path: String,
}

/// Splits `text` into tunes and extracts a record for each one, in file order.
#[instrument(level = "trace", skip(text))]
pub fn parse_tunes(text: &str, book_number: i32, file_path: &str) -> Vec<TuneRecord> {
    let text = normalize_line_endings(text);

    let tunes = split_tunes(&text)
        .map(|segment| {
            trace!(index = segment.index, line = segment.line, "extracting tune");
            extract_tune(segment.text, book_number, file_path)
        })
        .collect::<Vec<_>>();

    debug!(tunes = tunes.len(), "parsed tunes");
    tunes
}

/// Decodes raw file contents and parses them with [`parse_tunes`].
pub fn parse_source(
    bytes: &[u8],
    book_number: i32,
    file_path: &str,
    policy: DecodePolicy,
) -> Result<Vec<TuneRecord>, ParseError> {
    let text = decode_source(bytes, file_path, policy)?;
    Ok(parse_tunes(&text, book_number, file_path))
}
