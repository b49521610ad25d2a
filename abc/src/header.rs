//! Header-block extraction for a single tune.

use crate::TuneRecord;

/// Splits a `<letter>:` header line into its field letter and raw value.
pub(crate) fn header_field(line: &str) -> Option<(char, &str)> {
    let mut chars = line.chars();
    let letter = chars.next().filter(char::is_ascii_alphabetic)?;
    let value = chars.as_str().strip_prefix(':')?;
    Some((letter, value))
}

/// Field value with any inline `%` comment removed and whitespace trimmed.
/// `\%` stands for a literal percent sign.
fn field_value(raw: &str) -> String {
    let mut value = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'%') => {
                chars.next();
                value.push('%');
            }
            '%' => break,
            _ => value.push(c),
        }
    }
    value.trim().to_owned()
}

#[derive(Debug, Default)]
struct HeaderFields {
    reference_number: Option<String>,
    title: Option<String>,
    tune_type: Option<String>,
    meter: Option<String>,
    key_signature: Option<String>,
}

impl HeaderFields {
    /// Stores `raw` unless the field already has a value. Empty values never
    /// claim a field.
    fn record(&mut self, letter: char, raw: &str) {
        let slot = match letter {
            'X' => &mut self.reference_number,
            'T' => &mut self.title,
            'R' => &mut self.tune_type,
            'M' => &mut self.meter,
            'K' => &mut self.key_signature,
            _ => return,
        };
        if slot.is_none() {
            let value = field_value(raw);
            if !value.is_empty() {
                *slot = Some(value);
            }
        }
    }
}

/// Builds the record for one tune segment.
///
/// Only the header block is read: it runs from the first header line up to
/// and including the first `K:` line, or up to the first non-blank line that
/// is not a header or comment. Lines before the first header line are skipped.
/// The full segment text is kept as-is in [`TuneRecord::abc_notation`].
pub fn extract_tune(segment: &str, book_number: i32, file_path: &str) -> TuneRecord {
    let mut fields = HeaderFields::default();
    let mut in_header = false;

    for line in segment.lines() {
        if line.trim().is_empty() || line.starts_with('%') {
            continue;
        }
        match header_field(line) {
            Some((letter, raw)) => {
                in_header = true;
                fields.record(letter, raw);
                if letter == 'K' {
                    break;
                }
            }
            None if in_header => break,
            None => {}
        }
    }

    TuneRecord {
        book_number,
        reference_number: fields.reference_number.unwrap_or_default(),
        title: fields.title.unwrap_or_default(),
        tune_type: fields.tune_type.unwrap_or_default(),
        meter: fields.meter.unwrap_or_default(),
        key_signature: fields.key_signature.unwrap_or_default(),
        abc_notation: segment.to_owned(),
        file_path: file_path.to_owned(),
    }
}
