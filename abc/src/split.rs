//! Segmentation of a multi-tune file into one text span per tune.

use crate::header::header_field;

/// One tune's worth of text, borrowed from the file contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    /// Position of the segment within the file, starting at 0.
    pub index: usize,
    /// 1-based line number of the segment's first line.
    pub line: usize,
    pub text: &'a str,
}

/// Lazily splits `text` into tune segments.
///
/// A tune starts at its first non-blank, non-comment line, so every segment
/// has non-whitespace content. It ends when a new `X:` line follows header
/// lines or a blank line, at two consecutive blank lines, or at the end of
/// the input. Trailing blank lines are not part of a segment.
///
/// Once the text has any `X:` line, spans without one (a file header before
/// the first tune, notes between tunes) are dropped. Text with no `X:` line
/// at all is kept as a single tune.
///
/// Segment ends never include a line's `\r`, but line breaks inside a
/// segment are left as found; pass text through
/// [`normalize_line_endings`](crate::normalize_line_endings) first for
/// `\n`-only segments.
pub fn split_tunes(text: &str) -> Segments<'_> {
    Segments {
        text,
        has_reference: text
            .split('\n')
            .any(|line| LineKind::of(line) == LineKind::Reference),
        pos: 0,
        line_no: 0,
        index: 0,
        pending: None,
    }
}

#[derive(Debug)]
pub struct Segments<'a> {
    text: &'a str,
    /// Whether any line of `text` is an `X:` reference line.
    has_reference: bool,
    pos: usize,
    line_no: usize,
    index: usize,
    /// Segment opened by the `X:` line that closed the previous one.
    pending: Option<OpenSegment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Blank,
    Comment,
    Reference,
    Header,
    Body,
}

impl LineKind {
    fn of(line: &str) -> Self {
        if line.trim().is_empty() {
            LineKind::Blank
        } else if line.starts_with('%') {
            LineKind::Comment
        } else {
            match header_field(line) {
                Some(('X', value)) if !value.trim().is_empty() => LineKind::Reference,
                Some(_) => LineKind::Header,
                None => LineKind::Body,
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenSegment {
    start: usize,
    /// End of the last non-blank line, exclusive of its line break.
    end: usize,
    line: usize,
    has_header: bool,
    has_reference: bool,
    blank_run: usize,
}

impl OpenSegment {
    fn new(start: usize, end: usize, line: usize, kind: LineKind) -> Self {
        Self {
            start,
            end,
            line,
            has_header: matches!(kind, LineKind::Reference | LineKind::Header),
            has_reference: kind == LineKind::Reference,
            blank_run: 0,
        }
    }

    fn push(&mut self, end: usize, kind: LineKind) {
        self.end = end;
        self.blank_run = 0;
        if matches!(kind, LineKind::Reference | LineKind::Header) {
            self.has_header = true;
        }
        if kind == LineKind::Reference {
            self.has_reference = true;
        }
    }

    /// Whether a reference line must start a new tune instead of joining this one.
    fn closed_by_reference(&self) -> bool {
        self.has_header || self.blank_run > 0
    }
}

impl<'a> Segments<'a> {
    fn next_line(&mut self) -> Option<(usize, &'a str)> {
        if self.pos >= self.text.len() {
            return None;
        }
        let text = self.text;
        let start = self.pos;
        let rest = &text[start..];
        let line = match rest.find('\n') {
            Some(len) => {
                self.pos = start + len + 1;
                &rest[..len]
            }
            None => {
                self.pos = text.len();
                rest
            }
        };
        self.line_no += 1;
        Some((start, line))
    }

    fn keeps(&self, segment: &OpenSegment) -> bool {
        !self.has_reference || segment.has_reference
    }

    fn emit(&mut self, segment: OpenSegment) -> Segment<'a> {
        let source = self.text;
        let index = self.index;
        self.index += 1;
        Segment {
            index,
            line: segment.line,
            text: &source[segment.start..segment.end],
        }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut open = self.pending.take();

        while let Some((start, line)) = self.next_line() {
            let kind = LineKind::of(line);
            let end = start + line.strip_suffix('\r').unwrap_or(line).len();

            let Some(segment) = open.as_mut() else {
                if !matches!(kind, LineKind::Blank | LineKind::Comment) {
                    open = Some(OpenSegment::new(start, end, self.line_no, kind));
                }
                continue;
            };

            let reopened = match kind {
                LineKind::Blank => {
                    segment.blank_run += 1;
                    if segment.blank_run < 2 {
                        continue;
                    }
                    None
                }
                LineKind::Reference if segment.closed_by_reference() => {
                    Some(OpenSegment::new(start, end, self.line_no, kind))
                }
                _ => {
                    segment.push(end, kind);
                    continue;
                }
            };

            let done = std::mem::replace(&mut open, reopened);
            if let Some(done) = done.filter(|done| self.keeps(done)) {
                self.pending = open.take();
                return Some(self.emit(done));
            }
        }

        open.filter(|done| self.keeps(done)).map(|done| self.emit(done))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(input: &str) -> Vec<&str> {
        split_tunes(input).map(|segment| segment.text).collect()
    }

    #[test]
    fn test_split_on_reference_after_blank_line() {
        let input = "X:1\nT:A\nK:D\nabc|\n\nX:2\nT:B\nK:G\ndef|\n";
        assert_eq!(texts(input), vec!["X:1\nT:A\nK:D\nabc|", "X:2\nT:B\nK:G\ndef|"]);
    }

    #[test]
    fn test_split_on_reference_without_blank_line() {
        let input = "X:1\nT:A\nK:D\nabc|\nX:2\nT:B\nK:G\ndef|";
        assert_eq!(texts(input), vec!["X:1\nT:A\nK:D\nabc|", "X:2\nT:B\nK:G\ndef|"]);
    }

    #[test]
    fn test_split_on_double_blank_line() {
        let input = "T:A\nK:D\nabc|\n\n\nT:B\nK:G\ndef|\n";
        assert_eq!(texts(input), vec!["T:A\nK:D\nabc|", "T:B\nK:G\ndef|"]);
    }

    #[test]
    fn test_single_blank_line_is_kept_inside_tune() {
        let input = "X:1\nT:A\nK:D\nabc|\n\ncba|\n% end of part\ndef|\n";
        assert_eq!(texts(input), vec!["X:1\nT:A\nK:D\nabc|\n\ncba|\n% end of part\ndef|"]);
    }

    #[test]
    fn test_first_reference_line_does_not_split() {
        let input = "X:1\nT:A\nK:D\nabc|\n";
        assert_eq!(texts(input).len(), 1);
    }

    #[test]
    fn test_reference_joins_segment_without_headers() {
        let input = "stray words\nX:1\nT:A\nK:D\nabc|\n";
        assert_eq!(texts(input), vec!["stray words\nX:1\nT:A\nK:D\nabc|"]);
    }

    #[test]
    fn test_empty_reference_marker_does_not_split() {
        let input = "X:1\nT:A\nK:D\nabc|\nX:\ndef|\n";
        assert_eq!(texts(input).len(), 1);
    }

    #[test]
    fn test_leading_comments_and_blank_lines_are_dropped() {
        let input = "%abc-2.1\n%%pagewidth 21cm\n\n\nX:1\nT:A\nK:D\nabc|\n";
        assert_eq!(texts(input), vec!["X:1\nT:A\nK:D\nabc|"]);
    }

    #[test]
    fn test_no_reference_lines_is_one_tune() {
        let input = "\nT:Untitled Air\nM:3/4\nK:Am\nA2 B2 c2|\nd2 e2 f2|\n";
        assert_eq!(texts(input), vec!["T:Untitled Air\nM:3/4\nK:Am\nA2 B2 c2|\nd2 e2 f2|"]);
    }

    #[test]
    fn test_whitespace_only_input_has_no_segments() {
        assert!(texts("").is_empty());
        assert!(texts("\n  \n\t\n").is_empty());
        assert!(texts("% only a comment\n\n% and another\n").is_empty());
    }

    #[test]
    fn test_segment_positions() {
        let input = "% header\nX:1\nT:A\nK:D\nabc|\n\nX:2\nT:B\nK:G\n";
        let segments = split_tunes(input).collect::<Vec<_>>();

        assert_eq!(segments.len(), 2);
        assert_eq!((segments[0].index, segments[0].line), (0, 2));
        assert_eq!((segments[1].index, segments[1].line), (1, 7));
    }

    #[test]
    fn test_crlf_lines_are_recognised() {
        let input = "X:1\r\nT:A\r\nK:D\r\nabc|\r\n\r\n\r\nX:2\r\nT:B\r\nK:G\r\n";
        assert_eq!(texts(input), vec!["X:1\r\nT:A\r\nK:D\r\nabc|", "X:2\r\nT:B\r\nK:G"]);
    }

    #[test]
    fn test_file_header_before_first_tune_is_dropped() {
        let input = "%abc-2.1\nO:Ireland\nZ:transcribed by someone\n\n\
                     X:1\nT:Real Tune\nK:D\nabc|\n";
        assert_eq!(texts(input), vec!["X:1\nT:Real Tune\nK:D\nabc|"]);
    }

    #[test]
    fn test_notes_between_tunes_are_dropped() {
        let input = "X:1\nT:A\nK:D\nabc|\n\n\nTranscribed at a session\n\n\
                     X:2\nT:B\nK:G\ndef|\n";
        assert_eq!(texts(input), vec!["X:1\nT:A\nK:D\nabc|", "X:2\nT:B\nK:G\ndef|"]);
    }

    #[test]
    fn test_trailing_notes_after_last_tune_are_dropped() {
        let input = "X:1\nT:A\nK:D\nabc|\n\n\nEnd of book one\n";
        assert_eq!(texts(input), vec!["X:1\nT:A\nK:D\nabc|"]);
    }
}
