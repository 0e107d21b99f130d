//! Quote-aware delimited text reader.
//!
//! Follows RFC 4180 quoting: a field wrapped in `"` may contain the
//! delimiter and line breaks, and `""` inside it is a literal quote.
//! Rows may be ragged; use [`cell`] to read positions that may be missing.

use std::mem::take;

/// One line of a delimited document, untyped.
pub type RawRow = Vec<String>;

pub const COMMA: char = ',';

/// Split `text` into rows of cells. Blank lines are skipped; CRLF and LF
/// both end a row. An unterminated quote runs to end of input.
pub fn parse_rows(text: &str, sep: char) -> Vec<RawRow> {
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut row = Vec::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    if matches!(chars.peek(), Some('"')) {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            c if c == sep && !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                row.push(take(&mut field));
                push_row(&mut rows, take(&mut row));
            }
            _ => field.push(ch),
        }
    }

    row.push(field);
    push_row(&mut rows, row);
    rows
}

fn push_row(rows: &mut Vec<RawRow>, row: RawRow) {
    let blank = row.len() == 1 && row[0].trim().is_empty();
    if !blank {
        rows.push(row);
    }
}

/// Separate the header row from the data rows.
pub fn split_header(mut rows: Vec<RawRow>) -> Option<(RawRow, Vec<RawRow>)> {
    if rows.is_empty() {
        return None;
    }
    let header = rows.remove(0);
    Some((header, rows))
}

/// Cell `idx` of `row`, or `""` when the row is too short.
pub fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}
