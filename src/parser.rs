//! CSV row parsing for a single partition.
//!
//! A partition is parsed in one pass into a fully materialized `Vec<Row>`.
//! Row 0 is kept as an ordinary row: header handling belongs to the merge
//! writer, which needs to skip it positionally.

use crate::error::{MergeError, Result};
use serde::{Deserialize, Serialize};

/// One CSV record as an ordered list of field values.
pub type Row = Vec<String>;

/// Dialect options for [`parse_rows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Field delimiter, a single ASCII byte.
    pub delimiter: u8,
    /// Trim leading and trailing whitespace from every field.
    pub trim: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            trim: false,
        }
    }
}

/// Parse raw CSV bytes into rows.
///
/// `partition` only labels errors.
///
/// # Errors
///
/// Returns [`MergeError::ParseError`] if quoting is malformed, a row
/// has a different number of fields than the first row, or a field is not
/// valid UTF-8.
pub fn parse_rows(partition: &str, raw: &[u8], options: &ParseOptions) -> Result<Vec<Row>> {
    let parse_error = |reason: String| MergeError::ParseError {
        partition: partition.to_string(),
        reason,
    };

    // The csv reader is lenient about quoting, so malformed quotes are caught first
    if let Some((fault, line)) = quote_fault(raw, options.delimiter) {
        let reason = match fault {
            QuoteFault::Unterminated => format!("unterminated quoted field starting on line {line}"),
            QuoteFault::Bare => format!("bare quote in unquoted field on line {line}"),
            QuoteFault::AfterClosing => {
                format!("unexpected character after closing quote on line {line}")
            }
        };
        return Err(parse_error(reason));
    }

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .delimiter(options.delimiter)
        .trim(if options.trim {
            csv::Trim::All
        } else {
            csv::Trim::None
        })
        .from_reader(raw);

    let mut rows = Vec::new();
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec.map_err(|e| parse_error(format!("record #{}: {e}", i + 1)))?;
        rows.push(rec.iter().map(ToString::to_string).collect());
    }
    Ok(rows)
}

/// Ways a partition's quoting can be malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteFault {
    /// A quoted field runs to the end of the input.
    Unterminated,
    /// A quote inside a field that did not start with one, as in `a"b`.
    Bare,
    /// Something other than a delimiter or newline follows a closing quote.
    AfterClosing,
}

#[derive(Clone, Copy)]
enum Field {
    Start,
    Unquoted,
    Quoted,
    Closed,
}

/// First quoting fault in `raw` and the line (1-based) it is on.
///
/// Follows RFC 4180: a quote opens a quoted field only at the start of a
/// field, `""` inside a quoted field is an escaped quote, and a closing quote
/// ends the field. Blanks before a quote make it a bare quote, trimming or not.
fn quote_fault(raw: &[u8], delimiter: u8) -> Option<(QuoteFault, usize)> {
    let mut line = 1;
    let mut opened_on = 0;
    let mut field = Field::Start;
    let mut i = 0;
    while i < raw.len() {
        let b = raw[i];
        match field {
            Field::Quoted => {
                if b == b'"' {
                    if raw.get(i + 1) == Some(&b'"') {
                        i += 1;
                    } else {
                        field = Field::Closed;
                    }
                } else if b == b'\n' {
                    line += 1;
                }
            }
            Field::Closed => match b {
                b'\n' => {
                    line += 1;
                    field = Field::Start;
                }
                b'\r' if raw.get(i + 1) == Some(&b'\n') => {}
                d if d == delimiter => field = Field::Start,
                _ => return Some((QuoteFault::AfterClosing, line)),
            },
            Field::Start | Field::Unquoted => match b {
                b'\n' => {
                    line += 1;
                    field = Field::Start;
                }
                d if d == delimiter => field = Field::Start,
                b'"' if matches!(field, Field::Start) => {
                    field = Field::Quoted;
                    opened_on = line;
                }
                b'"' => return Some((QuoteFault::Bare, line)),
                _ => field = Field::Unquoted,
            },
        }
        i += 1;
    }
    matches!(field, Field::Quoted).then_some((QuoteFault::Unterminated, opened_on))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<Vec<Row>> {
        parse_rows("p", raw.as_bytes(), &ParseOptions::default())
    }

    #[test]
    fn header_is_row_zero() {
        let rows = parse("id,name\n1,Ann").unwrap();
        assert_eq!(rows, vec![vec!["id", "name"], vec!["1", "Ann"]]);
    }

    #[test]
    fn quoted_fields_keep_delimiters_and_newlines() {
        let rows = parse("id,note\n1,\"a, \"\"quoted\"\"\nvalue\"\n").unwrap();
        assert_eq!(rows[1], vec!["1", "a, \"quoted\"\nvalue"]);
    }

    #[test]
    fn unterminated_quote_is_rejected() {
        let err = parse("id,name\n1,\"Ann\n2,Bo\n").unwrap_err();
        match err {
            MergeError::ParseError { partition, reason } => {
                assert_eq!(partition, "p");
                assert!(reason.contains("line 2"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn quote_inside_unquoted_field_is_rejected() {
        let err = parse("id,name\n1,a\"b\n").unwrap_err();
        match err {
            MergeError::ParseError { reason, .. } => {
                assert!(reason.contains("bare quote"), "{reason}");
                assert!(reason.contains("line 2"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn text_after_closing_quote_is_rejected() {
        let err = parse("id,name\n1,\"Ann\"x\n").unwrap_err();
        match err {
            MergeError::ParseError { reason, .. } => {
                assert!(reason.contains("after closing quote"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn closing_quote_may_end_a_crlf_line() {
        let rows = parse("id,name\r\n1,\"Ann\"\r\n").unwrap();
        assert_eq!(rows[1], vec!["1", "Ann"]);
    }

    #[test]
    fn blank_before_opening_quote_is_a_bare_quote() {
        let options = ParseOptions {
            delimiter: b',',
            trim: true,
        };
        assert!(parse_rows("p", b"id,name\n1, \"Ann\"\n", &options).is_err());
    }

    #[test]
    fn ragged_row_is_rejected() {
        assert!(matches!(
            parse("id,name\n1,Ann,extra\n"),
            Err(MergeError::ParseError { .. })
        ));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let raw = b"id,name\n1,\xff\xfe\n";
        assert!(parse_rows("p", raw, &ParseOptions::default()).is_err());
    }

    #[test]
    fn empty_input_has_no_rows() {
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn custom_delimiter_and_trim() {
        let options = ParseOptions {
            delimiter: b';',
            trim: true,
        };
        let rows = parse_rows("p", b"id ; name\n 1 ;Ann \n", &options).unwrap();
        assert_eq!(rows, vec![vec!["id", "name"], vec!["1", "Ann"]]);
    }
}
