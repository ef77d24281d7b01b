//! Assertions over merged output and sink state.

use crate::io::cloud::{Destination, FakeObjectIO, ObjectIO, UploadState};
use crate::parser::{ParseOptions, Row, parse_rows};

/// Parse merged CSV output back into rows.
///
/// # Panics
///
/// Panics if `merged` is not well-formed CSV.
#[must_use]
pub fn parse_merged(merged: &[u8]) -> Vec<Row> {
    parse_rows("merged output", merged, &ParseOptions::default())
        .unwrap_or_else(|e| panic!("merged output is not valid CSV: {e}"))
}

/// Assert that `merged` holds exactly `expected`, row by row.
///
/// # Panics
///
/// Panics on the first differing row or a length mismatch.
pub fn assert_merged_rows(merged: &[u8], expected: &[&[&str]]) {
    let actual = parse_merged(merged);
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert_eq!(a, e, "row {i} differs");
    }
    assert_eq!(
        actual.len(),
        expected.len(),
        "row count mismatch:\n  expected: {expected:?}\n  actual: {actual:?}"
    );
}

/// Assert that `header` appears in `merged` exactly once, as row 0.
///
/// # Panics
///
/// Panics if row 0 differs or the header repeats later.
pub fn assert_single_header(merged: &[u8], header: &[&str]) {
    let rows = parse_merged(merged);
    let is_header = |row: &Row| row.iter().map(String::as_str).eq(header.iter().copied());
    assert!(
        rows.first().is_some_and(|r| is_header(r)),
        "row 0 is not {header:?}: {:?}",
        rows.first()
    );
    let repeats = rows.iter().skip(1).filter(|r| is_header(*r)).count();
    assert_eq!(repeats, 0, "header repeated {repeats} time(s) after row 0");
}

/// Assert that no upload to `destination` was completed and no object exists there.
///
/// # Panics
///
/// Panics if a completed upload or the object is found.
pub fn assert_no_completed_upload(store: &FakeObjectIO, destination: &Destination) {
    let completed = store
        .uploads()
        .into_iter()
        .filter(|u| &u.destination == destination && u.state == UploadState::Completed)
        .count();
    assert_eq!(completed, 0, "upload to {destination} was completed");
    assert!(
        !store
            .object_exists(&destination.bucket, &destination.key)
            .unwrap_or(false),
        "object {destination} exists"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_rows_match() {
        assert_merged_rows(b"id,name\n1,Ann\n", &[&["id", "name"], &["1", "Ann"]]);
        assert_single_header(b"id,name\n1,Ann\n", &["id", "name"]);
    }

    #[test]
    #[should_panic(expected = "header repeated")]
    fn repeated_header_is_caught() {
        assert_single_header(b"id\n1\nid\n", &["id"]);
    }
}
