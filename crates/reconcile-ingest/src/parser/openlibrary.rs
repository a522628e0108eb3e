//! Open Library dump parser
//!
//! Parses lines of the Open Library "all types" dump:
//!
//! ```text
//! type \t key \t revision \t last_modified \t JSON
//! /type/edition	/books/OL001M	6	2020-12-22T19:20:44.396666	{"key": "/books/OL001M", ...}
//! ```
//!
//! Only `/type/edition` lines qualify. From the JSON payload the edition key,
//! the Internet Archive identifier and the first ISBN-10/ISBN-13 are kept.

use serde::{Deserialize, Serialize};

use super::isbn::isbn10_to_isbn13;
use super::{LineParser, ParseError, Parsed, SkipReason};

/// Record type column value for editions
pub const EDITION_TYPE: &[u8] = b"/type/edition";

/// Columns per dump line
pub const COLUMN_COUNT: usize = 5;

const PAYLOAD_COLUMN: usize = 4;

/// One edition extracted from the dump
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edition {
    /// Open Library edition id, e.g. `OL123M`
    pub olid: String,
    /// Internet Archive identifier, empty when the edition has none
    pub ocaid: String,
    pub isbn10: String,
    pub isbn13: String,
}

impl Edition {
    pub fn new(
        olid: impl Into<String>,
        ocaid: impl Into<String>,
        isbn10: impl Into<String>,
        isbn13: impl Into<String>,
    ) -> Self {
        Self {
            olid: olid.into(),
            ocaid: ocaid.into(),
            isbn10: isbn10.into(),
            isbn13: isbn13.into(),
        }
    }

    /// Fill in the ISBN-13 from the ISBN-10 when only the latter is known
    ///
    /// An ISBN-13 that is already present is kept as is, even when the
    /// ISBN-10 would produce a different one.
    pub fn derive_isbn13(&mut self) {
        if !self.isbn13.is_empty() || self.isbn10.is_empty() {
            return;
        }

        let (isbn10, isbn13) = isbn10_to_isbn13(&self.isbn10);
        self.isbn10 = isbn10;
        self.isbn13 = isbn13.unwrap_or_default();
    }
}

#[derive(Debug, Deserialize)]
struct EditionPayload {
    key: Option<String>,
    ocaid: Option<String>,
    isbn_10: Option<Vec<String>>,
    isbn_13: Option<Vec<String>>,
}

/// Edition parser for the Open Library dump
#[derive(Debug, Clone, Copy, Default)]
pub struct EditionParser;

impl EditionParser {
    pub fn new() -> Self {
        Self
    }
}

impl LineParser for EditionParser {
    type Record = Edition;

    fn parse_line(&self, line: &[u8]) -> Result<Parsed<Edition>, ParseError> {
        let columns: Vec<&[u8]> = line.split(|&b| b == b'\t').collect();
        if columns.len() != COLUMN_COUNT {
            return Ok(Parsed::NotApplicable(SkipReason::WrongColumnCount(
                columns.len(),
            )));
        }

        if columns[0] != EDITION_TYPE {
            return Ok(Parsed::NotApplicable(SkipReason::WrongRecordType));
        }

        let payload: EditionPayload = serde_json::from_slice(columns[PAYLOAD_COLUMN])?;

        let mut edition = Edition {
            olid: payload
                .key
                .as_deref()
                .map(olid_from_key)
                .unwrap_or_default()
                .to_string(),
            ocaid: payload.ocaid.unwrap_or_default(),
            isbn10: first_of(payload.isbn_10),
            isbn13: first_of(payload.isbn_13),
        };
        edition.derive_isbn13();

        Ok(Parsed::Record(edition))
    }
}

/// `/books/OL1234M` -> `OL1234M`
pub fn olid_from_key(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

fn first_of(values: Option<Vec<String>>) -> String {
    values
        .and_then(|v| v.into_iter().next())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Parsed<Edition>, ParseError> {
        EditionParser::new().parse_line(line.as_bytes())
    }

    fn record(line: &str) -> Edition {
        match parse(line).unwrap() {
            Parsed::Record(edition) => edition,
            other => panic!("expected a record, got {:?}", other),
        }
    }

    #[test]
    fn test_olid_from_key() {
        assert_eq!(olid_from_key("/books/OL123M"), "OL123M");
        assert_eq!(olid_from_key("OL123M"), "OL123M");
    }

    #[test]
    fn test_isbn13_only() {
        let edition = record(
            "/type/edition\t/books/OL001M\t6\t2020-12-22T19:20:44.396666\t{\"key\": \"/books/OL001M\", \"isbn_13\": [\"9788955565683\"], \"ocaid\": \"IA001\"}",
        );
        assert_eq!(edition, Edition::new("OL001M", "IA001", "", "9788955565683"));
    }

    #[test]
    fn test_isbn10_is_converted() {
        let edition = record(
            "/type/edition\t/books/OL002M\t6\t2020-12-22T19:20:44.396666\t{\"key\": \"/books/OL002M\", \"isbn_10\": [\"0141439513\"], \"ocaid\": \"IA002\"}",
        );
        assert_eq!(
            edition,
            Edition::new("OL002M", "IA002", "0141439513", "9780141439518")
        );
    }

    #[test]
    fn test_existing_isbn13_is_not_recomputed() {
        let edition = record(
            "/type/edition\t/books/OL011M\t6\t2020-12-22T19:20:44.396666\t{\"key\": \"/books/OL011M\", \"isbn_10\": [\"0135043948\"], \"isbn_13\": [\"9788955565683\"], \"ocaid\": \"IA011\"}",
        );
        assert_eq!(edition.isbn10, "0135043948");
        assert_eq!(edition.isbn13, "9788955565683");
    }

    #[test]
    fn test_missing_and_null_fields_are_empty() {
        let edition = record(
            "/type/edition\t/books/OL007M\t6\t2020-12-22T19:20:44.396666\t{\"key\": \"/books/OL007M\", \"ocaid\": null, \"isbn_10\": []}",
        );
        assert_eq!(edition, Edition::new("OL007M", "", "", ""));
    }

    #[test]
    fn test_skips_non_editions() {
        let parsed = parse(
            "/type/author\t/authors/OL001A\t6\t2020-12-22T19:20:44.396666\t{\"key\": \"/authors/OL001A\"}",
        )
        .unwrap();
        assert_eq!(parsed, Parsed::NotApplicable(SkipReason::WrongRecordType));
    }

    #[test]
    fn test_wrong_column_count_is_not_applicable() {
        let parsed = parse("/books/OL009M\t6\t2020-12-22T19:20:44.396666\t{}").unwrap();
        assert_eq!(parsed, Parsed::NotApplicable(SkipReason::WrongColumnCount(4)));
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let err = parse("/type/edition\t/books/OL1M\t1\t2020-01-01\t{\"key\": ").unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn test_missing_or_null_key_gives_empty_olid() {
        let edition = record(
            "/type/edition\t/books/OL1M\t1\t2020-01-01\t{\"ocaid\": \"IA1\", \"isbn_13\": [\"9788955565683\"]}",
        );
        assert_eq!(edition, Edition::new("", "IA1", "", "9788955565683"));

        let edition = record(
            "/type/edition\t/books/OL1M\t1\t2020-01-01\t{\"key\": null, \"ocaid\": \"IA1\"}",
        );
        assert_eq!(edition, Edition::new("", "IA1", "", ""));
    }

    #[test]
    fn test_only_first_isbn_of_a_type_is_kept() {
        let edition = record(
            "/type/edition\t/books/OL010M\t6\t2020-12-22T19:20:44.396666\t{\"key\": \"/books/OL010M\", \"isbn_13\": [\"1234567890123\", \"9788955565683\"], \"ocaid\": \"IA010\"}",
        );
        assert_eq!(edition, Edition::new("OL010M", "IA010", "", "1234567890123"));
    }

    #[test]
    fn test_isbn10_check_digit_is_not_validated() {
        let edition = record(
            "/type/edition\t/books/OL003M\t6\t2020-12-22T19:20:44.396666\t{\"key\": \"/books/OL003M\", \"isbn_10\": [\"222222222X\"], \"ocaid\": \"IA003\"}",
        );
        assert_eq!(
            edition,
            Edition::new("OL003M", "IA003", "222222222X", "9782222222224")
        );
    }

    #[test]
    fn test_isbn13_is_kept_verbatim() {
        let edition = record(
            "/type/edition\t/books/OL004M\t6\t2020-12-22T19:20:44.396666\t{\"key\": \"/books/OL004M\", \"isbn_13\": [\"1234567890123\"], \"ocaid\": \"IA004\"}",
        );
        assert_eq!(edition, Edition::new("OL004M", "IA004", "", "1234567890123"));
    }

    #[test]
    fn test_too_many_columns_is_not_applicable() {
        let parsed = parse(
            "ExtraCol\t/type/edition\t/books/OL008M\t6\t2020-12-22T19:20:44.396666\t{\"key\": \"/books/OL008M\", \"isbn_13\": [\"9788955565683\"], \"ocaid\": \"IA008\"}",
        )
        .unwrap();
        assert_eq!(parsed, Parsed::NotApplicable(SkipReason::WrongColumnCount(6)));
    }

    #[test]
    fn test_empty_isbn13_array_is_empty() {
        let edition = record(
            "/type/edition\t/books/OL014M\t6\t2020-12-22T19:20:44.396666\t{\"key\": \"/books/OL014M\", \"isbn_13\": [], \"ocaid\": \"IA014\"}",
        );
        assert_eq!(edition, Edition::new("OL014M", "IA014", "", ""));
    }

    #[test]
    fn test_wrong_length_isbn10_is_replaced_on_edition() {
        let edition = record(
            "/type/edition\t/books/OL012M\t6\t2020-12-22T19:20:44.396666\t{\"key\": \"/books/OL012M\", \"isbn_10\": [\"123\"], \"ocaid\": \"IA012\"}",
        );
        assert_eq!(
            edition,
            Edition::new("OL012M", "IA012", "0000000000", "9780000000002")
        );
    }
}
