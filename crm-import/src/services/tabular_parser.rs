//! Tabular file parser
//!
//! Turns an uploaded comma-separated file into an ordered, non-empty list of
//! [`RawRecord`]s keyed by the header row. Column names and counts are not
//! validated: short rows are padded with empty values, extra cells are
//! dropped, and rows whose cells are all blank are skipped.

use crate::models::{ParsedFile, RawRecord};
use csv::{ReaderBuilder, Trim};
use thiserror::Error;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Media types accepted for uploads that do not end in `.csv`
const ACCEPTED_CONTENT_TYPES: &[&str] = &["text/csv", "application/vnd.ms-excel"];

/// Parse errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Header row only, or nothing at all
    #[error("The file appears to be empty: no data rows found")]
    EmptyFile,

    #[error("Malformed file at line {line}: {message}")]
    Malformed { line: u64, message: String },

    #[error("Unsupported file format '{0}': please upload a .csv file")]
    UnsupportedFormat(String),
}

/// Comma-separated CSV parser with header-keyed output
#[derive(Debug, Clone, Copy, Default)]
pub struct TabularParser;

impl TabularParser {
    pub fn new() -> Self {
        Self
    }

    /// Check that an upload looks like a CSV file before reading it
    ///
    /// Accepted when the name ends in `.csv` (any case) or the declared
    /// media type is a CSV type.
    pub fn accept(file_name: &str, content_type: Option<&str>) -> Result<(), ParseError> {
        let by_name = file_name.to_ascii_lowercase().ends_with(".csv");
        let by_type = content_type
            .map(|ct| {
                let essence = ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase();
                ACCEPTED_CONTENT_TYPES.contains(&essence.as_str())
            })
            .unwrap_or(false);

        if by_name || by_type {
            Ok(())
        } else {
            Err(ParseError::UnsupportedFormat(file_name.to_string()))
        }
    }

    /// Parse file contents into records, in file order
    pub fn parse(&self, contents: &[u8]) -> Result<ParsedFile, ParseError> {
        let contents = contents.strip_prefix(UTF8_BOM).unwrap_or(contents);

        let mut reader = ReaderBuilder::new()
            .delimiter(b',')
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(contents);

        let headers: Vec<String> = reader
            .headers()
            .map_err(malformed)?
            .iter()
            .map(str::to_string)
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(ParseError::EmptyFile);
        }

        let mut records = Vec::new();
        for result in reader.records() {
            let row = result.map_err(malformed)?;
            let record = RawRecord::new(
                headers
                    .iter()
                    .enumerate()
                    .map(|(i, header)| (header.clone(), row.get(i).unwrap_or("").to_string()))
                    .collect(),
            );
            if !record.is_blank() {
                records.push(record);
            }
        }

        tracing::debug!(
            columns = headers.len(),
            records = records.len(),
            "Parsed tabular file"
        );

        ParsedFile::from_records(headers, records).ok_or(ParseError::EmptyFile)
    }
}

fn malformed(err: csv::Error) -> ParseError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    let message = match err.kind() {
        csv::ErrorKind::Utf8 { err, .. } => format!("invalid UTF-8 ({})", err),
        _ => err.to_string(),
    };
    ParseError::Malformed { line, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ParsedFile, ParseError> {
        TabularParser::new().parse(text.as_bytes())
    }

    #[test]
    fn test_records_in_file_order() {
        let file = parse("Name,Email\nAnn,a@x.com\nBob,b@x.com\nCy,c@x.com\n").unwrap();
        assert_eq!(file.len(), 3);
        let names: Vec<_> = file.records().iter().map(|r| r.get("Name").unwrap()).collect();
        assert_eq!(names, vec!["Ann", "Bob", "Cy"]);
    }

    #[test]
    fn test_blank_rows_skipped() {
        let file = parse("Name,Email\nAnn,a@x.com\n , \n,\nBob,\n").unwrap();
        assert_eq!(file.len(), 2);
    }

    #[test]
    fn test_header_only_is_empty_file() {
        assert_eq!(parse("Name,Email\n"), Err(ParseError::EmptyFile));
        assert_eq!(parse(""), Err(ParseError::EmptyFile));
        assert_eq!(parse("Name,Email\n,\n"), Err(ParseError::EmptyFile));
    }

    #[test]
    fn test_short_rows_padded_and_extra_cells_dropped() {
        let file = parse("A,B,C\n1\n1,2,3,4\n").unwrap();
        let short = &file.records()[0];
        assert_eq!(short.get("B"), Some(""));
        assert_eq!(short.get("C"), Some(""));
        assert_eq!(file.records()[1].len(), 3);
    }

    #[test]
    fn test_bom_stripped_from_first_header() {
        let file = parse("\u{feff}Firstname,Lastname\nJane,Doe\n").unwrap();
        assert_eq!(file.headers()[0], "Firstname");
        assert_eq!(file.records()[0].get("Firstname"), Some("Jane"));
    }

    #[test]
    fn test_quoted_cells_keep_commas() {
        let file = parse("Company,City\n\"Acme, Inc.\",Paris\n").unwrap();
        assert_eq!(file.records()[0].get("Company"), Some("Acme, Inc."));
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let bytes = b"Name\n\xff\xfe\n";
        let err = TabularParser::new().parse(bytes).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn test_accept_by_name_or_media_type() {
        assert!(TabularParser::accept("people.CSV", None).is_ok());
        assert!(TabularParser::accept("export", Some("text/csv; charset=utf-8")).is_ok());
        assert!(TabularParser::accept("export.dat", Some("application/vnd.ms-excel")).is_ok());
        assert_eq!(
            TabularParser::accept("people.xlsx", Some("application/octet-stream")),
            Err(ParseError::UnsupportedFormat("people.xlsx".to_string()))
        );
    }
}
