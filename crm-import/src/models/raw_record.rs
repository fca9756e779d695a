//! Parsed input rows
//!
//! A [`RawRecord`] keeps every cell of one input row keyed by the header it
//! appeared under, in header order. A [`ParsedFile`] is the ordered,
//! non-empty record set produced by the tabular parser.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// One input row: header → cell value, in header-row order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    fields: Vec<(String, String)>,
}

impl RawRecord {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// Build a record from header/value pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value under `header`; with duplicate headers the first column wins
    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }

    /// Trimmed value under `header`, or None when absent or blank
    pub fn non_empty(&self, header: &str) -> Option<&str> {
        self.get(header).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(h, _)| h.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(h, v)| (h.as_str(), v.as_str()))
    }

    /// True when every cell is empty or whitespace
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.trim().is_empty())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Serialized as a JSON object whose keys follow header order
impl Serialize for RawRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (header, value) in &self.fields {
            map.serialize_entry(header, value)?;
        }
        map.end()
    }
}

/// Header row plus at least one data record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedFile {
    headers: Vec<String>,
    records: Vec<RawRecord>,
}

impl ParsedFile {
    /// Returns None when `records` is empty
    pub fn from_records(headers: Vec<String>, records: Vec<RawRecord>) -> Option<Self> {
        if records.is_empty() {
            None
        } else {
            Some(Self { headers, records })
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false; kept for the `len`/`is_empty` pair
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<RawRecord>) {
        (self.headers, self.records)
    }
}
