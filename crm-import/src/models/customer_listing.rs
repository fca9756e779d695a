//! Customer listing rows and the listing query applied before export

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One customer row as returned by the CRM listing endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerListing {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: i64,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub is_active: bool,
    /// Timestamp as sent by the store (RFC 3339 or `YYYY-MM-DD HH:MM:SS`)
    #[serde(default)]
    pub created_at: Option<String>,
}

impl CustomerListing {
    /// Parsed creation time, when the store sent a recognizable timestamp
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?.trim();
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Number(i64),
    Text(String),
}

fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match IdRepr::deserialize(deserializer)? {
        IdRepr::Number(n) => Ok(n),
        IdRepr::Text(s) => s.trim().parse().map_err(de::Error::custom),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagRepr {
    Bool(bool),
    Number(i64),
    Text(String),
}

/// Accepts `true`/`false`, `1`/`0` and their string forms
fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Option::<FlagRepr>::deserialize(deserializer)? {
        None => false,
        Some(FlagRepr::Bool(b)) => b,
        Some(FlagRepr::Number(n)) => n != 0,
        Some(FlagRepr::Text(s)) => matches!(s.trim(), "1" | "true" | "TRUE" | "True"),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Id,
    Name,
    Company,
    Email,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

/// Search, status filter and sort order for a customer listing
///
/// The default query keeps every row, newest id first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingQuery {
    /// Case-insensitive substring matched against name, email and company
    pub search: Option<String>,
    pub status: StatusFilter,
    pub sort: SortKey,
    pub direction: SortDirection,
}

impl ListingQuery {
    pub fn apply<'a>(&self, customers: &'a [CustomerListing]) -> Vec<&'a CustomerListing> {
        let needle = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut rows: Vec<&CustomerListing> = customers
            .iter()
            .filter(|c| match &needle {
                Some(needle) => [&c.name, &c.email, &c.company]
                    .into_iter()
                    .flatten()
                    .any(|field| field.to_lowercase().contains(needle.as_str())),
                None => true,
            })
            .filter(|c| match self.status {
                StatusFilter::All => true,
                StatusFilter::Active => c.is_active,
                StatusFilter::Inactive => !c.is_active,
            })
            .collect();

        // Stable sort: equal keys keep listing order
        rows.sort_by(|a, b| {
            let ordering = self.compare(a, b);
            match self.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });
        rows
    }

    fn compare(&self, a: &CustomerListing, b: &CustomerListing) -> Ordering {
        match self.sort {
            SortKey::Id => a.id.cmp(&b.id),
            SortKey::Name => a.name.cmp(&b.name),
            SortKey::Company => a.company.cmp(&b.company),
            SortKey::Email => a.email.cmp(&b.email),
            SortKey::CreatedAt => match (a.created_at_utc(), b.created_at_utc()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => a.created_at.cmp(&b.created_at),
            },
        }
    }
}
