//! Customer listing export
//!
//! Fixed column layout; Company and Name are always quoted, other cells are
//! written as-is. Rows are joined by `\n` with no trailing newline.

use crate::models::{CustomerListing, ListingQuery};

pub const EXPORT_FILE_NAME: &str = "customers_export.csv";

const EXPORT_HEADERS: &[&str] = &[
    "ID",
    "Company",
    "Name",
    "Email",
    "Phone",
    "Group",
    "Status",
    "Date Created",
];

fn quoted(value: Option<&str>) -> String {
    format!("\"{}\"", value.unwrap_or("").replace('"', "\"\""))
}

fn export_row(customer: &CustomerListing) -> String {
    let created = customer
        .created_at_utc()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .or_else(|| customer.created_at.clone())
        .unwrap_or_default();

    [
        customer.id.to_string(),
        quoted(customer.company.as_deref()),
        quoted(customer.name.as_deref()),
        customer.email.clone().unwrap_or_default(),
        customer.phone.clone().unwrap_or_default(),
        customer
            .group_name
            .as_deref()
            .filter(|g| !g.is_empty())
            .unwrap_or("None")
            .to_string(),
        if customer.is_active { "Active" } else { "Inactive" }.to_string(),
        created,
    ]
    .join(",")
}

/// Render customers (already filtered/sorted) as CSV text
pub fn export_customers<'a, I>(customers: I) -> String
where
    I: IntoIterator<Item = &'a CustomerListing>,
{
    std::iter::once(EXPORT_HEADERS.join(","))
        .chain(customers.into_iter().map(export_row))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Apply a listing query, then render
pub fn export_listing(customers: &[CustomerListing], query: &ListingQuery) -> String {
    let rows = query.apply(customers);
    tracing::debug!(
        listed = customers.len(),
        exported = rows.len(),
        "Exporting customer listing"
    );
    export_customers(rows)
}
