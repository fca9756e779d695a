//! Built-in field mappings for customer and lead imports

use super::field_mapper::{Coercion, FieldMapping, FieldRule};
use crate::models::{ImportTarget, RawRecord};

/// Lead statuses the CRM knows about
pub const LEAD_STATUSES: &[&str] = &["New", "Contacted", "Qualified", "Proposal", "Won", "Lost"];

/// "Firstname Lastname", else the company name
fn customer_display_name(raw: &RawRecord) -> Option<String> {
    let first = raw.non_empty("Firstname").unwrap_or("");
    let last = raw.non_empty("Lastname").unwrap_or("");
    let full = format!("{} {}", first, last).trim().to_string();
    if full.is_empty() {
        raw.non_empty("Company").map(str::to_string)
    } else {
        Some(full)
    }
}

static CUSTOMER_RULES: &[FieldRule] = &[
    FieldRule::derived("name", customer_display_name).with_default("Unknown"),
    FieldRule::text("email", &["Email"]),
    FieldRule::text("company", &["Company"]),
    FieldRule::text("vat_number", &["Vat"]),
    FieldRule::text("website", &["Website"]),
    FieldRule::text("phone", &["Contact phonenumber", "Phonenumber"]),
    FieldRule::text("address", &["Billing street", "Address"]),
    FieldRule::text("city", &["Billing city", "City"]),
    FieldRule::text("state", &["Billing state", "State"]),
    FieldRule::text("zipcode", &["Billing zip", "Zip"]),
    FieldRule::text("country", &["Billing country", "Country"]).with_default("United States"),
    FieldRule::constant("currency", "USD"),
    FieldRule::constant("language", "English"),
    FieldRule::constant("is_active", "1").coerce(Coercion::Integer),
];

static LEAD_RULES: &[FieldRule] = &[
    FieldRule::text("name", &["Name"]).with_default("Unknown Lead"),
    FieldRule::text("position", &["Position"]),
    FieldRule::text("company", &["Company"]),
    FieldRule::text("description", &["Description"]),
    FieldRule::text("address", &["Address"]),
    FieldRule::text("city", &["City"]),
    FieldRule::text("state", &["State"]),
    FieldRule::text("zipcode", &["Zip"]),
    FieldRule::text("country", &["Country"]),
    FieldRule::text("status", &["Status"])
        .with_default("New")
        .coerce(Coercion::Enum(LEAD_STATUSES)),
    FieldRule::text("source", &["Source"]),
    FieldRule::text("email", &["Email"]),
    FieldRule::text("website", &["Website"]),
    FieldRule::text("phone", &["Phonenumber"]),
    FieldRule::text("value", &["Lead value"])
        .with_default("0")
        .coerce(Coercion::Float),
    FieldRule::text("tags", &["Tags"]),
    // "Assign To" / "Add to Group" in the import form
    FieldRule::configured("owner").with_default("Me"),
    FieldRule::configured("group"),
    FieldRule::constant("currency", "USD"),
];

pub static CUSTOMER_MAPPING: FieldMapping = FieldMapping {
    target: ImportTarget::Customer,
    rules: CUSTOMER_RULES,
};

pub static LEAD_MAPPING: FieldMapping = FieldMapping {
    target: ImportTarget::Lead,
    rules: LEAD_RULES,
};

pub fn mapping_for(target: ImportTarget) -> &'static FieldMapping {
    match target {
        ImportTarget::Customer => &CUSTOMER_MAPPING,
        ImportTarget::Lead => &LEAD_MAPPING,
    }
}

/// Source columns recognized for a target, in template order
pub fn template_headers(target: ImportTarget) -> &'static [&'static str] {
    match target {
        ImportTarget::Customer => &[
            "Firstname",
            "Lastname",
            "Email",
            "Contact phonenumber",
            "Position",
            "Company",
            "Vat",
            "Phonenumber",
            "Website",
            "Address",
            "City",
            "State",
            "Zip",
            "Country",
            "Billing street",
            "Billing city",
            "Billing state",
            "Billing zip",
            "Billing country",
        ],
        ImportTarget::Lead => &[
            "Name",
            "Position",
            "Company",
            "Description",
            "Country",
            "Zip",
            "City",
            "State",
            "Address",
            "Status",
            "Source",
            "Email",
            "Website",
            "Phonenumber",
            "Lead value",
            "Tags",
        ],
    }
}
