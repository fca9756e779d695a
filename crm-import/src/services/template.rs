//! Downloadable import templates
//!
//! A template is a header-only CSV listing every source column the mapping
//! recognizes for a target. Output depends only on the target, so repeated
//! calls are byte-identical.

use super::mappings::template_headers;
use crate::models::ImportTarget;

/// Header-only template for `target`
pub fn template_csv(target: ImportTarget) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(template_headers(target))?;
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}
