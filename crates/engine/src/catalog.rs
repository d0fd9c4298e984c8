//! Care-gap catalog: raw care-gap names grouped under category headers.

use std::collections::HashMap;

use crate::model::{AuditEntry, AuditReason, CanonicalField, CanonicalRecord, RawTable};

/// Lookup from raw care-gap name (any case) to its category.
///
/// Built from a sheet whose headers are categories and whose cells list
/// the raw names belonging to each. A name listed under several headers
/// belongs to the leftmost one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CareGapCatalog {
    categories: Vec<String>,
    names: HashMap<String, usize>,
}

impl CareGapCatalog {
    pub fn from_table(table: &RawTable) -> Self {
        let mut catalog = Self {
            categories: table.headers.iter().map(|h| h.trim().to_string()).collect(),
            names: HashMap::new(),
        };
        for col in 0..catalog.categories.len() {
            for row in &table.rows {
                let Some(cell) = row.get(col) else { continue };
                let key = cell.trim().to_lowercase();
                if !key.is_empty() {
                    catalog.names.entry(key).or_insert(col);
                }
            }
        }
        catalog
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn category_of(&self, care_gap: &str) -> Option<&str> {
        self.names
            .get(&care_gap.trim().to_lowercase())
            .map(|&col| self.categories[col].as_str())
    }

    /// Rewrite each record's Care Gap to its category. Records with an
    /// uncatalogued care gap are removed and reported.
    pub fn apply(&self, records: Vec<CanonicalRecord>) -> (Vec<CanonicalRecord>, Vec<AuditEntry>) {
        let mut kept = Vec::with_capacity(records.len());
        let mut dropped = Vec::new();
        for mut record in records {
            match self.category_of(record.get(CanonicalField::CareGap)) {
                Some(category) => {
                    let category = category.to_string();
                    record.set(CanonicalField::CareGap, category);
                    kept.push(record);
                }
                None => dropped.push(AuditEntry {
                    kept: None,
                    discarded: record,
                    reason: AuditReason::UnmappedCareGap,
                }),
            }
        }
        (kept, dropped)
    }
}
