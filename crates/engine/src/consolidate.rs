//! Append normalized sources into one master table.

use log::debug;

use crate::model::{AuditEntry, AuditReason, CanonicalRecord, MasterTable};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Consolidation {
    pub table: MasterTable,
    pub audit: Vec<AuditEntry>,
}

/// Append every source in order. A record whose (Member ID, Care Gap)
/// already exists replaces the earlier record in its slot; the earlier one
/// goes to the audit log. Records without both key parts are always kept.
pub fn consolidate<I>(sources: I) -> Consolidation
where
    I: IntoIterator<Item = (Vec<CanonicalRecord>, String)>,
{
    let mut out = Consolidation::default();
    for (records, source_id) in sources {
        let before = out.audit.len();
        let count = records.len();
        for record in records {
            if let Some(discarded) = out.table.upsert(record.clone()) {
                out.audit.push(AuditEntry {
                    kept: Some(record),
                    discarded,
                    reason: AuditReason::DuplicateKey,
                });
            }
        }
        debug!(
            "source '{source_id}': {count} rows, {} replaced earlier rows",
            out.audit.len() - before
        );
    }
    out
}
