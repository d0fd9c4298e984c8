//! The two workflows: appending care-gap sheets into a master sheet, and
//! sorting PDFs against a master key sheet.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, info, warn};
use serde::Serialize;

use crate::catalog::CareGapCatalog;
use crate::config::EngineConfig;
use crate::consolidate::consolidate;
use crate::error::EngineError;
use crate::identity::{IdentityExtractor, TextExtractor};
use crate::matcher::match_identity;
use crate::model::{
    AuditEntry, CanonicalField, CanonicalRecord, FieldMapping, MasterTable, PdfDocument, RawTable,
};
use crate::normalize::{derive_identity, normalize, normalize_parallel};
use crate::package::{plan_layout, ArchiveWriter, ReportEntry};
use crate::pool;
use crate::store::MappingStore;

pub type CancelToken = Arc<AtomicBool>;

const MASTER_SOURCE: &str = "master";

// ---------------------------------------------------------------------------
// Append
// ---------------------------------------------------------------------------

/// One sheet to append and the id of its field mapping.
#[derive(Debug, Clone)]
pub struct AppendSource {
    pub table: RawTable,
    pub config_id: String,
}

impl AppendSource {
    pub fn new(table: RawTable, config_id: impl Into<String>) -> Self {
        Self {
            table,
            config_id: config_id.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppendOptions<'a> {
    pub catalog: Option<&'a CareGapCatalog>,
    pub workers: usize,
}

#[derive(Debug, Clone)]
pub struct AppendOutput {
    /// Output columns, in order.
    pub layout: Vec<CanonicalField>,
    pub table: MasterTable,
    pub audit: Vec<AuditEntry>,
    /// Master headers that are not canonical fields.
    pub dropped_columns: Vec<String>,
}

impl AppendOutput {
    pub fn headers(&self) -> Vec<String> {
        self.layout.iter().map(|f| f.label().to_string()).collect()
    }

    pub fn to_rows(&self) -> Vec<Vec<String>> {
        self.table
            .records()
            .iter()
            .map(|r| self.layout.iter().map(|f| r.get(*f).to_string()).collect())
            .collect()
    }

    pub fn to_raw_table(&self) -> RawTable {
        RawTable::new(self.headers(), self.to_rows())
    }
}

/// Output layout from the master sheet's headers.
///
/// Headers naming a canonical field are kept in master order; the rest are
/// returned as dropped. With no canonical headers the default layout is used.
pub fn resolve_layout(headers: &[String]) -> (Vec<CanonicalField>, Vec<String>) {
    let mut layout = Vec::new();
    let mut dropped = Vec::new();
    for header in headers {
        match CanonicalField::from_label(header) {
            Some(field) if !layout.contains(&field) => layout.push(field),
            Some(_) => {}
            None => dropped.push(header.clone()),
        }
    }
    if layout.is_empty() {
        layout = CanonicalField::DEFAULT_LAYOUT.to_vec();
    }
    (layout, dropped)
}

/// Normalize every source with its mapping and append them after the
/// master sheet's rows. Later rows win on duplicate (Member ID, Care Gap).
pub fn append_sheets(
    master: &RawTable,
    sources: &[AppendSource],
    store: &dyn MappingStore,
    options: &AppendOptions<'_>,
) -> Result<AppendOutput, EngineError> {
    // Snapshot every mapping before touching any rows.
    let mappings: Vec<FieldMapping> = sources
        .iter()
        .map(|s| {
            store.get(&s.config_id).ok_or_else(|| {
                EngineError::config(format!("no field mapping with id '{}'", s.config_id))
            })
        })
        .collect::<Result<_, _>>()?;

    let (layout, dropped_columns) = resolve_layout(&master.headers);
    for column in &dropped_columns {
        warn!("master column '{column}' is not a canonical field and will be dropped");
    }

    info!("append: {} master rows, {} sources", master.len(), sources.len());
    let workers = options.workers.max(1);
    let mut audit = Vec::new();
    let mut inputs = Vec::with_capacity(sources.len() + 1);
    inputs.push((master_records(master)?, MASTER_SOURCE.to_string()));

    for (source, mapping) in sources.iter().zip(&mappings) {
        let mut records = normalize_parallel(&source.table.records(), mapping, workers)?;
        for record in &mut records {
            derive_identity(record, mapping);
        }
        if let Some(catalog) = options.catalog {
            let (kept, dropped) = catalog.apply(records);
            debug!("source '{}': {} rows outside the care-gap catalog", mapping.id, dropped.len());
            audit.extend(dropped);
            records = kept;
        }
        inputs.push((records, mapping.id.clone()));
    }

    let consolidated = consolidate(inputs);
    audit.extend(consolidated.audit);
    info!(
        "append: {} rows out, {} audit entries",
        consolidated.table.len(),
        audit.len()
    );

    Ok(AppendOutput {
        layout,
        table: consolidated.table,
        audit,
        dropped_columns,
    })
}

fn master_records(master: &RawTable) -> Result<Vec<CanonicalRecord>, EngineError> {
    let mapping = FieldMapping::identity(MASTER_SOURCE);
    let mut records = normalize(&master.records(), &mapping)?;
    for record in &mut records {
        derive_identity(record, &mapping);
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Sort
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Created,
    Consolidating,
    Matching,
    Packaging,
    Completed,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Consolidating => "consolidating",
            Self::Matching => "matching",
            Self::Packaging => "packaging",
            Self::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// A failed sort job. `unmatched` lists documents already known to be
/// unmatched when the failure happened (empty unless packaging failed).
#[derive(Debug, Clone, PartialEq)]
pub struct JobFailure {
    pub phase: JobPhase,
    pub error: EngineError,
    pub unmatched: Vec<String>,
}

impl JobFailure {
    fn new(phase: JobPhase, error: EngineError) -> Self {
        Self {
            phase,
            error,
            unmatched: Vec::new(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sort job failed while {}: {}", self.phase, self.error)
    }
}

impl std::error::Error for JobFailure {}

#[derive(Debug)]
pub struct SortRequest {
    pub master: RawTable,
    pub documents: Vec<PdfDocument>,
    pub grouping: CanonicalField,
}

#[derive(Debug, Clone)]
pub struct SortOutput {
    /// Finished zip archive.
    pub archive: Vec<u8>,
    pub report: Vec<ReportEntry>,
    pub summary: String,
}

impl SortOutput {
    pub fn unmatched_count(&self) -> usize {
        self.report.iter().filter(|e| e.master_row.is_none()).count()
    }
}

/// Runs sort requests with a text extractor and archive writer.
#[derive(Clone)]
pub struct SortJob {
    config: EngineConfig,
    text: Arc<dyn TextExtractor>,
    writer: Arc<dyn ArchiveWriter>,
}

impl SortJob {
    pub fn new(
        config: EngineConfig,
        text: Arc<dyn TextExtractor>,
        writer: Arc<dyn ArchiveWriter>,
    ) -> Self {
        Self { config, text, writer }
    }

    /// Run on a dedicated thread, waiting at most `jobs.timeout_secs`. On
    /// timeout the job's workers are told to stop and its late result is
    /// discarded.
    pub fn run(&self, request: SortRequest) -> Result<SortOutput, JobFailure> {
        let cancel: CancelToken = Arc::new(AtomicBool::new(false));
        let phase = Arc::new(Mutex::new(JobPhase::Created));
        let (tx, rx) = mpsc::channel();

        let job = self.clone();
        let job_cancel = cancel.clone();
        let job_phase = phase.clone();
        thread::Builder::new()
            .name("gapsort-job".into())
            .spawn(move || {
                let result = job.execute(request, &job_cancel, &job_phase);
                // receiver is gone after a timeout
                let _ = tx.send(result);
            })
            .map_err(|e| JobFailure::new(JobPhase::Created, EngineError::Worker(e.to_string())))?;

        let received = match self.config.jobs.timeout() {
            Some(limit) => rx.recv_timeout(limit).map_err(|e| match e {
                RecvTimeoutError::Timeout => EngineError::Timeout { limit },
                RecvTimeoutError::Disconnected => job_thread_died(),
            }),
            None => rx.recv().map_err(|_| job_thread_died()),
        };

        match received {
            Ok(result) => result,
            Err(error) => {
                cancel.store(true, Ordering::Relaxed);
                let at = current_phase(&phase);
                warn!("sort job abandoned while {at}: {error}");
                Err(JobFailure::new(at, error))
            }
        }
    }

    fn execute(
        &self,
        request: SortRequest,
        cancel: &AtomicBool,
        phase: &Mutex<JobPhase>,
    ) -> Result<SortOutput, JobFailure> {
        let SortRequest {
            master,
            documents,
            grouping,
        } = request;

        set_phase(phase, JobPhase::Consolidating);
        let records = master_records(&master).map_err(|e| JobFailure::new(JobPhase::Consolidating, e))?;
        let table = MasterTable::from_records(records);
        info!("sort: master key sheet has {} rows", table.len());

        set_phase(phase, JobPhase::Matching);
        let extractor = IdentityExtractor::new(&self.config.extraction)
            .map_err(|e| JobFailure::new(JobPhase::Matching, e))?;
        let workers = self.config.jobs.effective_workers();
        info!("sort: extracting identities from {} documents on {workers} workers", documents.len());
        let identities = pool::map_ordered(&documents, workers, Some(cancel), |doc| {
            extractor.extract(doc, self.text.as_ref())
        })
        .map_err(|e| JobFailure::new(JobPhase::Matching, e))?;

        let results: Vec<_> = documents
            .iter()
            .zip(&identities)
            .map(|(doc, identity)| match_identity(identity, &table, &self.config.matching, &doc.filename))
            .collect();
        let matched = results.iter().filter(|r| r.is_matched()).count();
        info!("sort: {matched} of {} documents matched", results.len());

        set_phase(phase, JobPhase::Packaging);
        let plan = plan_layout(&documents, &results, &table, grouping)
            .map_err(|e| JobFailure::new(JobPhase::Packaging, e))?;
        let archive = self.writer.write(&plan, &documents).map_err(|error| JobFailure {
            phase: JobPhase::Packaging,
            error,
            unmatched: plan.unmatched(),
        })?;

        set_phase(phase, JobPhase::Completed);
        info!("sort: archive written ({} bytes)", archive.len());
        Ok(SortOutput {
            archive,
            report: plan.report,
            summary: plan.summary,
        })
    }
}

/// Sort `documents` against `master` grouped by `grouping`.
pub fn sort_documents(
    master: RawTable,
    documents: Vec<PdfDocument>,
    grouping: CanonicalField,
    text: Arc<dyn TextExtractor>,
    writer: Arc<dyn ArchiveWriter>,
    config: &EngineConfig,
) -> Result<SortOutput, JobFailure> {
    config
        .validate()
        .map_err(|e| JobFailure::new(JobPhase::Created, e))?;
    SortJob::new(config.clone(), text, writer).run(SortRequest {
        master,
        documents,
        grouping,
    })
}

fn set_phase(phase: &Mutex<JobPhase>, next: JobPhase) {
    if let Ok(mut p) = phase.lock() {
        *p = next;
    }
    debug!("sort job phase: {next}");
}

fn current_phase(phase: &Mutex<JobPhase>) -> JobPhase {
    phase.lock().map(|p| *p).unwrap_or(JobPhase::Created)
}

fn job_thread_died() -> EngineError {
    EngineError::Worker("job thread panicked".into())
}
