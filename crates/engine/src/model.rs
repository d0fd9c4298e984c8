use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::de::Deserializer;
use serde::ser::{SerializeMap, SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::identity::TextExtractor;

// ---------------------------------------------------------------------------
// Canonical fields
// ---------------------------------------------------------------------------

/// The fixed field set every source sheet is normalized into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalField {
    FirstName,
    LastName,
    MemberId,
    CareGap,
    Dob,
    Provider,
    Insurance,
    InsuranceProvided,
    FullName,
    Notes,
}

impl CanonicalField {
    pub const COUNT: usize = 10;

    pub const ALL: [CanonicalField; Self::COUNT] = [
        Self::FirstName,
        Self::LastName,
        Self::MemberId,
        Self::CareGap,
        Self::Dob,
        Self::Provider,
        Self::Insurance,
        Self::InsuranceProvided,
        Self::FullName,
        Self::Notes,
    ];

    /// Column layout used when the master sheet has no canonical headers.
    pub const DEFAULT_LAYOUT: [CanonicalField; 8] = [
        Self::FirstName,
        Self::LastName,
        Self::MemberId,
        Self::CareGap,
        Self::Dob,
        Self::Insurance,
        Self::Provider,
        Self::Notes,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::FirstName => "First Name",
            Self::LastName => "Last Name",
            Self::MemberId => "Member ID",
            Self::CareGap => "Care Gap",
            Self::Dob => "DOB",
            Self::Provider => "Doctor/Provider",
            Self::Insurance => "Insurance",
            Self::InsuranceProvided => "Insurance Provided",
            Self::FullName => "Full Name",
            Self::Notes => "Notes",
        }
    }

    /// Case-insensitive, whitespace-trimmed label lookup.
    pub fn from_label(label: &str) -> Option<Self> {
        let wanted = label.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.label().eq_ignore_ascii_case(wanted))
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CanonicalField {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| {
            EngineError::config(format!("unknown canonical field '{}'", s.trim()))
        })
    }
}

impl Serialize for CanonicalField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for CanonicalField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Field mapping
// ---------------------------------------------------------------------------

/// A column-name preset: canonical field -> source column.
///
/// Blank values and the literal `none` count as unmapped. The
/// `Insurance Provided` entry is a yes/no flag; when it is `No`, the
/// `Insurance` entry holds the insurer name itself rather than a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<CanonicalField, String>,
}

impl FieldMapping {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: CanonicalField, column: impl Into<String>) -> Self {
        self.fields.insert(field, column.into());
        self
    }

    /// Mapping where every canonical field reads the column of the same label.
    pub fn identity(id: impl Into<String>) -> Self {
        let id = id.into();
        let mut mapping = Self::new(id.clone(), id);
        for field in CanonicalField::ALL {
            mapping.fields.insert(field, field.label().to_string());
        }
        mapping
    }

    /// Mapped source column, or `None` when unmapped.
    pub fn column(&self, field: CanonicalField) -> Option<&str> {
        self.fields
            .get(&field)
            .map(|c| c.trim())
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("none"))
    }

    pub fn is_empty(&self) -> bool {
        CanonicalField::ALL.iter().all(|f| self.column(*f).is_none())
    }

    /// False when the sheet carries no insurance column of its own.
    pub fn insurance_provided(&self) -> bool {
        !matches!(
            self.fields.get(&CanonicalField::InsuranceProvided),
            Some(flag) if flag.trim().eq_ignore_ascii_case("no")
        )
    }

    /// Insurer name to stamp on every row when the sheet has none.
    pub fn literal_insurance(&self) -> Option<&str> {
        if self.insurance_provided() {
            None
        } else {
            self.column(CanonicalField::Insurance)
        }
    }
}

// ---------------------------------------------------------------------------
// Raw input
// ---------------------------------------------------------------------------

/// One spreadsheet row as (column, value) pairs in header order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    cells: Vec<(String, String)>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            cells: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.cells.push((column.into(), value.into()));
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    /// Exact column lookup.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    /// Exact lookup first, then the first header equal ignoring case and
    /// surrounding whitespace.
    pub fn lookup(&self, column: &str) -> Option<&str> {
        if let Some(value) = self.get(column) {
            return Some(value);
        }
        let wanted = column.trim();
        self.cells
            .iter()
            .find(|(c, _)| c.trim().eq_ignore_ascii_case(wanted))
            .map(|(_, v)| v.as_str())
    }
}

/// A header row plus data rows, as read from one sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows keyed by header. Short rows are padded with empty cells; cells
    /// past the last header are dropped.
    pub fn records(&self) -> Vec<RawRecord> {
        self.rows
            .iter()
            .map(|row| {
                RawRecord::from_pairs(self.headers.iter().enumerate().map(|(i, h)| {
                    (h.clone(), row.get(i).cloned().unwrap_or_default())
                }))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Canonical records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Provenance {
    pub source_id: String,
    pub row_index: usize,
}

/// A row in canonical form. Always holds exactly the canonical field set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalRecord {
    values: [String; CanonicalField::COUNT],
    pub provenance: Provenance,
}

impl CanonicalRecord {
    pub fn empty(source_id: impl Into<String>, row_index: usize) -> Self {
        Self {
            values: Default::default(),
            provenance: Provenance {
                source_id: source_id.into(),
                row_index,
            },
        }
    }

    pub fn get(&self, field: CanonicalField) -> &str {
        &self.values[field.index()]
    }

    pub fn set(&mut self, field: CanonicalField, value: impl Into<String>) {
        self.values[field.index()] = value.into();
    }

    pub fn with(mut self, field: CanonicalField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (CanonicalField, &str)> {
        CanonicalField::ALL
            .into_iter()
            .map(move |f| (f, self.values[f.index()].as_str()))
    }

    /// "First Last", falling back to the Full Name column.
    pub fn display_name(&self) -> String {
        let first = self.get(CanonicalField::FirstName).trim();
        let last = self.get(CanonicalField::LastName).trim();
        if first.is_empty() && last.is_empty() {
            return self.get(CanonicalField::FullName).trim().to_string();
        }
        format!("{first} {last}").trim().to_string()
    }
}

struct FieldsView<'a>(&'a CanonicalRecord);

impl Serialize for FieldsView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(CanonicalField::COUNT))?;
        for (field, value) in self.0.fields() {
            map.serialize_entry(field.label(), value)?;
        }
        map.end()
    }
}

impl Serialize for CanonicalRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("CanonicalRecord", 2)?;
        state.serialize_field("fields", &FieldsView(self))?;
        state.serialize_field("provenance", &self.provenance)?;
        state.end()
    }
}

// ---------------------------------------------------------------------------
// Master table
// ---------------------------------------------------------------------------

/// Duplicate key: normalized (Member ID, Care Gap), both non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    pub member_id: String,
    pub care_gap: String,
}

impl DedupKey {
    pub fn of(record: &CanonicalRecord) -> Option<Self> {
        let member_id = record.get(CanonicalField::MemberId).trim().to_lowercase();
        let care_gap = record.get(CanonicalField::CareGap).trim().to_lowercase();
        if member_id.is_empty() || care_gap.is_empty() {
            return None;
        }
        Some(Self { member_id, care_gap })
    }
}

/// Ordered canonical rows with a (Member ID, Care Gap) index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasterTable {
    records: Vec<CanonicalRecord>,
    index: HashMap<DedupKey, usize>,
}

impl MasterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build without deduplication (a key sheet is taken as-is).
    pub fn from_records(records: Vec<CanonicalRecord>) -> Self {
        let mut index = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            if let Some(key) = DedupKey::of(record) {
                index.entry(key).or_insert(i);
            }
        }
        Self { records, index }
    }

    /// Append a record. When its key is already present the new record takes
    /// over that slot and the displaced record is returned.
    pub fn upsert(&mut self, record: CanonicalRecord) -> Option<CanonicalRecord> {
        match DedupKey::of(&record) {
            Some(key) => match self.index.get(&key) {
                Some(&slot) => Some(std::mem::replace(&mut self.records[slot], record)),
                None => {
                    self.index.insert(key, self.records.len());
                    self.records.push(record);
                    None
                }
            },
            None => {
                self.records.push(record);
                None
            }
        }
    }

    pub fn position(&self, key: &DedupKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn records(&self) -> &[CanonicalRecord] {
        &self.records
    }

    pub fn get(&self, row: usize) -> Option<&CanonicalRecord> {
        self.records.get(row)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<CanonicalRecord> {
        self.records
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// An input PDF. Page text is extracted at most once.
#[derive(Debug)]
pub struct PdfDocument {
    pub filename: String,
    bytes: Vec<u8>,
    pages: OnceLock<Result<Vec<String>, EngineError>>,
}

impl PdfDocument {
    /// Directory components of `filename` are dropped.
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        let base = filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(filename.as_str())
            .to_string();
        Self {
            filename: base,
            bytes,
            pages: OnceLock::new(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn pages(&self, extractor: &dyn TextExtractor) -> Result<&[String], EngineError> {
        self.pages
            .get_or_init(|| extractor.extract_pages(&self.filename, &self.bytes))
            .as_deref()
            .map_err(Clone::clone)
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPass {
    MemberId,
    NameDob,
    FuzzyName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReason {
    NoCandidate,
    AmbiguousId,
    AmbiguousName,
    BelowThreshold,
}

impl UnmatchedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoCandidate => "no_candidate",
            Self::AmbiguousId => "ambiguous_id",
            Self::AmbiguousName => "ambiguous_name",
            Self::BelowThreshold => "below_threshold",
        }
    }
}

impl fmt::Display for UnmatchedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched {
        row: usize,
        confidence: f64,
        pass: MatchPass,
    },
    Unmatched {
        reason: UnmatchedReason,
    },
}

/// Exactly one per input document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub document: String,
    #[serde(flatten)]
    pub outcome: MatchOutcome,
}

impl MatchResult {
    pub fn matched(document: impl Into<String>, row: usize, confidence: f64, pass: MatchPass) -> Self {
        Self {
            document: document.into(),
            outcome: MatchOutcome::Matched { row, confidence, pass },
        }
    }

    pub fn unmatched(document: impl Into<String>, reason: UnmatchedReason) -> Self {
        Self {
            document: document.into(),
            outcome: MatchOutcome::Unmatched { reason },
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self.outcome, MatchOutcome::Matched { .. })
    }

    pub fn row(&self) -> Option<usize> {
        match self.outcome {
            MatchOutcome::Matched { row, .. } => Some(row),
            MatchOutcome::Unmatched { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<UnmatchedReason> {
        match self.outcome {
            MatchOutcome::Matched { .. } => None,
            MatchOutcome::Unmatched { reason } => Some(reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditReason {
    DuplicateKey,
    UnmappedCareGap,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub kept: Option<CanonicalRecord>,
    pub discarded: CanonicalRecord,
    pub reason: AuditReason,
}
