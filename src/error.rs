use serde::Serialize;
use thiserror::Error;

use crate::statement::StatementRole;

/// Errors raised while normalizing a single raw context.
///
/// These are always recovered locally: the offending context is excluded from
/// the fact store and reported, it never aborts ingestion of a filing.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ContextError {
    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    #[error("invalid dimension: {0}")]
    InvalidDimension(String),

    #[error("context has no period element")]
    MissingPeriod,

    #[error("context reference not found in context table")]
    UnknownReference,

    #[error("invalid fiscal year end {month}-{day}")]
    InvalidFiscalYearEnd { month: u32, day: u32 },
}

/// Errors raised while loading presentation/calculation linkbases.
///
/// A malformed linkbase violates the tree invariant and is not recoverable
/// by exclusion, so these surface to the caller directly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkbaseError {
    #[error("presentation linkbase cycle involving concept {0}")]
    Cycle(String),
}

/// Errors raised while assembling a single statement.
///
/// `MissingLinkbase` means "this statement type does not exist in this
/// filing"; `Incomplete` means "it exists but no periods survived
/// selection". Callers must be able to tell the two apart, and neither is a
/// statement full of missing cells, which assembles successfully.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatementError {
    #[error("no presentation linkbase entries for role {0}")]
    MissingLinkbase(StatementRole),

    #[error("statement for role {role} has no usable periods: {reason}")]
    Incomplete { role: StatementRole, reason: String },
}

/// Errors raised while parsing an XBRL instance document.
#[derive(Error, Debug)]
pub enum InstanceError {
    #[error("failed to parse instance XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("document contains no XBRL facts")]
    NotXbrl,
}

/// Errors raised by the multi-filing stitcher.
///
/// Per-filing failures are never errors here; they are recorded in the
/// skipped-filing report. The only hard stop is caller-requested
/// cancellation, checked between per-filing assembly units.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StitchError {
    #[error("stitching cancelled after {completed} of {total} filings")]
    Cancelled { completed: usize, total: usize },
}

/// A context excluded during normalization, with the reason it was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedContext {
    pub context_ref: String,
    pub reason: ContextError,
}
