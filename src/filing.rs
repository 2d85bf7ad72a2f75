use chrono::NaiveDate;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use strum::{EnumIter, IntoEnumIterator};

use crate::xbrl::facts::FactStore;
use crate::xbrl::linkbase::ConceptRegistry;

/// SEC form types that carry financial statements, plus their amendment
/// variants. Anything else round-trips through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(try_from = "String")]
pub enum ReportType {
    Form10K,
    Form10KA,
    Form10Q,
    Form10QA,
    Form20F,
    Form20FA,
    Form8K,
    Other(String),
}

impl ReportType {
    /// Amendments restate rather than extend coverage, so the stitcher
    /// treats them differently from original filings.
    pub fn is_amendment(&self) -> bool {
        match self {
            ReportType::Form10KA | ReportType::Form10QA | ReportType::Form20FA => true,
            ReportType::Other(s) => s.ends_with("/A"),
            _ => false,
        }
    }
}

impl TryFrom<String> for ReportType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ReportType::from_str(&s)
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportType::Form10K => write!(f, "10-K"),
            ReportType::Form10KA => write!(f, "10-K/A"),
            ReportType::Form10Q => write!(f, "10-Q"),
            ReportType::Form10QA => write!(f, "10-Q/A"),
            ReportType::Form20F => write!(f, "20-F"),
            ReportType::Form20FA => write!(f, "20-F/A"),
            ReportType::Form8K => write!(f, "8-K"),
            ReportType::Other(s) => write!(f, "{}", s),
        }
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<ReportType, String> {
        match s.to_uppercase().as_str() {
            "10-K" => Ok(ReportType::Form10K),
            "10-K/A" => Ok(ReportType::Form10KA),
            "10-Q" => Ok(ReportType::Form10Q),
            "10-Q/A" => Ok(ReportType::Form10QA),
            "20-F" => Ok(ReportType::Form20F),
            "20-F/A" => Ok(ReportType::Form20FA),
            "8-K" => Ok(ReportType::Form8K),
            _ => Ok(ReportType::Other(s.to_string())),
        }
    }
}

pub static REPORT_TYPES: Lazy<String> = Lazy::new(|| {
    ReportType::iter()
        .filter(|t| !matches!(t, ReportType::Other(_)))
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
});

impl ReportType {
    pub fn list_types() -> &'static str {
        &REPORT_TYPES
    }
}

/// One filing's frozen XBRL data: the fact store and the concept registry
/// built from its linkbases. Both are immutable after construction, so a
/// `FilingXbrl` is safe to hand to a parallel per-filing worker.
#[derive(Clone, Debug)]
pub struct FilingXbrl {
    pub store: FactStore,
    pub registry: ConceptRegistry,
}

/// One filing as seen by the stitcher. `xbrl: None` marks a filing with no
/// XBRL at all (pre-2009 historical filings, mostly); the stitcher skips
/// those with a recorded reason instead of failing.
#[derive(Clone, Debug)]
pub struct FilingSource {
    pub filing_id: String,
    pub filing_date: NaiveDate,
    pub report_type: ReportType,
    pub xbrl: Option<FilingXbrl>,
}
