use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ContextError;

/// A reporting period: a balance-sheet point in time or an income-statement
/// span. Unparseable dates never construct a `Period`; they fail context
/// normalization instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Period {
    Instant(NaiveDate),
    Duration { start: NaiveDate, end: NaiveDate },
}

impl Period {
    pub fn instant(date: NaiveDate) -> Self {
        Period::Instant(date)
    }

    /// Builds a duration, rejecting inverted spans.
    pub fn duration(start: NaiveDate, end: NaiveDate) -> Result<Self, ContextError> {
        if start > end {
            return Err(ContextError::InvalidPeriod(format!(
                "duration start {} is after end {}",
                start, end
            )));
        }
        Ok(Period::Duration { start, end })
    }

    pub fn is_instant(&self) -> bool {
        matches!(self, Period::Instant(_))
    }

    /// The date a period closes on; used for chronological ordering.
    pub fn end_date(&self) -> NaiveDate {
        match self {
            Period::Instant(date) => *date,
            Period::Duration { end, .. } => *end,
        }
    }

    /// Span in days, counting both endpoints. `None` for instants.
    pub fn span_days(&self) -> Option<i64> {
        match self {
            Period::Instant(_) => None,
            Period::Duration { start, end } => Some((*end - *start).num_days() + 1),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Instant(date) => write!(f, "{}", date),
            Period::Duration { start, end } => write!(f, "{}..{}", start, end),
        }
    }
}

/// The month/day an entity's fiscal year closes on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalYearEnd {
    pub month: u32,
    pub day: u32,
}

impl FiscalYearEnd {
    pub fn new(month: u32, day: u32) -> Result<Self, ContextError> {
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(ContextError::InvalidFiscalYearEnd { month, day });
        }
        Ok(FiscalYearEnd { month, day })
    }

    /// Calendar-year December close, the most common anchor.
    pub fn calendar() -> Self {
        FiscalYearEnd { month: 12, day: 31 }
    }

    /// The fiscal-year-end date falling in `year`, clamped to the last day
    /// of the month when the nominal day does not exist (Feb 29 and such).
    pub fn anchor_in(&self, year: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
            .unwrap_or_else(|| last_day_of_month(year, self.month))
    }

    /// Days between `date` and the nearest fiscal-year-end anchor.
    pub fn days_from_anchor(&self, date: NaiveDate) -> i64 {
        (date.year() - 1..=date.year() + 1)
            .map(|y| (date - self.anchor_in(y)).num_days().abs())
            .min()
            .unwrap_or(i64::MAX)
    }

    /// Days between `date` and the nearest fiscal-year start (the day after
    /// an anchor).
    pub fn days_from_year_start(&self, date: NaiveDate) -> i64 {
        (date.year() - 2..=date.year() + 1)
            .filter_map(|y| self.anchor_in(y).succ_opt())
            .map(|start| (date - start).num_days().abs())
            .min()
            .unwrap_or(i64::MAX)
    }
}

fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_y, next_m) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_y, next_m, 1)
        .and_then(|d| d.pred_opt())
        .expect("first of month always has a predecessor")
}

/// Tolerance windows for classifying duration spans. The exact thresholds
/// are tuned against a real filing corpus, so they live here rather than in
/// the classification code.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Inclusive day-span window for a quarterly period.
    pub quarter_days: (i64, i64),
    /// Inclusive day-span window for an annual period.
    pub annual_days: (i64, i64),
    /// How far a date may land from the fiscal-year-end anchor and still
    /// count as aligned to it.
    pub fye_slack_days: i64,
    /// How far a duration may start from the fiscal-year start and still
    /// classify as year-to-date.
    pub ytd_start_slack_days: i64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        BucketConfig {
            quarter_days: (80, 100),
            annual_days: (350, 380),
            fye_slack_days: 5,
            ytd_start_slack_days: 10,
        }
    }
}

/// Derived classification of a duration relative to the fiscal-year-end
/// anchor. Computed on demand, never stored on a fact, so a change of
/// fiscal-year-end metadata is picked up on the next classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FiscalBucket {
    Quarterly,
    Ytd,
    Annual,
    /// A span that fits no bucket; never a period candidate.
    Irregular,
}

impl FiscalBucket {
    pub fn classify(
        start: NaiveDate,
        end: NaiveDate,
        fye: FiscalYearEnd,
        config: &BucketConfig,
    ) -> FiscalBucket {
        let span = (end - start).num_days() + 1;

        if span >= config.quarter_days.0 && span <= config.quarter_days.1 {
            return FiscalBucket::Quarterly;
        }
        // An annual span is annual even when the filer's exact closing day
        // drifts a few days year to year.
        if span >= config.annual_days.0 && span <= config.annual_days.1 {
            return FiscalBucket::Annual;
        }
        if fye.days_from_year_start(start) <= config.ytd_start_slack_days {
            return FiscalBucket::Ytd;
        }
        FiscalBucket::Irregular
    }
}

impl fmt::Display for FiscalBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FiscalBucket::Quarterly => write!(f, "Q"),
            FiscalBucket::Ytd => write!(f, "YTD"),
            FiscalBucket::Annual => write!(f, "FY"),
            FiscalBucket::Irregular => write!(f, "irregular"),
        }
    }
}
