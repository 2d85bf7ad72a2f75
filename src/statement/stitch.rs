use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{StatementError, StitchError};
use crate::filing::FilingSource;
use crate::statement::assemble::{assemble, Cell, CellValue, LineItem, Statement, ValueMode};
use crate::statement::select::{select_periods, PeriodCandidate, PeriodFilter, PeriodView, SelectorConfig};
use crate::statement::StatementRole;
use crate::xbrl::context::Dimensions;
use crate::xbrl::period::Period;

/// Why a filing contributed nothing to a stitched statement. Recorded, not
/// raised: one pre-XBRL filing must never abort a multi-year request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    NoXbrl,
    MissingLinkbase,
    NoPeriods,
    Incomplete(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoXbrl => write!(f, "filing has no XBRL"),
            SkipReason::MissingLinkbase => write!(f, "no linkbase for requested role"),
            SkipReason::NoPeriods => write!(f, "no periods survived selection"),
            SkipReason::Incomplete(reason) => write!(f, "incomplete statement: {}", reason),
        }
    }
}

/// Skipped-filing report entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedFiling {
    pub filing_id: String,
    pub reason: SkipReason,
}

/// Knobs for a stitching run. Cancellation is cooperative and checked
/// between per-filing assembly units only; assembling one filing is fast
/// enough that mid-assembly checks would buy nothing.
#[derive(Clone, Debug, Default)]
pub struct StitchOptions {
    pub desired_count: usize,
    pub view: Option<PeriodView>,
    pub mode: ValueMode,
    /// Amendments restate existing periods; letting them add columns is
    /// opt-in.
    pub include_amendment_periods: bool,
    pub period_filter: Option<PeriodFilter>,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl StitchOptions {
    pub fn annual(desired_count: usize) -> Self {
        StitchOptions {
            desired_count,
            view: Some(PeriodView::Annual),
            ..StitchOptions::default()
        }
    }

    pub fn quarterly(desired_count: usize) -> Self {
        StitchOptions {
            desired_count,
            view: Some(PeriodView::Quarterly),
            ..StitchOptions::default()
        }
    }

    fn view(&self) -> PeriodView {
        self.view.unwrap_or(PeriodView::Annual)
    }
}

/// A statement extended across multiple filings. Columns are deduplicated
/// by `(period, dimensions)` and ordered chronologically, oldest first.
#[derive(Clone, Debug, Serialize)]
pub struct StitchedStatement {
    pub role: StatementRole,
    pub mode: ValueMode,
    pub periods: Vec<PeriodCandidate>,
    pub line_items: Vec<LineItem>,
}

/// The result of a stitching run: the merged statement plus the report of
/// filings that contributed nothing and why.
#[derive(Debug)]
pub struct StitchOutcome {
    pub statement: StitchedStatement,
    pub skipped: Vec<SkippedFiling>,
}

struct SourceStatement {
    statement: Statement,
    is_amendment: bool,
}

#[derive(Clone, Copy)]
struct ColumnSource {
    source: usize,
    period_index: usize,
    /// Whether this period was the source filing's own most-current column.
    /// Primary-period values predate any restatement truncation, so they
    /// win deduplication.
    primary: bool,
}

fn row_key(item: &LineItem) -> (String, Dimensions) {
    (item.concept.clone(), item.dimensions.clone())
}

fn find_cell<'a>(statement: &'a Statement, key: &(String, Dimensions), period: Period) -> Option<&'a Cell> {
    let period_index = statement.periods.iter().position(|c| c.period == period)?;
    statement
        .line_items
        .iter()
        .find(|item| item.concept == key.0 && item.dimensions == key.1)
        .map(|item| &item.cells[period_index])
}

/// Stitches one statement role across many filings of the same entity.
///
/// Filings are processed most-recent-first; per-filing failures (no XBRL,
/// missing linkbase, nothing selectable) are recorded and skipped. The
/// merged column set is deduplicated so the same logical period appearing
/// as "current" in one filing and "comparative" in a later one yields one
/// column, sourced from the filing where it was current.
pub fn stitch(
    filings: &[FilingSource],
    role: &StatementRole,
    selector: &SelectorConfig,
    options: &StitchOptions,
) -> Result<StitchOutcome, StitchError> {
    let total = filings.len();
    let mut order: Vec<&FilingSource> = filings.iter().collect();
    order.sort_by(|a, b| {
        b.filing_date
            .cmp(&a.filing_date)
            .then_with(|| b.filing_id.cmp(&a.filing_id))
    });

    let mut sources: Vec<SourceStatement> = Vec::new();
    let mut skipped: Vec<SkippedFiling> = Vec::new();

    for (completed, filing) in order.iter().enumerate() {
        if let Some(cancel) = &options.cancel {
            if cancel.load(Ordering::Relaxed) {
                return Err(StitchError::Cancelled { completed, total });
            }
        }

        let Some(xbrl) = &filing.xbrl else {
            info!("skipping {}: no XBRL", filing.filing_id);
            skipped.push(SkippedFiling {
                filing_id: filing.filing_id.clone(),
                reason: SkipReason::NoXbrl,
            });
            continue;
        };

        let concepts = xbrl.registry.concepts(role);
        if concepts.is_empty() {
            skipped.push(SkippedFiling {
                filing_id: filing.filing_id.clone(),
                reason: SkipReason::MissingLinkbase,
            });
            continue;
        }

        let periods = select_periods(
            &xbrl.store,
            role,
            &concepts,
            options.desired_count,
            options.view(),
            options.period_filter.as_ref(),
            selector,
        );
        if periods.is_empty() {
            skipped.push(SkippedFiling {
                filing_id: filing.filing_id.clone(),
                reason: SkipReason::NoPeriods,
            });
            continue;
        }

        match assemble(&xbrl.store, &xbrl.registry, role, &periods, options.mode) {
            Ok(statement) => {
                debug!(
                    "{} contributes {} periods, {} line items",
                    filing.filing_id,
                    statement.periods.len(),
                    statement.line_items.len()
                );
                sources.push(SourceStatement {
                    statement,
                    is_amendment: filing.report_type.is_amendment(),
                });
            }
            Err(StatementError::MissingLinkbase(_)) => skipped.push(SkippedFiling {
                filing_id: filing.filing_id.clone(),
                reason: SkipReason::MissingLinkbase,
            }),
            Err(StatementError::Incomplete { reason, .. }) => skipped.push(SkippedFiling {
                filing_id: filing.filing_id.clone(),
                reason: SkipReason::Incomplete(reason),
            }),
        }
    }

    // Column dedup. Pass one: original filings, most recent first, with a
    // primary-period claim beating a comparative one. Pass two: amendments
    // override values for already-selected periods, and add columns only
    // when the caller opted in.
    let mut columns: BTreeMap<Period, ColumnSource> = BTreeMap::new();
    for (idx, source) in sources.iter().enumerate() {
        if source.is_amendment {
            continue;
        }
        merge_columns(&mut columns, idx, &source.statement);
    }

    let mut overrides: BTreeMap<Period, usize> = BTreeMap::new();
    for (idx, source) in sources.iter().enumerate().rev() {
        if !source.is_amendment {
            continue;
        }
        if options.include_amendment_periods {
            merge_columns(&mut columns, idx, &source.statement);
        }
        for candidate in &source.statement.periods {
            if columns.contains_key(&candidate.period) {
                // Restatement tie-break: the amendment is the more recent
                // filing, so its value wins for this period.
                overrides.insert(candidate.period, idx);
            }
        }
    }

    // Line-item ordering: start from the most detailed source statement,
    // then weave in concepts only other filings present, keeping each one
    // after the row it followed in its own statement.
    let mut base_order: Vec<usize> = (0..sources.len()).collect();
    base_order.sort_by_key(|&i| std::cmp::Reverse(sources[i].statement.line_items.len()));

    let mut merged: Vec<LineItem> = Vec::new();
    for &idx in &base_order {
        let mut insert_at = 0;
        for item in &sources[idx].statement.line_items {
            let key = row_key(item);
            match merged.iter().position(|m| row_key(m) == key) {
                Some(pos) => insert_at = pos + 1,
                None => {
                    let mut template = item.clone();
                    template.cells.clear();
                    merged.insert(insert_at, template);
                    insert_at += 1;
                }
            }
        }
    }

    // Fill cells column by column from each column's owning statement,
    // falling back to an explicit Missing cell, then apply amendment
    // overrides on top.
    let mut periods: Vec<PeriodCandidate> = Vec::with_capacity(columns.len());
    let column_list: Vec<(Period, ColumnSource)> =
        columns.iter().map(|(p, s)| (*p, *s)).collect();
    for (_, col) in &column_list {
        periods.push(sources[col.source].statement.periods[col.period_index].clone());
    }

    for item in &mut merged {
        let key = (item.concept.clone(), item.dimensions.clone());
        let template_cell = source_template_cell(&sources, &key, item.is_dimensional);
        for (period, col) in &column_list {
            let owner = overrides
                .get(period)
                .and_then(|&amend_idx| find_cell(&sources[amend_idx].statement, &key, *period))
                .or_else(|| find_cell(&sources[col.source].statement, &key, *period));
            item.cells.push(owner.cloned().unwrap_or_else(|| {
                let mut cell = template_cell.clone();
                cell.value = CellValue::Missing;
                cell.unit = None;
                cell
            }));
        }
    }

    Ok(StitchOutcome {
        statement: StitchedStatement {
            role: role.clone(),
            mode: options.mode,
            periods,
            line_items: merged,
        },
        skipped,
    })
}

fn merge_columns(columns: &mut BTreeMap<Period, ColumnSource>, source: usize, statement: &Statement) {
    for (period_index, candidate) in statement.periods.iter().enumerate() {
        let claim = ColumnSource {
            source,
            period_index,
            primary: period_index == 0,
        };
        match columns.get(&candidate.period) {
            None => {
                columns.insert(candidate.period, claim);
            }
            Some(existing) if claim.primary && !existing.primary => {
                debug!(
                    "column {} re-sourced to its primary filing",
                    candidate.period
                );
                columns.insert(candidate.period, claim);
            }
            Some(_) => {}
        }
    }
}

/// A metadata-bearing cell for rows a source statement does not carry.
fn source_template_cell(
    sources: &[SourceStatement],
    key: &(String, Dimensions),
    is_dimensional: bool,
) -> Cell {
    for source in sources {
        if let Some(item) = source
            .statement
            .line_items
            .iter()
            .find(|item| item.concept == key.0 && item.dimensions == key.1)
        {
            if let Some(cell) = item.cells.first() {
                let mut template = cell.clone();
                template.value = CellValue::Missing;
                template.unit = None;
                return template;
            }
        }
    }
    Cell {
        value: CellValue::Missing,
        is_dimensional,
        balance_type: Default::default(),
        calculation_weight: None,
        preferred_sign: Default::default(),
        unit: None,
    }
}
