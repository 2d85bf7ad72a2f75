use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::statement::StatementRole;
use crate::xbrl::facts::FactStore;
use crate::xbrl::period::{BucketConfig, FiscalBucket, Period};

/// Annual vs. quarterly intent for period selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodView {
    Annual,
    Quarterly,
}

/// Caller-supplied restriction on candidate periods, applied to the date a
/// period closes on.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PeriodFilter {
    pub after: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
}

impl PeriodFilter {
    fn admits(&self, end: NaiveDate) -> bool {
        self.after.map_or(true, |a| end >= a) && self.before.map_or(true, |b| end <= b)
    }
}

/// Tunables for period selection. The oversampling factor and coverage
/// threshold come from corpus tuning, not from first principles, so they
/// are configuration rather than constants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// How many times `desired_count` raw candidates to gather before
    /// completeness filtering. Sparse periods are common enough that
    /// selecting exactly `desired_count` up front returns useless columns.
    pub oversample_factor: usize,
    /// Minimum fraction of the role's reporting concepts that must carry a
    /// non-dimensional fact in a period for it to survive filtering.
    pub min_coverage: f64,
    /// Slack when matching a quarter to its year-ago comparative.
    pub comparative_slack_days: i64,
    pub bucket: BucketConfig,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        SelectorConfig {
            oversample_factor: 3,
            min_coverage: 0.5,
            comparative_slack_days: 10,
            bucket: BucketConfig::default(),
        }
    }
}

/// A period chosen for display, with its derived classification and label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodCandidate {
    pub period: Period,
    pub fiscal_bucket: Option<FiscalBucket>,
    pub label: String,
}

impl PeriodCandidate {
    fn new(period: Period, bucket: Option<FiscalBucket>) -> Self {
        let label = match (period, bucket) {
            (Period::Instant(date), _) => format!("As of {}", date),
            (Period::Duration { end, .. }, Some(FiscalBucket::Annual)) => {
                format!("FY{}", chrono::Datelike::year(&end))
            }
            (Period::Duration { end, .. }, Some(FiscalBucket::Ytd)) => {
                format!("YTD ending {}", end)
            }
            (Period::Duration { end, .. }, _) => format!("Q ending {}", end),
        };
        PeriodCandidate {
            period,
            fiscal_bucket: bucket,
            label,
        }
    }
}

#[derive(Clone, Debug)]
struct Scored {
    candidate: PeriodCandidate,
    coverage: f64,
}

/// Chooses the best `desired_count` comparable periods for a statement role.
///
/// Candidates are enumerated from every concept in the role, not a single
/// anchor concept, because filers tag different line items against different
/// context ids for the same logical period. The pipeline is oversample →
/// completeness-filter → backfill → comparative guarantee, and the output is
/// ordered most-recent-first. Identical inputs yield identical output.
pub fn select_periods(
    store: &FactStore,
    role: &StatementRole,
    role_concepts: &[String],
    desired_count: usize,
    view: PeriodView,
    filter: Option<&PeriodFilter>,
    config: &SelectorConfig,
) -> Vec<PeriodCandidate> {
    if desired_count == 0 || role_concepts.is_empty() {
        return Vec::new();
    }
    let fye = store.fiscal_year_end();

    // Periods keyed in a BTreeMap so enumeration order never depends on
    // hash iteration. Two contexts with the same dates collapse to one
    // logical period here; dimensional-only periods never become columns.
    let mut covered: BTreeMap<Period, HashSet<&str>> = BTreeMap::new();
    let mut has_primary: BTreeMap<Period, bool> = BTreeMap::new();
    let mut reporting_concepts: HashSet<&str> = HashSet::new();

    for concept in role_concepts {
        let mut any = false;
        for fact in store.facts_for(concept) {
            any = true;
            if fact.dimensions.is_empty() && fact.value.as_number().is_some() {
                covered.entry(fact.period).or_default().insert(concept.as_str());
                has_primary.insert(fact.period, true);
            } else {
                has_primary.entry(fact.period).or_insert(false);
            }
        }
        if any {
            reporting_concepts.insert(concept.as_str());
        }
    }
    if reporting_concepts.is_empty() {
        return Vec::new();
    }
    let denominator = reporting_concepts.len() as f64;

    // Classify and filter to the requested view.
    let mut raw: Vec<Scored> = Vec::new();
    for (&period, primary) in &has_primary {
        if !primary {
            debug!("period {} has only dimensional facts, not a column", period);
            continue;
        }
        if let Some(f) = filter {
            if !f.admits(period.end_date()) {
                continue;
            }
        }

        let bucket = match period {
            Period::Instant(date) => {
                if !role.uses_instant() {
                    continue;
                }
                if view == PeriodView::Annual
                    && fye.days_from_anchor(date) > config.bucket.fye_slack_days
                {
                    continue;
                }
                None
            }
            Period::Duration { start, end } => {
                if role.uses_instant() {
                    continue;
                }
                let bucket = FiscalBucket::classify(start, end, fye, &config.bucket);
                let wanted = match view {
                    PeriodView::Annual => FiscalBucket::Annual,
                    PeriodView::Quarterly => FiscalBucket::Quarterly,
                };
                if bucket != wanted {
                    continue;
                }
                Some(bucket)
            }
        };

        let coverage = covered
            .get(&period)
            .map(|c| c.len() as f64 / denominator)
            .unwrap_or(0.0);
        raw.push(Scored {
            candidate: PeriodCandidate::new(period, bucket),
            coverage,
        });
    }

    // Most recent first; oversample before the completeness cut.
    raw.sort_by_key(|s| std::cmp::Reverse((s.candidate.period.end_date(), s.candidate.period)));
    let pool: Vec<Scored> = raw
        .into_iter()
        .take(desired_count.saturating_mul(config.oversample_factor.max(1)))
        .collect();

    let (passing, sparse): (Vec<&Scored>, Vec<&Scored>) =
        pool.iter().partition(|s| s.coverage >= config.min_coverage);
    for s in &sparse {
        debug!(
            "period {} coverage {:.2} below threshold {:.2}",
            s.candidate.period, s.coverage, config.min_coverage
        );
    }

    let mut selected: Vec<PeriodCandidate> =
        passing.iter().take(desired_count).map(|s| s.candidate.clone()).collect();

    // Backfill from the sparse remainder, best coverage first, rather than
    // returning fewer columns than requested.
    if selected.len() < desired_count {
        let mut backfill: Vec<&&Scored> = sparse.iter().collect();
        backfill.sort_by(|a, b| {
            b.coverage
                .partial_cmp(&a.coverage)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.candidate.period.end_date().cmp(&a.candidate.period.end_date()))
        });
        for s in backfill {
            if selected.len() >= desired_count {
                break;
            }
            selected.push(s.candidate.clone());
        }
    }
    selected.sort_by_key(|c| std::cmp::Reverse((c.period.end_date(), c.period)));

    // Comparative coverage: a quarterly statement must show the year-ago
    // quarter when the filing carries one, even if sorting by recency alone
    // would pick a nearer period instead.
    if view == PeriodView::Quarterly && desired_count >= 2 {
        if let Some(newest) = selected.first().cloned() {
            let target = newest.period.end_date() - chrono::Duration::days(365);
            let is_comparative = |c: &PeriodCandidate| {
                (c.period.end_date() - target).num_days().abs() <= config.comparative_slack_days
            };
            if !selected.iter().skip(1).any(is_comparative) {
                let comparative = pool
                    .iter()
                    .map(|s| &s.candidate)
                    .filter(|c| !selected.contains(c))
                    .find(|c| is_comparative(c))
                    .cloned();
                if let Some(comp) = comparative {
                    debug!("forcing year-ago comparative {} into selection", comp.period);
                    if selected.len() >= desired_count {
                        selected.pop();
                    }
                    selected.push(comp);
                    selected.sort_by_key(|c| {
                        std::cmp::Reverse((c.period.end_date(), c.period))
                    });
                }
            }
        }
    }

    selected.truncate(desired_count);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xbrl::context::Dimensions;
    use crate::xbrl::facts::{Fact, FactStoreBuilder, FactValue};
    use crate::xbrl::period::FiscalYearEnd;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn duration(start: NaiveDate, end: NaiveDate) -> Period {
        Period::duration(start, end).unwrap()
    }

    fn fact(concept: &str, value: f64, period: Period, dims: Dimensions) -> Fact {
        Fact {
            concept: concept.to_string(),
            value: FactValue::Number(value),
            unit: Some("USD".to_string()),
            period,
            dimensions: dims,
            decimals: None,
            entity_id: "e".to_string(),
        }
    }

    fn concepts() -> Vec<String> {
        vec!["Revenues".to_string(), "NetIncomeLoss".to_string()]
    }

    fn store_with(facts: Vec<Fact>) -> FactStore {
        let mut builder = FactStoreBuilder::new().fiscal_year_end(FiscalYearEnd::calendar());
        for f in facts {
            builder.insert(f);
        }
        builder.build()
    }

    #[test]
    fn quarterly_selection_includes_year_ago_comparative() {
        let q3_2023 = duration(date(2023, 7, 1), date(2023, 9, 30));
        let q3_2022 = duration(date(2022, 7, 1), date(2022, 9, 30));
        let q2_2023 = duration(date(2023, 4, 1), date(2023, 6, 30));
        let store = store_with(vec![
            fact("Revenues", 10.0, q3_2023, Dimensions::none()),
            fact("NetIncomeLoss", 1.0, q3_2023, Dimensions::none()),
            fact("Revenues", 9.0, q2_2023, Dimensions::none()),
            fact("NetIncomeLoss", 0.9, q2_2023, Dimensions::none()),
            fact("Revenues", 8.0, q3_2022, Dimensions::none()),
            fact("NetIncomeLoss", 0.8, q3_2022, Dimensions::none()),
        ]);

        let selected = select_periods(
            &store,
            &StatementRole::IncomeStatement,
            &concepts(),
            2,
            PeriodView::Quarterly,
            None,
            &SelectorConfig::default(),
        );

        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].period, q3_2023, "current quarter first");
        assert_eq!(
            selected[1].period, q3_2022,
            "year-ago comparative must displace the nearer Q2"
        );
    }

    #[test]
    fn annual_view_picks_annual_durations_most_recent_first() {
        let fy2023 = duration(date(2023, 1, 1), date(2023, 12, 31));
        let fy2022 = duration(date(2022, 1, 1), date(2022, 12, 31));
        let q4 = duration(date(2023, 10, 1), date(2023, 12, 31));
        let store = store_with(vec![
            fact("Revenues", 8.0, fy2022, Dimensions::none()),
            fact("NetIncomeLoss", 0.8, fy2022, Dimensions::none()),
            fact("Revenues", 10.0, fy2023, Dimensions::none()),
            fact("NetIncomeLoss", 1.0, fy2023, Dimensions::none()),
            fact("Revenues", 3.0, q4, Dimensions::none()),
        ]);

        let selected = select_periods(
            &store,
            &StatementRole::IncomeStatement,
            &concepts(),
            2,
            PeriodView::Annual,
            None,
            &SelectorConfig::default(),
        );
        let periods: Vec<Period> = selected.iter().map(|c| c.period).collect();
        assert_eq!(periods, vec![fy2023, fy2022]);
        assert_eq!(selected[0].label, "FY2023");
    }

    #[test]
    fn dimensional_only_periods_never_become_columns() {
        let fy2023 = duration(date(2023, 1, 1), date(2023, 12, 31));
        let fy2022 = duration(date(2022, 1, 1), date(2022, 12, 31));
        let segment = Dimensions::new(vec![crate::xbrl::context::Dimension {
            axis: "SegmentAxis".to_string(),
            member: "Auto".to_string(),
        }]);
        let store = store_with(vec![
            fact("Revenues", 10.0, fy2023, Dimensions::none()),
            fact("NetIncomeLoss", 1.0, fy2023, Dimensions::none()),
            // 2022 exists only as a segment breakdown.
            fact("Revenues", 4.0, fy2022, segment),
        ]);

        let selected = select_periods(
            &store,
            &StatementRole::IncomeStatement,
            &concepts(),
            3,
            PeriodView::Annual,
            None,
            &SelectorConfig::default(),
        );
        let periods: Vec<Period> = selected.iter().map(|c| c.period).collect();
        assert_eq!(periods, vec![fy2023]);
    }

    #[test]
    fn sparse_periods_are_backfilled_not_preferred() {
        let fy2023 = duration(date(2023, 1, 1), date(2023, 12, 31));
        let fy2022 = duration(date(2022, 1, 1), date(2022, 12, 31));
        let fy2021 = duration(date(2021, 1, 1), date(2021, 12, 31));
        let store = store_with(vec![
            // 2023 is sparse: one of two concepts.
            fact("Revenues", 10.0, fy2023, Dimensions::none()),
            fact("Revenues", 9.0, fy2022, Dimensions::none()),
            fact("NetIncomeLoss", 0.9, fy2022, Dimensions::none()),
            fact("Revenues", 8.0, fy2021, Dimensions::none()),
            fact("NetIncomeLoss", 0.8, fy2021, Dimensions::none()),
        ]);

        let mut config = SelectorConfig::default();
        config.min_coverage = 0.9;
        let selected = select_periods(
            &store,
            &StatementRole::IncomeStatement,
            &concepts(),
            2,
            PeriodView::Annual,
            None,
            &config,
        );
        let periods: Vec<Period> = selected.iter().map(|c| c.period).collect();
        assert_eq!(
            periods,
            vec![fy2022, fy2021],
            "complete periods beat a more recent sparse one"
        );

        // With three requested, the sparse period backfills.
        let selected = select_periods(
            &store,
            &StatementRole::IncomeStatement,
            &concepts(),
            3,
            PeriodView::Annual,
            None,
            &config,
        );
        assert_eq!(selected.len(), 3);
        assert!(selected.iter().any(|c| c.period == fy2023));
    }

    #[test]
    fn balance_sheet_selects_instants_near_fiscal_year_end() {
        let dec_2023 = Period::instant(date(2023, 12, 31));
        let dec_2022 = Period::instant(date(2022, 12, 31));
        let jun_2023 = Period::instant(date(2023, 6, 30));
        let store = store_with(vec![
            fact("Assets", 50.0, dec_2023, Dimensions::none()),
            fact("Assets", 45.0, jun_2023, Dimensions::none()),
            fact("Assets", 40.0, dec_2022, Dimensions::none()),
        ]);

        let selected = select_periods(
            &store,
            &StatementRole::BalanceSheet,
            &["Assets".to_string()],
            2,
            PeriodView::Annual,
            None,
            &SelectorConfig::default(),
        );
        let periods: Vec<Period> = selected.iter().map(|c| c.period).collect();
        assert_eq!(periods, vec![dec_2023, dec_2022]);
        assert_eq!(selected[0].label, "As of 2023-12-31");
    }

    #[test]
    fn selection_is_idempotent() {
        let q3_2023 = duration(date(2023, 7, 1), date(2023, 9, 30));
        let q3_2022 = duration(date(2022, 7, 1), date(2022, 9, 30));
        let store = store_with(vec![
            fact("Revenues", 10.0, q3_2023, Dimensions::none()),
            fact("NetIncomeLoss", 1.0, q3_2023, Dimensions::none()),
            fact("Revenues", 8.0, q3_2022, Dimensions::none()),
            fact("NetIncomeLoss", 0.8, q3_2022, Dimensions::none()),
        ]);

        let run = || {
            select_periods(
                &store,
                &StatementRole::IncomeStatement,
                &concepts(),
                2,
                PeriodView::Quarterly,
                None,
                &SelectorConfig::default(),
            )
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn period_filter_restricts_candidates() {
        let fy2023 = duration(date(2023, 1, 1), date(2023, 12, 31));
        let fy2022 = duration(date(2022, 1, 1), date(2022, 12, 31));
        let store = store_with(vec![
            fact("Revenues", 10.0, fy2023, Dimensions::none()),
            fact("NetIncomeLoss", 1.0, fy2023, Dimensions::none()),
            fact("Revenues", 9.0, fy2022, Dimensions::none()),
            fact("NetIncomeLoss", 0.9, fy2022, Dimensions::none()),
        ]);

        let filter = PeriodFilter {
            after: None,
            before: Some(date(2023, 1, 1)),
        };
        let selected = select_periods(
            &store,
            &StatementRole::IncomeStatement,
            &concepts(),
            2,
            PeriodView::Annual,
            Some(&filter),
            &SelectorConfig::default(),
        );
        let periods: Vec<Period> = selected.iter().map(|c| c.period).collect();
        assert_eq!(periods, vec![fy2022]);
    }
}
