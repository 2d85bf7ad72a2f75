use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::StatementError;
use crate::statement::select::PeriodCandidate;
use crate::statement::StatementRole;
use crate::xbrl::context::Dimensions;
use crate::xbrl::facts::{DuplicateFactConflict, FactStore};
use crate::xbrl::linkbase::{BalanceType, ConceptMetadata, ConceptRegistry, PreferredSign};

/// Which transformation layer is applied to instance values. Exactly two:
/// an earlier third "normalization" mode was removed as unnecessary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueMode {
    /// Values exactly as tagged in the instance document.
    #[default]
    Raw,
    /// Values sign-adjusted to match the as-filed display: an expense tagged
    /// positive but presented as a subtraction is flipped.
    Presentation,
}

/// A cell value. Missing is explicit absence, never zero and never null.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Present(f64),
    Missing,
}

impl CellValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Present(v) => Some(*v),
            CellValue::Missing => None,
        }
    }
}

/// One line-item × period cell. The metadata columns are part of the output
/// contract; downstream display decisions depend on their exact names.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub value: CellValue,
    pub is_dimensional: bool,
    pub balance_type: BalanceType,
    pub calculation_weight: Option<i8>,
    pub preferred_sign: PreferredSign,
    pub unit: Option<String>,
}

impl Cell {
    fn missing(meta: &ConceptMetadata, is_dimensional: bool) -> Cell {
        Cell {
            value: CellValue::Missing,
            is_dimensional,
            balance_type: meta.balance_type,
            calculation_weight: meta.calculation_weight,
            preferred_sign: meta.preferred_sign,
            unit: None,
        }
    }
}

/// One row of a statement: a concept (or one of its dimensional breakdowns)
/// with a cell per selected period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub concept: String,
    pub label: String,
    pub depth: u32,
    pub is_dimensional: bool,
    pub dimensions: Dimensions,
    pub cells: Vec<Cell>,
}

/// An assembled statement: ordered line items over a shared period set.
/// Every line item has exactly one cell per period by construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Statement {
    pub role: StatementRole,
    pub mode: ValueMode,
    pub periods: Vec<PeriodCandidate>,
    pub line_items: Vec<LineItem>,
    /// Duplicate-key conflicts touching this statement's concepts and
    /// periods, surfaced with every candidate value.
    pub conflicts: Vec<DuplicateFactConflict>,
}

impl Statement {
    pub fn is_all_missing(&self) -> bool {
        self.line_items
            .iter()
            .all(|li| li.cells.iter().all(|c| c.value.is_missing()))
    }

    /// Flattens the matrix into one record per line-item × period, for
    /// table/DataFrame consumers.
    pub fn to_rows(&self) -> Vec<StatementRow> {
        let mut rows = Vec::with_capacity(self.line_items.len() * self.periods.len());
        for item in &self.line_items {
            for (candidate, cell) in self.periods.iter().zip(&item.cells) {
                rows.push(StatementRow {
                    concept: item.concept.clone(),
                    label: item.label.clone(),
                    depth: item.depth,
                    period_label: candidate.label.clone(),
                    period: candidate.period.to_string(),
                    value: cell.value.as_f64(),
                    is_dimensional: cell.is_dimensional,
                    balance_type: cell.balance_type,
                    calculation_weight: cell.calculation_weight,
                    preferred_sign: cell.preferred_sign,
                    unit: cell.unit.clone(),
                });
            }
        }
        rows
    }
}

/// Flat export record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatementRow {
    pub concept: String,
    pub label: String,
    pub depth: u32,
    pub period_label: String,
    pub period: String,
    pub value: Option<f64>,
    pub is_dimensional: bool,
    pub balance_type: BalanceType,
    pub calculation_weight: Option<i8>,
    pub preferred_sign: PreferredSign,
    pub unit: Option<String>,
}

fn apply_mode(mode: ValueMode, meta: &ConceptMetadata, raw: f64) -> f64 {
    match mode {
        ValueMode::Raw => raw,
        // No calculation weight means no transformation, so raw and
        // presentation values round-trip identically for such concepts.
        ValueMode::Presentation => match meta.calculation_weight {
            Some(_) if meta.preferred_sign == PreferredSign::Negative => -raw,
            _ => raw,
        },
    }
}

/// Walks the presentation tree for `role` in document order and fills one
/// cell per line item per selected period. Dimensional facts become child
/// rows directly under their concept, never extra period columns.
pub fn assemble(
    store: &FactStore,
    registry: &ConceptRegistry,
    role: &StatementRole,
    periods: &[PeriodCandidate],
    mode: ValueMode,
) -> Result<Statement, StatementError> {
    let presentation = registry
        .presentation(role)
        .filter(|arcs| !arcs.is_empty())
        .ok_or_else(|| StatementError::MissingLinkbase(role.clone()))?;

    if periods.is_empty() {
        return Err(StatementError::Incomplete {
            role: role.clone(),
            reason: "no period candidates survived selection".to_string(),
        });
    }

    let period_set: Vec<_> = periods.iter().map(|c| c.period).collect();
    let default_meta = ConceptMetadata::default();
    let mut line_items = Vec::with_capacity(presentation.len());

    for arc in presentation {
        let meta = registry.resolve(role, &arc.concept).unwrap_or(&default_meta);
        let label = if meta.label.is_empty() {
            arc.concept.clone()
        } else {
            meta.label.clone()
        };

        let mut cells = Vec::with_capacity(periods.len());
        for candidate in periods {
            let cell = match store.display_fact(&arc.concept, &candidate.period, &Dimensions::none())
            {
                Some(fact) => {
                    let raw = fact
                        .value
                        .as_number()
                        .expect("display_fact only returns numeric facts");
                    Cell {
                        value: CellValue::Present(apply_mode(mode, meta, raw)),
                        is_dimensional: false,
                        balance_type: meta.balance_type,
                        calculation_weight: meta.calculation_weight,
                        preferred_sign: meta.preferred_sign,
                        unit: fact.unit.clone(),
                    }
                }
                None => Cell::missing(meta, false),
            };
            cells.push(cell);
        }
        line_items.push(LineItem {
            concept: arc.concept.clone(),
            label: label.clone(),
            depth: arc.depth,
            is_dimensional: false,
            dimensions: Dimensions::none(),
            cells,
        });

        // Segment breakdowns follow their parent concept as child rows,
        // one per distinct dimension set seen within the selected periods.
        for dims in store.dimension_sets_for(&arc.concept, &period_set) {
            let mut cells = Vec::with_capacity(periods.len());
            for candidate in periods {
                let cell = match store.display_fact(&arc.concept, &candidate.period, &dims) {
                    Some(fact) => {
                        let raw = fact
                            .value
                            .as_number()
                            .expect("display_fact only returns numeric facts");
                        Cell {
                            value: CellValue::Present(apply_mode(mode, meta, raw)),
                            is_dimensional: true,
                            balance_type: meta.balance_type,
                            calculation_weight: meta.calculation_weight,
                            preferred_sign: meta.preferred_sign,
                            unit: fact.unit.clone(),
                        }
                    }
                    None => Cell::missing(meta, true),
                };
                cells.push(cell);
            }
            debug!("emitting dimensional row {} ({})", arc.concept, dims);
            line_items.push(LineItem {
                concept: arc.concept.clone(),
                label: format!("{} ({})", label, dims),
                depth: arc.depth + 1,
                is_dimensional: true,
                dimensions: dims,
                cells,
            });
        }
    }

    let concepts: std::collections::HashSet<&str> =
        presentation.iter().map(|a| a.concept.as_str()).collect();
    let conflicts: Vec<DuplicateFactConflict> = store
        .conflicts()
        .iter()
        .filter(|c| concepts.contains(c.key.concept.as_str()))
        .filter(|c| period_set.contains(&c.key.period))
        .cloned()
        .collect();

    Ok(Statement {
        role: role.clone(),
        mode,
        periods: periods.to_vec(),
        line_items,
        conflicts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xbrl::context::Dimension;
    use crate::xbrl::facts::{Fact, FactStoreBuilder, FactValue};
    use crate::xbrl::linkbase::{CalculationArc, PresentationArc};
    use crate::xbrl::period::{FiscalYearEnd, Period};
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fy2023() -> Period {
        Period::duration(date(2023, 1, 1), date(2023, 12, 31)).unwrap()
    }

    fn fy2022() -> Period {
        Period::duration(date(2022, 1, 1), date(2022, 12, 31)).unwrap()
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

    fn candidate(period: Period) -> PeriodCandidate {
        PeriodCandidate {
            period,
            fiscal_bucket: None,
            label: period.to_string(),
        }
    }

    fn registry() -> ConceptRegistry {
        let mut presentation = HashMap::new();
        presentation.insert(
            StatementRole::IncomeStatement,
            vec![
                PresentationArc {
                    concept: "Revenues".to_string(),
                    parent: None,
                    depth: 0,
                    order: 1.0,
                    preferred_label: None,
                },
                PresentationArc {
                    concept: "CostOfRevenue".to_string(),
                    parent: None,
                    depth: 0,
                    order: 2.0,
                    preferred_label: None,
                },
            ],
        );
        let mut calculation = HashMap::new();
        calculation.insert(
            StatementRole::IncomeStatement,
            vec![CalculationArc {
                concept: "CostOfRevenue".to_string(),
                parent: "GrossProfit".to_string(),
                weight: -1.0,
            }],
        );
        ConceptRegistry::from_linkbases(presentation, calculation, HashMap::new()).unwrap()
    }

    fn store() -> FactStore {
        let segment = Dimensions::new(vec![Dimension {
            axis: "ProductAxis".to_string(),
            member: "Widgets".to_string(),
        }]);
        let mut builder = FactStoreBuilder::new().fiscal_year_end(FiscalYearEnd::calendar());
        builder.insert(fact("Revenues", 1000.0, fy2023(), Dimensions::none()));
        builder.insert(fact("Revenues", 400.0, fy2023(), segment));
        builder.insert(fact("CostOfRevenue", 600.0, fy2023(), Dimensions::none()));
        builder.build()
    }

    #[test]
    fn every_line_item_has_one_cell_per_period() {
        let statement = assemble(
            &store(),
            &registry(),
            &StatementRole::IncomeStatement,
            &[candidate(fy2023()), candidate(fy2022())],
            ValueMode::Raw,
        )
        .unwrap();

        assert_eq!(statement.periods.len(), 2);
        for item in &statement.line_items {
            assert_eq!(item.cells.len(), 2, "ragged matrix for {}", item.concept);
        }
    }

    #[test]
    fn absent_fact_is_missing_not_zero() {
        let statement = assemble(
            &store(),
            &registry(),
            &StatementRole::IncomeStatement,
            &[candidate(fy2023()), candidate(fy2022())],
            ValueMode::Raw,
        )
        .unwrap();

        let revenues = &statement.line_items[0];
        assert_eq!(revenues.cells[0].value, CellValue::Present(1000.0));
        assert_eq!(revenues.cells[1].value, CellValue::Missing);
        assert_ne!(revenues.cells[1].value, CellValue::Present(0.0));
    }

    #[test]
    fn dimensional_facts_become_flagged_child_rows() {
        let statement = assemble(
            &store(),
            &registry(),
            &StatementRole::IncomeStatement,
            &[candidate(fy2023())],
            ValueMode::Raw,
        )
        .unwrap();

        // Revenues, its Widgets breakdown, then CostOfRevenue.
        assert_eq!(statement.line_items.len(), 3);
        let child = &statement.line_items[1];
        assert_eq!(child.concept, "Revenues");
        assert_eq!(child.label, "Revenues (ProductAxis: Widgets)");
        assert!(child.is_dimensional);
        assert!(!child.dimensions.is_empty());
        assert_eq!(child.depth, 1);
        assert_eq!(child.cells[0].value, CellValue::Present(400.0));
        assert!(child.cells[0].is_dimensional);

        // And the non-dimensional rows are flagged false, symmetrically.
        assert!(!statement.line_items[0].is_dimensional);
        assert!(!statement.line_items[0].cells[0].is_dimensional);
    }

    #[test]
    fn presentation_mode_flips_negative_weight_concepts_only() {
        let periods = [candidate(fy2023())];
        let raw = assemble(
            &store(),
            &registry(),
            &StatementRole::IncomeStatement,
            &periods,
            ValueMode::Raw,
        )
        .unwrap();
        let pres = assemble(
            &store(),
            &registry(),
            &StatementRole::IncomeStatement,
            &periods,
            ValueMode::Presentation,
        )
        .unwrap();

        let cost_raw = raw.line_items.iter().find(|l| l.concept == "CostOfRevenue").unwrap();
        let cost_pres = pres.line_items.iter().find(|l| l.concept == "CostOfRevenue").unwrap();
        assert_eq!(cost_raw.cells[0].value, CellValue::Present(600.0));
        assert_eq!(cost_pres.cells[0].value, CellValue::Present(-600.0));

        // Revenues has no calculation weight: identical in both modes.
        let rev_raw = &raw.line_items[0];
        let rev_pres = &pres.line_items[0];
        assert_eq!(rev_raw.cells[0].value, rev_pres.cells[0].value);
    }

    #[test]
    fn missing_linkbase_is_distinguishable_from_all_missing() {
        let err = assemble(
            &store(),
            &registry(),
            &StatementRole::CashFlow,
            &[candidate(fy2023())],
            ValueMode::Raw,
        )
        .unwrap_err();
        assert!(matches!(err, StatementError::MissingLinkbase(_)));

        // A role that exists but has no data assembles into all-missing.
        let statement = assemble(
            &store(),
            &registry(),
            &StatementRole::IncomeStatement,
            &[candidate(fy2022())],
            ValueMode::Raw,
        )
        .unwrap();
        assert!(statement.is_all_missing());
    }

    #[test]
    fn empty_period_list_is_incomplete() {
        let err = assemble(
            &store(),
            &registry(),
            &StatementRole::IncomeStatement,
            &[],
            ValueMode::Raw,
        )
        .unwrap_err();
        assert!(matches!(err, StatementError::Incomplete { .. }));
    }

    #[test]
    fn cell_serializes_with_exact_metadata_key_names() {
        let statement = assemble(
            &store(),
            &registry(),
            &StatementRole::IncomeStatement,
            &[candidate(fy2023())],
            ValueMode::Raw,
        )
        .unwrap();

        let json = serde_json::to_value(&statement.line_items[0].cells[0]).unwrap();
        let obj = json.as_object().unwrap();
        for key in [
            "value",
            "is_dimensional",
            "balance_type",
            "calculation_weight",
            "preferred_sign",
            "unit",
        ] {
            assert!(obj.contains_key(key), "cell output lost key {:?}", key);
        }
        assert_eq!(obj["is_dimensional"], serde_json::Value::Bool(false));
    }

    #[test]
    fn statement_round_trips_through_json() {
        let mut builder = FactStoreBuilder::new().fiscal_year_end(FiscalYearEnd::calendar());
        builder.insert(fact("Revenues", 1000.0, fy2023(), Dimensions::none()));
        builder.insert(fact("Revenues", 1010.0, fy2023(), Dimensions::none()));
        let store = builder.build();

        let statement = assemble(
            &store,
            &registry(),
            &StatementRole::IncomeStatement,
            &[candidate(fy2023())],
            ValueMode::Raw,
        )
        .unwrap();
        assert!(!statement.conflicts.is_empty());

        let json = serde_json::to_string(&statement).unwrap();
        let back: Statement = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role, statement.role);
        assert_eq!(back.periods, statement.periods);
        assert_eq!(back.line_items, statement.line_items);
        assert_eq!(back.conflicts, statement.conflicts);
    }

    #[test]
    fn conflicts_touching_the_statement_are_surfaced() {
        let mut builder = FactStoreBuilder::new().fiscal_year_end(FiscalYearEnd::calendar());
        builder.insert(fact("Revenues", 1000.0, fy2023(), Dimensions::none()));
        builder.insert(fact("Revenues", 1010.0, fy2023(), Dimensions::none()));
        let store = builder.build();

        let statement = assemble(
            &store,
            &registry(),
            &StatementRole::IncomeStatement,
            &[candidate(fy2023())],
            ValueMode::Raw,
        )
        .unwrap();

        assert_eq!(statement.conflicts.len(), 1);
        assert_eq!(statement.conflicts[0].values.len(), 2);
        // The display slot holds the later value, deliberately.
        assert_eq!(
            statement.line_items[0].cells[0].value,
            CellValue::Present(1010.0)
        );
    }
}
