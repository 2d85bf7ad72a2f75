use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ContextError, RejectedContext};
use crate::xbrl::context::{normalize_contexts, Dimensions, RawContext};
use crate::xbrl::period::{FiscalYearEnd, Period};

/// A raw fact entry as handed over by the instance parser or an external
/// collaborator. Values are still strings; the context is still a reference.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawFact {
    pub concept_id: String,
    pub context_ref: String,
    pub value: String,
    pub unit_ref: Option<String>,
    pub decimals: Option<String>,
}

/// A reported value: numeric when it parses as one, text otherwise. Text
/// facts are kept for queries but never fill a statement cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FactValue {
    Number(f64),
    Text(String),
}

impl FactValue {
    pub fn parse(raw: &str) -> FactValue {
        let trimmed = raw.trim();
        let candidate = trimmed.replace(',', "");
        match candidate.parse::<f64>() {
            Ok(num) if !candidate.is_empty() => FactValue::Number(num),
            _ => FactValue::Text(trimmed.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FactValue::Number(n) => Some(*n),
            FactValue::Text(_) => None,
        }
    }
}

/// A normalized, atomic reported value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub concept: String,
    pub value: FactValue,
    pub unit: Option<String>,
    pub period: Period,
    pub dimensions: Dimensions,
    pub decimals: Option<String>,
    pub entity_id: String,
}

impl Fact {
    pub fn key(&self) -> FactKey {
        FactKey {
            concept: self.concept.clone(),
            period: self.period,
            dimensions: self.dimensions.clone(),
            unit: self.unit.clone(),
        }
    }
}

/// The identity of a fact. Two facts with the same key and different values
/// are a restatement or a tagging error, tracked as a conflict.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactKey {
    pub concept: String,
    pub period: Period,
    pub dimensions: Dimensions,
    pub unit: Option<String>,
}

/// Same key, differing values. Both candidates are retained and surfaced;
/// the store never silently picks one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DuplicateFactConflict {
    pub key: FactKey,
    pub values: Vec<FactValue>,
}

/// Mutable accumulation side of the builder → frozen store pattern.
#[derive(Debug, Default)]
pub struct FactStoreBuilder {
    facts: Vec<Fact>,
    fiscal_year_end: Option<FiscalYearEnd>,
    entity_id: Option<String>,
}

impl FactStoreBuilder {
    pub fn new() -> Self {
        FactStoreBuilder::default()
    }

    pub fn fiscal_year_end(mut self, fye: FiscalYearEnd) -> Self {
        self.fiscal_year_end = Some(fye);
        self
    }

    pub fn insert(&mut self, fact: Fact) {
        if self.entity_id.is_none() && !fact.entity_id.is_empty() {
            self.entity_id = Some(fact.entity_id.clone());
        }
        self.facts.push(fact);
    }

    /// Freezes the accumulated facts into an immutable, indexed store and
    /// computes the duplicate-key conflict report.
    pub fn build(self) -> FactStore {
        let mut by_concept: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_key: HashMap<FactKey, Vec<usize>> = HashMap::new();

        for (idx, fact) in self.facts.iter().enumerate() {
            by_concept.entry(fact.concept.clone()).or_default().push(idx);
            by_key.entry(fact.key()).or_default().push(idx);
        }

        let mut conflicts = Vec::new();
        for (key, indices) in &by_key {
            if indices.len() < 2 {
                continue;
            }
            let values: Vec<FactValue> =
                indices.iter().map(|&i| self.facts[i].value.clone()).collect();
            if values.windows(2).any(|w| w[0] != w[1]) {
                conflicts.push(DuplicateFactConflict {
                    key: key.clone(),
                    values,
                });
            }
        }
        conflicts.sort_by(|a, b| a.key.cmp(&b.key));

        FactStore {
            facts: self.facts,
            by_concept,
            conflicts,
            fiscal_year_end: self.fiscal_year_end.unwrap_or_else(FiscalYearEnd::calendar),
            entity_id: self.entity_id.unwrap_or_default(),
        }
    }
}

/// Immutable, indexed collection of one filing's normalized facts. Built
/// once, never mutated, safe to share across parallel per-filing workers.
#[derive(Clone, Debug)]
pub struct FactStore {
    facts: Vec<Fact>,
    by_concept: HashMap<String, Vec<usize>>,
    conflicts: Vec<DuplicateFactConflict>,
    fiscal_year_end: FiscalYearEnd,
    entity_id: String,
}

impl FactStore {
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn fiscal_year_end(&self) -> FiscalYearEnd {
        self.fiscal_year_end
    }

    pub fn conflicts(&self) -> &[DuplicateFactConflict] {
        &self.conflicts
    }

    pub fn all_concepts(&self) -> Vec<&str> {
        let mut concepts: Vec<&str> = self.by_concept.keys().map(String::as_str).collect();
        concepts.sort_unstable();
        concepts
    }

    pub fn facts_for(&self, concept: &str) -> impl Iterator<Item = &Fact> {
        self.by_concept
            .get(concept)
            .into_iter()
            .flatten()
            .map(move |&i| &self.facts[i])
    }

    /// Facts matching a concept with optional period and dimension filters,
    /// in insertion (document) order.
    pub fn query(
        &self,
        concept: &str,
        period: Option<&Period>,
        dimensions: Option<&Dimensions>,
    ) -> Vec<&Fact> {
        self.facts_for(concept)
            .filter(|f| period.map_or(true, |p| &f.period == p))
            .filter(|f| dimensions.map_or(true, |d| &f.dimensions == d))
            .collect()
    }

    /// The fact that fills a statement cell: the latest-inserted numeric
    /// match for the key. Amendments follow originals in instance order, so
    /// the later value is the deliberate winner; the conflict report still
    /// carries every candidate.
    pub fn display_fact(
        &self,
        concept: &str,
        period: &Period,
        dimensions: &Dimensions,
    ) -> Option<&Fact> {
        self.facts_for(concept)
            .filter(|f| &f.period == period && &f.dimensions == dimensions)
            .filter(|f| f.value.as_number().is_some())
            .last()
    }

    /// Distinct periods present for a concept, most recent first.
    pub fn periods_for(&self, concept: &str) -> Vec<Period> {
        self.facts_for(concept)
            .map(|f| f.period)
            .sorted_by_key(|p| std::cmp::Reverse((p.end_date(), *p)))
            .dedup()
            .collect()
    }

    /// Distinct non-empty dimension sets observed for a concept within the
    /// given periods, canonically ordered.
    pub fn dimension_sets_for(&self, concept: &str, periods: &[Period]) -> Vec<Dimensions> {
        self.facts_for(concept)
            .filter(|f| !f.dimensions.is_empty())
            .filter(|f| periods.contains(&f.period))
            .map(|f| f.dimensions.clone())
            .sorted()
            .dedup()
            .collect()
    }

    pub fn has_conflict(&self, key: &FactKey) -> bool {
        self.conflicts.iter().any(|c| &c.key == key)
    }
}

/// A filing's facts after normalization, plus everything that did not make
/// it in. Partial success is the normal case.
#[derive(Debug)]
pub struct NormalizedFiling {
    pub store: FactStore,
    pub rejected: Vec<RejectedContext>,
}

/// Runs the context normalizer over the raw inputs and builds the frozen
/// fact store. Facts pointing at rejected or unknown contexts are excluded
/// and accounted for in the rejected report.
pub fn ingest(
    raw_facts: &[RawFact],
    raw_contexts: &HashMap<String, RawContext>,
    fiscal_year_end: FiscalYearEnd,
) -> NormalizedFiling {
    let (contexts, mut rejected) = normalize_contexts(raw_contexts);
    let mut builder = FactStoreBuilder::new().fiscal_year_end(fiscal_year_end);
    let mut unknown_refs: Vec<String> = Vec::new();

    for raw in raw_facts {
        let Some(ctx) = contexts.get(&raw.context_ref) else {
            if rejected.iter().any(|r| r.context_ref == raw.context_ref) {
                // Context was already rejected with its own reason.
                continue;
            }
            debug!(
                "dropping fact {} with unknown context ref {}",
                raw.concept_id, raw.context_ref
            );
            unknown_refs.push(raw.context_ref.clone());
            continue;
        };

        builder.insert(Fact {
            concept: raw.concept_id.clone(),
            value: FactValue::parse(&raw.value),
            unit: raw.unit_ref.clone(),
            period: ctx.period,
            dimensions: ctx.dimensions.clone(),
            decimals: raw.decimals.clone(),
            entity_id: ctx.entity_id.clone(),
        });
    }

    unknown_refs.sort();
    unknown_refs.dedup();
    rejected.extend(unknown_refs.into_iter().map(|context_ref| RejectedContext {
        context_ref,
        reason: ContextError::UnknownReference,
    }));

    NormalizedFiling {
        store: builder.build(),
        rejected,
    }
}
