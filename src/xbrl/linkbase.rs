use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::LinkbaseError;
use crate::statement::StatementRole;

/// Debit/credit nature of a concept, from the taxonomy element definition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BalanceType {
    Debit,
    Credit,
    #[default]
    None,
}

impl BalanceType {
    pub fn parse(raw: &str) -> BalanceType {
        match raw.trim().to_ascii_lowercase().as_str() {
            "debit" => BalanceType::Debit,
            "credit" => BalanceType::Credit,
            _ => BalanceType::None,
        }
    }
}

/// Sign a value is expected to carry when displayed as filed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PreferredSign {
    #[default]
    Positive,
    Negative,
}

/// One presentation-linkbase arc: a concept's slot in the display hierarchy
/// of a statement role.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PresentationArc {
    pub concept: String,
    pub parent: Option<String>,
    pub depth: u32,
    pub order: f64,
    pub preferred_label: Option<String>,
}

/// One calculation-linkbase arc: the signed weight a concept contributes to
/// its parent total.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalculationArc {
    pub concept: String,
    pub parent: String,
    pub weight: f64,
}

/// Everything downstream display logic needs to know about a concept.
/// Exposed as first-class output on every statement cell, not consumed
/// internally and thrown away.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConceptMetadata {
    pub balance_type: BalanceType,
    pub calculation_weight: Option<i8>,
    pub preferred_sign: PreferredSign,
    pub depth: u32,
    pub label: String,
}

impl Default for ConceptMetadata {
    fn default() -> Self {
        ConceptMetadata {
            balance_type: BalanceType::None,
            calculation_weight: None,
            preferred_sign: PreferredSign::Positive,
            depth: 0,
            label: String::new(),
        }
    }
}

fn is_negated_label(label: &str) -> bool {
    label.to_ascii_lowercase().contains("negated")
}

/// Per-role view of the loaded linkbases: the presentation tree flattened
/// into document order, plus resolved metadata per concept.
#[derive(Clone, Debug, Default)]
pub struct RoleLinkbase {
    presentation: Vec<PresentationArc>,
    metadata: HashMap<String, ConceptMetadata>,
}

/// Immutable registry of concept metadata for one filing, built once from
/// the filing's linkbases and shared read-only across every statement
/// derived from that filing.
#[derive(Clone, Debug, Default)]
pub struct ConceptRegistry {
    roles: HashMap<StatementRole, RoleLinkbase>,
}

impl ConceptRegistry {
    /// Builds the registry. Presentation arcs are re-ordered into document
    /// order (depth-first by arc order); a cycle in the arcs violates the
    /// tree invariant and is fatal to the load, not patched over.
    pub fn from_linkbases(
        presentation: HashMap<StatementRole, Vec<PresentationArc>>,
        calculation: HashMap<StatementRole, Vec<CalculationArc>>,
        balance_types: HashMap<String, BalanceType>,
    ) -> Result<Self, LinkbaseError> {
        let mut roles = HashMap::new();

        for (role, arcs) in presentation {
            let ordered = order_presentation(arcs)?;
            let calc_arcs = calculation.get(&role).map(Vec::as_slice).unwrap_or(&[]);

            let mut metadata = HashMap::with_capacity(ordered.len());
            for arc in &ordered {
                let weight = calc_arcs
                    .iter()
                    .find(|c| c.concept == arc.concept)
                    .map(|c| if c.weight < 0.0 { -1i8 } else { 1i8 });

                let negated = arc
                    .preferred_label
                    .as_deref()
                    .map(is_negated_label)
                    .unwrap_or(false);
                let preferred_sign = if negated || weight == Some(-1) {
                    PreferredSign::Negative
                } else {
                    PreferredSign::Positive
                };

                let label = arc
                    .preferred_label
                    .clone()
                    .filter(|l| !is_negated_label(l) && !l.is_empty())
                    .unwrap_or_else(|| arc.concept.clone());

                metadata.insert(
                    arc.concept.clone(),
                    ConceptMetadata {
                        balance_type: balance_types
                            .get(&arc.concept)
                            .copied()
                            .unwrap_or_default(),
                        calculation_weight: weight,
                        preferred_sign,
                        depth: arc.depth,
                        label,
                    },
                );
            }

            debug!(
                "loaded role {} with {} presentation arcs",
                role,
                ordered.len()
            );
            roles.insert(
                role,
                RoleLinkbase {
                    presentation: ordered,
                    metadata,
                },
            );
        }

        Ok(ConceptRegistry { roles })
    }

    /// The flattened presentation tree for a role, in document order.
    /// `None` when the filing has no linkbase data for the role at all.
    pub fn presentation(&self, role: &StatementRole) -> Option<&[PresentationArc]> {
        self.roles.get(role).map(|r| r.presentation.as_slice())
    }

    pub fn resolve(&self, role: &StatementRole, concept: &str) -> Option<&ConceptMetadata> {
        self.roles.get(role).and_then(|r| r.metadata.get(concept))
    }

    pub fn concepts(&self, role: &StatementRole) -> Vec<String> {
        self.presentation(role)
            .map(|arcs| arcs.iter().map(|a| a.concept.clone()).collect())
            .unwrap_or_default()
    }

    pub fn roles(&self) -> impl Iterator<Item = &StatementRole> {
        self.roles.keys()
    }
}

/// Flattens arcs into document order: roots first by arc order, children
/// depth-first under their parent. A revisited or unreachable concept
/// means a cycle.
fn order_presentation(arcs: Vec<PresentationArc>) -> Result<Vec<PresentationArc>, LinkbaseError> {
    let total = arcs.len();
    let concept_set: HashSet<&str> = arcs.iter().map(|a| a.concept.as_str()).collect();

    let mut children: HashMap<Option<&str>, Vec<&PresentationArc>> = HashMap::new();
    for arc in &arcs {
        // Parents outside this role's arc set are treated as roots.
        let parent = arc
            .parent
            .as_deref()
            .filter(|p| concept_set.contains(p) && *p != arc.concept);
        children.entry(parent).or_default().push(arc);
    }
    for list in children.values_mut() {
        list.sort_by(|a, b| {
            a.order
                .partial_cmp(&b.order)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.concept.cmp(&b.concept))
        });
    }

    let mut ordered = Vec::with_capacity(total);
    let mut stack: Vec<&PresentationArc> = children
        .get(&None)
        .map(|roots| roots.iter().rev().copied().collect())
        .unwrap_or_default();
    let mut seen: HashSet<&str> = HashSet::new();

    while let Some(arc) = stack.pop() {
        if !seen.insert(arc.concept.as_str()) {
            return Err(LinkbaseError::Cycle(arc.concept.clone()));
        }
        ordered.push(arc.clone());
        if let Some(kids) = children.get(&Some(arc.concept.as_str())) {
            for kid in kids.iter().rev() {
                stack.push(kid);
            }
        }
    }

    if ordered.len() != total {
        // Arcs unreachable from any root can only mean a cycle.
        let stuck = arcs
            .iter()
            .find(|a| !seen.contains(a.concept.as_str()))
            .map(|a| a.concept.clone())
            .unwrap_or_default();
        return Err(LinkbaseError::Cycle(stuck));
    }

    Ok(ordered)
}
