use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{ContextError, RejectedContext};
use crate::xbrl::period::Period;

/// A raw context entry as handed over by the instance parser or an external
/// collaborator: entity, unparsed period strings, unparsed dimensions.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawContext {
    pub entity_id: String,
    pub period: RawPeriod,
    pub dimensions: Vec<RawDimension>,
}

/// Raw period strings off the wire. Instants carry `instant`; durations
/// carry `start`/`end`. Anything else is malformed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawPeriod {
    pub instant: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawDimension {
    pub axis: String,
    pub member: String,
}

/// One axis/member qualifier on a fact.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dimension {
    pub axis: String,
    pub member: String,
}

/// The full dimension set of a context, canonically ordered so that equality
/// and hashing do not depend on the order members appeared in the document.
/// Empty dimensions mark the primary, non-segmented value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dimensions(Vec<Dimension>);

impl Dimensions {
    pub fn new(mut pairs: Vec<Dimension>) -> Self {
        pairs.sort();
        pairs.dedup();
        Dimensions(pairs)
    }

    pub fn none() -> Self {
        Dimensions(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dimension> {
        self.0.iter()
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", dim.axis, dim.member)?;
        }
        Ok(())
    }
}

/// A context that survived normalization: a typed period plus its canonical
/// dimension set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedContext {
    pub entity_id: String,
    pub period: Period,
    pub dimensions: Dimensions,
}

fn parse_date(raw: &str, field: &str) -> Result<NaiveDate, ContextError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ContextError::InvalidPeriod(format!(
            "empty {} date string",
            field
        )));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|e| {
        ContextError::InvalidPeriod(format!("unparseable {} date {:?}: {}", field, trimmed, e))
    })
}

/// Normalizes one raw context. Malformed or empty-string dates are rejected
/// here, never coerced into a valid-looking period.
pub fn normalize_context(raw: &RawContext) -> Result<NormalizedContext, ContextError> {
    let period = match (&raw.period.instant, &raw.period.start, &raw.period.end) {
        (Some(instant), None, None) => Period::instant(parse_date(instant, "instant")?),
        (None, Some(start), Some(end)) => {
            Period::duration(parse_date(start, "start")?, parse_date(end, "end")?)?
        }
        (None, None, None) => return Err(ContextError::MissingPeriod),
        (Some(_), _, _) => {
            return Err(ContextError::InvalidPeriod(
                "context carries both instant and duration dates".to_string(),
            ))
        }
        (None, Some(_), None) | (None, None, Some(_)) => {
            return Err(ContextError::InvalidPeriod(
                "duration is missing its start or end date".to_string(),
            ))
        }
    };

    let mut pairs = Vec::with_capacity(raw.dimensions.len());
    for dim in &raw.dimensions {
        let axis = dim.axis.trim();
        let member = dim.member.trim();
        if axis.is_empty() || member.is_empty() {
            return Err(ContextError::InvalidDimension(format!(
                "axis {:?} / member {:?}",
                dim.axis, dim.member
            )));
        }
        pairs.push(Dimension {
            axis: axis.to_string(),
            member: member.to_string(),
        });
    }

    Ok(NormalizedContext {
        entity_id: raw.entity_id.clone(),
        period,
        dimensions: Dimensions::new(pairs),
    })
}

/// Normalizes a whole context table. Invalid contexts land in the rejected
/// report instead of the output map; two contexts with identical dates but
/// different dimension sets stay distinct entries.
pub fn normalize_contexts(
    raw: &HashMap<String, RawContext>,
) -> (HashMap<String, NormalizedContext>, Vec<RejectedContext>) {
    let mut normalized = HashMap::with_capacity(raw.len());
    let mut rejected = Vec::new();

    for (context_ref, context) in raw {
        match normalize_context(context) {
            Ok(ctx) => {
                normalized.insert(context_ref.clone(), ctx);
            }
            Err(reason) => {
                debug!("rejecting context {}: {}", context_ref, reason);
                rejected.push(RejectedContext {
                    context_ref: context_ref.clone(),
                    reason,
                });
            }
        }
    }

    rejected.sort_by(|a, b| a.context_ref.cmp(&b.context_ref));
    (normalized, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn duration_context(start: &str, end: &str) -> RawContext {
        RawContext {
            entity_id: "0000320193".to_string(),
            period: RawPeriod {
                instant: None,
                start: Some(start.to_string()),
                end: Some(end.to_string()),
            },
            dimensions: Vec::new(),
        }
    }

    #[test]
    fn normalizes_instant_and_duration() {
        let instant = RawContext {
            entity_id: "e".to_string(),
            period: RawPeriod {
                instant: Some("2023-12-31".to_string()),
                start: None,
                end: None,
            },
            dimensions: Vec::new(),
        };
        let ctx = normalize_context(&instant).unwrap();
        assert!(ctx.period.is_instant());

        let ctx = normalize_context(&duration_context("2023-01-01", "2023-12-31")).unwrap();
        assert_eq!(ctx.period.span_days(), Some(365));
    }

    #[test]
    fn empty_string_date_is_rejected_not_coerced() {
        let err = normalize_context(&duration_context("", "2023-12-31")).unwrap_err();
        assert!(matches!(err, ContextError::InvalidPeriod(_)));
    }

    #[test]
    fn inverted_duration_is_rejected() {
        let err = normalize_context(&duration_context("2023-12-31", "2023-01-01")).unwrap_err();
        assert!(matches!(err, ContextError::InvalidPeriod(_)));
    }

    #[test]
    fn missing_period_is_its_own_error() {
        let raw = RawContext::default();
        assert_eq!(normalize_context(&raw).unwrap_err(), ContextError::MissingPeriod);
    }

    #[test]
    fn dimensions_are_order_independent() {
        let a = Dimensions::new(vec![
            Dimension { axis: "Segment".into(), member: "Auto".into() },
            Dimension { axis: "Geo".into(), member: "US".into() },
        ]);
        let b = Dimensions::new(vec![
            Dimension { axis: "Geo".into(), member: "US".into() },
            Dimension { axis: "Segment".into(), member: "Auto".into() },
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn batch_normalization_reports_rejects() {
        let mut raw = HashMap::new();
        raw.insert("C1".to_string(), duration_context("2023-01-01", "2023-12-31"));
        raw.insert("C2".to_string(), duration_context("", "2023-12-31"));

        let (ok, rejected) = normalize_contexts(&raw);
        assert_eq!(ok.len(), 1);
        assert!(ok.contains_key("C1"));
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].context_ref, "C2");
        assert!(matches!(rejected[0].reason, ContextError::InvalidPeriod(_)));
    }
}
