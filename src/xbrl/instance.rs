use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

use crate::error::InstanceError;
use crate::xbrl::context::{RawContext, RawDimension, RawPeriod};
use crate::xbrl::facts::RawFact;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// The raw contents of one XBRL instance document: the fact list and the
/// context table, in exactly the shape the normalizer ingests. Producing
/// these from already-downloaded filings is this module's whole job; fetching
/// the filings is someone else's.
#[derive(Clone, Debug, Default)]
pub struct InstanceDocument {
    pub facts: Vec<RawFact>,
    pub contexts: HashMap<String, RawContext>,
}

/// Parses an XBRL instance document. Dates and values stay raw strings here;
/// validation belongs to the context normalizer, which also produces the
/// rejected-context report.
pub fn parse_instance(raw_xml: &str) -> Result<InstanceDocument, InstanceError> {
    let normalized = WHITESPACE.replace_all(raw_xml, " ");
    let tree = roxmltree::Document::parse(&normalized)?;

    let elements = tree
        .root_element()
        .children()
        .filter(|e| e.node_type() == roxmltree::NodeType::Element);

    // Units resolve unit refs into measure strings up front, so facts can
    // carry a real unit ("iso4217:USD") instead of a dangling reference.
    let mut units: HashMap<String, Vec<String>> = HashMap::new();
    for unit in elements.clone().filter(|e| e.tag_name().name() == "unit") {
        let id = unit.attribute("id").unwrap_or("");
        for measure in unit
            .descendants()
            .filter(|e| e.tag_name().name() == "measure")
        {
            let value = measure.text().unwrap_or("").trim();
            if !value.is_empty() {
                units
                    .entry(id.to_string())
                    .or_default()
                    .push(strip_prefix(value).to_string());
            }
        }
    }

    // Contexts: entity identifier, period dates, explicit dimension members.
    let mut contexts: HashMap<String, RawContext> = HashMap::new();
    for context in elements.clone().filter(|e| e.tag_name().name() == "context") {
        let id = context.attribute("id").unwrap_or("");
        debug!("context {}", id);
        let mut raw = RawContext::default();

        for child in context
            .children()
            .filter(|e| e.node_type() == roxmltree::NodeType::Element)
        {
            match child.tag_name().name() {
                "entity" => {
                    if let Some(identifier) = child
                        .descendants()
                        .find(|e| e.tag_name().name() == "identifier")
                    {
                        raw.entity_id = identifier.text().unwrap_or("").trim().to_string();
                    }
                    for member in child
                        .descendants()
                        .filter(|e| e.tag_name().name() == "explicitMember")
                    {
                        if let Some(axis) = member.attribute("dimension") {
                            raw.dimensions.push(RawDimension {
                                axis: axis.to_string(),
                                member: member.text().unwrap_or("").trim().to_string(),
                            });
                        }
                    }
                }
                "period" => {
                    raw.period = extract_period(&child);
                }
                _ => {}
            }
        }

        contexts.insert(id.to_string(), raw);
    }

    // Facts: every namespaced element that is not instance machinery.
    let non_fact_elements = ["context", "unit", "xbrl", "schemaRef"];
    let mut facts = Vec::new();
    for element in elements.filter(|e| {
        !non_fact_elements.contains(&e.tag_name().name()) && e.tag_name().namespace().is_some()
    }) {
        let name = element.tag_name().name();
        let namespace = element.tag_name().namespace().unwrap_or("");
        let prefix = element.lookup_prefix(namespace).unwrap_or("");
        let Some(context_ref) = element.attribute("contextRef") else {
            // Tuples and footnote machinery carry no context; not facts.
            continue;
        };

        let unit_ref = element
            .attribute("unitRef")
            .and_then(|r| units.get(r))
            .map(|measures| measures.join(" "));

        facts.push(RawFact {
            concept_id: if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}:{}", prefix, name)
            },
            context_ref: context_ref.to_string(),
            value: sanitize_value(element.text().unwrap_or("")),
            unit_ref,
            decimals: element.attribute("decimals").map(String::from),
        });
    }

    if facts.is_empty() {
        return Err(InstanceError::NotXbrl);
    }

    debug!("parsed {} facts, {} contexts", facts.len(), contexts.len());
    Ok(InstanceDocument { facts, contexts })
}

fn extract_period(node: &roxmltree::Node<'_, '_>) -> RawPeriod {
    let mut period = RawPeriod::default();
    for child in node
        .descendants()
        .filter(|e| e.node_type() == roxmltree::NodeType::Element)
    {
        let text = child.text().unwrap_or("").trim().to_string();
        match child.tag_name().name() {
            "instant" => period.instant = Some(text),
            "startDate" => period.start = Some(text),
            "endDate" => period.end = Some(text),
            _ => {}
        }
    }
    period
}

fn strip_prefix(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}

/// Inline-XBRL fact values can carry embedded HTML and odd unicode forms;
/// strip the markup, NFKC-normalize, collapse whitespace.
fn sanitize_value(input: &str) -> String {
    let mut output: String = input.nfkc().collect();
    if output.contains('<') {
        let fragment = Html::parse_fragment(&output);
        output = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    }
    WHITESPACE.replace_all(output.trim(), " ").to_string()
}
