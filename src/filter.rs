//! Scenario selection.
//!
//! The operator picks scenarios by id with one of three forms, which may be
//! mixed in a comma-separated list:
//!
//! - a single id: `T1.3`
//! - an inclusive range within one group: `T3.1-T3.4` or the short `T3.1-4`
//! - a list: `T1.1,T2.3,T5.1-2`
//!
//! A kind filter (producer or consumer) can be combined with any of them.

use crate::error::{BenchError, Result};
use crate::scenario::{Scenario, ScenarioId, ScenarioKind};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Selector {
    Single { prefix: String, index: u32 },
    Range { prefix: String, from: u32, to: u32 },
}

impl Selector {
    fn matches(&self, id: &ScenarioId) -> bool {
        let Some((prefix, index)) = id.parts() else {
            return false;
        };
        match self {
            Selector::Single { prefix: p, index: i } => p == prefix && *i == index,
            Selector::Range { prefix: p, from, to } => p == prefix && (*from..=*to).contains(&index),
        }
    }
}

/// A parsed `--test` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioFilter {
    raw: String,
    selectors: Vec<Selector>,
}

impl ScenarioFilter {
    pub fn parse(expr: &str) -> Result<Self> {
        let raw = expr.trim().to_string();
        let invalid = || BenchError::InvalidFilter(raw.clone());

        let mut selectors = Vec::new();
        for item in raw.split(',').map(str::trim) {
            if item.is_empty() {
                return Err(invalid());
            }
            let selector = match item.split_once('-') {
                None => {
                    let (prefix, index) = split_id(item).ok_or_else(invalid)?;
                    Selector::Single { prefix, index }
                }
                Some((start, end)) => {
                    let (prefix, from) = split_id(start.trim()).ok_or_else(invalid)?;
                    let end = end.trim();
                    let to = match split_id(end) {
                        Some((end_prefix, to)) if end_prefix == prefix => to,
                        Some(_) => return Err(invalid()),
                        None => end.parse::<u32>().map_err(|_| invalid())?,
                    };
                    if from > to {
                        return Err(invalid());
                    }
                    Selector::Range { prefix, from, to }
                }
            };
            selectors.push(selector);
        }

        Ok(Self { raw, selectors })
    }

    pub fn matches(&self, id: &ScenarioId) -> bool {
        self.selectors.iter().any(|s| s.matches(id))
    }
}

impl fmt::Display for ScenarioFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split `T3.12` into `("T3", 12)`. The group letter is case-insensitive.
fn split_id(s: &str) -> Option<(String, u32)> {
    let (prefix, index) = s.rsplit_once('.')?;
    let mut chars = prefix.chars();
    let letter = chars.next()?;
    let group = chars.as_str();
    if !letter.eq_ignore_ascii_case(&'t')
        || group.is_empty()
        || !group.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let index = index.parse::<u32>().ok()?;
    Some((format!("T{}", group), index))
}

/// Keep the scenarios matching both filters, in catalog order.
///
/// ## Returns
/// - `Ok(selection)` with at least one scenario
/// - `Err(BenchError::EmptySelection)` if nothing matches
pub fn select(
    scenarios: &[Scenario],
    filter: Option<&ScenarioFilter>,
    kind: Option<ScenarioKind>,
) -> Result<Vec<Scenario>> {
    let selected: Vec<Scenario> = scenarios
        .iter()
        .filter(|s| filter.map_or(true, |f| f.matches(&s.id)))
        .filter(|s| kind.map_or(true, |k| s.kind() == k))
        .cloned()
        .collect();

    if selected.is_empty() {
        let mut what = filter.map_or_else(|| "all".to_string(), |f| f.to_string());
        if let Some(k) = kind {
            what.push_str(&format!(" ({} only)", k));
        }
        return Err(BenchError::EmptySelection(what));
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuiteConfig;
    use crate::scenario::ScenarioCatalog;

    fn catalog() -> ScenarioCatalog {
        ScenarioCatalog::new(&SuiteConfig::default()).unwrap()
    }

    fn ids(selection: &[Scenario]) -> Vec<String> {
        selection.iter().map(|s| s.id.to_string()).collect()
    }

    #[test]
    fn test_single_id() {
        let f = ScenarioFilter::parse("T1.3").unwrap();
        assert!(f.matches(&ScenarioId::from("T1.3")));
        assert!(!f.matches(&ScenarioId::from("T1.30")));
        assert!(!f.matches(&ScenarioId::from("T11.3")));
    }

    #[test]
    fn test_range_selects_exactly_the_closed_interval() {
        let catalog = catalog();
        for expr in ["T3.2-T3.5", "T3.2-5", " t3.2 - T3.5 "] {
            let f = ScenarioFilter::parse(expr).unwrap();
            let picked = select(catalog.scenarios(), Some(&f), None).unwrap();
            assert_eq!(ids(&picked), vec!["T3.2", "T3.3", "T3.4", "T3.5"], "{}", expr);
        }
    }

    #[test]
    fn test_list_mixes_forms_and_keeps_catalog_order() {
        let f = ScenarioFilter::parse("T5.1,T1.1-2,T2.6").unwrap();
        let picked = select(catalog().scenarios(), Some(&f), None).unwrap();
        assert_eq!(ids(&picked), vec!["T1.1", "T1.2", "T2.6", "T5.1"]);
    }

    #[test]
    fn test_invalid_expressions() {
        for expr in ["", "T1", "X1.1", "T1.a", "T1.4-T1.2", "T1.1-T2.3", "T1.1,,T1.2", "T1.1-x"] {
            assert!(
                matches!(ScenarioFilter::parse(expr), Err(BenchError::InvalidFilter(_))),
                "{:?} should be rejected",
                expr
            );
        }
    }

    #[test]
    fn test_kind_filter() {
        let catalog = catalog();
        let consumers = select(catalog.scenarios(), None, Some(ScenarioKind::Consumer)).unwrap();
        assert_eq!(consumers.len(), 12);
        assert!(consumers.iter().all(|s| s.kind() == ScenarioKind::Consumer));

        let f = ScenarioFilter::parse("T1.1-T1.3").unwrap();
        let err = select(catalog.scenarios(), Some(&f), Some(ScenarioKind::Consumer)).unwrap_err();
        assert!(matches!(err, BenchError::EmptySelection(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_unknown_id_is_empty_selection() {
        let f = ScenarioFilter::parse("T9.1").unwrap();
        assert!(matches!(
            select(catalog().scenarios(), Some(&f), None),
            Err(BenchError::EmptySelection(_))
        ));
    }
}
