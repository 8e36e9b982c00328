//! Pattern matching engine: priority-ordered regex/keyword rules that vote
//! for hierarchy nodes. Matching is stateless and deterministic; candidate
//! selection between conflicting matches belongs to the rule engine.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::candidate::{Candidate, Source};
use crate::hierarchy::{HierarchyError, LabelHierarchy};

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("pattern rule '{rule}': {source}")]
    UnknownTarget {
        rule: String,
        source: HierarchyError,
    },
    #[error("pattern rule '{rule}': invalid regex '{pattern}': {source}")]
    BadRegex {
        rule: String,
        pattern: String,
        source: regex::Error,
    },
}

/// Declarative pattern rule, as it appears in the YAML config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRuleDef {
    pub name: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    /// Confidence assigned to the candidate when this rule matches.
    pub confidence: f64,
    /// Higher priority rules are emitted first and win rule-level ties.
    #[serde(default)]
    pub priority: i32,
    pub matcher: MatcherDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MatcherDef {
    /// Matches when any of the regexes matches. Compiled case-insensitive
    /// with `.` matching newlines.
    Regex { patterns: Vec<String> },
    /// Matches when any keyword occurs as a substring (case-insensitive).
    AnyKeyword { keywords: Vec<String> },
    /// Matches only when every keyword occurs (case-insensitive).
    AllKeywords { keywords: Vec<String> },
}

enum CompiledMatcher {
    Regex(Vec<Regex>),
    AnyKeyword(Vec<String>),
    AllKeywords(Vec<String>),
}

struct CompiledRule {
    name: String,
    category: String,
    subcategory: Option<String>,
    confidence: f64,
    priority: i32,
    matcher: CompiledMatcher,
}

/// Immutable set of compiled rules, fixed for the lifetime of a
/// classification session.
pub struct PatternEngine {
    // Sorted by priority (highest first), config order preserved for ties.
    rules: Vec<CompiledRule>,
}

impl PatternEngine {
    /// Compile all rules, resolving every target against the hierarchy.
    /// An unresolvable target or a malformed regex is fatal at startup.
    pub fn new(defs: &[PatternRuleDef], hierarchy: &LabelHierarchy) -> Result<Self, PatternError> {
        let mut rules = Vec::with_capacity(defs.len());
        for def in defs {
            hierarchy
                .resolve(&def.category, def.subcategory.as_deref())
                .map_err(|source| PatternError::UnknownTarget {
                    rule: def.name.clone(),
                    source,
                })?;

            let matcher = match &def.matcher {
                MatcherDef::Regex { patterns } => {
                    let mut compiled = Vec::with_capacity(patterns.len());
                    for pattern in patterns {
                        let regex = RegexBuilder::new(pattern)
                            .case_insensitive(true)
                            .dot_matches_new_line(true)
                            .build()
                            .map_err(|source| PatternError::BadRegex {
                                rule: def.name.clone(),
                                pattern: pattern.clone(),
                                source,
                            })?;
                        compiled.push(regex);
                    }
                    CompiledMatcher::Regex(compiled)
                }
                MatcherDef::AnyKeyword { keywords } => {
                    CompiledMatcher::AnyKeyword(lowercase_all(keywords))
                }
                MatcherDef::AllKeywords { keywords } => {
                    CompiledMatcher::AllKeywords(lowercase_all(keywords))
                }
            };

            rules.push(CompiledRule {
                name: def.name.clone(),
                category: def.category.clone(),
                subcategory: def.subcategory.clone(),
                confidence: def.confidence.clamp(0.0, 1.0),
                priority: def.priority,
                matcher,
            });
        }

        // Stable sort keeps config order for equal priorities.
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        log::info!("Pattern engine compiled {} rules", rules.len());
        Ok(Self { rules })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Apply every rule against `text`, returning all matches as candidates
    /// in priority order. Empty input or no matching rule yields an empty
    /// list; this never fails.
    pub fn match_text(&self, text: &str) -> Vec<Candidate> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let lower = text.to_lowercase();

        let mut candidates = Vec::new();
        for rule in &self.rules {
            if !rule.matches(&lower) {
                continue;
            }
            log::debug!(
                "pattern '{}' matched -> {}/{:?} ({:.2})",
                rule.name,
                rule.category,
                rule.subcategory,
                rule.confidence
            );
            let mut candidate = Candidate::new(
                rule.category.clone(),
                rule.subcategory.clone(),
                rule.confidence,
                Source::Pattern,
            );
            candidate.priority = rule.priority;
            candidate.reason = rule.name.clone();
            candidates.push(candidate);
        }
        candidates
    }
}

impl CompiledRule {
    fn matches(&self, lower_text: &str) -> bool {
        match &self.matcher {
            CompiledMatcher::Regex(patterns) => patterns.iter().any(|p| p.is_match(lower_text)),
            CompiledMatcher::AnyKeyword(keywords) => {
                keywords.iter().any(|k| lower_text.contains(k))
            }
            CompiledMatcher::AllKeywords(keywords) => {
                keywords.iter().all(|k| lower_text.contains(k))
            }
        }
    }
}

fn lowercase_all(keywords: &[String]) -> Vec<String> {
    keywords.iter().map(|k| k.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::LabelDef;

    fn hierarchy() -> LabelHierarchy {
        LabelHierarchy::from_defs(&[
            LabelDef::new("Payments Claim", "")
                .with_children(vec![LabelDef::new("Claims Paid (No Info)", "")]),
            LabelDef::new("Invoices Request", "")
                .with_children(vec![LabelDef::new("Invoice Copies", "")]),
        ])
        .unwrap()
    }

    fn rule(name: &str, category: &str, sub: &str, priority: i32, matcher: MatcherDef) -> PatternRuleDef {
        PatternRuleDef {
            name: name.to_string(),
            category: category.to_string(),
            subcategory: Some(sub.to_string()),
            confidence: 0.8,
            priority,
            matcher,
        }
    }

    #[test]
    fn test_unknown_target_is_fatal() {
        let h = hierarchy();
        let defs = vec![rule(
            "bad",
            "Refunds",
            "Invoice Copies",
            0,
            MatcherDef::AnyKeyword {
                keywords: vec!["refund".to_string()],
            },
        )];
        assert!(matches!(
            PatternEngine::new(&defs, &h),
            Err(PatternError::UnknownTarget { .. })
        ));
    }

    #[test]
    fn test_bad_regex_is_fatal() {
        let h = hierarchy();
        let defs = vec![rule(
            "broken",
            "Payments Claim",
            "Claims Paid (No Info)",
            0,
            MatcherDef::Regex {
                patterns: vec!["paid(".to_string()],
            },
        )];
        assert!(matches!(
            PatternEngine::new(&defs, &h),
            Err(PatternError::BadRegex { .. })
        ));
    }

    #[test]
    fn test_match_returns_priority_order() {
        let h = hierarchy();
        let defs = vec![
            rule(
                "invoice-request",
                "Invoices Request",
                "Invoice Copies",
                10,
                MatcherDef::Regex {
                    patterns: vec![r"send.*invoice".to_string()],
                },
            ),
            rule(
                "payment-claim",
                "Payments Claim",
                "Claims Paid (No Info)",
                50,
                MatcherDef::AnyKeyword {
                    keywords: vec!["already paid".to_string()],
                },
            ),
        ];
        let engine = PatternEngine::new(&defs, &h).unwrap();

        let candidates =
            engine.match_text("This was already paid, but please send the invoice copy anyway.");
        assert_eq!(candidates.len(), 2);
        // Higher priority rule first, regardless of config order.
        assert_eq!(candidates[0].reason, "payment-claim");
        assert_eq!(candidates[1].reason, "invoice-request");
        assert!(candidates.iter().all(|c| c.source == Source::Pattern));
    }

    #[test]
    fn test_matching_is_case_insensitive_and_deterministic() {
        let h = hierarchy();
        let defs = vec![rule(
            "payment-claim",
            "Payments Claim",
            "Claims Paid (No Info)",
            0,
            MatcherDef::AnyKeyword {
                keywords: vec!["Already Paid".to_string()],
            },
        )];
        let engine = PatternEngine::new(&defs, &h).unwrap();

        let first = engine.match_text("ALREADY PAID last week");
        let second = engine.match_text("ALREADY PAID last week");
        assert_eq!(first.len(), 1);
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].category, second[0].category);
    }

    #[test]
    fn test_no_match_and_empty_input_yield_empty() {
        let h = hierarchy();
        let defs = vec![rule(
            "payment-claim",
            "Payments Claim",
            "Claims Paid (No Info)",
            0,
            MatcherDef::AllKeywords {
                keywords: vec!["paid".to_string(), "check".to_string()],
            },
        )];
        let engine = PatternEngine::new(&defs, &h).unwrap();
        assert!(engine.match_text("unrelated content").is_empty());
        assert!(engine.match_text("paid but no chk word").is_empty());
        assert!(engine.match_text("   ").is_empty());
    }
}
