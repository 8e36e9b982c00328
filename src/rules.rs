//! Rule engine: reconciles pattern, ML and thread-continuity signals into a
//! single classification. Pure decision logic over already-available inputs;
//! the only side effect is the usage-counter bump on the shared hierarchy.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::candidate::{
    Candidate, Classification, Method, Source, FLAG_LOW_CONFIDENCE, FLAG_NEEDS_MANUAL_REVIEW,
    FLAG_THREAD_CONTINUATION,
};
use crate::hierarchy::{LabelHierarchy, NodeId};
use crate::nlp::NlpFeatures;
use crate::preprocess::ThreadContext;

/// Designated fallback route for low-confidence or unresolved decisions.
pub const FALLBACK_CATEGORY: &str = "Manual Review";
pub const FALLBACK_SUBCATEGORY: &str = "Complex Queries";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Decisions below this confidence are routed to Manual Review.
    pub min_confidence: f64,
    /// Whether a prior classification in the same thread may be injected as
    /// an extra candidate.
    pub thread_override_enabled: bool,
    /// Confidence boost applied to the injected thread candidate.
    pub thread_boost: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            thread_override_enabled: true,
            thread_boost: 0.1,
        }
    }
}

pub struct RuleEngine {
    hierarchy: Arc<LabelHierarchy>,
    config: DecisionConfig,
}

impl RuleEngine {
    pub fn new(hierarchy: Arc<LabelHierarchy>, config: DecisionConfig) -> Self {
        Self { hierarchy, config }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// The central decision function. Always produces a classification;
    /// malformed candidate categories are dropped, and an empty or fully
    /// invalidated pool degrades to Manual Review rather than failing.
    pub fn decide(
        &self,
        pattern_candidates: &[Candidate],
        ml_candidates: &[Candidate],
        features: &NlpFeatures,
        thread: &ThreadContext,
    ) -> Classification {
        // 1. Candidate pool, each already tagged with its source.
        let mut pool: Vec<Candidate> = Vec::with_capacity(
            pattern_candidates.len() + ml_candidates.len() + 1,
        );
        pool.extend_from_slice(pattern_candidates);
        pool.extend_from_slice(ml_candidates);

        // 2. Thread-context override: conversation continuity injects the
        // prior classification as a boosted candidate.
        if self.config.thread_override_enabled && thread.in_thread {
            if let Some(prior) = &thread.prior {
                let mut injected = Candidate::new(
                    prior.category.clone(),
                    prior.subcategory.clone(),
                    (prior.confidence + self.config.thread_boost).min(1.0),
                    Source::ThreadContext,
                );
                injected.reason = "thread-continuation".to_string();
                pool.push(injected);
            }
        }

        // 3. Hierarchy validation: unknown targets and failed validation
        // rules remove a candidate from contention.
        let eligible: Vec<(Candidate, NodeId)> = pool
            .into_iter()
            .filter_map(|candidate| {
                match self
                    .hierarchy
                    .resolve(&candidate.category, candidate.subcategory.as_deref())
                {
                    Ok(node) => {
                        if self.hierarchy.validate(node, features, thread) {
                            Some((candidate, node))
                        } else {
                            log::debug!(
                                "candidate {}/{:?} failed hierarchy validation",
                                candidate.category,
                                candidate.subcategory
                            );
                            None
                        }
                    }
                    Err(e) => {
                        log::debug!("dropping candidate with unresolvable target: {e}");
                        None
                    }
                }
            })
            .collect();

        // 4. Selection: highest confidence, then source rank, then pattern
        // rule priority; first-seen wins any remaining tie.
        let winner = eligible.into_iter().reduce(|best, other| {
            let best_key = (best.0.confidence, best.0.source.rank(), best.0.priority);
            let other_key = (other.0.confidence, other.0.source.rank(), other.0.priority);
            let ordering = other_key
                .0
                .total_cmp(&best_key.0)
                .then(other_key.1.cmp(&best_key.1))
                .then(other_key.2.cmp(&best_key.2));
            if ordering == std::cmp::Ordering::Greater {
                other
            } else {
                best
            }
        });

        let Some((winner, node)) = winner else {
            // 5. No eligible candidate at all.
            return self.no_candidate_fallback();
        };

        // 6. Threshold gate.
        if winner.confidence < self.config.min_confidence {
            return self.threshold_fallback(&winner);
        }

        self.hierarchy.record_usage(node);

        let mut result = Classification {
            category: winner.category.clone(),
            subcategory: winner.subcategory.clone(),
            confidence: winner.confidence,
            method_used: Method::from_source(winner.source),
            flags: Vec::new(),
            reasoning: format!(
                "{} candidate '{}' selected at {:.2} (threshold {:.2})",
                winner.source.as_str(),
                winner.reason,
                winner.confidence,
                self.config.min_confidence
            ),
        };
        if winner.source == Source::ThreadContext {
            result.add_flag(FLAG_THREAD_CONTINUATION);
        }
        result
    }

    fn no_candidate_fallback(&self) -> Classification {
        let mut result = Classification {
            category: FALLBACK_CATEGORY.to_string(),
            subcategory: Some(FALLBACK_SUBCATEGORY.to_string()),
            confidence: 0.0,
            method_used: Method::NoCandidateFallback,
            flags: Vec::new(),
            reasoning: "no eligible candidate survived validation".to_string(),
        };
        result.add_flag(FLAG_NEEDS_MANUAL_REVIEW);
        self.record_fallback_usage(&result);
        result
    }

    fn threshold_fallback(&self, rejected: &Candidate) -> Classification {
        // Keep the rejected winner's Manual Review route when it already
        // pointed there; otherwise use the generic complex-queries bucket.
        let subcategory = if rejected.category.eq_ignore_ascii_case(FALLBACK_CATEGORY)
            && self
                .hierarchy
                .resolve(FALLBACK_CATEGORY, rejected.subcategory.as_deref())
                .is_ok()
        {
            rejected.subcategory.clone()
        } else {
            Some(FALLBACK_SUBCATEGORY.to_string())
        };

        let mut result = Classification {
            category: FALLBACK_CATEGORY.to_string(),
            subcategory,
            confidence: rejected.confidence,
            method_used: Method::ThresholdFallback,
            flags: Vec::new(),
            reasoning: format!(
                "best candidate {}/{:?} at {:.2} below threshold {:.2}",
                rejected.category,
                rejected.subcategory,
                rejected.confidence,
                self.config.min_confidence
            ),
        };
        result.add_flag(FLAG_NEEDS_MANUAL_REVIEW);
        result.add_flag(FLAG_LOW_CONFIDENCE);
        self.record_fallback_usage(&result);
        result
    }

    fn record_fallback_usage(&self, result: &Classification) {
        match self
            .hierarchy
            .resolve(&result.category, result.subcategory.as_deref())
        {
            Ok(node) => self.hierarchy.record_usage(node),
            // A hierarchy without the fallback route still gets a result;
            // only the counter update is skipped.
            Err(e) => log::warn!("fallback route missing from hierarchy: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::LabelDef;
    use crate::preprocess::PriorClassification;

    fn hierarchy() -> Arc<LabelHierarchy> {
        Arc::new(
            LabelHierarchy::from_defs(&[
                LabelDef::new("Manual Review", "").with_children(vec![
                    LabelDef::new("Complex Queries", ""),
                    LabelDef::new("Inquiry/Redirection", ""),
                ]),
                LabelDef::new("No Reply", "")
                    .with_children(vec![LabelDef::new("System Notifications", "")]),
                LabelDef::new("Invoices Request", "")
                    .with_children(vec![LabelDef::new("Invoice Copies", "")]),
                LabelDef::new("Payments Claim", "").with_children(vec![
                    LabelDef::new("Payment Details", ""),
                    LabelDef::new("Payment Confirmation", "").with_rules(vec![
                        crate::hierarchy::ValidationRule::RequiresEntity {
                            entity: "payment_proof".to_string(),
                        },
                    ]),
                ]),
            ])
            .unwrap(),
        )
    }

    fn engine() -> RuleEngine {
        RuleEngine::new(hierarchy(), DecisionConfig::default())
    }

    fn pattern(category: &str, sub: &str, confidence: f64) -> Candidate {
        Candidate::new(category, Some(sub.to_string()), confidence, Source::Pattern)
    }

    fn ml(category: &str, sub: &str, confidence: f64) -> Candidate {
        Candidate::new(category, Some(sub.to_string()), confidence, Source::MlZeroShot)
    }

    #[test]
    fn test_empty_pool_degrades_to_manual_review() {
        let engine = engine();
        let result = engine.decide(
            &[],
            &[],
            &NlpFeatures::empty(),
            &ThreadContext::default(),
        );
        assert_eq!(result.category, "Manual Review");
        assert_eq!(result.subcategory.as_deref(), Some("Complex Queries"));
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.method_used, Method::NoCandidateFallback);
        assert!(result.has_flag(FLAG_NEEDS_MANUAL_REVIEW));
    }

    #[test]
    fn test_single_eligible_pattern_candidate_wins() {
        let engine = engine();
        let result = engine.decide(
            &[pattern("Invoices Request", "Invoice Copies", 0.8)],
            &[],
            &NlpFeatures::empty(),
            &ThreadContext::default(),
        );
        assert_eq!(result.category, "Invoices Request");
        assert_eq!(result.subcategory.as_deref(), Some("Invoice Copies"));
        assert_eq!(result.confidence, 0.8);
        assert_eq!(result.method_used, Method::Pattern);
        assert!(result.flags.is_empty());
    }

    #[test]
    fn test_source_priority_breaks_confidence_tie() {
        let engine = engine();
        let result = engine.decide(
            &[pattern("Invoices Request", "Invoice Copies", 0.7)],
            &[ml("No Reply", "System Notifications", 0.7)],
            &NlpFeatures::empty(),
            &ThreadContext::default(),
        );
        assert_eq!(result.category, "Invoices Request");
        assert_eq!(result.method_used, Method::Pattern);
    }

    #[test]
    fn test_keyword_fallback_loses_to_zero_shot_on_tie() {
        let engine = engine();
        let mut keyword = ml("No Reply", "System Notifications", 0.65);
        keyword.source = Source::MlKeywordFallback;
        let result = engine.decide(
            &[],
            &[keyword, ml("Payments Claim", "Payment Details", 0.65)],
            &NlpFeatures::empty(),
            &ThreadContext::default(),
        );
        assert_eq!(result.category, "Payments Claim");
        assert_eq!(result.method_used, Method::MlZeroShot);
    }

    #[test]
    fn test_higher_confidence_wins_across_sources() {
        // threshold 0.6; pattern 0.8 vs ml 0.5 -> pattern result unchanged.
        let engine = engine();
        let result = engine.decide(
            &[pattern("Invoices Request", "Invoice Copies", 0.8)],
            &[ml("No Reply", "System Notifications", 0.5)],
            &NlpFeatures::empty(),
            &ThreadContext::default(),
        );
        assert_eq!(result.category, "Invoices Request");
        assert_eq!(result.subcategory.as_deref(), Some("Invoice Copies"));
        assert_eq!(result.confidence, 0.8);
        assert_eq!(result.method_used, Method::Pattern);
    }

    #[test]
    fn test_below_threshold_routes_to_manual_review() {
        let engine = engine();
        let result = engine.decide(
            &[pattern("Payments Claim", "Payment Details", 0.4)],
            &[],
            &NlpFeatures::empty(),
            &ThreadContext::default(),
        );
        assert_eq!(result.category, "Manual Review");
        assert_eq!(result.subcategory.as_deref(), Some("Complex Queries"));
        assert_eq!(result.confidence, 0.4);
        assert_eq!(result.method_used, Method::ThresholdFallback);
        assert!(result.has_flag(FLAG_NEEDS_MANUAL_REVIEW));
        assert!(result.has_flag(FLAG_LOW_CONFIDENCE));
    }

    #[test]
    fn test_threshold_fallback_keeps_manual_review_subcategory() {
        let engine = engine();
        let result = engine.decide(
            &[pattern("Manual Review", "Inquiry/Redirection", 0.5)],
            &[],
            &NlpFeatures::empty(),
            &ThreadContext::default(),
        );
        assert_eq!(result.category, "Manual Review");
        assert_eq!(result.subcategory.as_deref(), Some("Inquiry/Redirection"));
        assert_eq!(result.method_used, Method::ThresholdFallback);
    }

    #[test]
    fn test_validation_rules_drop_candidates() {
        let engine = engine();
        // Payment Confirmation requires a payment_proof entity; without it
        // the only candidate is ineligible.
        let result = engine.decide(
            &[pattern("Payments Claim", "Payment Confirmation", 0.9)],
            &[],
            &NlpFeatures::empty(),
            &ThreadContext::default(),
        );
        assert_eq!(result.method_used, Method::NoCandidateFallback);

        let mut features = NlpFeatures::empty();
        features.push_entity("payment_proof", "receipt attached");
        let result = engine.decide(
            &[pattern("Payments Claim", "Payment Confirmation", 0.9)],
            &[],
            &features,
            &ThreadContext::default(),
        );
        assert_eq!(result.category, "Payments Claim");
        assert_eq!(result.subcategory.as_deref(), Some("Payment Confirmation"));
    }

    #[test]
    fn test_malformed_candidate_folds_into_fallback() {
        let engine = engine();
        let result = engine.decide(
            &[pattern("Nonexistent Category", "Nope", 0.95)],
            &[],
            &NlpFeatures::empty(),
            &ThreadContext::default(),
        );
        assert_eq!(result.method_used, Method::NoCandidateFallback);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_thread_override_injects_boosted_prior() {
        let engine = engine();
        let thread = ThreadContext {
            in_thread: true,
            thread_count: 1,
            prior: Some(PriorClassification {
                category: "Payments Claim".to_string(),
                subcategory: Some("Payment Details".to_string()),
                confidence: 0.55,
            }),
        };
        // Prior at 0.55 + boost 0.1 = 0.65 beats the 0.6 ml candidate.
        let result = engine.decide(
            &[],
            &[ml("No Reply", "System Notifications", 0.6)],
            &NlpFeatures::empty(),
            &thread,
        );
        assert_eq!(result.category, "Payments Claim");
        assert_eq!(result.method_used, Method::ThreadContext);
        assert!(result.has_flag(FLAG_THREAD_CONTINUATION));
        assert!((result.confidence - 0.65).abs() < 1e-9);
    }

    #[test]
    fn test_thread_override_disabled_by_policy() {
        let hierarchy = hierarchy();
        let engine = RuleEngine::new(
            hierarchy,
            DecisionConfig {
                thread_override_enabled: false,
                ..DecisionConfig::default()
            },
        );
        let thread = ThreadContext {
            in_thread: true,
            thread_count: 1,
            prior: Some(PriorClassification {
                category: "Payments Claim".to_string(),
                subcategory: Some("Payment Details".to_string()),
                confidence: 0.9,
            }),
        };
        let result = engine.decide(
            &[],
            &[ml("No Reply", "System Notifications", 0.7)],
            &NlpFeatures::empty(),
            &thread,
        );
        assert_eq!(result.category, "No Reply");
    }

    #[test]
    fn test_usage_counters_updated_on_every_decision() {
        let hierarchy = hierarchy();
        let engine = RuleEngine::new(Arc::clone(&hierarchy), DecisionConfig::default());

        engine.decide(
            &[pattern("Invoices Request", "Invoice Copies", 0.8)],
            &[],
            &NlpFeatures::empty(),
            &ThreadContext::default(),
        );
        engine.decide(&[], &[], &NlpFeatures::empty(), &ThreadContext::default());

        let stats = hierarchy.stats();
        assert_eq!(stats["Invoice Copies"], 1);
        assert_eq!(stats["Invoices Request"], 1);
        // Fallback decisions are counted too.
        assert_eq!(stats["Complex Queries"], 1);
        assert_eq!(stats["Manual Review"], 1);
    }

    #[test]
    fn test_pattern_priority_breaks_full_tie() {
        let engine = engine();
        let mut low = pattern("No Reply", "System Notifications", 0.7);
        low.priority = 1;
        let mut high = pattern("Invoices Request", "Invoice Copies", 0.7);
        high.priority = 9;
        let result = engine.decide(
            &[low, high],
            &[],
            &NlpFeatures::empty(),
            &ThreadContext::default(),
        );
        assert_eq!(result.category, "Invoices Request");
    }
}
