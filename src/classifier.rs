//! Orchestrator: sequences preprocessing, NLP feature extraction, ML
//! inference and pattern matching, then hands everything to the rule engine
//! for the final decision. Owns the process-wide label hierarchy; everything
//! else is per-call state.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::candidate::Classification;
use crate::config::Config;
use crate::hierarchy::LabelHierarchy;
use crate::ml::{KeywordClassifier, MlClassifier};
use crate::nlp::FeatureExtractor;
use crate::patterns::PatternEngine;
use crate::preprocess::{Preprocessor, PriorClassification};
use crate::rules::RuleEngine;

/// Caller-facing classification of one email.
#[derive(Debug, Clone, Serialize)]
pub struct EmailClassification {
    #[serde(flatten)]
    pub result: Classification,
    pub in_thread: bool,
    pub processing_time_ms: u64,
}

pub struct EmailClassifier {
    preprocessor: Preprocessor,
    extractor: FeatureExtractor,
    patterns: PatternEngine,
    ml: Box<dyn MlClassifier>,
    rules: RuleEngine,
    hierarchy: Arc<LabelHierarchy>,
}

impl EmailClassifier {
    /// Build the full pipeline from configuration. Fails only on the fatal
    /// configuration errors (hierarchy integrity, unresolvable pattern
    /// targets, malformed regexes).
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let (hierarchy, patterns) = config.build()?;
        let rules = RuleEngine::new(Arc::clone(&hierarchy), config.decision_config());
        log::info!(
            "classifier ready: {} labels, {} pattern rules, threshold {:.2}",
            hierarchy.label_count(),
            patterns.rule_count(),
            config.min_confidence
        );
        Ok(Self {
            preprocessor: Preprocessor::new(),
            extractor: FeatureExtractor::new(),
            patterns,
            ml: Box::new(KeywordClassifier::new()),
            rules,
            hierarchy,
        })
    }

    /// Replace the ML collaborator (e.g. with a real zero-shot model client).
    pub fn with_ml_classifier(mut self, ml: Box<dyn MlClassifier>) -> Self {
        self.ml = ml;
        self
    }

    pub fn classify(&self, subject: &str, body: &str) -> EmailClassification {
        self.classify_with_prior(subject, body, None)
    }

    /// Classify one email, optionally carrying the prior classification of
    /// an earlier message in the same thread.
    pub fn classify_with_prior(
        &self,
        subject: &str,
        body: &str,
        prior: Option<PriorClassification>,
    ) -> EmailClassification {
        let start = Instant::now();

        let mut cleaned = self.preprocessor.preprocess(subject, body);
        cleaned.thread.prior = prior;

        // Subject often carries the decisive phrase ("Automatic reply: ...").
        let match_text = format!("{}\n{}", cleaned.subject, cleaned.text);

        let features = self.extractor.analyze(&cleaned.text);
        let pattern_candidates = self.patterns.match_text(&match_text);
        let ml_candidates = self.ml.classify(&match_text);

        let result = self.rules.decide(
            &pattern_candidates,
            &ml_candidates,
            &features,
            &cleaned.thread,
        );

        let elapsed = start.elapsed().as_millis() as u64;
        log::info!(
            "classified as {}/{:?} ({:.2}, {}) in {elapsed}ms",
            result.category,
            result.subcategory,
            result.confidence,
            result.method_used.as_str()
        );

        EmailClassification {
            result,
            in_thread: cleaned.thread.in_thread,
            processing_time_ms: elapsed,
        }
    }

    pub fn hierarchy(&self) -> &Arc<LabelHierarchy> {
        &self.hierarchy
    }

    /// Usage-count snapshot across all labels.
    pub fn stats(&self) -> HashMap<String, u64> {
        self.hierarchy.stats()
    }
}
