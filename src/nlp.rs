//! Lightweight NLP feature extraction for the rule engine.
//!
//! Everything here is regex- and lexicon-driven: entities (amounts, invoice
//! and account numbers, payment-proof references), urgency, a coarse
//! sentiment score, topics and financial terms. The rule engine and the
//! hierarchy validation rules consume the resulting feature bag read-only.

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub kind: String,
    pub value: String,
}

/// Feature bag consumed by hierarchy validation rules and the rule engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NlpFeatures {
    pub entities: Vec<Entity>,
    pub key_phrases: Vec<String>,
    pub topics: Vec<String>,
    /// 0.0 (calm) to 1.0 (urgent).
    pub urgency: f64,
    /// -1.0 (hostile) to 1.0 (friendly).
    pub sentiment: f64,
    pub financial_terms: Vec<String>,
    pub action_required: bool,
    /// 0.0 (trivial) to 1.0 (long, multi-topic).
    pub complexity: f64,
}

impl NlpFeatures {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_entity(&self, kind: &str) -> bool {
        self.entities.iter().any(|e| e.kind == kind)
    }

    pub fn entities_of(&self, kind: &str) -> Vec<&str> {
        self.entities
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.value.as_str())
            .collect()
    }

    pub fn push_entity(&mut self, kind: &str, value: &str) {
        self.entities.push(Entity {
            kind: kind.to_string(),
            value: value.to_string(),
        });
    }
}

struct EntityPattern {
    kind: &'static str,
    regex: Regex,
}

pub struct FeatureExtractor {
    entity_patterns: Vec<EntityPattern>,
    urgency_terms: Vec<&'static str>,
    negative_terms: Vec<&'static str>,
    positive_terms: Vec<&'static str>,
    financial_terms: Vec<&'static str>,
    action_terms: Vec<&'static str>,
    topic_terms: Vec<(&'static str, Vec<&'static str>)>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor {
    pub fn new() -> Self {
        let entity = |kind: &'static str, pattern: &str| EntityPattern {
            kind,
            // Patterns are static and known-good; a bad one is a programming
            // error, caught by the construction test below.
            regex: Regex::new(pattern).unwrap(),
        };

        Self {
            entity_patterns: vec![
                entity("email", r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b"),
                entity("phone", r"\b\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b"),
                entity("amount", r"\$[\d,]+\.?\d{0,2}"),
                entity("date", r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b"),
                entity("invoice_number", r"(?i)(?:invoice|inv)\s*#?\s*([a-z0-9-]{3,})"),
                entity("account_number", r"(?i)(?:account|acct)\s*#?\s*([a-z0-9-]{4,})"),
                entity("transaction_id", r"(?i)(?:payment|ach|transaction|batch)\s+(?:id|number)s?\s*[:#]?\s*([a-z0-9]+)"),
                entity("check_number", r"(?i)check\s*(?:#|number)\s*(\d{2,})"),
                entity(
                    "payment_proof",
                    r"(?i)(?:receipt|proof|confirmation|remittance|eft)\s*(?:#|of payment|attached|included|enclosed)?",
                ),
                entity("attachment_ref", r"(?i)\b(?:attached|attachment|enclosed|see attached)\b"),
            ],
            urgency_terms: vec![
                "urgent", "immediately", "asap", "as soon as possible", "right away",
                "time sensitive", "final notice", "deadline", "overdue", "past due",
                "escalate", "legal action",
            ],
            negative_terms: vec![
                "dispute", "refuse", "scam", "harassment", "incorrect", "error",
                "wrong", "not our responsibility", "do not owe", "cease and desist",
                "bogus", "complaint", "frustrated",
            ],
            positive_terms: vec![
                "thank you", "thanks", "appreciate", "glad", "happy to", "resolved",
                "confirmed", "great",
            ],
            financial_terms: vec![
                "invoice", "payment", "balance", "remittance", "check", "wire",
                "ach", "credit card", "statement", "billing", "refund", "settlement",
                "account", "outstanding", "past due",
            ],
            action_terms: vec![
                "please send", "please provide", "please advise", "need", "require",
                "request", "can you", "could you", "let us know", "respond",
            ],
            topic_terms: vec![
                ("payment", vec!["paid", "payment", "check", "wire", "remit", "settled"]),
                ("invoice", vec!["invoice", "bill", "statement", "po number"]),
                ("dispute", vec!["dispute", "contested", "disagree", "refuse", "not ours"]),
                ("closure", vec!["closed", "bankruptcy", "out of business", "ceased operations"]),
                ("out_of_office", vec!["out of office", "auto-reply", "automatic reply", "on vacation", "on leave"]),
                ("support", vec!["ticket", "case number", "support request", "help desk"]),
            ],
        }
    }

    /// Extract the full feature bag from cleaned email text. Never fails;
    /// empty or trivial input yields an empty bag.
    pub fn analyze(&self, text: &str) -> NlpFeatures {
        if text.trim().len() < 5 {
            return NlpFeatures::empty();
        }
        let lower = text.to_lowercase();

        let mut features = NlpFeatures::empty();
        for ep in &self.entity_patterns {
            // Cap per-kind matches so a pathological email cannot balloon the bag.
            for m in ep.regex.find_iter(text).take(10) {
                features.push_entity(ep.kind, m.as_str().trim());
            }
        }

        for (topic, terms) in &self.topic_terms {
            if terms.iter().any(|t| lower.contains(t)) {
                features.topics.push(topic.to_string());
            }
        }

        features.financial_terms = self
            .financial_terms
            .iter()
            .filter(|t| lower.contains(*t))
            .map(|t| t.to_string())
            .collect();

        features.urgency = self.ratio_score(&lower, &self.urgency_terms, 3.0);
        features.sentiment = self.sentiment(&lower);
        features.action_required = self.action_terms.iter().any(|t| lower.contains(t));
        features.complexity = self.complexity(&lower, &features);
        features.key_phrases = self.key_phrases(&lower);

        log::debug!(
            "NLP features: {} entities, urgency {:.2}, sentiment {:.2}, topics {:?}",
            features.entities.len(),
            features.urgency,
            features.sentiment,
            features.topics
        );
        features
    }

    fn ratio_score(&self, text: &str, terms: &[&str], saturation: f64) -> f64 {
        let hits = terms.iter().filter(|t| text.contains(*t)).count() as f64;
        (hits / saturation).min(1.0)
    }

    fn sentiment(&self, text: &str) -> f64 {
        let neg = self.negative_terms.iter().filter(|t| text.contains(*t)).count() as f64;
        let pos = self.positive_terms.iter().filter(|t| text.contains(*t)).count() as f64;
        if neg + pos == 0.0 {
            0.0
        } else {
            ((pos - neg) / (pos + neg)).clamp(-1.0, 1.0)
        }
    }

    fn complexity(&self, text: &str, features: &NlpFeatures) -> f64 {
        let words = text.split_whitespace().count() as f64;
        let length_part = (words / 400.0).min(0.6);
        let topic_part = (features.topics.len() as f64 * 0.15).min(0.4);
        (length_part + topic_part).min(1.0)
    }

    fn key_phrases(&self, text: &str) -> Vec<String> {
        // Sentences that carry a financial term, most informative first.
        text.split(['.', '\n'])
            .map(str::trim)
            .filter(|s| s.len() > 15 && s.len() < 200)
            .filter(|s| self.financial_terms.iter().any(|t| s.contains(t)))
            .take(5)
            .map(|s| s.to_string())
            .collect()
    }
}
