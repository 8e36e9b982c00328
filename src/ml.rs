//! ML collaborator boundary. The zero-shot model lives outside this crate
//! behind the `MlClassifier` trait; the shipped implementation is the
//! keyword-scoring fallback that stands in when no model is wired up.
//! Returning no candidates is a valid answer meaning "no confident signal".

use std::collections::HashMap;

use crate::candidate::{Candidate, Source};

pub trait MlClassifier: Send + Sync {
    /// Propose zero or more confidence-scored classifications for the
    /// cleaned email text, best first.
    fn classify(&self, text: &str) -> Vec<Candidate>;
}

/// Keyword-weighted category scorer. Longer phrases weigh more; the best
/// scoring category is emitted as a single low-to-medium confidence
/// candidate with source `ml-keyword-fallback`.
pub struct KeywordClassifier {
    category_keywords: Vec<(String, Vec<&'static str>)>,
    subcategory_keywords: HashMap<&'static str, Vec<(&'static str, Vec<&'static str>)>>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordClassifier {
    pub fn new() -> Self {
        let category_keywords = vec![
            (
                "Manual Review".to_string(),
                vec![
                    "dispute", "contested", "disagreement", "refuse payment", "proof of payment",
                    "invoice attached", "import failed", "missing field", "out of business",
                    "bankruptcy", "attorney", "legal counsel", "please advise",
                ],
            ),
            (
                "Payments Claim".to_string(),
                vec![
                    "already paid", "payment was made", "check sent", "we paid", "settled",
                    "payment sent", "paid in full", "payment completed", "remitted",
                ],
            ),
            (
                "Invoices Request".to_string(),
                vec![
                    "send invoice", "need invoice", "provide invoice", "invoice copy",
                    "copies of invoices", "outstanding invoices",
                ],
            ),
            (
                "Auto Reply".to_string(),
                vec![
                    "out of office", "automatic reply", "auto-reply", "on vacation", "on leave",
                    "away from desk", "limited access to email",
                ],
            ),
            (
                "No Reply".to_string(),
                vec![
                    "ticket created", "case opened", "case resolved", "do not reply",
                    "unsubscribe", "delivery failure", "cannot be processed",
                    "system notification",
                ],
            ),
        ];

        let mut subcategory_keywords: HashMap<&'static str, Vec<(&'static str, Vec<&'static str>)>> =
            HashMap::new();
        subcategory_keywords.insert(
            "Manual Review",
            vec![
                ("Partial/Disputed Payment", vec!["dispute", "contested", "disagreement", "refuse"]),
                ("Invoice Receipt", vec!["invoice attached", "invoice copy attached"]),
                ("External Submission", vec!["import failed", "submission failed", "invoice issue"]),
                ("Invoice Errors", vec!["missing field", "format mismatch", "incomplete invoice"]),
                ("Closure + Payment Due", vec!["closed", "closure"]),
                ("Inquiry/Redirection", vec!["please advise", "redirect", "contact instead"]),
            ],
        );
        subcategory_keywords.insert(
            "Payments Claim",
            vec![
                ("Payment Confirmation", vec!["proof of payment", "payment confirmation", "check number", "eft#"]),
                ("Payment Details", vec!["payment details", "remittance info", "payment breakdown", "will be mailed"]),
                ("Claims Paid (No Info)", vec!["already paid", "was paid", "we paid", "settled"]),
            ],
        );
        subcategory_keywords.insert(
            "Auto Reply",
            vec![
                ("With Alternate Contact", vec!["please contact", "reach out to", "if urgent"]),
                ("Return Date Specified", vec!["return on", "back on", "out until"]),
                ("Out of Office", vec!["out of office", "automatic reply", "on vacation"]),
            ],
        );
        subcategory_keywords.insert(
            "No Reply",
            vec![
                ("Ticket Created", vec!["ticket created", "case opened", "case number is"]),
                ("Ticket Resolved", vec!["resolved", "case closed"]),
                ("Processing Errors", vec!["cannot be processed", "delivery failure", "failed to process"]),
                ("System Notifications", vec!["do not reply", "system notification", "unsubscribe"]),
            ],
        );
        subcategory_keywords.insert(
            "Invoices Request",
            vec![("Invoice Copies", vec!["invoice"])],
        );

        Self {
            category_keywords,
            subcategory_keywords,
        }
    }

    fn score(text: &str, keywords: &[&str]) -> usize {
        keywords
            .iter()
            .filter(|k| text.contains(*k))
            // Multi-word phrases are stronger evidence than single words.
            .map(|k| k.split_whitespace().count())
            .sum()
    }

    fn pick_subcategory(&self, category: &str, text: &str) -> Option<String> {
        let options = self.subcategory_keywords.get(category)?;
        // No keyword evidence for a specific subcategory leaves the vote at
        // category level; the subcategory stays open.
        options
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
            .map(|(name, _)| name.to_string())
    }
}

impl MlClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Vec<Candidate> {
        let lower = text.to_lowercase();
        if lower.trim().is_empty() {
            return Vec::new();
        }

        let best = self
            .category_keywords
            .iter()
            .map(|(category, keywords)| (category, Self::score(&lower, keywords)))
            .max_by_key(|(_, score)| *score);

        let Some((category, score)) = best else {
            return Vec::new();
        };
        if score == 0 {
            return Vec::new();
        }

        // Keyword evidence is deliberately capped well below pattern-rule
        // confidence so it only decides when nothing stronger matched.
        let confidence = (0.4 + 0.08 * score as f64).min(0.72);
        let mut candidate = Candidate::new(
            category.clone(),
            self.pick_subcategory(category, &lower),
            confidence,
            Source::MlKeywordFallback,
        );
        candidate.reason = format!("keyword score {score}");
        log::debug!(
            "keyword classifier: {} ({:.2}) from score {score}",
            candidate.category,
            confidence
        );
        vec![candidate]
    }
}
