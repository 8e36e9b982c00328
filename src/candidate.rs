use serde::{Deserialize, Serialize};

/// Where a classification proposal came from. Ordering matters: when two
/// candidates tie on confidence, the higher-ranked source wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "pattern")]
    Pattern,
    #[serde(rename = "thread-context")]
    ThreadContext,
    #[serde(rename = "ml-zero-shot")]
    MlZeroShot,
    #[serde(rename = "ml-keyword-fallback")]
    MlKeywordFallback,
}

impl Source {
    /// Tie-break rank. Pattern beats the thread-continuity override, which
    /// beats model output, which beats the keyword heuristic.
    pub fn rank(&self) -> u8 {
        match self {
            Source::Pattern => 3,
            Source::ThreadContext => 2,
            Source::MlZeroShot => 1,
            Source::MlKeywordFallback => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Pattern => "pattern",
            Source::ThreadContext => "thread-context",
            Source::MlZeroShot => "ml-zero-shot",
            Source::MlKeywordFallback => "ml-keyword-fallback",
        }
    }
}

/// A proposed classification from one signal source, not yet reconciled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub category: String,
    pub subcategory: Option<String>,
    pub confidence: f64,
    pub source: Source,
    /// Pattern-rule priority; zero for non-pattern sources.
    #[serde(default)]
    pub priority: i32,
    /// Name of the rule or signal that produced this candidate.
    #[serde(default)]
    pub reason: String,
}

impl Candidate {
    pub fn new(
        category: impl Into<String>,
        subcategory: Option<String>,
        confidence: f64,
        source: Source,
    ) -> Self {
        Self {
            category: category.into(),
            subcategory,
            confidence,
            source,
            priority: 0,
            reason: String::new(),
        }
    }
}

/// How the final decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "pattern")]
    Pattern,
    #[serde(rename = "thread-context")]
    ThreadContext,
    #[serde(rename = "ml-zero-shot")]
    MlZeroShot,
    #[serde(rename = "ml-keyword-fallback")]
    MlKeywordFallback,
    #[serde(rename = "threshold-fallback")]
    ThresholdFallback,
    #[serde(rename = "no-candidate-fallback")]
    NoCandidateFallback,
}

impl Method {
    pub fn from_source(source: Source) -> Self {
        match source {
            Source::Pattern => Method::Pattern,
            Source::ThreadContext => Method::ThreadContext,
            Source::MlZeroShot => Method::MlZeroShot,
            Source::MlKeywordFallback => Method::MlKeywordFallback,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Pattern => "pattern",
            Method::ThreadContext => "thread-context",
            Method::MlZeroShot => "ml-zero-shot",
            Method::MlKeywordFallback => "ml-keyword-fallback",
            Method::ThresholdFallback => "threshold-fallback",
            Method::NoCandidateFallback => "no-candidate-fallback",
        }
    }
}

pub const FLAG_NEEDS_MANUAL_REVIEW: &str = "needs_manual_review";
pub const FLAG_LOW_CONFIDENCE: &str = "low_confidence";
pub const FLAG_THREAD_CONTINUATION: &str = "thread_continuation";

/// Final reconciled decision for one email. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub subcategory: Option<String>,
    pub confidence: f64,
    pub method_used: Method,
    pub flags: Vec<String>,
    /// Human-readable explanation of why this decision was made.
    pub reasoning: String,
}

impl Classification {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    pub fn add_flag(&mut self, flag: &str) {
        if !self.has_flag(flag) {
            self.flags.push(flag.to_string());
        }
    }
}
