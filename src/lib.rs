pub mod candidate;
pub mod classifier;
pub mod config;
pub mod hierarchy;
pub mod ml;
pub mod nlp;
pub mod patterns;
pub mod preprocess;
pub mod rules;

pub use candidate::{Candidate, Classification, Method, Source};
pub use classifier::{EmailClassification, EmailClassifier};
pub use config::Config;
pub use hierarchy::{HierarchyError, LabelHierarchy};
pub use ml::{KeywordClassifier, MlClassifier};
pub use nlp::{FeatureExtractor, NlpFeatures};
pub use patterns::PatternEngine;
pub use preprocess::{Preprocessor, PriorClassification, ThreadContext};
pub use rules::{DecisionConfig, RuleEngine};
