//! Label hierarchy: the immutable category tree shared by every
//! classification call, plus per-node usage counters.
//!
//! The tree is built once from the declarative configuration at startup and
//! never mutated afterwards; only the usage counters change at runtime, and
//! those are atomics so concurrent classifications never take a lock.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::nlp::NlpFeatures;
use crate::preprocess::ThreadContext;

/// Fatal configuration-time errors. Classification itself never raises;
/// these only surface while loading the hierarchy or resolving rule targets
/// against it, and they abort startup.
#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("unknown category: {category:?} / {subcategory:?}")]
    UnknownCategory {
        category: String,
        subcategory: Option<String>,
    },
    #[error("duplicate label name in hierarchy: {0}")]
    DuplicateName(String),
    #[error("hierarchy defines no categories")]
    Empty,
}

/// Declarative node definition, as it appears in the YAML config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Predicates a candidate must satisfy to be assigned this node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<ValidationRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<LabelDef>,
}

impl LabelDef {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            rules: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<LabelDef>) -> Self {
        self.children = children;
        self
    }

    pub fn with_rules(mut self, rules: Vec<ValidationRule>) -> Self {
        self.rules = rules;
        self
    }
}

/// Predicate attached to a hierarchy node. A candidate classification must
/// pass every rule on the node and on all of its ancestors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ValidationRule {
    /// Requires an extracted entity of the given kind (e.g. "amount",
    /// "payment_proof", "transaction_id").
    RequiresEntity { entity: String },
    /// Rejects the node when an entity of the given kind is present.
    ForbidsEntity { entity: String },
    /// Requires the urgency score to be at least `min`.
    MinUrgency { min: f64 },
    /// Requires at least one detected financial term.
    RequiresFinancialTerm,
    /// Requires the email to be part of an existing thread.
    RequiresThread,
}

impl ValidationRule {
    fn passes(&self, features: &NlpFeatures, thread: &ThreadContext) -> bool {
        match self {
            ValidationRule::RequiresEntity { entity } => features.has_entity(entity),
            ValidationRule::ForbidsEntity { entity } => !features.has_entity(entity),
            ValidationRule::MinUrgency { min } => features.urgency >= *min,
            ValidationRule::RequiresFinancialTerm => !features.financial_terms.is_empty(),
            ValidationRule::RequiresThread => thread.in_thread,
        }
    }
}

/// Opaque handle to a node in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

struct Node {
    name: String,
    parent: Option<usize>,
    children: Vec<usize>,
    rules: Vec<ValidationRule>,
    usage: AtomicU64,
}

/// The process-wide category tree. Structure is immutable after load; usage
/// counters are atomic and safe to bump from concurrent classifications.
pub struct LabelHierarchy {
    nodes: Vec<Node>,
    roots: Vec<usize>,
    /// Lowercased name -> node index. Names are unique across the whole
    /// tree, so a bare name addresses exactly one node.
    index: HashMap<String, usize>,
}

impl LabelHierarchy {
    /// Build the tree from its declarative definition, enforcing the
    /// integrity invariants (non-empty, globally unique names).
    pub fn from_defs(defs: &[LabelDef]) -> Result<Self, HierarchyError> {
        if defs.is_empty() {
            return Err(HierarchyError::Empty);
        }

        let mut hierarchy = LabelHierarchy {
            nodes: Vec::new(),
            roots: Vec::new(),
            index: HashMap::new(),
        };

        for def in defs {
            let root = hierarchy.insert(def, None)?;
            hierarchy.roots.push(root);
        }

        log::info!(
            "Label hierarchy loaded: {} categories, {} labels total",
            hierarchy.roots.len(),
            hierarchy.nodes.len()
        );
        Ok(hierarchy)
    }

    fn insert(&mut self, def: &LabelDef, parent: Option<usize>) -> Result<usize, HierarchyError> {
        let key = def.name.to_lowercase();
        if self.index.contains_key(&key) {
            return Err(HierarchyError::DuplicateName(def.name.clone()));
        }

        let id = self.nodes.len();
        self.nodes.push(Node {
            name: def.name.clone(),
            parent,
            children: Vec::new(),
            rules: def.rules.clone(),
            usage: AtomicU64::new(0),
        });
        self.index.insert(key, id);

        for child in &def.children {
            let child_id = self.insert(child, Some(id))?;
            self.nodes[id].children.push(child_id);
        }
        Ok(id)
    }

    /// Look up a node by (category, subcategory) name pair. Matching is
    /// case-insensitive on names; the category must be a top-level node and
    /// the subcategory, when given, a descendant of it.
    pub fn resolve(
        &self,
        category: &str,
        subcategory: Option<&str>,
    ) -> Result<NodeId, HierarchyError> {
        let unknown = || HierarchyError::UnknownCategory {
            category: category.to_string(),
            subcategory: subcategory.map(|s| s.to_string()),
        };

        let cat_id = *self.index.get(&category.to_lowercase()).ok_or_else(unknown)?;
        if !self.roots.contains(&cat_id) {
            return Err(unknown());
        }

        let Some(sub) = subcategory else {
            return Ok(NodeId(cat_id));
        };

        let sub_id = *self.index.get(&sub.to_lowercase()).ok_or_else(unknown)?;
        if self.ancestors(sub_id).any(|a| a == cat_id) {
            Ok(NodeId(sub_id))
        } else {
            Err(unknown())
        }
    }

    /// Evaluate the validation rules on `node` and all of its ancestors
    /// against the supplied feature bag. True only if every rule passes.
    pub fn validate(&self, node: NodeId, features: &NlpFeatures, thread: &ThreadContext) -> bool {
        let mut current = Some(node.0);
        while let Some(id) = current {
            let n = &self.nodes[id];
            if !n.rules.iter().all(|r| r.passes(features, thread)) {
                return false;
            }
            current = n.parent;
        }
        true
    }

    /// Increment the usage counter on `node` and every ancestor up to its
    /// root, so category-level stats aggregate subcategory volume. Safe to
    /// call from concurrent classifications.
    pub fn record_usage(&self, node: NodeId) {
        let mut current = Some(node.0);
        while let Some(id) = current {
            let n = &self.nodes[id];
            n.usage.fetch_add(1, Ordering::Relaxed);
            current = n.parent;
        }
    }

    /// Snapshot of usage counts by label name. Does not block concurrent
    /// increments; counts read are at-least-as-old-as the call.
    pub fn stats(&self) -> HashMap<String, u64> {
        self.nodes
            .iter()
            .map(|n| (n.name.clone(), n.usage.load(Ordering::Relaxed)))
            .collect()
    }

    pub fn name(&self, node: NodeId) -> &str {
        &self.nodes[node.0].name
    }

    pub fn usage(&self, node: NodeId) -> u64 {
        self.nodes[node.0].usage.load(Ordering::Relaxed)
    }

    /// Names of the top-level categories, in definition order.
    pub fn categories(&self) -> Vec<&str> {
        self.roots.iter().map(|&id| self.nodes[id].name.as_str()).collect()
    }

    /// Direct children names of a label, in definition order.
    pub fn sublabels(&self, name: &str) -> Vec<&str> {
        match self.index.get(&name.to_lowercase()) {
            Some(&id) => self.nodes[id]
                .children
                .iter()
                .map(|&c| self.nodes[c].name.as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn label_count(&self) -> usize {
        self.nodes.len()
    }

    fn ancestors(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.nodes[id].parent, move |&p| self.nodes[p].parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn small_hierarchy() -> LabelHierarchy {
        let defs = vec![
            LabelDef::new("Manual Review", "Needs a human").with_children(vec![
                LabelDef::new("Complex Queries", "Multiple topics"),
                LabelDef::new("Payment Confirmation", "Proof provided").with_rules(vec![
                    ValidationRule::RequiresEntity {
                        entity: "payment_proof".to_string(),
                    },
                ]),
            ]),
            LabelDef::new("No Reply", "System mail")
                .with_children(vec![LabelDef::new("System Notifications", "Alerts")]),
        ];
        LabelHierarchy::from_defs(&defs).unwrap()
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let h = small_hierarchy();
        let node = h.resolve("manual review", Some("COMPLEX QUERIES")).unwrap();
        assert_eq!(h.name(node), "Complex Queries");
    }

    #[test]
    fn test_resolve_rejects_unknown_and_mismatched_pairs() {
        let h = small_hierarchy();
        assert!(matches!(
            h.resolve("Invoices", None),
            Err(HierarchyError::UnknownCategory { .. })
        ));
        // Valid names, but System Notifications is not under Manual Review.
        assert!(h
            .resolve("Manual Review", Some("System Notifications"))
            .is_err());
        // Subcategory names do not work as categories.
        assert!(h.resolve("Complex Queries", None).is_err());
    }

    #[test]
    fn test_duplicate_names_are_fatal() {
        let defs = vec![
            LabelDef::new("Manual Review", ""),
            LabelDef::new("No Reply", "")
                .with_children(vec![LabelDef::new("Manual Review", "dup")]),
        ];
        assert!(matches!(
            LabelHierarchy::from_defs(&defs),
            Err(HierarchyError::DuplicateName(_))
        ));
    }

    #[test]
    fn test_empty_hierarchy_is_fatal() {
        assert!(matches!(
            LabelHierarchy::from_defs(&[]),
            Err(HierarchyError::Empty)
        ));
    }

    #[test]
    fn test_validate_walks_ancestors_and_is_deterministic() {
        let h = small_hierarchy();
        let node = h.resolve("Manual Review", Some("Payment Confirmation")).unwrap();
        let thread = ThreadContext::default();

        let empty = NlpFeatures::empty();
        for _ in 0..3 {
            assert!(!h.validate(node, &empty, &thread));
        }

        let mut with_proof = NlpFeatures::empty();
        with_proof.push_entity("payment_proof", "receipt attached");
        assert!(h.validate(node, &with_proof, &thread));

        // Unconstrained node always validates against an empty feature bag.
        let plain = h.resolve("Manual Review", Some("Complex Queries")).unwrap();
        assert!(h.validate(plain, &empty, &thread));
    }

    #[test]
    fn test_record_usage_increments_ancestors() {
        let h = small_hierarchy();
        let node = h.resolve("No Reply", Some("System Notifications")).unwrap();
        h.record_usage(node);
        h.record_usage(node);

        let stats = h.stats();
        assert_eq!(stats["System Notifications"], 2);
        assert_eq!(stats["No Reply"], 2);
        assert_eq!(stats["Manual Review"], 0);
    }

    #[test]
    fn test_concurrent_record_usage_loses_no_updates() {
        let h = Arc::new(small_hierarchy());
        let node = h.resolve("Manual Review", Some("Complex Queries")).unwrap();

        let threads = 8;
        let per_thread = 500;
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let h = Arc::clone(&h);
                std::thread::spawn(move || {
                    for _ in 0..per_thread {
                        h.record_usage(node);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let expected = (threads * per_thread) as u64;
        assert_eq!(h.usage(node), expected);
        let stats = h.stats();
        assert_eq!(stats["Manual Review"], expected);
    }

    #[test]
    fn test_sublabels_preserve_definition_order() {
        let h = small_hierarchy();
        assert_eq!(
            h.sublabels("Manual Review"),
            vec!["Complex Queries", "Payment Confirmation"]
        );
        assert_eq!(h.categories(), vec!["Manual Review", "No Reply"]);
    }
}
