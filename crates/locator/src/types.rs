//! Core types for the selector system

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uipilot_ui_tree::{NodeId, UiNode};

/// How a text-like criterion compares against the node attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    Substring,
}

impl MatchMode {
    pub fn name(&self) -> &'static str {
        match self {
            MatchMode::Exact => "exact",
            MatchMode::Substring => "substring",
        }
    }
}

/// Criterion kind, in the resolver's fixed evaluation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionKind {
    ResourceId,
    Text,
    ContentDesc,
    ClassName,
    Index,
}

impl CriterionKind {
    pub fn name(&self) -> &'static str {
        match self {
            CriterionKind::ResourceId => "resource_id",
            CriterionKind::Text => "text",
            CriterionKind::ContentDesc => "content_desc",
            CriterionKind::ClassName => "class_name",
            CriterionKind::Index => "index",
        }
    }
}

/// One match criterion. The set of kinds is closed; evaluation dispatches
/// exhaustively rather than probing attributes at runtime.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Criterion {
    ResourceId { value: String, mode: MatchMode },
    Text { value: String, mode: MatchMode },
    ContentDesc { value: String, mode: MatchMode },
    ClassName { value: String, mode: MatchMode },
    Index { value: usize },
}

impl Criterion {
    pub fn kind(&self) -> CriterionKind {
        match self {
            Criterion::ResourceId { .. } => CriterionKind::ResourceId,
            Criterion::Text { .. } => CriterionKind::Text,
            Criterion::ContentDesc { .. } => CriterionKind::ContentDesc,
            Criterion::ClassName { .. } => CriterionKind::ClassName,
            Criterion::Index { .. } => CriterionKind::Index,
        }
    }

    /// Canonical rendition used for signatures, independent of the order
    /// the caller supplied criteria in. Values have the join delimiter
    /// escaped so no value can forge another criteria set.
    pub(crate) fn canonical_key(&self) -> String {
        match self {
            Criterion::ResourceId { value, mode }
            | Criterion::Text { value, mode }
            | Criterion::ContentDesc { value, mode }
            | Criterion::ClassName { value, mode } => {
                format!("{}:{}:{}", self.kind().name(), mode.name(), escape(value))
            }
            Criterion::Index { value } => format!("index:{}", value),
        }
    }
}

/// A set of match criteria describing an intended UI element.
///
/// Criteria are unordered for equality and signature purposes; the
/// resolver applies its own fixed evaluation order. An empty selector is
/// rejected before traversal.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SelectorSpec {
    criteria: Vec<Criterion>,
}

impl SelectorSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource_id(self, value: impl Into<String>, mode: MatchMode) -> Self {
        self.with(Criterion::ResourceId {
            value: value.into(),
            mode,
        })
    }

    pub fn with_text(self, value: impl Into<String>, mode: MatchMode) -> Self {
        self.with(Criterion::Text {
            value: value.into(),
            mode,
        })
    }

    pub fn with_content_desc(self, value: impl Into<String>, mode: MatchMode) -> Self {
        self.with(Criterion::ContentDesc {
            value: value.into(),
            mode,
        })
    }

    pub fn with_class_name(self, value: impl Into<String>, mode: MatchMode) -> Self {
        self.with(Criterion::ClassName {
            value: value.into(),
            mode,
        })
    }

    pub fn with_index(self, value: usize) -> Self {
        self.with(Criterion::Index { value })
    }

    pub fn with(mut self, criterion: Criterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Criteria normalized to the fixed field order, deduplicated.
    pub(crate) fn normalized(&self) -> Vec<Criterion> {
        let mut out = self.criteria.clone();
        out.sort();
        out.dedup();
        out
    }

    /// Canonical string over the normalized criteria set. Two selectors
    /// with identical criteria always render identically, regardless of
    /// supplied order.
    pub fn canonical_string(&self) -> String {
        let keys: Vec<String> = self.normalized().iter().map(|c| c.canonical_key()).collect();
        keys.join("|")
    }

    /// Deterministic, order-independent signature of the criteria set.
    pub fn signature(&self) -> Signature {
        Signature::of(&self.canonical_string())
    }

    /// The selector that canonically describes `node`: exact criteria
    /// built from its own non-empty identifying attributes. This is what
    /// auto-learning persists, and what the confidence tie-break looks up
    /// per candidate.
    pub fn describing(node: &UiNode) -> Self {
        let mut spec = Self::new();
        if !node.resource_id.is_empty() {
            spec = spec.with_resource_id(&node.resource_id, MatchMode::Exact);
        }
        if !node.text.is_empty() {
            spec = spec.with_text(&node.text, MatchMode::Exact);
        }
        if !node.content_desc.is_empty() {
            spec = spec.with_content_desc(&node.content_desc, MatchMode::Exact);
        }
        if !node.class_name.is_empty() {
            spec = spec.with_class_name(&node.class_name, MatchMode::Exact);
        }
        spec
    }
}

// Backslash first, so escaped output never re-escapes.
fn escape(value: &str) -> String {
    value.replace('\\', r"\\").replace('|', r"\|")
}

impl PartialEq for SelectorSpec {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for SelectorSpec {}

impl fmt::Display for SelectorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_string())
    }
}

/// Deterministic hash identifying a selector's criteria set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(String);

impl Signature {
    pub(crate) fn of(canonical: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(canonical.as_bytes());
        Signature(format!("sel_{}", hasher.finalize().to_hex()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A criterion that contributed to a candidate's score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedCriterion {
    pub kind: CriterionKind,
    /// Tier weight credited for this criterion.
    pub weight: u32,
}

/// One ranked resolution candidate.
#[derive(Clone, Debug)]
pub struct MatchCandidate {
    /// Node in the tree the resolution ran against.
    pub node: NodeId,
    /// Lexicographic tier score; higher ranks first.
    pub score: u32,
    /// Criteria that contributed, with the tier each landed in.
    pub matched: Vec<MatchedCriterion>,
    /// Learned confidence applied as the final tie-break. Neutral (0.5)
    /// when nothing has been learned for the candidate.
    pub tie_break: f64,
}

/// Source of learned confidence for the resolver tie-break, keyed by the
/// signature of a candidate's describing selector.
pub trait ConfidenceLookup {
    fn confidence(&self, signature: &Signature) -> Option<f64>;
}

/// Lookup that knows nothing; every candidate gets the neutral tie-break.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLearnedConfidence;

impl ConfidenceLookup for NoLearnedConfidence {
    fn confidence(&self, _signature: &Signature) -> Option<f64> {
        None
    }
}

impl ConfidenceLookup for HashMap<String, f64> {
    fn confidence(&self, signature: &Signature) -> Option<f64> {
        self.get(signature.as_str()).copied()
    }
}

/// Per-call resolution context: the app the tree was captured from and the
/// learned-confidence source consulted for tie-breaks.
pub struct ResolveContext<'a> {
    pub app_package: &'a str,
    pub confidence: &'a dyn ConfidenceLookup,
}

impl<'a> ResolveContext<'a> {
    pub fn new(app_package: &'a str, confidence: &'a dyn ConfidenceLookup) -> Self {
        Self {
            app_package,
            confidence,
        }
    }

    /// Context with no learned state, e.g. when learning is disabled.
    pub fn without_learning(app_package: &'a str) -> Self {
        static NONE: NoLearnedConfidence = NoLearnedConfidence;
        Self {
            app_package,
            confidence: &NONE,
        }
    }
}
