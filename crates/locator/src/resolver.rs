//! Selector resolution with deterministic, explainable scoring
//!
//! Every node of the tree is evaluated against every supplied criterion; a
//! node is a candidate only when all criteria hold. Candidates are ranked
//! by lexicographic tier scoring: each tier weight exceeds any combination
//! of lower tiers, so a resource-id exact match can never be outranked by
//! stacked weaker evidence. Learned confidence orders only candidates with
//! equal scores; remaining ties keep document order.

use std::cmp::Ordering;

use tracing::debug;
use uipilot_ui_tree::{UiNode, UiTree};

use crate::errors::ResolveError;
use crate::types::{
    Criterion, MatchCandidate, MatchMode, MatchedCriterion, ResolveContext, SelectorSpec,
};

/// Tie-break applied when nothing has been learned for a candidate; equal
/// to a brand-new pattern's smoothed confidence.
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;

// Tier weights. Powers of two so every tier outweighs all lower tiers
// combined (32 > 16 + 8 + 4 + 2 + 1).
const TIER_RESOURCE_ID_EXACT: u32 = 32;
const TIER_TEXT_EXACT: u32 = 16;
const TIER_CONTENT_DESC_EXACT: u32 = 8;
const TIER_SUBSTRING: u32 = 4;
const TIER_CLASS_NAME: u32 = 2;
const TIER_INDEX: u32 = 1;

/// Evaluate `selector` against `tree`, returning every candidate ranked
/// best-first. The ranking is identical for identical inputs.
pub fn resolve(
    tree: &UiTree,
    selector: &SelectorSpec,
    ctx: &ResolveContext<'_>,
) -> Result<Vec<MatchCandidate>, ResolveError> {
    if selector.is_empty() {
        return Err(ResolveError::InvalidSelector);
    }

    let criteria = selector.normalized();
    let mut candidates = Vec::new();
    for (id, _) in tree.iter() {
        let Some(node) = tree.get(id) else {
            continue;
        };
        if let Some((score, matched)) = evaluate(node, &criteria) {
            let describing = SelectorSpec::describing(node).signature();
            let tie_break = ctx
                .confidence
                .confidence(&describing)
                .unwrap_or(NEUTRAL_CONFIDENCE);
            candidates.push(MatchCandidate {
                node: id,
                score,
                matched,
                tie_break,
            });
        }
    }

    // Stable sort: document order survives among fully tied candidates.
    candidates.sort_by(|a, b| {
        b.score.cmp(&a.score).then_with(|| {
            b.tie_break
                .partial_cmp(&a.tie_break)
                .unwrap_or(Ordering::Equal)
        })
    });

    debug!(
        app = ctx.app_package,
        selector = %selector,
        candidates = candidates.len(),
        "selector resolved"
    );
    Ok(candidates)
}

/// Resolve to a single element, or report why that is not possible.
pub fn resolve_unique(
    tree: &UiTree,
    selector: &SelectorSpec,
    ctx: &ResolveContext<'_>,
) -> Result<MatchCandidate, ResolveError> {
    let mut candidates = resolve(tree, selector, ctx)?;
    let Some(top) = candidates.first() else {
        return Err(ResolveError::NotFound(selector.canonical_string()));
    };

    let tied = candidates
        .iter()
        .take_while(|c| c.score == top.score && c.tie_break == top.tie_break)
        .count();
    if tied >= 2 {
        candidates.truncate(tied);
        return Err(ResolveError::Ambiguous {
            selector: selector.canonical_string(),
            candidates,
        });
    }

    Ok(candidates.swap_remove(0))
}

enum Quality {
    Exact,
    Substring,
}

/// Match quality of a single text-like attribute. An exact hit is credited
/// as exact even under substring mode; the tier reflects what actually
/// matched, not what was requested.
fn quality(actual: &str, wanted: &str, mode: MatchMode) -> Option<Quality> {
    if actual == wanted {
        return Some(Quality::Exact);
    }
    if mode == MatchMode::Substring && !wanted.is_empty() && actual.contains(wanted) {
        return Some(Quality::Substring);
    }
    None
}

/// Conjunctive evaluation: `None` unless the node satisfies every
/// criterion, otherwise the summed tier score and per-criterion credits.
fn evaluate(node: &UiNode, criteria: &[Criterion]) -> Option<(u32, Vec<MatchedCriterion>)> {
    let mut score = 0u32;
    let mut matched = Vec::with_capacity(criteria.len());
    for criterion in criteria {
        let weight = match criterion {
            Criterion::ResourceId { value, mode } => {
                match quality(&node.resource_id, value, *mode)? {
                    Quality::Exact => TIER_RESOURCE_ID_EXACT,
                    Quality::Substring => TIER_SUBSTRING,
                }
            }
            Criterion::Text { value, mode } => match quality(&node.text, value, *mode)? {
                Quality::Exact => TIER_TEXT_EXACT,
                Quality::Substring => TIER_SUBSTRING,
            },
            Criterion::ContentDesc { value, mode } => {
                match quality(&node.content_desc, value, *mode)? {
                    Quality::Exact => TIER_CONTENT_DESC_EXACT,
                    Quality::Substring => TIER_SUBSTRING,
                }
            }
            Criterion::ClassName { value, mode } => {
                quality(&node.class_name, value, *mode)?;
                TIER_CLASS_NAME
            }
            Criterion::Index { value } => {
                if node.index != *value {
                    return None;
                }
                TIER_INDEX
            }
        };
        score += weight;
        matched.push(MatchedCriterion {
            kind: criterion.kind(),
            weight,
        });
    }
    Some((score, matched))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::types::CriterionKind;
    use uipilot_ui_tree::parse_dump;

    const LOGIN_DUMP: &str = r#"<hierarchy>
  <node class="android.widget.FrameLayout" package="com.example.app" bounds="[0,0][1080,1920]">
    <node class="android.widget.Button" resource-id="login_btn" text="Log in" clickable="true" bounds="[0,0][100,100]"/>
    <node class="android.widget.Button" resource-id="login_btn2" text="Log in twice" clickable="true" bounds="[0,100][100,200]"/>
  </node>
</hierarchy>"#;

    const OK_DUMP: &str = r#"<hierarchy>
  <node class="android.widget.Button" resource-id="ok_top" text="OK" bounds="[0,0][100,100]"/>
  <node class="android.widget.Button" resource-id="ok_bottom" text="OK" bounds="[0,100][100,200]"/>
</hierarchy>"#;

    fn node_resource_id(tree: &UiTree, candidate: &MatchCandidate) -> String {
        tree.get(candidate.node).unwrap().resource_id.clone()
    }

    #[test]
    fn test_empty_selector_is_invalid() {
        let tree = parse_dump(LOGIN_DUMP).unwrap();
        let ctx = ResolveContext::without_learning("com.example.app");
        let err = resolve(&tree, &SelectorSpec::new(), &ctx).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidSelector));
    }

    #[test]
    fn test_resource_id_prefix_resolves_uniquely() {
        let tree = parse_dump(LOGIN_DUMP).unwrap();
        let ctx = ResolveContext::without_learning("com.example.app");
        let selector = SelectorSpec::new().with_resource_id("login_btn", MatchMode::Substring);

        let top = resolve_unique(&tree, &selector, &ctx).unwrap();
        assert_eq!(node_resource_id(&tree, &top), "login_btn");
        assert_eq!(top.score, TIER_RESOURCE_ID_EXACT);

        let all = resolve(&tree, &selector, &ctx).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].score, TIER_SUBSTRING);
    }

    #[test]
    fn test_equal_text_matches_are_ambiguous() {
        let tree = parse_dump(OK_DUMP).unwrap();
        let ctx = ResolveContext::without_learning("com.example.app");
        let selector = SelectorSpec::new().with_text("OK", MatchMode::Exact);

        let err = resolve_unique(&tree, &selector, &ctx).unwrap_err();
        match err {
            ResolveError::Ambiguous { candidates, .. } => {
                assert_eq!(candidates.len(), 2);
                let ids: Vec<_> = candidates
                    .iter()
                    .map(|c| node_resource_id(&tree, c))
                    .collect();
                assert_eq!(ids, ["ok_top", "ok_bottom"]);
            }
            other => panic!("expected ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_tree_is_not_found() {
        let tree = parse_dump("<hierarchy/>").unwrap();
        let ctx = ResolveContext::without_learning("com.example.app");
        let selector = SelectorSpec::new().with_text("anything", MatchMode::Substring);
        let err = resolve_unique(&tree, &selector, &ctx).unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
    }

    #[test]
    fn test_conjunctive_matching() {
        let tree = parse_dump(LOGIN_DUMP).unwrap();
        let ctx = ResolveContext::without_learning("com.example.app");
        let selector = SelectorSpec::new()
            .with_text("Log in", MatchMode::Substring)
            .with_class_name("android.widget.Button", MatchMode::Exact)
            .with_resource_id("login_btn2", MatchMode::Exact);

        let all = resolve(&tree, &selector, &ctx).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(node_resource_id(&tree, &all[0]), "login_btn2");
        // resource-id exact + text substring + class name
        assert_eq!(
            all[0].score,
            TIER_RESOURCE_ID_EXACT + TIER_SUBSTRING + TIER_CLASS_NAME
        );
        let kinds: Vec<_> = all[0].matched.iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            [
                CriterionKind::ResourceId,
                CriterionKind::Text,
                CriterionKind::ClassName
            ]
        );
    }

    #[test]
    fn test_confidence_breaks_score_ties() {
        let tree = parse_dump(OK_DUMP).unwrap();
        let selector = SelectorSpec::new().with_text("OK", MatchMode::Exact);

        let bottom = tree
            .iter()
            .filter_map(|(id, _)| tree.get(id))
            .find(|n| n.resource_id == "ok_bottom")
            .unwrap();
        let mut learned = HashMap::new();
        learned.insert(
            SelectorSpec::describing(bottom).signature().as_str().to_string(),
            0.9,
        );

        let ctx = ResolveContext::new("com.example.app", &learned);
        let top = resolve_unique(&tree, &selector, &ctx).unwrap();
        assert_eq!(node_resource_id(&tree, &top), "ok_bottom");
    }

    #[test]
    fn test_confidence_never_overrides_score() {
        let tree = parse_dump(LOGIN_DUMP).unwrap();
        let selector = SelectorSpec::new().with_resource_id("login_btn", MatchMode::Substring);

        // the weaker (substring) candidate is maximally trusted
        let weaker = tree
            .iter()
            .filter_map(|(id, _)| tree.get(id))
            .find(|n| n.resource_id == "login_btn2")
            .unwrap();
        let mut learned = HashMap::new();
        learned.insert(
            SelectorSpec::describing(weaker).signature().as_str().to_string(),
            1.0,
        );

        let ctx = ResolveContext::new("com.example.app", &learned);
        let top = resolve_unique(&tree, &selector, &ctx).unwrap();
        assert_eq!(node_resource_id(&tree, &top), "login_btn");
    }

    #[test]
    fn test_index_criterion() {
        let raw = r#"<hierarchy>
  <node class="android.widget.LinearLayout">
    <node class="android.widget.Button" text="tab"/>
    <node class="android.widget.Button" text="tab"/>
    <node class="android.widget.Button" text="tab"/>
  </node>
</hierarchy>"#;
        let tree = parse_dump(raw).unwrap();
        let ctx = ResolveContext::without_learning("com.example.app");
        let selector = SelectorSpec::new()
            .with_text("tab", MatchMode::Exact)
            .with_index(1);

        let top = resolve_unique(&tree, &selector, &ctx).unwrap();
        assert_eq!(tree.get(top.node).unwrap().index, 1);
        assert_eq!(top.score, TIER_TEXT_EXACT + TIER_INDEX);
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let tree = parse_dump(LOGIN_DUMP).unwrap();
        let ctx = ResolveContext::without_learning("com.example.app");
        let selector = SelectorSpec::new().with_text("Log in", MatchMode::Substring);

        let first = resolve(&tree, &selector, &ctx).unwrap();
        let second = resolve(&tree, &selector, &ctx).unwrap();
        let order = |cands: &[MatchCandidate]| {
            cands
                .iter()
                .map(|c| (c.node, c.score))
                .collect::<Vec<_>>()
        };
        assert_eq!(order(&first), order(&second));
    }
}
