//! Engine facade
//!
//! Binds the device transport, the tree pipeline and the pattern store
//! into the operations an outer tool layer calls. Every operation builds
//! its own tree from a fresh dump; the pattern store is the only shared
//! mutable state and is never held across a sleep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use uipilot_locator::{
    resolve, resolve_unique, MatchCandidate, ResolveContext, SelectorSpec,
};
use uipilot_pattern_store::{
    NewPattern, Outcome, Pattern, PatternStore, ReliabilityStats, StoreError,
};
use uipilot_ui_tree::{filter, parse_dump, Bounds, UiNode, UiTree};

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::ports::DevicePort;

/// Projection knobs for [`UiEngine::view`]. Composable; all off yields the
/// full tree.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ViewOptions {
    /// Collapse to interactive nodes, reattached to the nearest retained
    /// ancestor.
    pub interactive_only: bool,
    /// Drop everything below this depth (root is depth 0).
    pub max_depth: Option<usize>,
    /// Keep nodes from denylisted system packages.
    pub include_system: bool,
    /// Emit the flat bounds listing instead of the nested tree.
    pub bounds_only: bool,
}

/// Identifying attributes of a resolved node, detached from the tree.
#[derive(Clone, Debug, Serialize)]
pub struct ElementInfo {
    pub class_name: String,
    pub resource_id: String,
    pub text: String,
    pub content_desc: String,
    pub package: String,
    pub bounds: Bounds,
    pub clickable: bool,
    pub enabled: bool,
    /// Tap target.
    pub center: (i32, i32),
}

impl ElementInfo {
    fn from_node(node: &UiNode) -> Self {
        Self {
            class_name: node.class_name.clone(),
            resource_id: node.resource_id.clone(),
            text: node.text.clone(),
            content_desc: node.content_desc.clone(),
            package: node.package.clone(),
            bounds: node.bounds,
            clickable: node.clickable,
            enabled: node.enabled,
            center: node.bounds.center(),
        }
    }
}

/// A successfully resolved element, ready for the caller to act on and to
/// report an outcome against.
#[derive(Clone, Debug, Serialize)]
pub struct ResolvedElement {
    /// Signature of the selector canonically describing this element.
    /// Outcome reports use this key; it is what auto-learning persisted.
    pub signature: String,
    pub score: u32,
    /// Learned confidence that ranked this element, neutral when unknown.
    pub confidence: f64,
    pub element: ElementInfo,
}

/// The element-resolution engine. Cheap to share behind an `Arc`.
pub struct UiEngine {
    device: Arc<dyn DevicePort>,
    store: Option<PatternStore>,
    config: EngineConfig,
}

impl UiEngine {
    /// Open the engine against a device, creating the pattern database on
    /// first use. No database is touched when learning is disabled.
    pub async fn new(device: Arc<dyn DevicePort>, config: EngineConfig) -> Result<Self, EngineError> {
        let store = if config.learning_enabled {
            if let Some(parent) = config.store_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
            }
            Some(PatternStore::open(&config.store_path, config.smoothing).await?)
        } else {
            None
        };
        info!(
            learning = config.learning_enabled,
            store = %config.store_path.display(),
            "engine ready"
        );
        Ok(Self {
            device,
            store,
            config,
        })
    }

    /// Engine with a throwaway in-memory store, for tests and dry runs.
    pub async fn with_memory_store(
        device: Arc<dyn DevicePort>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let store = if config.learning_enabled {
            Some(PatternStore::in_memory(config.smoothing).await?)
        } else {
            None
        };
        Ok(Self {
            device,
            store,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Dump and parse the current UI hierarchy.
    pub async fn snapshot(&self) -> Result<UiTree, EngineError> {
        let raw = self.device.dump_ui_hierarchy().await?;
        Ok(parse_dump(&raw)?)
    }

    /// Current hierarchy projected per `options`, as a JSON value ready
    /// for the outer protocol layer.
    pub async fn view(&self, options: &ViewOptions) -> Result<serde_json::Value, EngineError> {
        let mut tree = self.snapshot().await?;
        if !options.include_system {
            tree = filter::exclude_system(&tree, &self.config.system_denylist);
        }
        if options.interactive_only {
            tree = filter::interactive_only(&tree);
        }
        if let Some(depth) = options.max_depth {
            tree = filter::depth_limited(&tree, depth);
        }
        if options.bounds_only {
            return Ok(serde_json::to_value(filter::bounds_only(&tree))?);
        }
        Ok(serde_json::to_value(tree.to_view())?)
    }

    /// Resolve `selector` to exactly one element. On success the element's
    /// describing selector is persisted (when auto-learning is on) so
    /// future outcome reports and tie-breaks can find it.
    pub async fn find_element(
        &self,
        selector: &SelectorSpec,
    ) -> Result<ResolvedElement, EngineError> {
        let app = self.device.current_package().await?;
        let tree = self.snapshot().await?;
        let learned = self.learned_confidence(&app).await?;
        let ctx = ResolveContext::new(&app, &learned);

        let top = resolve_unique(&tree, selector, &ctx)?;
        let resolved = self.describe(&tree, &top)?;

        if self.config.auto_learn {
            if let Some(store) = &self.store {
                let node = tree.get(top.node).ok_or_else(missing_node)?;
                let describing = SelectorSpec::describing(node);
                store
                    .save(&NewPattern {
                        app_package: app.clone(),
                        signature: describing.signature().as_str().to_string(),
                        selector: describing.canonical_string(),
                    })
                    .await?;
                debug!(app = %app, signature = %resolved.signature, "element learned");
            }
        }
        Ok(resolved)
    }

    /// All candidates for `selector`, best first, up to `limit`. Does not
    /// learn and does not require uniqueness.
    pub async fn find_elements(
        &self,
        selector: &SelectorSpec,
        limit: usize,
    ) -> Result<Vec<ResolvedElement>, EngineError> {
        let app = self.device.current_package().await?;
        let tree = self.snapshot().await?;
        let learned = self.learned_confidence(&app).await?;
        let ctx = ResolveContext::new(&app, &learned);

        let candidates = resolve(&tree, selector, &ctx)?;
        candidates
            .iter()
            .take(limit)
            .map(|candidate| self.describe(&tree, candidate))
            .collect()
    }

    /// Report how acting on a previously resolved element went, closing
    /// the learning loop. Returns the updated confidence; `None` when the
    /// pattern is unknown or learning is disabled.
    pub async fn report_outcome(
        &self,
        signature: &str,
        outcome: Outcome,
        latency_ms: Option<u64>,
    ) -> Result<Option<f64>, EngineError> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let app = self.device.current_package().await?;
        let confidence = store
            .record_outcome(&app, signature, outcome, latency_ms)
            .await?;
        debug!(app = %app, signature, success = outcome.is_success(), ?confidence, "outcome recorded");
        Ok(confidence)
    }

    /// Poll until `selector` resolves uniquely or the budget runs out.
    /// Resolution and parse failures keep the loop going; anything else
    /// aborts it. No store state is held across the sleep.
    pub async fn wait_for_element(
        &self,
        selector: &SelectorSpec,
        timeout: Option<std::time::Duration>,
    ) -> Result<ResolvedElement, EngineError> {
        let budget = timeout.unwrap_or(self.config.default_wait_timeout);
        let started = Instant::now();
        let mut last = String::from("never attempted");

        loop {
            match self.find_element(selector).await {
                Ok(found) => return Ok(found),
                Err(err @ (EngineError::Resolve(_) | EngineError::Tree(_))) => {
                    last = err.to_string();
                }
                Err(other) => return Err(other),
            }
            if started.elapsed() >= budget {
                return Err(EngineError::TimeoutExceeded {
                    waited_ms: started.elapsed().as_millis() as u64,
                    last,
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Poll until two consecutive dumps are identical, meaning the UI has
    /// settled. Same timeout contract as [`Self::wait_for_element`].
    pub async fn wait_for_idle(
        &self,
        timeout: Option<std::time::Duration>,
    ) -> Result<(), EngineError> {
        let budget = timeout.unwrap_or(self.config.default_wait_timeout);
        let started = Instant::now();
        let mut previous: Option<String> = None;

        loop {
            let dump = self.device.dump_ui_hierarchy().await?;
            if previous.as_deref() == Some(dump.as_str()) {
                return Ok(());
            }
            previous = Some(dump);
            if started.elapsed() >= budget {
                return Err(EngineError::TimeoutExceeded {
                    waited_ms: started.elapsed().as_millis() as u64,
                    last: "ui still changing between dumps".to_string(),
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    pub async fn save_pattern(&self, pattern: &NewPattern) -> Result<Pattern, EngineError> {
        Ok(self.store()?.save(pattern).await?)
    }

    pub async fn get_pattern(
        &self,
        app: &str,
        signature: &str,
    ) -> Result<Option<Pattern>, EngineError> {
        Ok(self.store()?.get(app, signature).await?)
    }

    pub async fn list_patterns(&self, app: &str) -> Result<Vec<Pattern>, EngineError> {
        Ok(self
            .store()?
            .list(app, self.config.max_listed_patterns)
            .await?)
    }

    pub async fn delete_pattern(&self, app: &str, signature: &str) -> Result<bool, EngineError> {
        Ok(self.store()?.delete(app, signature).await?)
    }

    pub async fn reliability_stats(
        &self,
        app: &str,
        days: u32,
    ) -> Result<ReliabilityStats, EngineError> {
        Ok(self.store()?.reliability_stats(app, days).await?)
    }

    /// Delete patterns unused for longer than `older_than`. Explicit only;
    /// the engine never sweeps on its own.
    pub async fn sweep_stale(&self, older_than: chrono::Duration) -> Result<usize, EngineError> {
        let cutoff = Utc::now() - older_than;
        Ok(self.store()?.sweep_stale(cutoff).await?)
    }

    pub async fn prune_log(&self, before: DateTime<Utc>) -> Result<usize, EngineError> {
        Ok(self.store()?.prune_log(before).await?)
    }

    /// Flush and close the pattern store.
    pub async fn close(self) -> Result<(), EngineError> {
        if let Some(store) = self.store {
            store.close().await?;
        }
        Ok(())
    }

    fn store(&self) -> Result<&PatternStore, EngineError> {
        self.store.as_ref().ok_or(EngineError::LearningDisabled)
    }

    async fn learned_confidence(&self, app: &str) -> Result<HashMap<String, f64>, EngineError> {
        let Some(store) = &self.store else {
            return Ok(HashMap::new());
        };
        let patterns = store.list(app, self.config.max_listed_patterns).await?;
        Ok(patterns
            .into_iter()
            .map(|p| (p.signature, p.confidence))
            .collect())
    }

    fn describe(
        &self,
        tree: &UiTree,
        candidate: &MatchCandidate,
    ) -> Result<ResolvedElement, EngineError> {
        let node = tree.get(candidate.node).ok_or_else(missing_node)?;
        Ok(ResolvedElement {
            signature: SelectorSpec::describing(node).signature().as_str().to_string(),
            score: candidate.score,
            confidence: candidate.tie_break,
            element: ElementInfo::from_node(node),
        })
    }
}

fn missing_node() -> EngineError {
    EngineError::Tree(uipilot_ui_tree::TreeError::MalformedInput(
        "candidate points outside the tree".to_string(),
    ))
}
