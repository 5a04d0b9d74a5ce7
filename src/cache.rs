// src/cache.rs

//! Process-wide memoization of VAD analyses.
//!
//! Keyed by `(source_id, preset)`. Entries are immutable `Arc<VadAnalysis>`
//! values: compute once, share everywhere. The store is injected into the
//! orchestrator rather than hidden in a global, so tests can supply a fresh
//! cache per scenario.
//!
//! Single-flight: the map lock is only held long enough to fetch or insert a
//! cell; the analysis itself runs outside the lock, with concurrent callers
//! for the same key awaiting the same cell. A failed computation leaves the
//! cell empty so the next caller retries.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::Result;
use crate::presets::Preset;
use crate::vad::VadAnalysis;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    source_id: String,
    preset: Preset,
}

/// Thread-safe, single-flight VAD memo.
#[derive(Default)]
pub struct VadCache {
    cells: Mutex<HashMap<Key, Arc<OnceCell<Arc<VadAnalysis>>>>>,
}

impl VadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the analysis for `(source_id, preset)`, computing it at most
    /// once across concurrent callers.
    pub async fn get_or_analyze<F, Fut>(
        &self,
        source_id: &str,
        preset: Preset,
        compute: F,
    ) -> Result<Arc<VadAnalysis>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<VadAnalysis>>,
    {
        let cell = {
            let mut cells = self.cells.lock().await;
            cells
                .entry(Key {
                    source_id: source_id.to_owned(),
                    preset,
                })
                .or_default()
                .clone()
        };

        let analysis = cell
            .get_or_try_init(|| async {
                debug!(source_id, preset = preset.as_str(), "vad cache miss");
                compute().await.map(Arc::new)
            })
            .await?;

        Ok(analysis.clone())
    }

    /// Drop every preset entry for one source (called when a source is
    /// deleted). Analyses already handed out stay valid; they are immutable.
    pub async fn clear(&self, source_id: &str) {
        let mut cells = self.cells.lock().await;
        cells.retain(|k, _| k.source_id != source_id);
    }

    /// Number of cached keys (including in-flight ones). Test hook.
    pub async fn len(&self) -> usize {
        self.cells.lock().await.len()
    }
}
