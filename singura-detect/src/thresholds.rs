//! Threshold store — per-organization threshold cache over a pluggable
//! persistence seam.
//!
//! Reads are the hot path: one lookup per detection pass under a read
//! lock. A miss loads reinforcement-optimized overrides with a single retry
//! and falls back to the compiled-in defaults, logging the fallback once per
//! organization. Installed sets replace the previous one atomically, so a
//! concurrent pass sees either the old set or the new one end-to-end.

use crate::error::ThresholdLoadError;
use async_trait::async_trait;
use singura_core::thresholds::ThresholdSet;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Persistence seam for reinforcement-optimized threshold overrides.
/// The storage layer is out of scope; tests supply doubles.
#[async_trait]
pub trait ThresholdLoader: Send + Sync {
    /// Load the stored override set for an organization, if any.
    async fn load(
        &self,
        organization_id: &str,
    ) -> Result<Option<ThresholdSet>, ThresholdLoadError>;
}

/// Loader with no backing store: every organization runs on defaults.
pub struct NullThresholdLoader;

#[async_trait]
impl ThresholdLoader for NullThresholdLoader {
    async fn load(
        &self,
        _organization_id: &str,
    ) -> Result<Option<ThresholdSet>, ThresholdLoadError> {
        Ok(None)
    }
}

/// Cached per-organization threshold sets.
pub struct ThresholdStore {
    loader: Arc<dyn ThresholdLoader>,
    cache: RwLock<HashMap<String, Arc<ThresholdSet>>>,
    /// Organizations already warned about load fallback; one log line each.
    warned: Mutex<HashSet<String>>,
    defaults: Arc<ThresholdSet>,
}

impl ThresholdStore {
    pub fn new(loader: Arc<dyn ThresholdLoader>) -> Self {
        Self {
            loader,
            cache: RwLock::new(HashMap::new()),
            warned: Mutex::new(HashSet::new()),
            defaults: Arc::new(ThresholdSet::default()),
        }
    }

    /// A store that never loads overrides.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(NullThresholdLoader))
    }

    /// The threshold set for an organization. Never fails: load problems
    /// degrade to defaults.
    pub async fn get_for(&self, organization_id: &str) -> Arc<ThresholdSet> {
        if let Some(set) = self.cache.read().await.get(organization_id) {
            return set.clone();
        }

        let resolved = self.load_with_retry(organization_id).await;
        let mut cache = self.cache.write().await;
        // A concurrent pass may have resolved first; keep whichever landed.
        cache
            .entry(organization_id.to_string())
            .or_insert(resolved)
            .clone()
    }

    /// Drop the cached entry so the next pass reloads.
    pub async fn refresh(&self, organization_id: &str) {
        self.cache.write().await.remove(organization_id);
    }

    /// Install a new set for an organization, replacing the old one as a
    /// whole. Invalid sets are rejected; the previous set stays in place.
    pub async fn install(
        &self,
        organization_id: &str,
        set: ThresholdSet,
    ) -> Result<(), ThresholdLoadError> {
        set.validate().map_err(ThresholdLoadError::Invalid)?;
        self.cache
            .write()
            .await
            .insert(organization_id.to_string(), Arc::new(set));
        Ok(())
    }

    async fn load_with_retry(&self, organization_id: &str) -> Arc<ThresholdSet> {
        for attempt in 0..2 {
            match self.loader.load(organization_id).await {
                Ok(Some(set)) => match set.validate() {
                    Ok(()) => return Arc::new(set),
                    Err(reason) => {
                        self.warn_once(organization_id, &format!("invalid stored set: {reason}"))
                            .await;
                        return self.defaults.clone();
                    }
                },
                Ok(None) => return self.defaults.clone(),
                Err(err) if attempt == 0 => {
                    tracing::debug!(%organization_id, %err, "threshold load failed, retrying");
                }
                Err(err) => {
                    self.warn_once(organization_id, &err.to_string()).await;
                }
            }
        }
        self.defaults.clone()
    }

    async fn warn_once(&self, organization_id: &str, reason: &str) {
        let mut warned = self.warned.lock().await;
        if warned.insert(organization_id.to_string()) {
            tracing::warn!(
                %organization_id,
                %reason,
                "falling back to default thresholds"
            );
        }
    }
}
