use crate::error::Result;
use crate::schema::{AnalysisConfig, DataTable};
use crate::AnalysisReport;
use log::debug;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// SHA-256 digest of a table's contents plus the analysis configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(table: &DataTable, config: &AnalysisConfig) -> Result<Self> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(table)?);
        hasher.update(b"\n");
        hasher.update(serde_json::to_vec(config)?);
        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Caller-owned memo of finished reports. Keys are derived from content, so a
/// changed table never hits a stale entry.
#[derive(Debug, Default)]
pub struct AnalysisCache {
    entries: HashMap<CacheKey, AnalysisReport>,
    hits: usize,
    misses: usize,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&AnalysisReport> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: CacheKey, report: AnalysisReport) {
        self.entries.insert(key, report);
    }

    /// Returns the cached report for this content or computes and stores it.
    /// Errors are never cached.
    pub fn get_or_compute<F>(
        &mut self,
        table: &DataTable,
        config: &AnalysisConfig,
        compute: F,
    ) -> Result<AnalysisReport>
    where
        F: FnOnce() -> Result<AnalysisReport>,
    {
        let key = CacheKey::derive(table, config)?;
        if let Some(report) = self.entries.get(&key) {
            self.hits += 1;
            debug!("Analysis cache hit for {}", key.as_str());
            return Ok(report.clone());
        }

        self.misses += 1;
        let report = compute()?;
        self.entries.insert(key, report.clone());
        Ok(report)
    }

    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}
