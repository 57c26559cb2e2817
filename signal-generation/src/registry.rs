//! Explicitly constructed indicator registry.

use crate::strategies::{
    AdxDiCross, HeikinAshiTrend, IndicatorStrategy, MacdBollinger, PivotBreakout, RsiVolumeBollinger,
    SupertrendFlip,
};
use common::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Catalogue entry for a registered strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub win_rate: f64,
}

/// Strategies by id.
pub struct IndicatorRegistry {
    strategies: BTreeMap<String, Arc<dyn IndicatorStrategy>>,
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self {
            strategies: BTreeMap::new(),
        }
    }

    /// Register a strategy under its own id, replacing any previous entry.
    pub fn register(&mut self, strategy: Arc<dyn IndicatorStrategy>) {
        self.strategies.insert(strategy.id().to_string(), strategy);
    }

    /// Registry holding every shipped strategy.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SupertrendFlip));
        registry.register(Arc::new(MacdBollinger));
        registry.register(Arc::new(RsiVolumeBollinger));
        registry.register(Arc::new(AdxDiCross));
        registry.register(Arc::new(HeikinAshiTrend));
        registry.register(Arc::new(PivotBreakout));
        registry
    }

    pub fn create(&self, id: &str) -> EngineResult<Arc<dyn IndicatorStrategy>> {
        self.strategies
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownIndicator(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.strategies.contains_key(id)
    }

    /// Sorted by id.
    pub fn list(&self) -> Vec<IndicatorInfo> {
        self.strategies
            .values()
            .map(|s| IndicatorInfo {
                id: s.id().to_string(),
                name: s.name().to_string(),
                description: s.description().to_string(),
                win_rate: s.win_rate(),
            })
            .collect()
    }
}

impl Default for IndicatorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
