use std::collections::HashMap;

use crate::audio::errors::ConfigError;
use crate::audio::types::Variant;

/// Immutable mapping from variant to source location. Built from an
/// already validated [`EngineConfig`](crate::audio::config::EngineConfig).
#[derive(Debug, Clone)]
pub struct TrackRegistry {
    sources: HashMap<Variant, String>,
}

impl TrackRegistry {
    pub fn new(sources: HashMap<Variant, String>) -> Self {
        TrackRegistry { sources }
    }

    pub fn resolve(&self, variant: &Variant) -> Result<&str, ConfigError> {
        self.sources
            .get(variant)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::UnknownVariant {
                variant: variant.clone(),
            })
    }

    /// Registered variants in name order.
    pub fn variants(&self) -> Vec<Variant> {
        let mut variants: Vec<Variant> = self.sources.keys().cloned().collect();
        variants.sort();
        variants
    }
}
