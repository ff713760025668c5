use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use provgate_types::{Deadline, ModelId};

use crate::{ModelRegistry, StoreError};

#[derive(Debug, Error)]
pub enum BiasMetricError {
    /// The provider could not produce a value. Not an infrastructure fault.
    #[error("bias metric unavailable for {model_id}: {reason}")]
    Unavailable { model_id: ModelId, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Supplies one bias deviation per model, e.g. a demographic parity difference.
///
/// `Ok(None)` means the model has no recorded fairness results.
pub trait BiasMetricProvider: Send + Sync {
    fn deviation(&self, model_id: &ModelId, deadline: Deadline)
    -> Result<Option<f64>, BiasMetricError>;
}

/// Fixed values supplied up front.
#[derive(Default)]
pub struct StaticBiasMetrics {
    values: RwLock<HashMap<ModelId, f64>>,
}

impl StaticBiasMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, model_id: ModelId, deviation: f64) -> Self {
        self.values
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(model_id, deviation);
        self
    }

    pub fn set(&self, model_id: ModelId, deviation: f64) -> Result<(), BiasMetricError> {
        let mut values = self.values.write().map_err(|_| {
            BiasMetricError::Store(StoreError::Backend("bias metrics lock poisoned".to_string()))
        })?;
        values.insert(model_id, deviation);
        Ok(())
    }
}

impl BiasMetricProvider for StaticBiasMetrics {
    fn deviation(
        &self,
        model_id: &ModelId,
        deadline: Deadline,
    ) -> Result<Option<f64>, BiasMetricError> {
        deadline.check().map_err(StoreError::from)?;
        let values = self.values.read().map_err(|_| {
            BiasMetricError::Store(StoreError::Backend("bias metrics lock poisoned".to_string()))
        })?;
        Ok(values.get(model_id).copied())
    }
}

/// Reads per-attribute results from the model registry and reports the worst.
pub struct RegistryBiasMetrics {
    registry: Arc<dyn ModelRegistry>,
}

impl RegistryBiasMetrics {
    pub fn new(registry: Arc<dyn ModelRegistry>) -> Self {
        Self { registry }
    }
}

impl BiasMetricProvider for RegistryBiasMetrics {
    fn deviation(
        &self,
        model_id: &ModelId,
        deadline: Deadline,
    ) -> Result<Option<f64>, BiasMetricError> {
        let Some(metadata) = self.registry.get_model_metadata(model_id, deadline)? else {
            return Err(BiasMetricError::Unavailable {
                model_id: model_id.clone(),
                reason: "model is not registered".to_string(),
            });
        };
        let worst = metadata.worst_bias().map(|(_, deviation)| deviation);
        if let Some(value) = worst
            && !value.is_finite()
        {
            return Err(BiasMetricError::Unavailable {
                model_id: model_id.clone(),
                reason: format!("non-finite deviation {value}"),
            });
        }
        Ok(worst)
    }
}
