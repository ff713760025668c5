use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::debug;

use provgate_types::{Deadline, ModelId, ModelMetadata};

use crate::{ModelRegistry, StoreError};

/// In-process registry, mainly for embedding and tests.
#[derive(Default)]
pub struct StaticModelRegistry {
    models: RwLock<HashMap<ModelId, ModelMetadata>>,
}

impl StaticModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(models: impl IntoIterator<Item = ModelMetadata>) -> Self {
        let models = models
            .into_iter()
            .map(|meta| (meta.model_id.clone(), meta))
            .collect();
        Self {
            models: RwLock::new(models),
        }
    }

    /// Register or replace a model's metadata.
    pub fn insert(&self, metadata: ModelMetadata) -> Result<(), StoreError> {
        let mut models = self
            .models
            .write()
            .map_err(|_| StoreError::Backend("model registry lock poisoned".to_string()))?;
        models.insert(metadata.model_id.clone(), metadata);
        Ok(())
    }
}

impl ModelRegistry for StaticModelRegistry {
    fn get_model_metadata(
        &self,
        model_id: &ModelId,
        deadline: Deadline,
    ) -> Result<Option<ModelMetadata>, StoreError> {
        deadline.check()?;
        let models = self
            .models
            .read()
            .map_err(|_| StoreError::Backend("model registry lock poisoned".to_string()))?;
        Ok(models.get(model_id).cloned())
    }
}

/// Registry backed by a directory of `<model_id>.json` files.
#[derive(Debug, Clone)]
pub struct JsonDirRegistry {
    dir: PathBuf,
}

impl JsonDirRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, model_id: &ModelId) -> Result<PathBuf, StoreError> {
        let id = model_id.as_str();
        let safe = !id.starts_with('.')
            && !id.contains(['/', '\\'])
            && !id.chars().any(char::is_control);
        if !safe {
            return Err(StoreError::Invalid(format!(
                "model id {id:?} cannot be used as a registry file name"
            )));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

impl ModelRegistry for JsonDirRegistry {
    fn get_model_metadata(
        &self,
        model_id: &ModelId,
        deadline: Deadline,
    ) -> Result<Option<ModelMetadata>, StoreError> {
        deadline.check()?;
        let path = self.path_for(model_id)?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(model_id = %model_id, path = %path.display(), "Model not registered");
                return Ok(None);
            }
            Err(err) => {
                return Err(StoreError::Backend(format!(
                    "failed to read {}: {err}",
                    path.display()
                )));
            }
        };

        let metadata: ModelMetadata = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))?;
        if &metadata.model_id != model_id {
            return Err(StoreError::Corrupt(format!(
                "{} describes model {}, not {model_id}",
                path.display(),
                metadata.model_id
            )));
        }
        Ok(Some(metadata))
    }
}
