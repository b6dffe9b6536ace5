//! In-memory adapter for BiasModelRepository.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{BiasModel, IdAllocator, ModelId, NewBiasModel};
use crate::domain::ports::BiasModelRepository;

/// Bias model store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryBiasModelRepository {
    ids: IdAllocator,
    models: RwLock<HashMap<ModelId, BiasModel>>,
}

impl InMemoryBiasModelRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate ids from a shared counter.
    pub fn with_allocator(ids: IdAllocator) -> Self {
        Self {
            ids,
            models: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl BiasModelRepository for InMemoryBiasModelRepository {
    async fn create(&self, model: NewBiasModel) -> DomainResult<ModelId> {
        let mut models = self.models.write().await;
        let id = ModelId(self.ids.next_id());
        models.insert(id, BiasModel::new(id, model, Utc::now()));
        Ok(id)
    }

    async fn get(&self, id: ModelId) -> DomainResult<BiasModel> {
        self.models
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(DomainError::BiasModelNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CiphertextHandle;

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = InMemoryBiasModelRepository::new();
        let params = NewBiasModel {
            encrypted_bias_threshold: CiphertextHandle([1; 32]),
            encrypted_calibration_range: CiphertextHandle([2; 32]),
        };

        let id = repo.create(params).await.unwrap();
        let model = repo.get(id).await.unwrap();
        assert_eq!(model.id, id);
        assert_eq!(model.encrypted_bias_threshold, params.encrypted_bias_threshold);

        assert!(matches!(
            repo.get(ModelId(42)).await,
            Err(DomainError::BiasModelNotFound(ModelId(42)))
        ));
    }
}
