//! Storage port for bias models.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{BiasModel, ModelId, NewBiasModel};

/// Repository port for bias-detection parameters. Models are immutable once
/// created.
#[async_trait]
pub trait BiasModelRepository: Send + Sync {
    async fn create(&self, model: NewBiasModel) -> DomainResult<ModelId>;

    /// Fails with `BiasModelNotFound` if absent.
    async fn get(&self, id: ModelId) -> DomainResult<BiasModel>;
}
