//! In-memory adapters. Default stores for a single process and for tests.

pub mod bias_model_repository;
pub mod group_statistics;
pub mod review_repository;

pub use bias_model_repository::InMemoryBiasModelRepository;
pub use group_statistics::RunningMeanGroupStatistics;
pub use review_repository::InMemoryReviewRepository;
