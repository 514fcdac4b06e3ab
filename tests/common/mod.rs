//! Shared setup for the integration tests.

#![allow(dead_code)]

pub mod rows;
pub mod strategies;

use std::sync::Arc;
use velt_migration::orchestration::BatchRunner;
use velt_migration::test_helpers::{InMemoryStaging, TestEnvironment};

/// Seeded environment plus a batch runner over fresh in-memory staging
pub struct Harness {
    pub env: TestEnvironment,
    pub staging: Arc<InMemoryStaging>,
    pub runner: BatchRunner,
}

impl Harness {
    pub async fn new() -> Self {
        let env = TestEnvironment::new().await.expect("seeded environment");
        let staging = Arc::new(InMemoryStaging::new());
        let runner = BatchRunner::new(env.context.clone(), staging.clone());
        Self {
            env,
            staging,
            runner,
        }
    }

    /// Value of the historical member number field on a membership
    pub fn historical_field(&self) -> String {
        format!("custom_{}", self.env.seeded.historical_id_field_id)
    }
}
