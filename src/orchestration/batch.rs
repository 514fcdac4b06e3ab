//! Batch driver: claims up to one batch of staged rows for a source, marks
//! each row processed before migrating it and counts the outcomes.

use super::{
    ActiveMemberMigration, AddressMemberMigration, FileMakerMigration, GiftMigration,
    MandateMigration, SourceMigration,
};
use crate::config::MAX_BATCH_SIZE;
use crate::context::MigrationContext;
use crate::error::Result;
use crate::staging::{SourceKind, StagingRow, StagingStore};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument};

/// Outcome of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub source: SourceKind,
    pub created: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn new(source: SourceKind) -> Self {
        Self {
            source,
            created: 0,
            failed: 0,
        }
    }

    /// No unprocessed rows were left
    pub fn is_empty(&self) -> bool {
        self.created + self.failed == 0
    }

    pub fn processed(&self) -> usize {
        self.created + self.failed
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "Alle {} zijn verwerkt.", self.source.label())
        } else {
            write!(
                f,
                "{} {} overgezet naar CiviCRM, {} niet overgezet vanwege fouten (check log)",
                self.created,
                self.source.label(),
                self.failed
            )
        }
    }
}

pub struct BatchRunner {
    ctx: MigrationContext,
    staging: Arc<dyn StagingStore>,
}

impl BatchRunner {
    pub fn new(ctx: MigrationContext, staging: Arc<dyn StagingStore>) -> Self {
        Self { ctx, staging }
    }

    pub fn context(&self) -> &MigrationContext {
        &self.ctx
    }

    /// Configured batch size for `source`, or `requested` clamped to 1..=500
    pub fn batch_size(&self, source: SourceKind, requested: Option<u32>) -> u32 {
        let batches = &self.ctx.config.batches;
        let configured = match source {
            SourceKind::AddressMember => batches.migratie_adres,
            SourceKind::Lifetime => batches.leven,
            SourceKind::Free => batches.gratis,
            SourceKind::Archive => batches.archief,
            SourceKind::Active => batches.actief,
            SourceKind::Mandate => batches.mandaat,
            SourceKind::Gift => batches.giften,
        };
        requested.unwrap_or(configured).clamp(1, MAX_BATCH_SIZE)
    }

    /// Process at most one batch of `source`.
    ///
    /// Errors are fatal for the batch: staging failures, and for gifts a
    /// review group that cannot be found or created.
    #[instrument(skip(self))]
    pub async fn run(&self, source: SourceKind, batch_size: Option<u32>) -> Result<BatchSummary> {
        let limit = self.batch_size(source, batch_size);
        let staging = self.staging.as_ref();
        let ctx = &self.ctx;

        let summary = match source {
            SourceKind::AddressMember => {
                let rows = staging.address_members(limit).await?;
                self.process(source, rows, &AddressMemberMigration::new(ctx, staging))
                    .await?
            }
            SourceKind::Lifetime | SourceKind::Free | SourceKind::Archive => {
                let recipe = FileMakerMigration::new(ctx, source)?;
                let rows = staging.filemaker_members(source, limit).await?;
                self.process(source, rows, &recipe).await?
            }
            SourceKind::Active => {
                let rows = staging.active_members(limit).await?;
                self.process(source, rows, &ActiveMemberMigration::new(ctx))
                    .await?
            }
            SourceKind::Mandate => {
                let rows = staging.mandates(limit).await?;
                self.process(source, rows, &MandateMigration::new(ctx)).await?
            }
            SourceKind::Gift => {
                let recipe = GiftMigration::prepare(ctx).await?;
                let rows = staging.gifts(limit).await?;
                self.process(source, rows, &recipe).await?
            }
        };

        info!(
            created = summary.created,
            failed = summary.failed,
            "Batch finished"
        );
        Ok(summary)
    }

    /// Run batches until one comes back empty; returns every summary,
    /// the final empty one included
    pub async fn run_until_done(
        &self,
        source: SourceKind,
        batch_size: Option<u32>,
    ) -> Result<Vec<BatchSummary>> {
        let mut summaries = Vec::new();
        loop {
            let summary = self.run(source, batch_size).await?;
            summaries.push(summary);
            if summary.is_empty() {
                return Ok(summaries);
            }
        }
    }

    async fn process<M>(&self, source: SourceKind, rows: Vec<M::Row>, recipe: &M) -> Result<BatchSummary>
    where
        M: SourceMigration,
    {
        let mut summary = BatchSummary::new(source);
        for row in &rows {
            // claimed before migrating: a crash mid-row must not retry it
            self.staging.mark_processed(source, &row.key()).await?;
            if recipe.migrate(row).await {
                summary.created += 1;
            } else {
                summary.failed += 1;
            }
        }
        Ok(summary)
    }
}

impl fmt::Debug for BatchRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchRunner").field("ctx", &self.ctx).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_messages() {
        let empty = BatchSummary::new(SourceKind::Lifetime);
        assert_eq!(empty.to_string(), "Alle velt leden voor het leven zijn verwerkt.");

        let summary = BatchSummary {
            source: SourceKind::Gift,
            created: 8,
            failed: 2,
        };
        assert_eq!(
            summary.to_string(),
            "8 velt giften overgezet naar CiviCRM, 2 niet overgezet vanwege fouten (check log)"
        );
        assert_eq!(summary.processed(), 10);
    }
}
