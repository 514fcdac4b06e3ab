//! In-memory [`StagingStore`] for batch and orchestrator tests.

use crate::error::{MigrationError, Result};
use crate::staging::{
    ActiveMemberRow, AddressMemberRow, FileMakerMemberRow, GiftRow, MandateRow, PersonRow,
    SourceKind, StagingRow, StagingStore,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressMemberOutcome {
    pub contact_id: Option<i64>,
}

#[derive(Debug, Default)]
struct State {
    address_members: Vec<AddressMemberRow>,
    persons: Vec<PersonRow>,
    filemaker: HashMap<SourceKind, Vec<FileMakerMemberRow>>,
    active: Vec<ActiveMemberRow>,
    mandates: Vec<MandateRow>,
    gifts: Vec<GiftRow>,
    processed: HashSet<(SourceKind, String)>,
    outcomes: HashMap<i64, AddressMemberOutcome>,
}

impl State {
    fn unclaimed<T: StagingRow + Clone>(&self, source: SourceKind, rows: &[T], limit: u32) -> Vec<T> {
        rows.iter()
            .filter(|row| !self.processed.contains(&(source, row.key())))
            .take(limit as usize)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStaging {
    state: Mutex<State>,
}

impl InMemoryStaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_address_member(&self, row: AddressMemberRow) {
        self.state.lock().address_members.push(row);
    }

    pub fn add_person(&self, row: PersonRow) {
        self.state.lock().persons.push(row);
    }

    pub fn add_filemaker_member(&self, source: SourceKind, row: FileMakerMemberRow) {
        self.state.lock().filemaker.entry(source).or_default().push(row);
    }

    pub fn add_active_member(&self, row: ActiveMemberRow) {
        self.state.lock().active.push(row);
    }

    pub fn add_mandate(&self, row: MandateRow) {
        self.state.lock().mandates.push(row);
    }

    pub fn add_gift(&self, row: GiftRow) {
        self.state.lock().gifts.push(row);
    }

    pub fn is_processed(&self, source: SourceKind, key: &str) -> bool {
        self.state
            .lock()
            .processed
            .contains(&(source, key.to_string()))
    }

    pub fn outcome(&self, lidmaatschap_id: i64) -> Option<AddressMemberOutcome> {
        self.state.lock().outcomes.get(&lidmaatschap_id).cloned()
    }
}

#[async_trait]
impl StagingStore for InMemoryStaging {
    async fn address_members(&self, limit: u32) -> Result<Vec<AddressMemberRow>> {
        let state = self.state.lock();
        Ok(state.unclaimed(SourceKind::AddressMember, &state.address_members, limit))
    }

    async fn filemaker_members(&self, source: SourceKind, limit: u32) -> Result<Vec<FileMakerMemberRow>> {
        if !source.is_filemaker_member() {
            return Err(MigrationError::Staging(format!(
                "{source} does not use the FileMaker member layout"
            )));
        }
        let state = self.state.lock();
        let rows = state.filemaker.get(&source).cloned().unwrap_or_default();
        Ok(state.unclaimed(source, &rows, limit))
    }

    async fn active_members(&self, limit: u32) -> Result<Vec<ActiveMemberRow>> {
        let state = self.state.lock();
        Ok(state.unclaimed(SourceKind::Active, &state.active, limit))
    }

    async fn mandates(&self, limit: u32) -> Result<Vec<MandateRow>> {
        let state = self.state.lock();
        Ok(state.unclaimed(SourceKind::Mandate, &state.mandates, limit))
    }

    async fn gifts(&self, limit: u32) -> Result<Vec<GiftRow>> {
        let state = self.state.lock();
        Ok(state.unclaimed(SourceKind::Gift, &state.gifts, limit))
    }

    async fn mark_processed(&self, source: SourceKind, key: &str) -> Result<()> {
        self.state.lock().processed.insert((source, key.to_string()));
        Ok(())
    }

    async fn persons_for(&self, lidmaatschap_id: i64) -> Result<Vec<PersonRow>> {
        Ok(self
            .state
            .lock()
            .persons
            .iter()
            .filter(|p| p.lidmaatschap_id == lidmaatschap_id)
            .cloned()
            .collect())
    }

    async fn count_persons(&self, lidmaatschap_id: i64) -> Result<i64> {
        Ok(self.persons_for(lidmaatschap_id).await?.len() as i64)
    }

    async fn record_address_member_outcome(
        &self,
        lidmaatschap_id: i64,
        contact_id: Option<i64>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state
            .processed
            .insert((SourceKind::AddressMember, lidmaatschap_id.to_string()));
        state
            .outcomes
            .insert(lidmaatschap_id, AddressMemberOutcome { contact_id });
        Ok(())
    }
}
