use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{RecordStore, RequestQuery, RunningStage, StoreError, INTAKE_MESSAGE, INTAKE_SYSTEM};
use crate::domain::{
    Event, NewEvent, NewRequest, RequestId, RequestSnapshot, Stage, StageFields, StageStatus,
    Vehicle,
};

#[derive(Default)]
struct Tables {
    requests: HashMap<RequestId, RequestSnapshot>,
    vehicles: HashMap<RequestId, Vehicle>,
    events: Vec<Event>,
    next_event_id: i64,
}

impl Tables {
    fn push_event(&mut self, id: &RequestId, event: NewEvent) {
        self.next_event_id += 1;
        self.events.push(Event {
            id: self.next_event_id,
            request_id: id.clone(),
            timestamp: Utc::now(),
            level: event.level,
            system: event.system,
            message: event.message,
            metadata: event.metadata,
        });
    }
}

/// Process-local store used by tests and dry runs.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a snapshot as-is. Test helper for seeding arbitrary states.
    pub async fn insert_snapshot(&self, snapshot: RequestSnapshot) {
        let mut tables = self.tables.write().await;
        tables.requests.insert(snapshot.id.clone(), snapshot);
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn create_request(&self, request: NewRequest) -> Result<RequestId, StoreError> {
        let id = RequestId::generate();
        let (snapshot, vehicle) = request.into_snapshot(id.clone(), Utc::now());
        let mut tables = self.tables.write().await;
        tables.requests.insert(id.clone(), snapshot);
        if let Some(vehicle) = vehicle {
            tables.vehicles.insert(id.clone(), vehicle);
        }
        tables.push_event(&id, NewEvent::info(INTAKE_SYSTEM, INTAKE_MESSAGE));
        Ok(id)
    }

    async fn get_request(&self, id: &RequestId) -> Result<RequestSnapshot, StoreError> {
        let tables = self.tables.read().await;
        tables
            .requests
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn get_vehicle(&self, id: &RequestId) -> Result<Option<Vehicle>, StoreError> {
        let tables = self.tables.read().await;
        if !tables.requests.contains_key(id) {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(tables.vehicles.get(id).cloned())
    }

    async fn update_stage_fields(&self, id: &RequestId, fields: StageFields) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let snapshot = tables
            .requests
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        fields.apply_to(snapshot, Utc::now());
        Ok(())
    }

    async fn claim_stage(
        &self,
        id: &RequestId,
        stage: Stage,
        expected: StageStatus,
        fields: StageFields,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let snapshot = tables
            .requests
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if snapshot.stages.status(stage) != expected {
            return Ok(false);
        }
        fields.apply_to(snapshot, Utc::now());
        Ok(true)
    }

    async fn append_event(&self, id: &RequestId, event: NewEvent) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.requests.contains_key(id) {
            return Err(StoreError::NotFound(id.clone()));
        }
        tables.push_event(id, event);
        Ok(())
    }

    async fn list_events(&self, id: &RequestId, limit: usize) -> Result<Vec<Event>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .iter()
            .rev()
            .filter(|e| &e.request_id == id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_requests(&self, query: RequestQuery) -> Result<Vec<RequestSnapshot>, StoreError> {
        let tables = self.tables.read().await;
        let mut found: Vec<RequestSnapshot> = tables
            .requests
            .values()
            .filter(|s| query.matches(s))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn find_running_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<RunningStage>, StoreError> {
        let tables = self.tables.read().await;
        let mut running = Vec::new();
        for snapshot in tables.requests.values() {
            for stage in Stage::ALL {
                let record = snapshot.stages.record(stage);
                if record.status != StageStatus::Running {
                    continue;
                }
                // A running row without a timestamp predates stamping; treat as stale.
                let since = record.updated_at.unwrap_or(snapshot.created_at);
                if since < cutoff {
                    running.push(RunningStage {
                        request_id: snapshot.id.clone(),
                        stage,
                        since,
                    });
                }
            }
        }
        Ok(running)
    }
}
