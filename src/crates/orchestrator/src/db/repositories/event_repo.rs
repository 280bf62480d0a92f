//! Workflow event repository: append-only log with per-workflow sequencing

use crate::db::connection::DatabasePool;
use crate::db::models::EventRow;
use crate::events::model::{EventLevel, EventType, WorkflowEvent};

/// Event repository for managing the workflow event log
pub struct EventRepository;

fn enum_to_string<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_value(value).expect("event enum always serializes") {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

fn enum_from_string<T: serde::de::DeserializeOwned>(value: &str) -> Result<T, sqlx::Error> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

impl EventRow {
    fn into_workflow_event(self) -> Result<WorkflowEvent, sqlx::Error> {
        Ok(WorkflowEvent {
            id: self.id,
            workflow_id: self.workflow_id,
            sequence: self.sequence,
            timestamp: self
                .timestamp
                .parse()
                .map_err(|e: chrono::ParseError| sqlx::Error::Decode(Box::new(e)))?,
            agent: self.agent,
            event_type: enum_from_string::<EventType>(&self.event_type)?,
            level: enum_from_string::<EventLevel>(&self.level)?,
            message: self.message,
            data: self
                .data
                .map(|d| serde_json::from_str(&d))
                .transpose()
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            correlation_id: self.correlation_id,
        })
    }
}

impl EventRepository {
    /// Append an already-sequenced event to the log. The sequence number
    /// itself is assigned by `EventBus::next_sequence` before this is
    /// called; this method persists it verbatim rather than issuing its own,
    /// so that in-process subscriber ordering and the persisted log agree.
    pub async fn append(pool: &DatabasePool, event: &WorkflowEvent) -> Result<(), sqlx::Error> {
        let data = event
            .data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        sqlx::query(
            "INSERT INTO workflow_events
                (id, workflow_id, sequence, timestamp, agent, event_type, level, message, data, correlation_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id)
        .bind(&event.workflow_id)
        .bind(event.sequence)
        .bind(event.timestamp.to_rfc3339())
        .bind(&event.agent)
        .bind(enum_to_string(&event.event_type))
        .bind(enum_to_string(&event.level))
        .bind(&event.message)
        .bind(&data)
        .bind(&event.correlation_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Highest sequence number recorded for a workflow, or 0 if none.
    pub async fn max_sequence(pool: &DatabasePool, workflow_id: &str) -> Result<i64, sqlx::Error> {
        let result: (Option<i64>,) =
            sqlx::query_as("SELECT MAX(sequence) FROM workflow_events WHERE workflow_id = ?")
                .bind(workflow_id)
                .fetch_one(pool)
                .await?;
        Ok(result.0.unwrap_or(0))
    }

    /// Ordered replay of every event with `sequence > after_sequence`.
    pub async fn events_after(
        pool: &DatabasePool,
        workflow_id: &str,
        after_sequence: i64,
    ) -> Result<Vec<WorkflowEvent>, sqlx::Error> {
        let rows: Vec<EventRow> = sqlx::query_as::<_, EventRow>(
            "SELECT * FROM workflow_events WHERE workflow_id = ? AND sequence > ? ORDER BY sequence ASC",
        )
        .bind(workflow_id)
        .bind(after_sequence)
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(EventRow::into_workflow_event).collect()
    }

    /// Full ordered event log for a workflow.
    pub async fn list_for_workflow(pool: &DatabasePool, workflow_id: &str) -> Result<Vec<WorkflowEvent>, sqlx::Error> {
        Self::events_after(pool, workflow_id, 0).await
    }

    /// Delete events older than `retention_days`, used by the periodic
    /// retention sweep in `services::recovery`.
    pub async fn delete_older_than(pool: &DatabasePool, retention_days: u32) -> Result<u64, sqlx::Error> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::days(retention_days as i64)).to_rfc3339();
        let result = sqlx::query("DELETE FROM workflow_events WHERE timestamp < ?")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::model::{EventLevel, EventType};

    async fn setup_db() -> sqlx::sqlite::SqlitePool {
        let pool = sqlx::sqlite::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE workflow_events (
                id TEXT PRIMARY KEY NOT NULL,
                workflow_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                agent TEXT NOT NULL,
                event_type TEXT NOT NULL,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                data TEXT,
                correlation_id TEXT
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn event(workflow_id: &str, sequence: i64) -> WorkflowEvent {
        WorkflowEvent {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            sequence,
            timestamp: chrono::Utc::now(),
            agent: "architect".to_string(),
            event_type: EventType::StageStarted,
            level: EventLevel::Info,
            message: "go".to_string(),
            data: None,
            correlation_id: None,
        }
    }

    #[tokio::test]
    async fn append_and_replay_in_order() {
        let pool = setup_db().await;
        EventRepository::append(&pool, &event("wf-1", 1)).await.unwrap();
        EventRepository::append(&pool, &event("wf-1", 2)).await.unwrap();
        EventRepository::append(&pool, &event("wf-2", 1)).await.unwrap();

        let events = EventRepository::list_for_workflow(&pool, "wf-1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 1);
        assert_eq!(events[1].sequence, 2);
    }

    #[tokio::test]
    async fn max_sequence_is_zero_for_unknown_workflow() {
        let pool = setup_db().await;
        assert_eq!(EventRepository::max_sequence(&pool, "nope").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn events_after_returns_only_newer_sequences() {
        let pool = setup_db().await;
        for seq in 1..=3 {
            EventRepository::append(&pool, &event("wf-1", seq)).await.unwrap();
        }
        let events = EventRepository::events_after(&pool, "wf-1", 1).await.unwrap();
        assert_eq!(events.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![2, 3]);
    }
}
