//! Non-blocking fan-out of workflow events
//!
//! Two audiences: synchronous in-process subscribers (registered in-proc,
//! called in registration order, never allowed to block or propagate a
//! failure to the emitter) and a `tokio::sync::broadcast`-backed socket
//! fan-out consumed by `api::ws`. Generalizes
//! `api::ws::pool::ConnectionPool`'s connection-tracking style and
//! `api::ws::events::RealtimeEvent`'s tagged-event shape to this domain's
//! closed event set.

use super::model::{EventLevel, EventType, StreamEvent, StreamEventSubtype, WorkflowEvent};
use crate::db::{repositories::EventRepository, DatabasePool};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use tracing::error;

type Handler = Box<dyn Fn(&WorkflowEvent) + Send + Sync>;

pub struct EventBus {
    pool: Option<Arc<DatabasePool>>,
    subscribers: DashMap<u64, Handler>,
    next_subscriber_id: AtomicU64,
    sequence_counters: DashMap<String, i64>,
    socket_tx: broadcast::Sender<WorkflowEvent>,
    stream_tx: broadcast::Sender<StreamEvent>,
    trace_retention_days: AtomicU32,
    include_tool_results: AtomicBool,
    pending: Mutex<JoinSet<()>>,
}

impl EventBus {
    pub fn new(pool: Option<Arc<DatabasePool>>) -> Self {
        let (socket_tx, _) = broadcast::channel(1024);
        let (stream_tx, _) = broadcast::channel(1024);
        Self {
            pool,
            subscribers: DashMap::new(),
            next_subscriber_id: AtomicU64::new(1),
            sequence_counters: DashMap::new(),
            socket_tx,
            stream_tx,
            trace_retention_days: AtomicU32::new(0),
            include_tool_results: AtomicBool::new(false),
            pending: Mutex::new(JoinSet::new()),
        }
    }

    pub fn socket_receiver(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.socket_tx.subscribe()
    }

    pub fn stream_receiver(&self) -> broadcast::Receiver<StreamEvent> {
        self.stream_tx.subscribe()
    }

    /// Register a non-blocking in-process handler. Returns an id for
    /// [`Self::unsubscribe`].
    pub fn subscribe(&self, handler: Handler) -> u64 {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, handler);
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.remove(&id);
    }

    /// Toggle stream-event persistence. 0 disables it.
    pub fn configure(&self, trace_retention_days: u32, include_tool_results: bool) {
        self.trace_retention_days.store(trace_retention_days, Ordering::Relaxed);
        self.include_tool_results.store(include_tool_results, Ordering::Relaxed);
    }

    fn next_sequence(&self, workflow_id: &str) -> i64 {
        let mut entry = self.sequence_counters.entry(workflow_id.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Build and emit a `WorkflowEvent` for `workflow_id`, issuing the next
    /// per-workflow sequence number, persisting it (if a pool is attached),
    /// fanning it out to in-process subscribers synchronously, and
    /// scheduling the socket broadcast as a tracked background task.
    pub async fn emit_workflow(
        &self,
        workflow_id: &str,
        agent: &str,
        event_type: EventType,
        level: EventLevel,
        message: String,
        data: Option<serde_json::Value>,
    ) {
        let event = WorkflowEvent {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            sequence: self.next_sequence(workflow_id),
            timestamp: chrono::Utc::now(),
            agent: agent.to_string(),
            event_type,
            level,
            message,
            data,
            correlation_id: None,
        };
        self.emit(event).await;
    }

    /// Persist (if configured) and fan out an already-constructed event.
    pub async fn emit(&self, event: WorkflowEvent) {
        if let Some(pool) = &self.pool {
            if let Err(e) = EventRepository::append(pool, &event).await {
                error!("failed to persist workflow event {}: {}", event.id, e);
            }
        }

        for entry in self.subscribers.iter() {
            let handler = entry.value();
            let id = *entry.key();
            if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&event))) {
                error!("event subscriber {} panicked handling {:?}: {:?}", id, event.event_type, panic);
            }
        }

        let tx = self.socket_tx.clone();
        let to_send = event.clone();
        let mut pending = self.pending.lock().await;
        pending.spawn(async move {
            // send() only errors when there are no receivers, which is routine.
            let _ = tx.send(to_send);
        });
    }

    /// Fan out an ephemeral stream event. Converts to a persisted
    /// `WorkflowEvent` when trace retention is enabled; always reaches
    /// streaming socket subscribers. Tool-result events are dropped unless
    /// explicitly opted into via [`Self::configure`].
    pub async fn emit_stream(&self, event: StreamEvent) {
        if event.subtype == StreamEventSubtype::ToolResult && !self.include_tool_results.load(Ordering::Relaxed) {
            return;
        }

        if self.trace_retention_days.load(Ordering::Relaxed) > 0 {
            let workflow_event = WorkflowEvent {
                id: uuid::Uuid::new_v4().to_string(),
                workflow_id: event.workflow_id.clone(),
                sequence: self.next_sequence(&event.workflow_id),
                timestamp: event.timestamp,
                agent: event.agent.clone(),
                event_type: EventType::Stream,
                level: EventLevel::Trace,
                message: event.content.clone(),
                data: event.tool_input.clone(),
                correlation_id: None,
            };
            self.emit(workflow_event).await;
        }

        let tx = self.stream_tx.clone();
        let mut pending = self.pending.lock().await;
        pending.spawn(async move {
            let _ = tx.send(event);
        });
    }

    /// Await every in-flight broadcast task, for orderly shutdown.
    pub async fn shutdown(&self) {
        let mut pending = self.pending.lock().await;
        while pending.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn subscriber_receives_events_in_order() {
        let bus = EventBus::new(None);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        bus.subscribe(Box::new(move |_event| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        bus.emit_workflow("wf-1", "architect", EventType::StageStarted, EventLevel::Info, "go".into(), None)
            .await;
        bus.emit_workflow("wf-1", "architect", EventType::StageCompleted, EventLevel::Info, "done".into(), None)
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn sequence_numbers_are_per_workflow_and_monotonic() {
        let bus = EventBus::new(None);
        let seqs = Arc::new(std::sync::Mutex::new(Vec::new()));
        let captured = seqs.clone();
        bus.subscribe(Box::new(move |event| {
            captured.lock().unwrap().push(event.sequence);
        }));

        for _ in 0..3 {
            bus.emit_workflow("wf-1", "a", EventType::StageStarted, EventLevel::Info, "x".into(), None)
                .await;
        }
        bus.emit_workflow("wf-2", "a", EventType::StageStarted, EventLevel::Info, "x".into(), None)
            .await;

        assert_eq!(*seqs.lock().unwrap(), vec![1, 2, 3, 1]);
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn a_panicking_subscriber_does_not_stop_delivery() {
        let bus = EventBus::new(None);
        bus.subscribe(Box::new(|_event| panic!("boom")));
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        bus.subscribe(Box::new(move |_event| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        bus.emit_workflow("wf-1", "a", EventType::StageStarted, EventLevel::Info, "x".into(), None)
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn tool_result_stream_events_are_suppressed_by_default() {
        let bus = EventBus::new(None);
        let mut rx = bus.stream_receiver();

        bus.emit_stream(StreamEvent {
            workflow_id: "wf-1".into(),
            agent: "developer".into(),
            subtype: StreamEventSubtype::ToolResult,
            content: "output".into(),
            tool_name: Some("bash".into()),
            tool_input: None,
            timestamp: chrono::Utc::now(),
        })
        .await;
        bus.shutdown().await;

        assert!(rx.try_recv().is_err());
    }
}
