//! Workflow event bus: shapes and fan-out.

pub mod bus;
pub mod model;

pub use bus::EventBus;
pub use model::{EventLevel, EventType, ReviewEventData, StreamEvent, StreamEventSubtype, WorkflowEvent};
