//! Batch execution: pre-validation and sandboxed subprocess execution for a
//! single batch of plan steps.

pub mod batch;

pub use batch::BatchExecutor;
