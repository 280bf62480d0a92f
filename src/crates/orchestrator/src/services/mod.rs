//! Service layer: the collaborators `api::handlers` calls into.
//!
//! `workflow` is this crate's orchestrator service; `recovery` reconciles
//! in-flight workflows on startup and sweeps retained event history.

pub mod recovery;
pub mod workflow;

pub use recovery::{reconcile_on_startup, spawn_retention_sweep};
pub use workflow::{git2_vcs_factory, OrchestratorService, VcsFactory};
