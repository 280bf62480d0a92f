//! External collaborator contracts: VCS snapshot/restore and the LLM driver.
//!
//! Both are specified as narrow traits the graph nodes depend on, with a
//! concrete implementation behind each (`Git2VcsAdapter`, `LlmDriver`), so
//! tests can substitute an in-memory fake without touching a real worktree
//! or LLM endpoint.

pub mod driver;
pub mod vcs;

pub use driver::Driver;
pub use vcs::VcsAdapter;
