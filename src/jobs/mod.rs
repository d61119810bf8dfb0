//! # Jobs Module
//!
//! Asynchronous transcription jobs: what they look like, where they are kept, and
//! what runs them.
//!
//! ## Components:
//! - **model**: Job records, the status lifecycle and the updates that drive it
//! - **registry**: Thread-safe in-memory store with retention-based eviction
//! - **runner**: Spawns jobs in the background and records their outcome

pub mod model;
pub mod registry;
pub mod runner;

pub use model::{Job, JobId, JobStatus, Stage};
pub use registry::JobRegistry;
pub use runner::JobRunner;
