//! # Audio Module
//!
//! Getting request audio onto local disk and off it again.
//!
//! ## Components:
//! - **source**: Acquisition from base64 payloads, remote URLs and uploads
//! - **scratch**: Scratch files and the memory-reclamation guard that bracket every job

pub mod scratch;
pub mod source;

pub use scratch::{ReclaimGuard, ScratchFile};
pub use source::{extension_from_filename, AudioFetcher, AudioSource};
