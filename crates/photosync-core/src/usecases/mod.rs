//! Use cases (interactors) for PhotoSync
//!
//! This module contains the application use cases that orchestrate
//! domain entities and port interfaces. Use cases are thin coordinators
//! that delegate business rules to domain methods and I/O to ports.
//!
//! ## Use Cases
//!
//! - [`IngestAssetsUseCase`] - Mirror the local library into the record store
//! - [`ResetRecordsUseCase`] - Administrative "reset all" and "retry now"
//! - [`StatusSummaryUseCase`] - Per-status record counts

pub mod ingest_assets;
pub mod reset_records;
pub mod status_summary;

pub use ingest_assets::{IngestAssetsUseCase, IngestReport};
pub use reset_records::ResetRecordsUseCase;
pub use status_summary::{StatusSummary, StatusSummaryUseCase};
