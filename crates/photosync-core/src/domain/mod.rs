//! Domain entities and business logic
//!
//! This module contains the core domain types for PhotoSync:
//! - Newtypes for type-safe identifiers and validated values
//! - The `SyncRecord` entity and its status lifecycle
//! - Domain-specific error types

pub mod errors;
pub mod newtypes;
pub mod record;

// Re-export commonly used types
pub use errors::DomainError;
pub use newtypes::*;
pub use record::{SyncRecord, SyncStatus};
