//! PhotoSync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `SyncRecord` and its `Local -> Syncing -> Synced` lifecycle
//! - **Use cases** - `IngestAssetsUseCase`, `ResetRecordsUseCase`, `StatusSummaryUseCase`
//! - **Port definitions** - Traits for adapters: `RecordStore`, `AssetProvider`, `Uploader`
//! - **Presentation feed** - Day-grouped, change-notified view over the store
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement.
//! Use cases orchestrate domain entities through port interfaces.

pub mod config;
pub mod domain;
pub mod feed;
pub mod ports;
pub mod usecases;

#[cfg(test)]
pub(crate) mod test_support;
