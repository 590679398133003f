//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`RecordStore`] - Persistent record state with change notifications
//! - [`AssetProvider`] - The local media library
//! - [`Uploader`] - The remote store

pub mod asset_provider;
pub mod record_store;
pub mod uploader;

pub use asset_provider::{AssetDescriptor, AssetProvider};
pub use record_store::{
    mutate, BulkMutation, ChangeKind, MutationOutcome, RecordFilter, RecordStore, StoreChange,
    CHANGE_CHANNEL_CAPACITY, MAX_MUTATION_ATTEMPTS,
};
pub use uploader::{StagedPayload, Uploader};
