//! # Sync & Reconciliation Module
//!
//! Reconciles the canonical ecological store against external providers.
//!
//! ## Overview
//!
//! This module manages the lifecycle of provider syncs, including:
//! - Diffing canonical and provider snapshots into minimal
//!   insert/update/delete sets
//! - Mapping provider taxon identifiers to canonical taxa via synonym keys
//! - Applying entity diffs in dependency order inside one transaction
//! - Re-indexing provider-local association pairs to canonical ids
//! - Reporting per-entity counts and warnings to the caller
//!
//! ## Components
//!
//! - **Diff Engine** (`diff`): pure snapshot reconciliation, reused across
//!   all three entity collections
//! - **Snapshot Reader** (`snapshot`): canonical snapshots and comparable
//!   row types
//! - **Synonym Mapper** (`synonym`): provider taxon id resolution and
//!   retroactive remapping
//! - **Sync Run State Machine** (`run`): validated phase transitions
//! - **Source Registry** (`registry`): explicit provider-type dispatch
//! - **Sync Orchestrator** (`orchestrator`): the transactional multi-entity
//!   sync itself

pub mod diff;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod run;
pub mod snapshot;
pub mod synonym;

pub use diff::{diff, DiffSet, Reconcilable, UpdatePair};
pub use error::{Result, SyncError};
pub use orchestrator::{SyncConfig, SyncOrchestrator};
pub use registry::{SourceFactory, SourceRegistry};
pub use report::{EntityDelta, SyncReport};
pub use run::{SyncRun, SyncRunId, SyncState};
pub use snapshot::{OccurrenceRow, PlotOccurrenceRow, PlotRow};
pub use synonym::{RemapReport, SynonymMapper, TaxonResolution};
