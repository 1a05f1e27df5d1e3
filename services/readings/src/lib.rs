//! Readings Service
//!
//! Backend for the meter reading review dashboard. Inspection sessions are
//! uploaded to S3 as one folder per session (`metadata.json` plus the full
//! meter photo and per-dial crops), filed under a folder per capture source
//! and review status. This service rebuilds reading records from those
//! folders on every request and relabels sessions by moving their folders
//! between status prefixes.
//!
//! ## Architecture
//!
//! ```text
//! S3 Bucket                                          HTTP API
//! ┌──────────────────────┐                          ┌──────────────┐
//! │ [GO95/]f_correct/    │    ┌──────────────┐      │ /api/readings│
//! │   <session>/         │───▶│ Session      │      │ /api/counts  │
//! │     metadata.json    │    │ Locator      │      └──────────────┘
//! │     original.jpg     │    └──────────────┘             ▲
//! │     dial_1.jpg       │           │                     │
//! │ f_incorrect/ ...     │           ▼                     │
//! │ s_incorrect_labeled/ │    ┌──────────────┐      ┌──────────────┐
//! └──────────────────────┘    │ Session      │─────▶│ Aggregator   │
//!            ▲                │ Parser       │      └──────────────┘
//!            │                └──────────────┘
//!            │  copy + delete
//!     ┌──────────────┐                              ┌──────────────┐
//!     │ Status Mover │◀─────────────────────────────│ /bulk-move   │
//!     └──────────────┘                              └──────────────┘
//! ```

pub mod aggregator;
pub mod api;
pub mod config;
pub mod layout;
pub mod locator;
pub mod memory_store;
pub mod mover;
pub mod parser;
pub mod reading;
pub mod s3_store;
pub mod store;
pub mod work_types;

pub use aggregator::{ReadingsAggregator, Scope};
pub use api::{create_router, start_api_server, AppState};
pub use config::Config;
pub use layout::{Layout, SourceFilter, SourceType, Status};
pub use locator::SessionLocator;
pub use memory_store::{InMemoryObjectStore, StoreOperation};
pub use mover::{BulkMoveReport, MoveItemResult, MoveOutcome, MoveRequest, StatusMover};
pub use parser::{ImageKind, ScanContext, SessionParser};
pub use reading::{
    ConditionCodeCount, DialDetail, ImageReference, ReadingCounts, SessionRecord, StatusBreakdown,
    WorkTypeStats,
};
pub use s3_store::S3ObjectStore;
pub use store::{ObjectStore, ObjectSummary, StoreError};
pub use work_types::{WorkType, WorkTypeCatalog};
