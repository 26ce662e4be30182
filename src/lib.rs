//! horizon-datakit: relational store and visualization backend for EU
//! Horizon research-project extracts.
//!
//! The pipeline: raw CSV extracts → normalized store (`store`) → enriched
//! immutable snapshot (`snapshot`) → collaboration network (`network`) and
//! chart aggregations (`charts`).

pub mod charts;
pub mod clean;
pub mod config;
pub mod enrich;
pub mod error;
pub mod ingest;
pub mod layout;
pub mod network;
pub mod schema;
pub mod snapshot;
pub mod store;

pub use charts::FigureSpec;
pub use config::DataConfig;
pub use error::{HorizonError, Result};
pub use layout::LayoutOptions;
pub use network::{build_collaboration_network, FieldFilter, NetworkFilter, NetworkLayout};
pub use snapshot::{Snapshot, SnapshotCell};
pub use store::{HorizonStore, LoadReport};
