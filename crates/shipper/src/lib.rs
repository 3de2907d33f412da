#![doc = include_str!("../README.md")]

pub mod cache;
pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod enrich;
pub mod error;
pub mod offline;
pub mod pipeline;
pub mod sender;
pub mod store;
pub mod tailer;

pub use cache::ThreatCache;
pub use config::{EnrichmentSettings, ShipperConfig, ShipperConfigBuilder};
pub use dedup::DedupRegistry;
pub use enrich::{Enricher, IngestOutcome};
pub use error::ShipperError;
pub use offline::OfflineQueue;
pub use pipeline::{PipelineState, ShipperPipeline, ShipperPipelineBuilder};
pub use sender::{DeliveryWorker, WorkerStats};
pub use tailer::FileTailer;
