//! lobstore reproduces deferred LOB reclamation: every update of a row's
//! large object appends a new version, superseded versions keep their
//! space until an explicit compaction, and closing the store compacts.
//!
//! [`LobStore`] is the storage engine, [`GrowthHarness`] drives the
//! repeated-update workload and samples how the file grows.

pub mod allocation;
pub mod backends;
pub mod config;
pub mod error;
pub mod harness;
pub mod lob_store;
pub mod log;
pub mod payload;
pub mod protocol_utils;
pub mod report;
pub mod row_table;
pub mod shared_store;

pub use backends::{DefaultLobBackend, FileLobBackend, MemoryLobBackend};
pub use config::HarnessConfig;
pub use error::{Error, Result};
pub use harness::{CompactionReport, GrowthHarness, RunReport, Sample};
pub use lob_store::{LobStore, SizeProbe, StoreConfig, StoreStats};
pub use log::{LobBackend, LobVersion, RowId};
pub use payload::{PayloadShape, RealtimeData, Workload};
pub use shared_store::SharedLobStore;
