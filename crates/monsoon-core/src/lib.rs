//! # monsoon-core
//!
//! **Live host telemetry, windowed.**
//!
//! `monsoon-core` turns a push stream of host metric snapshots (per-core CPU
//! usage, memory, processes) into bounded per-entity history and
//! display-ready projections.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use monsoon_core::{
//!     DashboardConfig, NativeProvider, SubscriptionController, Topic, ViewState,
//! };
//!
//! let config = DashboardConfig::default();
//! let mut cpu = SubscriptionController::new(
//!     Arc::new(NativeProvider::new()),
//!     Topic::CpuCores,
//!     config.retention(),
//!     config.params(),
//! );
//! cpu.start().expect("provider available");
//!
//! std::thread::sleep(std::time::Duration::from_secs(2));
//! cpu.pump();
//! let rows = cpu.project(&ViewState::for_topic(Topic::CpuCores));
//! println!("{} cores", rows.len());
//! cpu.stop();
//! ```
//!
//! ## Architecture
//!
//! Provider → sink → [`SubscriptionController`] → [`Reconciler`] →
//! [`HistoryStore`] → [`project`] → presentation
//!
//! Two projection modes:
//! - **Instantaneous**: rows of the latest snapshot, filtered, stably sorted
//!   and limited to the visible columns.
//! - **History**: each entity's window of up to 60 samples (FIFO), in
//!   first-seen order.
//!
//! Switching modes only changes what is read; history is never reset.

pub mod config;
pub mod error;
pub mod projector;
pub mod provider;
pub mod reconcile;
pub mod session;
pub mod snapshot;
pub mod static_info;
pub mod store;
pub mod subscription;
pub mod topic;
pub mod view;

pub use config::DashboardConfig;
pub use error::{Error, Result};
pub use projector::{
    Cell, CellValue, DisplayRow, Projection, SeriesView, filter_records, project, sort_records,
};
pub use provider::scripted::{ProviderCall, ReplayFile};
pub use provider::{
    Delivery, DeliveryBody, MetricsProvider, NativeProvider, ScriptedProvider, SnapshotSink,
    TopicParams,
};
pub use reconcile::{ReconcileStats, Reconciler, reconcile};
pub use session::{SessionId, SessionState, SubscriptionSession};
pub use snapshot::{EntityKey, EntityRecord, Sample, Snapshot, unix_ms_now};
pub use static_info::{CacheInfo, CpuInfo, StaticInfo, SystemInfo, format_bytes, format_uptime};
pub use store::{DEFAULT_CAPACITY, FieldStats, HistoryStore, Retention, Series};
pub use subscription::{PumpStats, SubscriptionController};
pub use topic::{Column, ColumnSource, StaticTopic, Topic};
pub use view::{SortDirection, SortKey, ViewMode, ViewState};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
