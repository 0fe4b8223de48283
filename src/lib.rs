//! `dewguard`: telemetry ingestion and condensation-risk computation for
//! cultivation spaces.
//!
//! Layout follows the Explicit Module Boundary Pattern (EMBP): each module
//! exposes a small surface, and this file re-exports what the routes and the
//! binary need so they do not reach into sibling internals.
//!
//! - [`psychro`]: dew point and temperature conversions
//! - [`store`]: sources, points and ingestion rules
//! - [`adapters`]: pull-based ingestion from device APIs
//! - [`risk`]: time-series condensation risk
//! - [`manual`]: single-sample worst-case estimate
//! - [`recommendations`]: mitigation messages
//! - [`routes`]: HTTP surface

pub mod adapters;
pub mod config;
pub mod errors;
pub mod manual;
pub mod models;
pub mod psychro;
pub mod recommendations;
pub mod risk;
pub mod routes;
pub mod schema;
pub mod store;

pub use adapters::{Device, DeviceAdapter, DeviceAdapters, PulseAdapter};
pub use config::Config;
pub use errors::TelemetryError;
pub use manual::{estimate_manual, ManualEstimate, ManualEstimateInput};
pub use models::{
    DecodedRow, IngestMode, IngestSummary, PointInput, PulseConfig, SourceConfig, SourceType,
    TelemetryPoint, TelemetrySource,
};
pub use risk::{compute_telemetry_risk, RiskBand, RiskSample, RiskSummary};
pub use store::{MemoryRepository, PgRepository, TelemetryRepository, TelemetryStore};

// ---

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub store: TelemetryStore,
    pub adapters: DeviceAdapters,
    pub config: Config,
}
