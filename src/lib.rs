//! `autotune` is a remote-segmentation-configuration engine: given a device's hardware/software
//! fingerprint, it fetches a server-assigned configuration ("segment") over the network, exposes
//! the resulting settings to the host application through a one-shot callback, and falls back to
//! a cached or compiled-in default configuration whenever the network is unavailable or the
//! response is malformed.
//!
//! # Overview
//!
//! The crate is organized as a set of building blocks around one central type.
//!
//! [`SegmentConfig`] is the unit of configuration: an immutable value holding the segment id,
//! group id, settings mapping ([`Settings`] of tagged [`SettingValue`] scalars), and a content
//! hash. It is produced by parsing a server response, loading the on-disk cache, or from the
//! caller's compiled-in defaults; it is only ever replaced wholesale, never edited.
//!
//! [`ConfigCache`](config_cache::ConfigCache) persists the most recently accepted
//! `SegmentConfig` under an application-owned storage root, so a device that has been assigned a
//! segment once keeps its settings across launches without a network round trip.
//!
//! [`DeviceFingerprint`] is the request payload: a snapshot of device attributes taken from the
//! host's [`DeviceInfoProvider`](device::DeviceInfoProvider) at each fetch. Attributes the host
//! cannot determine are an explicit [`DeviceAttr::Unknown`](device::DeviceAttr) rather than an
//! empty-string convention.
//!
//! [`FetchClient`](fetch_client::FetchClient) performs the single-attempt network exchange on a
//! worker thread and reports exactly one [`FetchOutcome`](fetch_client::FetchOutcome) back over
//! a channel.
//!
//! [`ConfigEngine`] ties it together: `init` loads cache-or-defaults, `fetch` registers a
//! one-shot callback and issues the exchange, and the host's per-tick `poll` drains completions
//! and delivers the callback exactly once, followed by one telemetry record to the
//! [`AnalyticsSink`](telemetry::AnalyticsSink) collaborator. Every failure path still delivers a
//! valid configuration; degraded network conditions only show up as stale/default settings and
//! the telemetry error flag.
//!
//! # Example
//!
//! ```no_run
//! # use autotune::{ConfigEngine, EngineConfig, Settings};
//! let engine = ConfigEngine::new(EngineConfig::new()).unwrap();
//! engine.init(
//!     "sheet-id",
//!     "1.0.0",
//!     true,
//!     [("totalObjects".to_owned(), 10.into())].into_iter().collect::<Settings>(),
//! );
//! engine.fetch(|settings, group| {
//!     println!("got settings for group {}: {:?}", group, settings);
//! }).unwrap();
//! loop {
//!     engine.poll(); // once per host scheduler tick
//! #   break;
//! }
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

pub mod config_cache;
pub mod device;
pub mod experiment;
pub mod fetch_client;
pub mod telemetry;

mod engine;
mod error;
mod segment_config;
mod settings;

pub use config_cache::{ConfigCache, FixedStorageRoot, HostStorage};
pub use device::{DeviceAttr, DeviceFingerprint, DeviceInfoProvider, DeviceSnapshot, UnknownDeviceInfo};
pub use engine::{ConfigEngine, EngineConfig, FetchCallback};
pub use error::{Error, Result};
pub use experiment::{ExperimentTimer, NoopExperimentTimer};
pub use fetch_client::{FetchClient, FetchClientConfig, FetchOutcome, DEFAULT_ENDPOINT};
pub use segment_config::{
    SegmentConfig, CLIENT_DEFAULT_GROUP, CLIENT_DEFAULT_HASH, CLIENT_DEFAULT_SEGMENT,
};
pub use settings::{SettingValue, Settings};
pub use telemetry::{AnalyticsSink, EmitStatus, TelemetryEvent};
