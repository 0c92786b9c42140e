//! Analytics boundary: the per-delivery telemetry record and the sink it is emitted to.

use serde::Serialize;

use crate::DeviceFingerprint;

/// Name of the telemetry event emitted after each delivery.
pub const SEGMENT_REQUEST_INFO_EVENT: &str = "autotune.SegmentRequestInfo";

/// Telemetry record describing one segment request, assembled at delivery time.
///
/// Device fields reuse the naming convention of the fingerprint wire format so server-side
/// analysis can join the two.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    /// When the record was assembled.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Segment that was delivered to the host.
    pub segment_id: String,
    /// Group that was delivered to the host.
    pub group_id: i64,
    /// Whether the fetch failed and a stale/default config was delivered instead.
    pub error: bool,
    /// Whether the player manually overrode the delivered settings.
    pub player_override: bool,
    /// Round-trip time from fetch to delivery, in seconds.
    pub request_latency: f64,
    /// Fingerprint the request was made with.
    #[serde(flatten)]
    pub fingerprint: DeviceFingerprint,
    /// Version of this crate.
    pub plugin_version: &'static str,
}

/// Status reported by the analytics collaborator for an emitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitStatus {
    /// The event was accepted.
    Ok,
    /// Analytics collection is disabled on this host.
    Disabled,
    /// The collaborator is shedding load and dropped the event.
    Throttled,
    /// The event was rejected as invalid.
    InvalidData,
}

/// A trait for forwarding finished telemetry records to the host's analytics system.
///
/// # Notes
///
/// `emit` is called from the engine's poll cycle, so implementations should not block the
/// calling thread. Implementations should not panic; a panicking sink is contained at the
/// delivery boundary and logged, but the event is lost.
pub trait AnalyticsSink {
    /// Forwards one finished event, returning the collaborator's accept status.
    fn emit(&self, event: TelemetryEvent) -> EmitStatus;
}

/// A sink that drops all events.
pub struct NoopAnalyticsSink;
impl AnalyticsSink for NoopAnalyticsSink {
    fn emit(&self, _event: TelemetryEvent) -> EmitStatus {
        EmitStatus::Disabled
    }
}

impl<T: Fn(TelemetryEvent)> AnalyticsSink for T {
    fn emit(&self, event: TelemetryEvent) -> EmitStatus {
        self(event);
        EmitStatus::Ok
    }
}
