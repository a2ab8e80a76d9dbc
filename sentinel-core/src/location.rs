//! Ambient geolocation.
//!
//! Location is an OS capability the engine merely consumes: when no provider
//! is available the emergency payload carries null coordinates instead of
//! failing the dispatch.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A WGS-84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Source of the device's current position.
pub trait LocationProvider: Send + Sync + 'static {
    /// Latest known position, or `None` when geolocation is unavailable.
    fn current(&self) -> Option<GeoPoint>;
}

/// Shared provider handle.
pub type LocationHandle = Arc<dyn LocationProvider>;

/// Provider pinned to a fixed position (e.g. a configured facility address).
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub GeoPoint);

impl LocationProvider for FixedLocation {
    fn current(&self) -> Option<GeoPoint> {
        Some(self.0)
    }
}

/// Provider for runtimes without geolocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

impl LocationProvider for NoLocation {
    fn current(&self) -> Option<GeoPoint> {
        None
    }
}
