//! The proximity check run on every document update.

use crate::feed::{ChangeBatch, UpdateHandler};
use crate::geodesy::{Coordinate, Geodesy, GeodesyError, KarneyGeodesic};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Alert line printed when the truck is within the threshold.
pub const NEARBY_ALERT: &str = "*** ALERT: TRUCK IS NEARBY! ***";
/// Status line printed when the truck is farther than the threshold.
pub const NOT_NEARBY: &str = "Truck is not nearby.";
/// Status line printed when a snapshot lacks coordinates.
pub const WAITING: &str = "Waiting for valid truck coordinates...";

/// Destination for human-readable status lines.
pub trait StatusSink: Send + Sync {
    /// Emit one line.
    fn line(&self, line: &str);
}

/// Writes status lines to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl StatusSink for ConsoleSink {
    fn line(&self, line: &str) {
        println!("{}", line);
    }
}

/// Collects status lines in memory.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl BufferSink {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Whether any line equals `needle` after trimming.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.trim() == needle)
    }

    /// How many lines equal `needle` after trimming.
    pub fn count(&self, needle: &str) -> usize {
        self.lines.lock().iter().filter(|l| l.trim() == needle).count()
    }
}

impl StatusSink for BufferSink {
    fn line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

/// Raw `latitude`/`longitude` values taken from a snapshot.
///
/// Both keys are present and non-null; whether they are usable numbers is
/// decided when the distance is computed.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedPosition {
    latitude: Value,
    longitude: Value,
}

impl TrackedPosition {
    /// Extract the position, or `None` if either key is missing or null.
    pub fn from_fields(fields: &Map<String, Value>) -> Option<Self> {
        let present = |key: &str| fields.get(key).filter(|v| !v.is_null()).cloned();
        Some(Self {
            latitude: present("latitude")?,
            longitude: present("longitude")?,
        })
    }

    /// Interpret the raw values as a coordinate.
    ///
    /// Numbers are taken as-is and numeric strings are parsed. Anything else
    /// is an error.
    pub fn coordinate(&self) -> Result<Coordinate, GeodesyError> {
        Ok(Coordinate::new(
            as_degrees("latitude", &self.latitude)?,
            as_degrees("longitude", &self.longitude)?,
        ))
    }
}

impl fmt::Display for TrackedPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

fn as_degrees(field: &'static str, value: &Value) -> Result<f64, GeodesyError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| GeodesyError::NotANumber {
        field,
        value: value.to_string(),
    })
}

/// Outcome of evaluating one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum ProximityStatus {
    /// Latitude or longitude missing.
    Waiting,
    /// Within the threshold.
    Nearby {
        /// Computed distance in meters
        distance_m: f64,
    },
    /// Beyond the threshold.
    NotNearby {
        /// Computed distance in meters
        distance_m: f64,
    },
    /// The distance could not be computed.
    Failed {
        /// Failure detail
        detail: String,
    },
}

impl ProximityStatus {
    /// Whether this is a nearby alert.
    pub fn is_nearby(&self) -> bool {
        matches!(self, Self::Nearby { .. })
    }

    /// Computed distance, if there is one.
    pub fn distance_m(&self) -> Option<f64> {
        match self {
            Self::Nearby { distance_m } | Self::NotNearby { distance_m } => Some(*distance_m),
            _ => None,
        }
    }
}

/// Update handler that reports whether the tracked truck is near a fixed
/// reference location.
///
/// Each snapshot is evaluated on its own and nothing carries over between
/// calls. Bad data in one snapshot is reported and the next one is processed
/// normally.
///
/// # Examples
///
/// ```rust
/// use truck_tracker::geodesy::Coordinate;
/// use truck_tracker::handler::{BufferSink, ProximityHandler, ProximityStatus};
/// use truck_tracker::feed::{ChangeBatch, Snapshot};
/// use std::sync::Arc;
///
/// let sink = BufferSink::new();
/// let handler = ProximityHandler::new(Coordinate::new(0.0, 0.0), 10.0)
///     .with_sink(Arc::new(sink.clone()));
///
/// let batch = ChangeBatch::of(vec![Snapshot::from_json(
///     "location",
///     serde_json::json!({"latitude": 0.0, "longitude": 0.0}),
/// )]);
/// let statuses = handler.handle(&batch);
///
/// assert!(statuses[0].is_nearby());
/// assert!(sink.contains("*** ALERT: TRUCK IS NEARBY! ***"));
/// ```
#[derive(Clone)]
pub struct ProximityHandler {
    reference: Coordinate,
    threshold_m: f64,
    geodesy: Arc<dyn Geodesy>,
    sink: Arc<dyn StatusSink>,
}

impl ProximityHandler {
    /// Handler using the WGS-84 geodesic and printing to stdout.
    pub fn new(reference: Coordinate, threshold_m: f64) -> Self {
        Self {
            reference,
            threshold_m,
            geodesy: Arc::new(KarneyGeodesic),
            sink: Arc::new(ConsoleSink),
        }
    }

    /// Use a different distance provider.
    pub fn with_geodesy(mut self, geodesy: Arc<dyn Geodesy>) -> Self {
        self.geodesy = geodesy;
        self
    }

    /// Send status lines somewhere other than stdout.
    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The fixed observer location.
    pub fn reference(&self) -> Coordinate {
        self.reference
    }

    /// The alert distance in meters.
    pub fn threshold_m(&self) -> f64 {
        self.threshold_m
    }

    /// Evaluate one snapshot's fields without printing anything.
    pub fn evaluate(&self, fields: &Map<String, Value>) -> ProximityStatus {
        match TrackedPosition::from_fields(fields) {
            None => ProximityStatus::Waiting,
            Some(position) => self.measure(&position),
        }
    }

    fn measure(&self, position: &TrackedPosition) -> ProximityStatus {
        let distance = position
            .coordinate()
            .and_then(|truck| self.geodesy.distance_m(self.reference, truck));

        match distance {
            Ok(distance_m) if distance_m <= self.threshold_m => {
                ProximityStatus::Nearby { distance_m }
            }
            Ok(distance_m) => ProximityStatus::NotNearby { distance_m },
            Err(e) => ProximityStatus::Failed {
                detail: e.to_string(),
            },
        }
    }

    /// Evaluate and report every snapshot in the batch, in order.
    pub fn handle(&self, batch: &ChangeBatch) -> Vec<ProximityStatus> {
        batch
            .snapshots
            .iter()
            .map(|snapshot| {
                self.sink.line("");
                self.sink.line("--- Received Update ---");

                let status = match TrackedPosition::from_fields(&snapshot.fields) {
                    None => ProximityStatus::Waiting,
                    Some(position) => {
                        self.sink.line(&format!("Truck Location: {}", position));
                        self.sink.line(&format!("Your Location:  {}", self.reference));
                        self.measure(&position)
                    }
                };
                self.report(&status);

                tracing::debug!(document = %snapshot.id, ?status, "evaluated snapshot");
                status
            })
            .collect()
    }

    fn report(&self, status: &ProximityStatus) {
        match status {
            ProximityStatus::Waiting => self.sink.line(WAITING),
            ProximityStatus::Nearby { distance_m } => {
                self.sink.line(&format!("Distance: {:.2} meters", distance_m));
                self.sink.line("");
                self.sink.line(NEARBY_ALERT);
                self.sink.line("");
            }
            ProximityStatus::NotNearby { distance_m } => {
                self.sink.line(&format!("Distance: {:.2} meters", distance_m));
                self.sink.line(NOT_NEARBY);
            }
            ProximityStatus::Failed { detail } => {
                self.sink
                    .line(&format!("Could not calculate distance. Error: {}", detail));
            }
        }
    }

    /// Lines announcing what is being watched.
    pub fn banner(&self) -> Vec<String> {
        vec![
            String::new(),
            "Starting tracker...".to_string(),
            format!(
                "Watching for updates from the truck. You are at {}.",
                self.reference
            ),
            format!(
                "Will notify when truck is within {} meters.",
                self.threshold_m
            ),
            "-".repeat(50),
        ]
    }

    /// Print the banner to this handler's sink.
    pub fn announce(&self) {
        for line in self.banner() {
            self.sink.line(&line);
        }
    }

    /// Print an arbitrary line to this handler's sink.
    pub fn say(&self, line: &str) {
        self.sink.line(line);
    }
}

impl UpdateHandler for ProximityHandler {
    fn on_snapshot(&self, batch: &ChangeBatch) {
        self.handle(batch);
    }
}
