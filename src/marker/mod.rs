//! # Marker Reconciliation
//!
//! Consumer-side rule keeping two visually co-located map markers under
//! separate ownership:
//!
//! - the **live marker** belongs to the GPS stream and follows every
//!   published position;
//! - the **draggable marker** (search result, manually placed pin)
//!   belongs to the user. It is seeded from the first available fix
//!   exactly once, through a one-time latch; after that no GPS update
//!   may move it.
//!
//! The tracker does not enforce any of this - the split lives entirely
//! on the consuming side, which is why it is modeled as its own state
//! machine here rather than as tracker policy.

use tracing::debug;

use crate::geo::Coordinate;
use crate::location::PositionSample;

/// Marker state for one map view.
#[derive(Debug, Default)]
pub struct MarkerReconciler {
    live: Option<Coordinate>,
    draggable: Option<Coordinate>,
    /// One-time latch: once set, GPS data never moves the draggable
    /// marker again
    draggable_initialized: bool,
}

impl MarkerReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one `current_position` update.
    ///
    /// A present sample always moves the live marker. An absent one
    /// (sampling failed) keeps the last known live marker on screen;
    /// showing staleness differently is a rendering concern, not a
    /// position concern.
    pub fn apply_gps_update(&mut self, update: Option<&PositionSample>) {
        let Some(sample) = update else {
            return;
        };

        let coord = sample.coordinate();
        self.live = Some(coord);

        if !self.draggable_initialized && self.draggable.is_none() {
            self.draggable = Some(coord);
            self.draggable_initialized = true;
            debug!("draggable marker seeded once at {:.5}, {:.5}", coord.lat, coord.lng);
        }
    }

    /// The user dragged the marker somewhere.
    pub fn drag_to(&mut self, position: Coordinate) {
        self.draggable = Some(position);
        self.draggable_initialized = true;
    }

    /// The user picked a search result.
    pub fn select_search_result(&mut self, position: Coordinate) {
        self.draggable = Some(position);
        self.draggable_initialized = true;
    }

    /// Position of the live GPS marker, if any fix arrived yet.
    pub fn live_marker(&self) -> Option<Coordinate> {
        self.live
    }

    /// Position of the user-owned draggable marker.
    pub fn draggable_marker(&self) -> Option<Coordinate> {
        self.draggable
    }
}
