//! Geofence membership over a set of assigned sites.
//!
//! Containment is not mutually exclusive: overlapping fences may both
//! contain a position. The matcher reports the full contained set, nearest
//! first; the tie-break policy lives in the attendance state machine.

use crate::geo::{distance_m, Coordinate};
use crate::model::{Position, Site, SiteId};

/// One contained site, with the distance from the sampled position to its
/// center.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteMatch {
    pub site_id: SiteId,
    pub distance_m: f64,
}

/// The set of geofences an employee is currently assigned to.
#[derive(Debug, Clone, Default)]
pub struct GeofenceSet {
    sites: Vec<Site>,
}

impl GeofenceSet {
    pub fn new(sites: Vec<Site>) -> Self {
        Self { sites }
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn site(&self, id: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.id == id)
    }

    /// Whether `center` of `site` is within its radius of the coordinate.
    pub fn contains(coordinate: Coordinate, site: &Site) -> bool {
        distance_m(coordinate, site.center) <= site.radius_m
    }

    /// All sites whose geofence contains the position, sorted nearest
    /// first.
    pub fn matches(&self, position: &Position) -> Vec<SiteMatch> {
        let mut matched: Vec<SiteMatch> = self
            .sites
            .iter()
            .filter_map(|site| {
                let d = distance_m(position.coordinate, site.center);
                (d <= site.radius_m).then(|| SiteMatch {
                    site_id: site.id.clone(),
                    distance_m: d,
                })
            })
            .collect();
        matched.sort_by(|a, b| {
            a.distance_m
                .partial_cmp(&b.distance_m)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matched
    }
}
