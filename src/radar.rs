//! Group radar.
//!
//! Projects the live positions of group members onto a circular radar
//! centred on the user and rotated to the user's heading, then merges
//! markers that would overlap on the small watch screen.
//!
//! Screen convention: origin at the radar centre, x grows right, y grows
//! down, 0° (straight ahead) points up.

use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::config::RadarConfig;
use crate::geo::{bearing_and_distance, normalize_degrees, SimplePoint};

/// Live location of a group member as delivered by the group feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f32>,
    #[serde(default)]
    pub going_to: Option<String>,
    #[serde(default, alias = "help", alias = "sos")]
    pub needs_help: bool,
    #[serde(default, alias = "timestamp")]
    pub timestamp_ms: i64,
}

impl From<&MemberInfo> for SimplePoint {
    fn from(m: &MemberInfo) -> Self {
        SimplePoint { lat: m.lat, lon: m.lon, ele: m.altitude }
    }
}

/// A position on the radar in pixels relative to its centre.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScreenOffset {
    pub x: f32,
    pub y: f32,
}

impl ScreenOffset {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Offset at `radius` pixels in direction `degrees` (0 = up, clockwise).
    pub fn from_polar(degrees: f64, radius: f32) -> Self {
        let theta = degrees.to_radians() as f32;
        Self {
            x: radius * theta.sin(),
            y: -radius * theta.cos(),
        }
    }

    pub fn magnitude(&self) -> f32 {
        self.x.hypot(self.y)
    }

    pub fn distance_to(&self, other: &ScreenOffset) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Screen projection of one peer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolarResult {
    pub offset: ScreenOffset,
    /// The peer is beyond the radar range and drawn on the rim.
    pub is_capped: bool,
}

/// A peer ready to be drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarMarker {
    pub user_id: String,
    pub distance_m: f64,
    /// Bearing to the peer relative to the user's heading, degrees [0, 360).
    pub relative_bearing_deg: f64,
    pub polar: PolarResult,
    /// Where the marker is drawn; differs from `polar.offset` once fanned out.
    pub display_offset: ScreenOffset,
    pub needs_help: bool,
}

/// Markers merged because they would overlap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarCluster {
    pub centroid: ScreenOffset,
    pub members: Vec<RadarMarker>,
}

/// Scale a real-world distance and relative bearing into a radar offset.
///
/// A non-positive range (only reachable from a config built in code) draws
/// every peer on the rim and the user's own position at the centre.
pub fn project_polar(distance_m: f64, relative_bearing_deg: f64, config: &RadarConfig) -> PolarResult {
    let ratio = if config.max_distance_m > 0.0 {
        distance_m / config.max_distance_m
    } else if distance_m > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };
    let is_capped = ratio > 1.0;
    let radius = if is_capped { config.radius_px } else { ratio as f32 * config.radius_px };

    PolarResult {
        offset: ScreenOffset::from_polar(relative_bearing_deg, radius),
        is_capped,
    }
}

/// Project one peer relative to the user's position and heading.
pub fn project_peer(user: &SimplePoint, heading: f64, peer: &MemberInfo, config: &RadarConfig) -> RadarMarker {
    let (distance_m, bearing) = bearing_and_distance(user, &SimplePoint::from(peer));
    let relative_bearing_deg = normalize_degrees(bearing - heading);
    let polar = project_polar(distance_m, relative_bearing_deg, config);

    RadarMarker {
        user_id: peer.user_id.clone(),
        distance_m,
        relative_bearing_deg,
        polar,
        display_offset: polar.offset,
        needs_help: peer.needs_help,
    }
}

/// Project every peer except the user themself.
pub fn project_peers(
    user: &SimplePoint,
    heading: f64,
    peers: &[MemberInfo],
    config: &RadarConfig,
) -> Vec<RadarMarker> {
    peers
        .iter()
        .filter(|peer| config.self_id.as_deref() != Some(peer.user_id.as_str()))
        .map(|peer| project_peer(user, heading, peer, config))
        .collect()
}

/// Group markers closer than the cluster threshold and fan out the members
/// of every multi-member cluster around its centroid.
///
/// Overlap is transitive: two markers share a cluster when a chain of
/// markers, each within the threshold of the next, links them. The result
/// does not depend on input order apart from the order of clusters and of
/// members within a cluster, which follow the input.
pub fn cluster_markers(markers: Vec<RadarMarker>, config: &RadarConfig) -> Vec<RadarCluster> {
    let n = markers.len();
    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in i + 1..n {
            let gap = markers[i].polar.offset.distance_to(&markers[j].polar.offset);
            if gap <= config.cluster_threshold_px {
                union(&mut parent, i, j);
            }
        }
    }

    let mut slot_of_root: Vec<Option<usize>> = vec![None; n];
    let mut groups: Vec<Vec<RadarMarker>> = Vec::new();
    for (i, marker) in markers.into_iter().enumerate() {
        let root = find(&mut parent, i);
        let slot = *slot_of_root[root].get_or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(marker);
    }

    groups
        .into_iter()
        .map(|members| {
            let mut cluster = RadarCluster {
                centroid: centroid(&members),
                members,
            };
            fan_out(&mut cluster, config.fan_radius_px);
            cluster
        })
        .collect()
}

/// Spread the members of a multi-member cluster evenly on a circle around
/// its centroid, first member at 12 o'clock.
fn fan_out(cluster: &mut RadarCluster, radius: f32) {
    if cluster.members.len() < 2 {
        return;
    }
    let step = TAU / cluster.members.len() as f32;
    for (k, member) in cluster.members.iter_mut().enumerate() {
        let angle = step * k as f32;
        member.display_offset = ScreenOffset {
            x: cluster.centroid.x + radius * angle.sin(),
            y: cluster.centroid.y - radius * angle.cos(),
        };
    }
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        parent[ra.max(rb)] = ra.min(rb);
    }
}

fn centroid(members: &[RadarMarker]) -> ScreenOffset {
    let n = members.len() as f32;
    let (sx, sy) = members
        .iter()
        .fold((0.0, 0.0), |(sx, sy), m| (sx + m.polar.offset.x, sy + m.polar.offset.y));
    ScreenOffset { x: sx / n, y: sy / n }
}

/// Projection followed by clustering, one call per rendered frame.
pub fn build_radar(
    user: &SimplePoint,
    heading: f64,
    peers: &[MemberInfo],
    config: &RadarConfig,
) -> Vec<RadarCluster> {
    let markers = project_peers(user, heading, peers, config);
    log::trace!("radar frame: {} peers projected", markers.len());
    cluster_markers(markers, config)
}
