//! The indoor building model: a building broken down into floors, rooms, and
//! vertical connections, all sharing one arena of points. The `transform`
//! module cleans up the geometry in place.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use geom::{Distance, LonLat};
use situtil::Tags;

use crate::osm::{NodeID, RelationID, WayID};

mod geometry;
mod level;
pub mod osm;
pub mod transform;

pub use crate::geometry::WallSection;
pub use crate::level::{format_float, format_levels, parse_levels, Level};
pub use crate::transform::ConsolidateOptions;

/// One point of a building, shared between every boundary that touches it.
/// Rooms and connections store `NodeID`s; the building's arena owns the
/// actual nodes, so moving or merging a point here updates every wall built
/// on it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndoorNode {
    pub id: NodeID,
    pub pt: LonLat,
    pub levels: BTreeSet<Level>,
    pub tags: Tags,
}

impl IndoorNode {
    pub fn in_proximity(&self, other: &IndoorNode, threshold: Distance) -> bool {
        self.pt.gps_dist(other.pt) < threshold
    }

    /// Deterministically fuses a cluster of nodes into one. `members` must be
    /// sorted by ascending id; tag conflicts resolve last-write-wins in that
    /// order. The result keeps the lowest real (non-synthetic) member id, or
    /// `fallback_id` when every member is synthetic. The position is the
    /// arithmetic mean and the level sets union.
    ///
    /// Members farther than `warn_beyond` apart merge anyway, with a warning.
    /// Transitive chaining can legitimately stretch a cluster beyond the
    /// pairwise threshold.
    pub fn merged(
        members: &[&IndoorNode],
        fallback_id: NodeID,
        warn_beyond: Distance,
    ) -> IndoorNode {
        assert!(!members.is_empty(), "Can't merge 0 nodes");
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                let dist = a.pt.gps_dist(b.pt);
                if dist > warn_beyond {
                    warn!("Merging {} and {}, which are {} apart", a.id, b.id, dist);
                }
            }
        }

        let id = members
            .iter()
            .map(|n| n.id)
            .filter(|id| !id.is_synthetic())
            .min()
            .unwrap_or(fallback_id);
        let pt = LonLat::center(&members.iter().map(|n| n.pt).collect::<Vec<_>>());
        let mut levels = BTreeSet::new();
        let mut tags = Tags::empty();
        for n in members {
            levels.extend(n.levels.iter().cloned());
            tags.extend(n.tags.clone());
        }
        IndoorNode {
            id,
            pt,
            levels,
            tags,
        }
    }

    pub fn osm_tags(&self) -> Tags {
        let mut tags = self.tags.clone();
        if !self.levels.is_empty() {
            tags.insert(osm::LEVEL, format_levels(&self.levels));
        }
        tags
    }
}

/// What a closed boundary represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndoorClass {
    Room,
    Area,
    Corridor,
    /// The full outline of one floor.
    Level,
}

impl fmt::Display for IndoorClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IndoorClass::Room => write!(f, "room"),
            IndoorClass::Area => write!(f, "area"),
            IndoorClass::Corridor => write!(f, "corridor"),
            IndoorClass::Level => write!(f, "level"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Room {
    pub id: WayID,
    pub levels: BTreeSet<Level>,
    pub class: IndoorClass,
    /// Closed ring of points; the first id repeats at the end.
    pub boundary: Vec<NodeID>,
    /// In meters, but stored as the raw tag number for round-tripping.
    pub height: Option<f64>,
    pub name: Option<String>,
    pub reference: Option<String>,
    pub tags: Tags,
}

impl Room {
    pub fn osm_tags(&self) -> Tags {
        let mut tags = self.tags.clone();
        tags.insert(osm::INDOOR, self.class.to_string());
        tags.insert(osm::LEVEL, format_levels(&self.levels));
        if let Some(h) = self.height {
            tags.insert(osm::HEIGHT, format_float(h));
        }
        if let Some(n) = &self.name {
            tags.insert(osm::NAME, n.clone());
        }
        if let Some(r) = &self.reference {
            tags.insert(osm::REF, r.clone());
        }
        tags
    }
}

/// How a vertical connection moves people between levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionKind {
    Stairs,
    Elevator,
    /// An escalator or moving walkway.
    Conveyor,
}

/// A stairwell, elevator shaft, or escalator. Before consolidation each one
/// covers a single level (a fragment); afterwards, the merged connection
/// spans every level it serves.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LevelConnection {
    pub id: WayID,
    pub kind: ConnectionKind,
    pub class: IndoorClass,
    pub levels: BTreeSet<Level>,
    /// Levels whose floor relation references this connection directly.
    pub level_refs: BTreeSet<Level>,
    pub boundary: Vec<NodeID>,
    pub tags: Tags,
}

impl LevelConnection {
    /// The boundary points carrying actual shaft geometry. Points tagged as
    /// decorative (doors, windows) sit wherever the mapper drew the opening
    /// and are excluded from shape comparison.
    pub fn simple_nodes(
        &self,
        nodes: &BTreeMap<NodeID, IndoorNode>,
        decorative_tags: &[String],
    ) -> Vec<NodeID> {
        self.boundary
            .iter()
            .filter(|id| {
                let tags = &nodes[*id].tags;
                !decorative_tags.iter().any(|key| tags.contains_key(key))
            })
            .cloned()
            .collect()
    }

    /// True if every simple node of `self` has a simple node of `other`
    /// within `threshold`. One-directional: a small elevator shaft overlaps
    /// the bigger stairwell around it, not vice versa.
    pub fn overlaps(
        &self,
        other: &LevelConnection,
        nodes: &BTreeMap<NodeID, IndoorNode>,
        threshold: Distance,
        decorative_tags: &[String],
    ) -> bool {
        let mine = self.simple_nodes(nodes, decorative_tags);
        let theirs = other.simple_nodes(nodes, decorative_tags);
        if mine.is_empty() || theirs.is_empty() {
            return false;
        }
        mine.iter().all(|a| {
            theirs
                .iter()
                .any(|b| nodes[a].in_proximity(&nodes[b], threshold))
        })
    }

    pub fn osm_tags(&self) -> Tags {
        let mut tags = self.tags.clone();
        match self.kind {
            ConnectionKind::Stairs => {
                tags.insert(osm::STAIRS, "yes");
            }
            ConnectionKind::Elevator => {
                tags.insert(osm::HIGHWAY, "elevator");
            }
            ConnectionKind::Conveyor => {
                tags.insert(osm::STAIRS, "yes");
                tags.insert(osm::CONVEYING, "yes");
            }
        }
        tags.insert(osm::INDOOR, self.class.to_string());
        tags.insert(osm::LEVEL, format_levels(&self.levels));
        tags
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Floor {
    pub id: RelationID,
    pub level: Level,
    pub height: Option<f64>,
    pub name: Option<String>,
    /// The outline of the whole floor, when mapped.
    pub shell: Option<Room>,
    pub tags: Tags,
}

impl Floor {
    pub fn osm_tags(&self) -> Tags {
        let mut tags = self.tags.clone();
        tags.insert(osm::LEVEL, format!("{}", self.level));
        if let Some(h) = self.height {
            tags.insert(osm::HEIGHT, format_float(h));
        }
        if let Some(n) = &self.name {
            tags.insert(osm::NAME, n.clone());
        }
        tags
    }
}

/// Something owning a boundary ring in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OwnerID {
    /// An index into `Building::rooms`.
    Room(usize),
    /// An index into `Building::connections`.
    Connection(usize),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Building {
    pub id: RelationID,
    pub min_level: i64,
    pub max_level: i64,
    pub name: Option<String>,
    pub height: Option<f64>,
    pub tags: Tags,

    /// Every point of the building, keyed by id. All boundaries reference
    /// into this arena.
    pub nodes: BTreeMap<NodeID, IndoorNode>,
    pub rooms: Vec<Room>,
    pub connections: Vec<LevelConnection>,
    pub floors: Vec<Floor>,
    /// Point features (doors in walls, amenities) that stand on their own.
    pub pois: Vec<NodeID>,
    pub entrances: Vec<NodeID>,
    pub outline: Option<WayID>,
    pub innerline: Option<WayID>,

    /// The element ids present when the building was extracted. The diff
    /// export compares against these to classify creates and deletes.
    pub original_nodes: BTreeSet<NodeID>,
    pub original_ways: BTreeSet<WayID>,
    pub original_relations: BTreeSet<RelationID>,

    next_synthetic_id: i64,
}

impl Building {
    pub fn new(id: RelationID, min_level: i64, max_level: i64) -> Building {
        Building {
            id,
            min_level,
            max_level,
            name: None,
            height: None,
            tags: Tags::empty(),
            nodes: BTreeMap::new(),
            rooms: Vec::new(),
            connections: Vec::new(),
            floors: Vec::new(),
            pois: Vec::new(),
            entrances: Vec::new(),
            outline: None,
            innerline: None,
            original_nodes: BTreeSet::new(),
            original_ways: BTreeSet::new(),
            original_relations: BTreeSet::new(),
            next_synthetic_id: 0,
        }
    }

    /// A fresh id for a node this toolchain creates.
    pub fn new_node_id(&mut self) -> NodeID {
        self.next_synthetic_id -= 1;
        NodeID(self.next_synthetic_id)
    }

    /// A fresh id for a way this toolchain creates.
    pub fn new_way_id(&mut self) -> WayID {
        self.next_synthetic_id -= 1;
        WayID(self.next_synthetic_id)
    }

    /// Every level some room or connection exists on.
    pub fn all_levels(&self) -> BTreeSet<Level> {
        let mut levels = BTreeSet::new();
        for room in &self.rooms {
            levels.extend(room.levels.iter().cloned());
        }
        for conn in &self.connections {
            levels.extend(conn.levels.iter().cloned());
        }
        levels
    }

    pub fn boundary(&self, owner: OwnerID) -> &Vec<NodeID> {
        match owner {
            OwnerID::Room(idx) => &self.rooms[idx].boundary,
            OwnerID::Connection(idx) => &self.connections[idx].boundary,
        }
    }

    pub fn boundary_mut(&mut self, owner: OwnerID) -> &mut Vec<NodeID> {
        match owner {
            OwnerID::Room(idx) => &mut self.rooms[idx].boundary,
            OwnerID::Connection(idx) => &mut self.connections[idx].boundary,
        }
    }

    pub fn osm_tags(&self) -> Tags {
        let mut tags = self.tags.clone();
        tags.insert(osm::MIN_LEVEL, self.min_level.to_string());
        tags.insert(osm::MAX_LEVEL, self.max_level.to_string());
        if let Some(h) = self.height {
            tags.insert(osm::HEIGHT, format_float(h));
        }
        if let Some(n) = &self.name {
            tags.insert(osm::NAME, n.clone());
        }
        tags
    }
}
