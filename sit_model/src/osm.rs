//! Strongly-typed ids for OSM elements, and the tag keys this toolchain cares
//! about.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct NodeID(pub i64);

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct WayID(pub i64);

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct RelationID(pub i64);

impl NodeID {
    /// Negative ids are synthetic: created by this toolchain and not yet known
    /// upstream, following the convention OSM editors use for new elements.
    pub fn is_synthetic(self) -> bool {
        self.0 < 0
    }
}

impl WayID {
    pub fn is_synthetic(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for NodeID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "node {}", self.0)
    }
}

impl fmt::Display for WayID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "way {}", self.0)
    }
}

impl fmt::Display for RelationID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "relation {}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum OsmID {
    Node(NodeID),
    Way(WayID),
    Relation(RelationID),
}

impl OsmID {
    pub fn inner(self) -> i64 {
        match self {
            OsmID::Node(n) => n.0,
            OsmID::Way(w) => w.0,
            OsmID::Relation(r) => r.0,
        }
    }
}

impl fmt::Display for OsmID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OsmID::Node(n) => write!(f, "{}", n),
            OsmID::Way(w) => write!(f, "{}", w),
            OsmID::Relation(r) => write!(f, "{}", r),
        }
    }
}

// Normal OSM keys.
pub const LEVEL: &str = "level";
pub const HEIGHT: &str = "height";
pub const NAME: &str = "name";
pub const REF: &str = "ref";
pub const DOOR: &str = "door";
pub const WINDOW: &str = "window";
pub const ENTRANCE: &str = "entrance";
pub const INDOOR: &str = "indoor";
pub const STAIRS: &str = "stairs";
pub const CONVEYING: &str = "conveying";
pub const HIGHWAY: &str = "highway";
pub const MIN_LEVEL: &str = "building:min_level";
pub const MAX_LEVEL: &str = "building:max_level";

// indoorOSM-style keys describing building parts.
pub const BUILDINGPART: &str = "buildingpart";
pub const VERTICAL_PASSAGE: &str = "buildingpart:verticalpassage";
pub const FLOOR_RANGE: &str = "buildingpart:verticalpassage:floorrange";
pub const LEVEL_USAGE: &str = "level:usage";

// When fragments with and without a measured height merge, the surviving
// height is demoted to this key to mark the lower confidence.
pub const EST_HEIGHT: &str = "est_height";
