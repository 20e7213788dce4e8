use std::collections::BTreeSet;

use crate::osm::NodeID;
use crate::{Building, Level, OwnerID};

/// Everything drawn on one level: the rooms and connection fragments there,
/// and every point their boundaries reach. Multi-level entities show up in
/// each of their levels' groups; the points themselves stay shared through
/// the building's arena, so per-level passes still see cross-level effects.
pub struct LevelGroup {
    pub level: Level,
    pub owners: Vec<OwnerID>,
    pub nodes: BTreeSet<NodeID>,
}

impl LevelGroup {
    pub fn new(building: &Building, level: Level) -> LevelGroup {
        let mut owners = Vec::new();
        for (idx, room) in building.rooms.iter().enumerate() {
            if room.levels.contains(&level) {
                owners.push(OwnerID::Room(idx));
            }
        }
        for (idx, conn) in building.connections.iter().enumerate() {
            if conn.levels.contains(&level) {
                owners.push(OwnerID::Connection(idx));
            }
        }

        let mut nodes = BTreeSet::new();
        for owner in &owners {
            for id in building.boundary(*owner) {
                assert!(
                    building.nodes.contains_key(id),
                    "{:?} references {}, which isn't in the building",
                    owner,
                    id
                );
                nodes.insert(*id);
            }
        }
        LevelGroup {
            level,
            owners,
            nodes,
        }
    }
}
