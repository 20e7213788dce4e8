//! The clustering pass. All points on a level that transitively lie within
//! the proximity tolerance collapse into one point at their average position,
//! and every boundary referencing a cluster member is rewritten to the
//! survivor.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::osm::NodeID;
use crate::transform::{ConsolidateOptions, LevelGroup};
use crate::{Building, IndoorNode, OwnerID};

pub fn merge_nearby_nodes(
    building: &mut Building,
    group: &mut LevelGroup,
    opts: &ConsolidateOptions,
) {
    let clusters = find_clusters(building, group, opts);
    if !clusters.is_empty() {
        debug!(
            "Level {}: merging {} nodes down to {}",
            group.level,
            clusters.iter().map(|c| c.len()).sum::<usize>(),
            clusters.len()
        );
    }
    for members in clusters {
        apply_cluster(building, group, &members, opts);
    }

    // Merging can leave the same point twice in a row in a boundary. Collapse
    // those zero-length sections everywhere.
    for room in &mut building.rooms {
        collapse_degenerate_sections(&mut room.boundary);
    }
    for conn in &mut building.connections {
        collapse_degenerate_sections(&mut conn.boundary);
    }
}

/// Partitions the level's points into clusters of transitively-nearby ones.
/// Proximity itself isn't transitive, so a cluster is a connected component
/// of the pairwise graph, built by unioning each point's neighborhood into
/// whatever clusters it touches.
fn find_clusters(
    building: &Building,
    group: &LevelGroup,
    opts: &ConsolidateOptions,
) -> Vec<BTreeSet<NodeID>> {
    // Which boundaries each point belongs to.
    let mut owners_per_node: BTreeMap<NodeID, BTreeSet<OwnerID>> = BTreeMap::new();
    for owner in &group.owners {
        for id in building.boundary(*owner) {
            owners_per_node.entry(*id).or_default().insert(*owner);
        }
    }

    let mut clusters: Vec<BTreeSet<NodeID>> = Vec::new();
    for id in &group.nodes {
        let node = &building.nodes[id];
        let mut nearby: BTreeSet<NodeID> = BTreeSet::new();
        for other_id in &group.nodes {
            if other_id == id {
                continue;
            }
            // Two corners of the same boundary can sit close together
            // because the feature is genuinely thin, like a pillar. Never
            // link points sharing a boundary directly; they can still end up
            // in one cluster through a third point.
            if let (Some(a), Some(b)) = (owners_per_node.get(id), owners_per_node.get(other_id))
            {
                if !a.is_disjoint(b) {
                    continue;
                }
            }
            if node.in_proximity(&building.nodes[other_id], opts.max_wall_width) {
                nearby.insert(*other_id);
            }
        }
        if nearby.is_empty() {
            continue;
        }

        // Union the neighborhood with every existing cluster it touches.
        let mut united = nearby;
        united.insert(*id);
        clusters.retain(|cluster| {
            if cluster.is_disjoint(&united) {
                true
            } else {
                united.extend(cluster.iter().cloned());
                false
            }
        });
        clusters.push(united);
    }
    clusters
}

fn apply_cluster(
    building: &mut Building,
    group: &mut LevelGroup,
    members: &BTreeSet<NodeID>,
    opts: &ConsolidateOptions,
) {
    // Reserve a synthetic id up front; it goes unused when some member has a
    // real id.
    let fallback = building.new_node_id();
    let member_refs: Vec<&IndoorNode> = members.iter().map(|id| &building.nodes[id]).collect();
    let merged = IndoorNode::merged(&member_refs, fallback, opts.max_wall_width * 3.0);
    let merged_id = merged.id;

    for id in members {
        building.nodes.remove(id);
    }
    building.nodes.insert(merged_id, merged);

    // Rewrite every reference in the building, not just this level's. A
    // cluster member can sit on a multi-level boundary.
    let rewrite = |ids: &mut Vec<NodeID>| {
        for id in ids {
            if members.contains(id) {
                *id = merged_id;
            }
        }
    };
    for room in &mut building.rooms {
        rewrite(&mut room.boundary);
    }
    for conn in &mut building.connections {
        rewrite(&mut conn.boundary);
    }
    for floor in &mut building.floors {
        if let Some(shell) = &mut floor.shell {
            rewrite(&mut shell.boundary);
        }
    }
    rewrite(&mut building.pois);
    rewrite(&mut building.entrances);

    for id in members {
        group.nodes.remove(id);
    }
    group.nodes.insert(merged_id);
}

/// Removes immediate repeats from a boundary. The closing duplicate of a ring
/// (first id repeated at the end) is meant to be there and survives.
pub(crate) fn collapse_degenerate_sections(boundary: &mut Vec<NodeID>) {
    let mut i = 0;
    while i + 1 < boundary.len() {
        if boundary[i] == boundary[i + 1] && boundary.len() > 2 {
            boundary.remove(i + 1);
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use geom::LonLat;
    use situtil::Tags;

    use super::*;
    use crate::osm::{RelationID, WayID};
    use crate::{IndoorClass, Level, Room};

    // About 0.11m of latitude.
    const CM11: f64 = 0.000001;

    fn add_node(building: &mut Building, id: i64, lon: f64, lat: f64) {
        building.nodes.insert(
            NodeID(id),
            IndoorNode {
                id: NodeID(id),
                pt: LonLat::new(lon, lat),
                levels: [Level::new(0.0)].into_iter().collect(),
                tags: Tags::empty(),
            },
        );
    }

    fn add_room(building: &mut Building, id: i64, boundary: Vec<i64>) {
        building.rooms.push(Room {
            id: WayID(id),
            levels: [Level::new(0.0)].into_iter().collect(),
            class: IndoorClass::Room,
            boundary: boundary.into_iter().map(NodeID).collect(),
            height: None,
            name: None,
            reference: None,
            tags: Tags::empty(),
        });
    }

    #[test]
    fn test_chained_cluster() {
        // Three rooms with one corner each: A near B, B near C, but A and C
        // more than the tolerance apart. Proximity isn't transitive, but
        // clustering is; all three must merge into one point.
        let mut building = Building::new(RelationID(1), 0, 0);
        add_node(&mut building, 1, 0.0, 0.0);
        add_node(&mut building, 2, 0.0, 3.0 * CM11);
        add_node(&mut building, 3, 0.0, 6.0 * CM11);
        // A far-away second corner for each room.
        add_node(&mut building, 4, 0.001, 0.0);
        add_node(&mut building, 5, 0.002, 0.0);
        add_node(&mut building, 6, 0.003, 0.0);
        add_room(&mut building, 10, vec![1, 4]);
        add_room(&mut building, 11, vec![2, 5]);
        add_room(&mut building, 12, vec![3, 6]);

        let mut group = LevelGroup::new(&building, Level::new(0.0));
        let opts = ConsolidateOptions::default();
        // 1-2 and 2-3 are 0.33m apart, 1-3 is 0.66m: only transitively close.
        merge_nearby_nodes(&mut building, &mut group, &opts);

        assert_eq!(building.rooms[0].boundary[0], NodeID(1));
        assert_eq!(building.rooms[1].boundary[0], NodeID(1));
        assert_eq!(building.rooms[2].boundary[0], NodeID(1));
        // The survivor sits at the average of the three.
        let survivor = &building.nodes[&NodeID(1)];
        assert!((survivor.pt.latitude - 3.0 * CM11).abs() < 1e-12);
        // The merged-away points are gone from the arena.
        assert!(!building.nodes.contains_key(&NodeID(2)));
        assert!(!building.nodes.contains_key(&NodeID(3)));
    }

    #[test]
    fn test_same_boundary_points_never_merge_directly() {
        // A thin pillar: both its corners are within tolerance but belong to
        // the same boundary.
        let mut building = Building::new(RelationID(1), 0, 0);
        add_node(&mut building, 1, 0.0, 0.0);
        add_node(&mut building, 2, 0.0, CM11);
        add_room(&mut building, 10, vec![1, 2, 1]);

        let mut group = LevelGroup::new(&building, Level::new(0.0));
        merge_nearby_nodes(&mut building, &mut group, &ConsolidateOptions::default());

        assert_eq!(
            building.rooms[0].boundary,
            vec![NodeID(1), NodeID(2), NodeID(1)]
        );
        assert!(building.nodes.contains_key(&NodeID(2)));
    }

    #[test]
    fn test_closed_ring_survives_merge() {
        // Two triangles sharing a corner drawn twice. Merging must not break
        // the first == last closure of either ring.
        let mut building = Building::new(RelationID(1), 0, 0);
        add_node(&mut building, 1, 0.0, 0.0);
        add_node(&mut building, 2, 0.001, 0.0);
        add_node(&mut building, 3, 0.001, 0.001);
        // Room B's copy of corner 1, 0.11m away.
        add_node(&mut building, 4, 0.0, CM11);
        add_node(&mut building, 5, -0.001, 0.0);
        add_node(&mut building, 6, -0.001, 0.001);
        add_room(&mut building, 10, vec![1, 2, 3, 1]);
        add_room(&mut building, 11, vec![4, 5, 6, 4]);

        let mut group = LevelGroup::new(&building, Level::new(0.0));
        merge_nearby_nodes(&mut building, &mut group, &ConsolidateOptions::default());

        let b = &building.rooms[1].boundary;
        assert_eq!(b.len(), 4);
        assert_eq!(b[0], NodeID(1));
        assert_eq!(b[3], NodeID(1));
        assert_eq!(building.rooms[0].boundary.len(), 4);
    }

    #[test]
    fn test_collapse_degenerate_sections() {
        let mut boundary = vec![NodeID(1), NodeID(1), NodeID(2), NodeID(2), NodeID(1)];
        collapse_degenerate_sections(&mut boundary);
        assert_eq!(boundary, vec![NodeID(1), NodeID(2), NodeID(1)]);

        // A fully-collapsed ring keeps its closing pair.
        let mut tiny = vec![NodeID(3), NodeID(3)];
        collapse_degenerate_sections(&mut tiny);
        assert_eq!(tiny, vec![NodeID(3), NodeID(3)]);
    }

    #[test]
    fn test_idempotent() {
        let mut building = Building::new(RelationID(1), 0, 0);
        add_node(&mut building, 1, 0.0, 0.0);
        add_node(&mut building, 2, 0.0, CM11);
        add_node(&mut building, 3, 0.001, 0.0);
        add_node(&mut building, 4, 0.001, CM11);
        add_room(&mut building, 10, vec![1, 3]);
        add_room(&mut building, 11, vec![2, 4]);

        let opts = ConsolidateOptions::default();
        let mut group = LevelGroup::new(&building, Level::new(0.0));
        merge_nearby_nodes(&mut building, &mut group, &opts);
        let after_first = building.clone();

        let mut group = LevelGroup::new(&building, Level::new(0.0));
        merge_nearby_nodes(&mut building, &mut group, &opts);
        assert_eq!(building.rooms[0].boundary, after_first.rooms[0].boundary);
        assert_eq!(building.nodes.len(), after_first.nodes.len());
    }
}
