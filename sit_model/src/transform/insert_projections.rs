//! The wall-splitting pass. When two rooms share a physical wall but one
//! mapper drew a corner partway along the other's wall, the corner projects
//! onto that wall within the proximity tolerance. Splitting the wall at the
//! foot of the projection gives the later clustering pass a T-junction point
//! to merge with.

use crate::osm::NodeID;
use crate::transform::{ConsolidateOptions, LevelGroup};
use crate::{Building, IndoorNode, WallSection};

pub fn split_walls(building: &mut Building, group: &mut LevelGroup, opts: &ConsolidateOptions) {
    for owner_idx in 0..group.owners.len() {
        let owner = group.owners[owner_idx];
        let boundary = building.boundary(owner).clone();
        if boundary.len() < 2 {
            continue;
        }
        // The level's points as they stand now, including points created
        // while splitting earlier boundaries on this level.
        let candidates: Vec<NodeID> = group.nodes.iter().cloned().collect();

        let mut new_boundary = vec![boundary[0]];
        for window in boundary.windows(2) {
            let (start, end) = (window[0], window[1]);
            let section =
                WallSection::new(building.nodes[&start].pt, building.nodes[&end].pt);

            // Splits for this section, ordered along it.
            let mut hits: Vec<(f64, geom::LonLat, NodeID)> = Vec::new();
            for cand in &candidates {
                let node = &building.nodes[cand];
                if let Some((foot, t)) = section.project(node.pt, opts.max_wall_width) {
                    // Only interior projections split the section; points
                    // near an endpoint are the clustering pass's job. The
                    // point must also genuinely be near the wall, not just
                    // near its infinite extension.
                    if t > 0.0
                        && t < 1.0
                        && foot.gps_dist(node.pt) < opts.max_wall_width
                    {
                        hits.push((t, foot, *cand));
                    }
                }
            }
            hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

            for (_, foot, cand) in hits {
                let levels = building.nodes[&start].levels.clone();
                let tags = building.nodes[&cand].tags.clone();
                let id = building.new_node_id();
                building.nodes.insert(
                    id,
                    IndoorNode {
                        id,
                        pt: foot,
                        levels,
                        tags,
                    },
                );
                new_boundary.push(id);
                group.nodes.insert(id);
            }
            new_boundary.push(end);
        }
        *building.boundary_mut(owner) = new_boundary;
    }
}
