//! Cleans up a building whose floors were each traced independently. Walls
//! shared between rooms get common points, abutting corners collapse into
//! one, and per-level copies of stairwells and elevators fuse into single
//! multi-level connections.

use geom::Distance;
use log::debug;
use situtil::Timer;

use crate::Building;

mod group_levels;
mod insert_projections;
mod merge_connections;
mod merge_nodes;

pub use group_levels::LevelGroup;

/// Tolerances for the consolidation passes.
#[derive(Clone, Debug)]
pub struct ConsolidateOptions {
    /// Two points closer than this are taken to mean the same physical wall
    /// corner. Should stay well below the thinnest real wall.
    pub max_wall_width: Distance,
    /// Vertical passages drawn on different levels can be displaced by much
    /// more than a wall width, so cross-level comparison uses this wider
    /// tolerance.
    pub max_level_connection_offset: Distance,
    /// Tag keys marking a boundary point as decorative. Such points don't
    /// describe shaft shape and are ignored when comparing connections.
    pub decorative_tags: Vec<String>,
}

impl Default for ConsolidateOptions {
    fn default() -> ConsolidateOptions {
        ConsolidateOptions {
            max_wall_width: Distance::centimeters(40),
            max_level_connection_offset: Distance::meters(2.0),
            decorative_tags: vec!["door".to_string(), "window".to_string()],
        }
    }
}

impl Building {
    /// Runs the full consolidation pipeline. The phases are strictly ordered:
    /// splitting walls creates the T-junction points that clustering then
    /// merges, and connection merging relies on each level's geometry already
    /// being clean.
    pub fn run_all_consolidations(&mut self, opts: &ConsolidateOptions, timer: &mut Timer) {
        timer.start(format!("consolidate {}", self.id));
        for level in self.all_levels() {
            timer.start(format!("consolidate level {}", level));
            let mut group = LevelGroup::new(self, level);
            let before = group.nodes.len();
            insert_projections::split_walls(self, &mut group, opts);
            let after_split = group.nodes.len();
            merge_nodes::merge_nearby_nodes(self, &mut group, opts);
            debug!(
                "Level {}: {} nodes, {} after splitting walls, {} after merging",
                level,
                before,
                after_split,
                group.nodes.len()
            );
            timer.stop(format!("consolidate level {}", level));
        }
        timer.start("merge vertical connections");
        merge_connections::merge_vertical_connections(self, opts);
        timer.stop("merge vertical connections");
        timer.stop(format!("consolidate {}", self.id));
    }
}
