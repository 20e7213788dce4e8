//! The cross-level pass. Each stairwell or elevator arrives as one fragment
//! per level, drawn independently and displaced by up to a couple of meters.
//! Fragments whose shapes overlap fuse into a single connection spanning all
//! their levels, shaped like the best-drawn fragment.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use geom::{Distance, LonLat};

use situtil::Tags;

use crate::osm::{self, NodeID};
use crate::transform::merge_nodes::collapse_degenerate_sections;
use crate::transform::ConsolidateOptions;
use crate::{Building, ConnectionKind, IndoorClass, IndoorNode, LevelConnection, WallSection};

pub fn merge_vertical_connections(building: &mut Building, opts: &ConsolidateOptions) {
    let groups = find_overlap_groups(building, opts);
    debug!(
        "{} connection fragments form {} connections",
        building.connections.len(),
        groups.len()
    );

    let mut merged = Vec::new();
    for group in groups {
        if group.len() == 1 {
            // A connection only mapped on one level passes through untouched.
            merged.push(building.connections[group[0]].clone());
        } else {
            merged.push(merge_group(building, &group, opts));
        }
    }
    building.connections = merged;
    prune_orphan_nodes(building);
}

/// Groups fragment indices by geometric overlap, unioning transitively just
/// like node clustering. Overlap is one-directional, so a fragment joins a
/// group if it overlaps or is overlapped by any member.
fn find_overlap_groups(building: &Building, opts: &ConsolidateOptions) -> Vec<Vec<usize>> {
    let conns = &building.connections;
    let mut groups: Vec<BTreeSet<usize>> = Vec::new();
    for i in 0..conns.len() {
        let mut united: BTreeSet<usize> = (0..conns.len())
            .filter(|j| {
                conns[i].overlaps(
                    &conns[*j],
                    &building.nodes,
                    opts.max_level_connection_offset,
                    &opts.decorative_tags,
                ) || conns[*j].overlaps(
                    &conns[i],
                    &building.nodes,
                    opts.max_level_connection_offset,
                    &opts.decorative_tags,
                )
            })
            .collect();
        united.insert(i);
        groups.retain(|g| {
            if g.is_disjoint(&united) {
                true
            } else {
                united.extend(g.iter().cloned());
                false
            }
        });
        groups.push(united);
    }
    groups
        .into_iter()
        .map(|g| g.into_iter().collect())
        .collect()
}

fn merge_group(
    building: &mut Building,
    group: &[usize],
    opts: &ConsolidateOptions,
) -> LevelConnection {
    // The fragment with the most simple nodes has the most detailed shape
    // and becomes the template. Ties go to the earliest fragment.
    let mut template = group[0];
    let mut most = simple_count(building, template, opts);
    for idx in &group[1..] {
        let count = simple_count(building, *idx, opts);
        if count > most {
            most = count;
            template = *idx;
        }
    }

    // Walk the template's shape. Each of its simple nodes absorbs every
    // fragment node within the cross-level tolerance.
    let mut old_to_new: BTreeMap<NodeID, NodeID> = BTreeMap::new();
    let mut new_boundary: Vec<NodeID> = Vec::new();
    let template_simple =
        building.connections[template].simple_nodes(&building.nodes, &opts.decorative_tags);
    for s in template_simple {
        if let Some(new) = old_to_new.get(&s) {
            // Either the ring's closing duplicate, or a template node an
            // earlier one already absorbed.
            new_boundary.push(*new);
            continue;
        }
        let mut members: BTreeSet<NodeID> = BTreeSet::new();
        members.insert(s);
        for idx in group {
            for other in
                building.connections[*idx].simple_nodes(&building.nodes, &opts.decorative_tags)
            {
                if !old_to_new.contains_key(&other)
                    && building.nodes[&s]
                        .in_proximity(&building.nodes[&other], opts.max_level_connection_offset)
                {
                    members.insert(other);
                }
            }
        }

        let fallback = building.new_node_id();
        let member_refs: Vec<&IndoorNode> =
            members.iter().map(|id| &building.nodes[id]).collect();
        let merged = IndoorNode::merged(
            &member_refs,
            fallback,
            opts.max_level_connection_offset * 3.0,
        );
        let merged_id = merged.id;
        building.nodes.insert(merged_id, merged);
        for id in members {
            old_to_new.insert(id, merged_id);
        }
        new_boundary.push(merged_id);
    }

    // A way drawn starting at a door loses its closing duplicate along with
    // the other decorative nodes, so the walked shape may be an open chain.
    if new_boundary.first() != new_boundary.last() {
        if let Some(first) = new_boundary.first().cloned() {
            new_boundary.push(first);
        }
    }

    // Fragment nodes the template walk didn't absorb, typically doors drawn
    // at different spots per level, get projected onto the merged shape and
    // spliced in there.
    for idx in group {
        for node_id in building.connections[*idx].boundary.clone() {
            if old_to_new.contains_key(&node_id) {
                continue;
            }
            attach_leftover_node(building, &mut new_boundary, &mut old_to_new, node_id, opts);
        }
    }

    // Corners of a shaft narrower than the cross-level tolerance fuse into
    // the same merged point, leaving immediate repeats in the walked ring.
    collapse_degenerate_sections(&mut new_boundary);

    let id = building.new_way_id();
    let mut levels = BTreeSet::new();
    let mut level_refs = BTreeSet::new();
    let mut tags = Tags::empty();
    let mut kind = None;
    let mut class = None;
    let mut any_height_missing = false;
    for idx in group {
        let conn = &building.connections[*idx];
        levels.extend(conn.levels.iter().cloned());
        level_refs.extend(conn.level_refs.iter().cloned());
        if !conn.tags.contains_key(osm::HEIGHT) {
            any_height_missing = true;
        }
        tags.extend(conn.tags.clone());

        match kind {
            None => kind = Some(conn.kind),
            Some(k) if k != conn.kind => warn!(
                "Merging fragments of {} with different kinds: {:?} vs {:?}. Going with {:?}",
                conn.id, k, conn.kind, k
            ),
            _ => {}
        }
        match class {
            None => class = Some(conn.class),
            Some(c) if c != conn.class => warn!(
                "Merging fragments of {} with different classes: {:?} vs {:?}. Going with {:?}",
                conn.id, c, conn.class, c
            ),
            _ => {}
        }
    }
    // A height measured on one level doesn't necessarily hold on the others.
    if any_height_missing {
        if let Some(h) = tags.remove(osm::HEIGHT) {
            tags.insert(osm::EST_HEIGHT, h);
        }
    }

    let merged_levels = levels.clone();
    for node_id in &new_boundary {
        if let Some(node) = building.nodes.get_mut(node_id) {
            node.levels.extend(merged_levels.iter().cloned());
        }
    }

    // Rooms sharing a wall with a fragment now follow the merged points.
    let rewrite = |ids: &mut Vec<NodeID>| {
        for id in ids {
            if let Some(new) = old_to_new.get(id) {
                *id = *new;
            }
        }
    };
    for room in &mut building.rooms {
        rewrite(&mut room.boundary);
    }
    for floor in &mut building.floors {
        if let Some(shell) = &mut floor.shell {
            rewrite(&mut shell.boundary);
        }
    }
    rewrite(&mut building.pois);
    rewrite(&mut building.entrances);

    LevelConnection {
        id,
        // Groups are non-empty, so both are set by now.
        kind: kind.unwrap_or(ConnectionKind::Stairs),
        class: class.unwrap_or(IndoorClass::Room),
        levels,
        level_refs,
        boundary: new_boundary,
        tags,
    }
}

fn simple_count(building: &Building, idx: usize, opts: &ConsolidateOptions) -> usize {
    building.connections[idx]
        .simple_nodes(&building.nodes, &opts.decorative_tags)
        .len()
}

/// Projects an unabsorbed fragment node onto the closest section of the
/// merged boundary. Projections landing on a section endpoint reuse that
/// point; interior ones get a fresh point spliced into the ring.
fn attach_leftover_node(
    building: &mut Building,
    new_boundary: &mut Vec<NodeID>,
    old_to_new: &mut BTreeMap<NodeID, NodeID>,
    node_id: NodeID,
    opts: &ConsolidateOptions,
) {
    let pt = building.nodes[&node_id].pt;
    let mut best: Option<(usize, LonLat, f64, Distance)> = None;
    for i in 0..new_boundary.len().saturating_sub(1) {
        let section = WallSection::new(
            building.nodes[&new_boundary[i]].pt,
            building.nodes[&new_boundary[i + 1]].pt,
        );
        if let Some((foot, t)) = section.project(pt, opts.max_wall_width) {
            let dist = pt.gps_dist(foot);
            if best.map(|(_, _, _, d)| dist < d).unwrap_or(true) {
                best = Some((i, foot, t, dist));
            }
        }
    }

    match best {
        Some((i, _, t, _)) if t == 0.0 => {
            old_to_new.insert(node_id, new_boundary[i]);
        }
        Some((i, _, t, _)) if t == 1.0 => {
            old_to_new.insert(node_id, new_boundary[i + 1]);
        }
        Some((i, foot, _, _)) => {
            let levels = building.nodes[&node_id].levels.clone();
            let tags = building.nodes[&node_id].tags.clone();
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
            new_boundary.insert(i + 1, id);
            old_to_new.insert(node_id, id);
        }
        None => {
            warn!(
                "{} doesn't project onto the merged connection boundary; dropping it",
                node_id
            );
        }
    }
}

/// Drops arena points nothing references anymore. Fragment corners superseded
/// by merged points vanish here; the diff export later emits deletes for the
/// real ones.
fn prune_orphan_nodes(building: &mut Building) {
    let mut referenced: BTreeSet<NodeID> = BTreeSet::new();
    for room in &building.rooms {
        referenced.extend(room.boundary.iter().cloned());
    }
    for conn in &building.connections {
        referenced.extend(conn.boundary.iter().cloned());
    }
    for floor in &building.floors {
        if let Some(shell) = &floor.shell {
            referenced.extend(shell.boundary.iter().cloned());
        }
    }
    referenced.extend(building.pois.iter().cloned());
    referenced.extend(building.entrances.iter().cloned());
    building.nodes.retain(|id, _| referenced.contains(id));
}
