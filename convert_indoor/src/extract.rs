//! Builds `Building`s out of indoorOSM-style tagged relations: a
//! `type=building` relation whose members are per-level floor relations,
//! whose way members in turn are rooms and vertical passages. Buildings that
//! can't be parsed are skipped with a warning, never fatal.

use std::collections::BTreeSet;

use anyhow::{anyhow, bail, Result};
use log::{info, warn};

use situtil::Timer;

use sit_model::osm::{self, NodeID, OsmID, RelationID, WayID};
use sit_model::{
    parse_levels, Building, ConnectionKind, ConsolidateOptions, Floor, IndoorClass, IndoorNode,
    Level, LevelConnection, Room,
};

use crate::reader::Document;

pub fn extract_buildings(
    doc: &Document,
    opts: &ConsolidateOptions,
    timer: &mut Timer,
) -> Vec<Building> {
    timer.start("extract buildings");
    let mut buildings = Vec::new();
    for (id, relation) in &doc.relations {
        if !relation.tags.is("type", "building") {
            continue;
        }
        match extract_building(doc, *id, opts) {
            Ok(building) => buildings.push(building),
            Err(err) => warn!("Skipping {}: {}", id, err),
        }
    }
    timer.stop("extract buildings");
    info!("Extracted {} buildings", buildings.len());
    buildings
}

fn extract_building(
    doc: &Document,
    id: RelationID,
    opts: &ConsolidateOptions,
) -> Result<Building> {
    let relation = &doc.relations[&id];
    let min_level = relation
        .tags
        .get(osm::MIN_LEVEL)
        .and_then(|x| x.parse::<i64>().ok())
        .ok_or_else(|| anyhow!("no usable {}", osm::MIN_LEVEL))?;
    let max_level = relation
        .tags
        .get(osm::MAX_LEVEL)
        .and_then(|x| x.parse::<i64>().ok())
        .ok_or_else(|| anyhow!("no usable {}", osm::MAX_LEVEL))?;

    let mut building = Building::new(id, min_level, max_level);
    building.name = relation.tags.get(osm::NAME).cloned();
    building.height = relation
        .tags
        .get(osm::HEIGHT)
        .and_then(|x| x.parse::<f64>().ok());
    building.tags = relation.tags.clone();
    for key in [osm::MIN_LEVEL, osm::MAX_LEVEL, osm::NAME, osm::HEIGHT, "type"] {
        building.tags.remove(key);
    }
    snapshot_original_ids(doc, id, &mut building);

    for (role, member) in &relation.members {
        match member {
            OsmID::Relation(r) => {
                if let Err(err) = extract_floor(doc, *r, &mut building) {
                    warn!("Skipping floor {} of {}: {}", r, id, err);
                }
            }
            OsmID::Way(w) => {
                // The building's footprint.
                if building.outline.is_none() {
                    building.outline = Some(*w);
                } else {
                    info!("Multiple outline ways for {}", id);
                }
            }
            OsmID::Node(n) => {
                if role == "entrance" {
                    add_node(doc, &mut building, *n, &BTreeSet::new())?;
                    building.entrances.push(*n);
                }
            }
        }
    }

    if building.floors.is_empty() {
        bail!("no parseable floors");
    }
    warn_standalone_decorations(&building);
    split_connection_fragments(&mut building, opts);
    Ok(building)
}

fn extract_floor(doc: &Document, id: RelationID, building: &mut Building) -> Result<()> {
    let relation = doc
        .relations
        .get(&id)
        .ok_or_else(|| anyhow!("not in the input"))?;
    let levels = parse_levels(relation.tags.get(osm::LEVEL).map(|x| x.as_str()).unwrap_or(""));
    if levels.len() != 1 {
        bail!("floors must have exactly one level, this one has {}", levels.len());
    }
    let level = *levels.iter().next().unwrap();

    let mut floor = Floor {
        id,
        level,
        height: relation
            .tags
            .get(osm::HEIGHT)
            .and_then(|x| x.parse::<f64>().ok()),
        name: relation.tags.get(osm::NAME).cloned(),
        shell: None,
        tags: relation.tags.clone(),
    };
    for key in [osm::LEVEL, osm::HEIGHT, osm::NAME] {
        floor.tags.remove(key);
    }

    for (role, member) in &relation.members {
        match member {
            OsmID::Node(n) => {
                add_node(doc, building, *n, &floor_levels(level))?;
                if role == "entrance" {
                    if let Some(node) = building.nodes.get_mut(n) {
                        node.tags.insert(osm::ENTRANCE, "yes");
                    }
                    building.entrances.push(*n);
                } else {
                    building.pois.push(*n);
                }
            }
            OsmID::Way(w) => {
                if role == "shell" {
                    match extract_room(doc, *w, level, IndoorClass::Level, building) {
                        Ok(room) => floor.shell = Some(room),
                        Err(err) => warn!("Skipping shell {} of floor {}: {}", w, id, err),
                    }
                } else if let Err(err) = extract_buildingpart(doc, *w, level, building) {
                    warn!("Skipping {} on floor {}: {}", w, id, err);
                }
            }
            OsmID::Relation(r) => {
                // A multipolygon carrying the building outline.
                if let Some(sub) = doc.relations.get(r) {
                    for (sub_role, sub_member) in &sub.members {
                        if let OsmID::Way(w) = sub_member {
                            match sub_role.as_str() {
                                "outer" => building.outline = Some(*w),
                                "inner" => building.innerline = Some(*w),
                                _ => {}
                            }
                        }
                    }
                }
            }
        }
    }

    building.floors.push(floor);
    Ok(())
}

/// A floor way member is a vertical passage if tagged as one, otherwise a
/// room.
fn extract_buildingpart(
    doc: &Document,
    id: WayID,
    level: Level,
    building: &mut Building,
) -> Result<()> {
    let way = doc.ways.get(&id).ok_or_else(|| anyhow!("not in the input"))?;
    if way.tags.contains_key(osm::VERTICAL_PASSAGE) {
        let connection = extract_connection(doc, id, level, building)?;
        building.connections.push(connection);
    } else {
        let room = extract_room(doc, id, level, IndoorClass::Corridor, building)?;
        building.rooms.push(room);
    }
    Ok(())
}

fn extract_room(
    doc: &Document,
    id: WayID,
    floor_level: Level,
    default_class: IndoorClass,
    building: &mut Building,
) -> Result<Room> {
    let way = doc.ways.get(&id).ok_or_else(|| anyhow!("not in the input"))?;
    let mut levels = parse_levels(
        way.tags.get(osm::LEVEL).map(|x| x.as_str()).unwrap_or(""),
    );
    if levels.is_empty() {
        levels = floor_levels(floor_level);
    }

    let class = match way.tags.get(osm::BUILDINGPART).map(|x| x.as_str()) {
        Some("room") => IndoorClass::Room,
        Some("hall") => IndoorClass::Area,
        Some("corridor") => IndoorClass::Corridor,
        Some("shell") => IndoorClass::Level,
        Some(other) => {
            info!("Unrecognized buildingpart {:?} on {}", other, id);
            default_class
        }
        None => default_class,
    };

    for n in &way.nodes {
        add_node(doc, building, *n, &levels)?;
    }

    let mut room = Room {
        id,
        levels,
        class,
        boundary: way.nodes.clone(),
        height: way
            .tags
            .get(osm::HEIGHT)
            .and_then(|x| x.parse::<f64>().ok()),
        name: way.tags.get(osm::NAME).cloned(),
        reference: way.tags.get(osm::REF).cloned(),
        tags: way.tags.clone(),
    };
    for key in [
        osm::LEVEL,
        osm::HEIGHT,
        osm::NAME,
        osm::REF,
        osm::BUILDINGPART,
    ] {
        room.tags.remove(key);
    }
    Ok(room)
}

fn extract_connection(
    doc: &Document,
    id: WayID,
    floor_level: Level,
    building: &mut Building,
) -> Result<LevelConnection> {
    let way = doc.ways.get(&id).ok_or_else(|| anyhow!("not in the input"))?;
    let kind = match way.tags.get(osm::VERTICAL_PASSAGE).map(|x| x.as_str()) {
        Some("stairway") => ConnectionKind::Stairs,
        Some("elevator") => ConnectionKind::Elevator,
        Some("escalator") => ConnectionKind::Conveyor,
        Some(other) => bail!("unrecognized vertical passage type {:?}", other),
        None => bail!("no vertical passage type"),
    };
    let levels = parse_levels(
        way.tags
            .get(osm::FLOOR_RANGE)
            .map(|x| x.as_str())
            .unwrap_or(""),
    );
    if levels.is_empty() {
        bail!("no usable {}", osm::FLOOR_RANGE);
    }
    // An opening instead of a walled shaft.
    let class = if way.tags.is(osm::DOOR, "no") {
        IndoorClass::Area
    } else {
        IndoorClass::Room
    };

    for n in &way.nodes {
        add_node(doc, building, *n, &levels)?;
    }

    let mut connection = LevelConnection {
        id,
        kind,
        class,
        levels,
        level_refs: floor_levels(floor_level),
        boundary: way.nodes.clone(),
        tags: way.tags.clone(),
    };
    for key in [
        osm::BUILDINGPART,
        osm::VERTICAL_PASSAGE,
        osm::FLOOR_RANGE,
        osm::LEVEL,
    ] {
        connection.tags.remove(key);
    }
    Ok(connection)
}

/// Inserts a document node into the building's arena, or extends the levels
/// of the already-present copy.
fn add_node(
    doc: &Document,
    building: &mut Building,
    id: NodeID,
    levels: &BTreeSet<Level>,
) -> Result<()> {
    let node = doc.nodes.get(&id).ok_or_else(|| anyhow!("{} missing from the input", id))?;
    building
        .nodes
        .entry(id)
        .or_insert_with(|| IndoorNode {
            id,
            pt: node.pt,
            levels: BTreeSet::new(),
            tags: node.tags.clone(),
        })
        .levels
        .extend(levels.iter().cloned());
    Ok(())
}

fn floor_levels(level: Level) -> BTreeSet<Level> {
    [level].into_iter().collect()
}

/// Doors and windows are expected to sit in some wall. A decorative point no
/// room boundary references is probably a mapping mistake.
fn warn_standalone_decorations(building: &Building) {
    let mut referenced: BTreeSet<NodeID> = BTreeSet::new();
    for room in &building.rooms {
        referenced.extend(room.boundary.iter().cloned());
    }
    for conn in &building.connections {
        referenced.extend(conn.boundary.iter().cloned());
    }
    for id in &building.pois {
        if referenced.contains(id) {
            continue;
        }
        let tags = &building.nodes[id].tags;
        if tags.contains_key(osm::DOOR) {
            warn!("Found standalone door {}", id);
        } else if tags.contains_key(osm::WINDOW) {
            warn!("Found standalone window {}", id);
        }
    }
}

/// The consolidation passes expect one connection fragment per level. A
/// passage arrives as one way tagged with its whole floor range, possibly
/// referenced by several floor relations; break it apart so each fragment
/// covers a single level.
fn split_connection_fragments(building: &mut Building, opts: &ConsolidateOptions) {
    let originals = std::mem::take(&mut building.connections);
    let mut fragments: Vec<LevelConnection> = Vec::new();

    // First a fragment per direct floor reference.
    for conn in &originals {
        for level in &conn.level_refs {
            let mut fragment = conn.clone();
            fragment.levels = floor_levels(*level);
            fragments.push(fragment);
        }
    }

    // Then cover the rest of each declared floor range, unless an overlapping
    // fragment already serves that level.
    for conn in &originals {
        'levels: for level in &conn.levels {
            for fragment in &fragments {
                if fragment.levels == floor_levels(*level)
                    && conn.overlaps(
                        fragment,
                        &building.nodes,
                        opts.max_level_connection_offset,
                        &opts.decorative_tags,
                    )
                {
                    continue 'levels;
                }
            }
            let mut fragment = conn.clone();
            fragment.levels = floor_levels(*level);
            fragments.push(fragment);
        }
    }

    building.connections = fragments;
}

fn snapshot_original_ids(doc: &Document, id: RelationID, building: &mut Building) {
    let mut pending = vec![id];
    while let Some(r) = pending.pop() {
        if !building.original_relations.insert(r) {
            continue;
        }
        let Some(relation) = doc.relations.get(&r) else {
            continue;
        };
        for (_, member) in &relation.members {
            match member {
                OsmID::Node(n) => {
                    building.original_nodes.insert(*n);
                }
                OsmID::Way(w) => {
                    building.original_ways.insert(*w);
                    if let Some(way) = doc.ways.get(w) {
                        building.original_nodes.extend(way.nodes.iter().cloned());
                    }
                }
                OsmID::Relation(sub) => {
                    pending.push(*sub);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader;

    /// One building, two floors. The ground floor has a square room and a
    /// stairwell fragment; the upper floor references the same stairwell way,
    /// whose floorrange spans both levels.
    const BUILDING: &str = r#"<osm version="0.6">
        <node id="1" lat="51.02550" lon="13.72230"/>
        <node id="2" lat="51.02550" lon="13.72240"/>
        <node id="3" lat="51.02560" lon="13.72240"/>
        <node id="4" lat="51.02560" lon="13.72230"/>
        <node id="5" lat="51.02550" lon="13.72250"/>
        <node id="6" lat="51.02560" lon="13.72250"/>
        <node id="7" lat="51.02555" lon="13.72231"><tag k="door" v="yes"/></node>
        <way id="10">
            <nd ref="1"/><nd ref="2"/><nd ref="3"/><nd ref="4"/><nd ref="1"/>
            <tag k="buildingpart" v="room"/>
            <tag k="name" v="lobby"/>
        </way>
        <way id="11">
            <nd ref="2"/><nd ref="5"/><nd ref="6"/><nd ref="3"/><nd ref="2"/>
            <tag k="buildingpart" v="verticalpassage"/>
            <tag k="buildingpart:verticalpassage" v="stairway"/>
            <tag k="buildingpart:verticalpassage:floorrange" v="0;1"/>
        </way>
        <relation id="100">
            <member type="way" ref="10" role="buildingpart"/>
            <member type="way" ref="11" role="buildingpart"/>
            <member type="node" ref="7" role=""/>
            <tag k="type" v="level"/>
            <tag k="level" v="0"/>
        </relation>
        <relation id="101">
            <member type="way" ref="11" role="buildingpart"/>
            <tag k="type" v="level"/>
            <tag k="level" v="1"/>
        </relation>
        <relation id="200">
            <member type="relation" ref="100" role="level"/>
            <member type="relation" ref="101" role="level"/>
            <tag k="type" v="building"/>
            <tag k="building:min_level" v="0"/>
            <tag k="building:max_level" v="1"/>
            <tag k="name" v="main hall"/>
        </relation>
    </osm>"#;

    fn extract_sample() -> Vec<Building> {
        let doc = reader::read_str(BUILDING).unwrap();
        let mut timer = situtil::Timer::new("test");
        let buildings =
            extract_buildings(&doc, &ConsolidateOptions::default(), &mut timer);
        timer.done();
        buildings
    }

    #[test]
    fn test_extract_structure() {
        let buildings = extract_sample();
        assert_eq!(buildings.len(), 1);
        let building = &buildings[0];
        assert_eq!(building.id, RelationID(200));
        assert_eq!(building.min_level, 0);
        assert_eq!(building.max_level, 1);
        assert_eq!(building.name, Some("main hall".to_string()));
        assert_eq!(building.floors.len(), 2);
        assert_eq!(building.rooms.len(), 1);
        assert_eq!(building.rooms[0].name, Some("lobby".to_string()));
        assert_eq!(building.rooms[0].class, IndoorClass::Room);
        assert_eq!(building.pois, vec![NodeID(7)]);
    }

    #[test]
    fn test_multi_level_passage_splits_into_fragments() {
        let buildings = extract_sample();
        let building = &buildings[0];
        // The stairwell way is referenced by both floors and spans levels 0
        // and 1: one fragment per level, not per reference per level.
        assert_eq!(building.connections.len(), 2);
        let levels: Vec<BTreeSet<Level>> = building
            .connections
            .iter()
            .map(|c| c.levels.clone())
            .collect();
        assert!(levels.contains(&floor_levels(Level::new(0.0))));
        assert!(levels.contains(&floor_levels(Level::new(1.0))));
        for conn in &building.connections {
            assert_eq!(conn.kind, ConnectionKind::Stairs);
            assert_eq!(
                conn.boundary,
                vec![NodeID(2), NodeID(5), NodeID(6), NodeID(3), NodeID(2)]
            );
        }
    }

    #[test]
    fn test_original_ids_snapshotted() {
        let buildings = extract_sample();
        let building = &buildings[0];
        assert_eq!(
            building.original_relations,
            [RelationID(100), RelationID(101), RelationID(200)]
                .into_iter()
                .collect()
        );
        assert_eq!(
            building.original_ways,
            [WayID(10), WayID(11)].into_iter().collect()
        );
        assert!(building.original_nodes.contains(&NodeID(1)));
        assert!(building.original_nodes.contains(&NodeID(7)));
    }

    #[test]
    fn test_building_without_levels_skipped() {
        let doc = reader::read_str(
            r#"<osm>
                <relation id="300"><tag k="type" v="building"/></relation>
            </osm>"#,
        )
        .unwrap();
        let mut timer = situtil::Timer::new("test");
        let buildings = extract_buildings(&doc, &ConsolidateOptions::default(), &mut timer);
        timer.done();
        assert!(buildings.is_empty());
    }

    #[test]
    fn test_shared_wall_nodes_collect_all_levels() {
        let buildings = extract_sample();
        let building = &buildings[0];
        // Node 2 belongs to the lobby (level 0) and the stairwell (0-1).
        let node = &building.nodes[&NodeID(2)];
        assert_eq!(
            node.levels,
            [Level::new(0.0), Level::new(1.0)].into_iter().collect()
        );
        // Node 1 is lobby-only.
        assert_eq!(building.nodes[&NodeID(1)].levels, floor_levels(Level::new(0.0)));
    }
}
