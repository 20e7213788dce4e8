//! Serializes consolidated buildings as an osmChange diff. Elements whose
//! ids weren't in the building's original snapshot go into `<create>`,
//! surviving originals into `<modify>`, and originals no longer referenced
//! into `<delete>`.

use std::io::Write;

use anyhow::Result;
use log::info;

use situtil::{Tags, Timer};

use sit_model::osm::{NodeID, OsmID, RelationID, WayID};
use sit_model::Building;

pub fn write_osmchange(buildings: &[Building], path: &str, timer: &mut Timer) -> Result<()> {
    timer.start(format!("write {}", path));
    let out = osmchange_string(buildings)?;
    let mut f = fs_err::File::create(path)?;
    f.write_all(out.as_bytes())?;
    timer.stop(format!("write {}", path));
    info!("Wrote {}", path);
    Ok(())
}

pub fn osmchange_string(buildings: &[Building]) -> Result<String> {
    let mut create = Vec::new();
    let mut modify = Vec::new();
    let mut delete = Vec::new();

    for building in buildings {
        let mut current_nodes = Vec::new();
        let mut current_ways: Vec<(WayID, Vec<NodeID>, Tags)> = Vec::new();
        let mut current_relations = Vec::new();

        for node in building.nodes.values() {
            current_nodes.push(node);
        }
        for room in &building.rooms {
            current_ways.push((room.id, room.boundary.clone(), room.osm_tags()));
        }
        for conn in &building.connections {
            current_ways.push((conn.id, conn.boundary.clone(), conn.osm_tags()));
        }
        for floor in &building.floors {
            if let Some(shell) = &floor.shell {
                current_ways.push((shell.id, shell.boundary.clone(), shell.osm_tags()));
            }
        }
        for floor in &building.floors {
            let mut members: Vec<(String, OsmID)> = Vec::new();
            if let Some(shell) = &floor.shell {
                members.push(("shell".to_string(), OsmID::Way(shell.id)));
            }
            current_relations.push((floor.id, floor.osm_tags(), members));
        }
        current_relations.push((building.id, building.osm_tags(), building_members(building)));

        for node in &current_nodes {
            let xml = node_element(node.id, node.pt, &node.osm_tags())?;
            if building.original_nodes.contains(&node.id) {
                modify.push(xml);
            } else {
                create.push(xml);
            }
        }
        for (id, boundary, tags) in &current_ways {
            let xml = way_element(*id, boundary, tags)?;
            if building.original_ways.contains(id) {
                modify.push(xml);
            } else {
                create.push(xml);
            }
        }
        for (id, tags, members) in &current_relations {
            let xml = relation_element(*id, tags, members)?;
            if building.original_relations.contains(id) {
                modify.push(xml);
            } else {
                create.push(xml);
            }
        }

        // Everything in the snapshot that didn't survive consolidation.
        for id in &building.original_nodes {
            if !building.nodes.contains_key(id) {
                delete.push(stub_element("node", id.0)?);
            }
        }
        let surviving_ways: Vec<WayID> = current_ways.iter().map(|(id, _, _)| *id).collect();
        for id in &building.original_ways {
            // The footprint ways aren't re-emitted, but they still exist.
            if !surviving_ways.contains(id)
                && building.outline != Some(*id)
                && building.innerline != Some(*id)
            {
                delete.push(stub_element("way", id.0)?);
            }
        }
        let surviving_relations: Vec<RelationID> =
            current_relations.iter().map(|(id, _, _)| *id).collect();
        for id in &building.original_relations {
            if !surviving_relations.contains(id) {
                delete.push(stub_element("relation", id.0)?);
            }
        }
    }

    info!(
        "osmChange: {} created, {} modified, {} deleted",
        create.len(),
        modify.len(),
        delete.len()
    );
    let mut out = String::new();
    out.push_str("<osmChange version=\"0.6\" generator=\"convert_indoor\">\n");
    for (section, elements) in [("create", create), ("modify", modify), ("delete", delete)] {
        out.push_str(&format!("<{}>\n", section));
        for e in elements {
            out.push_str("  ");
            out.push_str(&e);
            out.push('\n');
        }
        out.push_str(&format!("</{}>\n", section));
    }
    out.push_str("</osmChange>\n");
    Ok(out)
}

/// The building relation keeps its full membership: every indoor node, room,
/// connection, and shell way, plus the footprint, floor relations, and
/// entrances. Otherwise the modify would strip the relation's structure.
fn building_members(building: &Building) -> Vec<(String, OsmID)> {
    let mut members: Vec<(String, OsmID)> = Vec::new();
    if let Some(w) = building.outline {
        members.push(("outline".to_string(), OsmID::Way(w)));
    }
    if let Some(w) = building.innerline {
        members.push(("inner".to_string(), OsmID::Way(w)));
    }
    for id in &building.pois {
        members.push((String::new(), OsmID::Node(*id)));
    }
    for room in &building.rooms {
        members.push((String::new(), OsmID::Way(room.id)));
    }
    for conn in &building.connections {
        members.push((String::new(), OsmID::Way(conn.id)));
    }
    for floor in &building.floors {
        if let Some(shell) = &floor.shell {
            members.push((String::new(), OsmID::Way(shell.id)));
        }
    }
    for floor in &building.floors {
        members.push(("level".to_string(), OsmID::Relation(floor.id)));
    }
    for id in &building.entrances {
        members.push(("entrance".to_string(), OsmID::Node(*id)));
    }
    members
}

fn node_element(id: NodeID, pt: geom::LonLat, tags: &Tags) -> Result<String> {
    let mut elem = xmltree::Element::new("node");
    elem.attributes.insert("id".to_string(), id.0.to_string());
    elem.attributes
        .insert("lat".to_string(), pt.latitude.to_string());
    elem.attributes
        .insert("lon".to_string(), pt.longitude.to_string());
    push_tags(&mut elem, tags);
    element_string(elem)
}

fn way_element(id: WayID, nodes: &[NodeID], tags: &Tags) -> Result<String> {
    let mut elem = xmltree::Element::new("way");
    elem.attributes.insert("id".to_string(), id.0.to_string());
    for n in nodes {
        let mut nd = xmltree::Element::new("nd");
        nd.attributes.insert("ref".to_string(), n.0.to_string());
        elem.children.push(xmltree::XMLNode::Element(nd));
    }
    push_tags(&mut elem, tags);
    element_string(elem)
}

fn relation_element(
    id: RelationID,
    tags: &Tags,
    members: &[(String, OsmID)],
) -> Result<String> {
    let mut elem = xmltree::Element::new("relation");
    elem.attributes.insert("id".to_string(), id.0.to_string());
    for (role, member) in members {
        let mut m = xmltree::Element::new("member");
        let kind = match member {
            OsmID::Node(_) => "node",
            OsmID::Way(_) => "way",
            OsmID::Relation(_) => "relation",
        };
        m.attributes.insert("type".to_string(), kind.to_string());
        m.attributes
            .insert("ref".to_string(), member.inner().to_string());
        m.attributes.insert("role".to_string(), role.clone());
        elem.children.push(xmltree::XMLNode::Element(m));
    }
    push_tags(&mut elem, tags);
    element_string(elem)
}

/// A delete only needs the element's id.
fn stub_element(kind: &str, id: i64) -> Result<String> {
    let mut elem = xmltree::Element::new(kind);
    elem.attributes.insert("id".to_string(), id.to_string());
    element_string(elem)
}

fn push_tags(elem: &mut xmltree::Element, tags: &Tags) {
    for (k, v) in tags.inner() {
        let mut tag = xmltree::Element::new("tag");
        tag.attributes.insert("k".to_string(), k.to_string());
        tag.attributes.insert("v".to_string(), v.to_string());
        elem.children.push(xmltree::XMLNode::Element(tag));
    }
}

fn element_string(elem: xmltree::Element) -> Result<String> {
    let mut bytes: Vec<u8> = Vec::new();
    elem.write_with_config(
        &mut bytes,
        xmltree::EmitterConfig::new().write_document_declaration(false),
    )?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use geom::LonLat;

    use super::*;
    use sit_model::{IndoorClass, IndoorNode, Level, Room};

    fn sample_building() -> Building {
        let mut building = Building::new(RelationID(200), 0, 1);
        for id in [1, 2, -5] {
            building.nodes.insert(
                NodeID(id),
                IndoorNode {
                    id: NodeID(id),
                    pt: LonLat::new(13.7, 51.0),
                    levels: [Level::new(0.0)].into_iter().collect(),
                    tags: situtil::Tags::empty(),
                },
            );
        }
        building.rooms.push(Room {
            id: WayID(10),
            levels: [Level::new(0.0)].into_iter().collect(),
            class: IndoorClass::Room,
            boundary: vec![NodeID(1), NodeID(2), NodeID(-5), NodeID(1)],
            height: None,
            name: None,
            reference: None,
            tags: situtil::Tags::empty(),
        });
        building.pois = vec![NodeID(2)];
        building.original_nodes = [NodeID(1), NodeID(2), NodeID(3)].into_iter().collect();
        building.original_ways = [WayID(10), WayID(11)].into_iter().collect();
        building.original_relations = BTreeSet::from([RelationID(200)]);
        building
    }

    /// Ids of all `kind` elements inside the `section` of the diff.
    fn ids(doc: &roxmltree::Document, section: &str, kind: &str) -> Vec<i64> {
        doc.descendants()
            .find(|n| n.has_tag_name(section))
            .unwrap()
            .descendants()
            .filter(|n| n.has_tag_name(kind))
            .map(|n| n.attribute("id").unwrap().parse().unwrap())
            .collect()
    }

    #[test]
    fn test_classification() {
        let out = osmchange_string(&[sample_building()]).unwrap();
        let doc = roxmltree::Document::parse(&out).unwrap();
        // The synthetic node -5 is new; originals survive as modifies; node 3
        // and way 11 vanished.
        assert_eq!(ids(&doc, "create", "node"), vec![-5]);
        assert!(ids(&doc, "modify", "node").contains(&1));
        assert_eq!(ids(&doc, "modify", "way"), vec![10]);
        assert_eq!(ids(&doc, "modify", "relation"), vec![200]);
        assert_eq!(ids(&doc, "delete", "node"), vec![3]);
        assert_eq!(ids(&doc, "delete", "way"), vec![11]);
        assert!(ids(&doc, "delete", "relation").is_empty());
    }

    #[test]
    fn test_way_serialization() {
        let out = osmchange_string(&[sample_building()]).unwrap();
        let doc = roxmltree::Document::parse(&out).unwrap();
        let way = doc
            .descendants()
            .find(|n| n.has_tag_name("way"))
            .unwrap();
        let nd_refs: Vec<i64> = way
            .children()
            .filter(|n| n.has_tag_name("nd"))
            .map(|n| n.attribute("ref").unwrap().parse().unwrap())
            .collect();
        assert_eq!(nd_refs, vec![1, 2, -5, 1]);
        let tags: Vec<(&str, &str)> = way
            .children()
            .filter(|n| n.has_tag_name("tag"))
            .map(|n| (n.attribute("k").unwrap(), n.attribute("v").unwrap()))
            .collect();
        assert!(tags.contains(&("indoor", "room")));
        assert!(tags.contains(&("level", "0")));
    }

    #[test]
    fn test_building_relation_keeps_membership() {
        let out = osmchange_string(&[sample_building()]).unwrap();
        let doc = roxmltree::Document::parse(&out).unwrap();
        let relation = doc
            .descendants()
            .find(|n| n.has_tag_name("relation"))
            .unwrap();
        let members: Vec<(&str, i64)> = relation
            .children()
            .filter(|n| n.has_tag_name("member"))
            .map(|n| {
                (
                    n.attribute("type").unwrap(),
                    n.attribute("ref").unwrap().parse().unwrap(),
                )
            })
            .collect();
        // The room way and the indoor node stay members of the relation.
        assert!(members.contains(&("way", 10)));
        assert!(members.contains(&("node", 2)));
    }
}
