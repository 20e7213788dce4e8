//! Reads OSM XML into a `Document`. References to objects missing from the
//! input are kept as-is, not dropped; the fetcher resolves them afterwards.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};

use geom::LonLat;
use situtil::{prettyprint_usize, Tags, Timer};

use sit_model::osm::{NodeID, OsmID, RelationID, WayID};

#[derive(Default)]
pub struct Document {
    pub nodes: BTreeMap<NodeID, Node>,
    pub ways: BTreeMap<WayID, Way>,
    pub relations: BTreeMap<RelationID, Relation>,
}

pub struct Node {
    pub pt: LonLat,
    pub tags: Tags,
}

pub struct Way {
    pub nodes: Vec<NodeID>,
    pub tags: Tags,
}

pub struct Relation {
    pub tags: Tags,
    /// (role, member)
    pub members: Vec<(String, OsmID)>,
}

impl Document {
    pub fn empty() -> Document {
        Document::default()
    }

    /// Splices in another document, such as a batch of fetched elements.
    /// Objects already present win over incoming duplicates.
    pub fn merge(&mut self, other: Document) {
        for (id, node) in other.nodes {
            self.nodes.entry(id).or_insert(node);
        }
        for (id, way) in other.ways {
            self.ways.entry(id).or_insert(way);
        }
        for (id, relation) in other.relations {
            self.relations.entry(id).or_insert(relation);
        }
    }

    /// All references pointing at objects this document doesn't contain.
    pub fn missing_references(
        &self,
    ) -> (BTreeSet<NodeID>, BTreeSet<WayID>, BTreeSet<RelationID>) {
        let mut nodes = BTreeSet::new();
        let mut ways = BTreeSet::new();
        let mut relations = BTreeSet::new();
        for way in self.ways.values() {
            for n in &way.nodes {
                if !self.nodes.contains_key(n) {
                    nodes.insert(*n);
                }
            }
        }
        for relation in self.relations.values() {
            for (_, member) in &relation.members {
                match member {
                    OsmID::Node(n) => {
                        if !self.nodes.contains_key(n) {
                            nodes.insert(*n);
                        }
                    }
                    OsmID::Way(w) => {
                        if !self.ways.contains_key(w) {
                            ways.insert(*w);
                        }
                    }
                    OsmID::Relation(r) => {
                        if !self.relations.contains_key(r) {
                            relations.insert(*r);
                        }
                    }
                }
            }
        }
        (nodes, ways, relations)
    }
}

pub fn read(path: &str, timer: &mut Timer) -> Result<Document> {
    timer.start(format!("read {}", path));
    let raw_string = fs_err::read_to_string(path)?;
    let doc = read_str(&raw_string)?;
    timer.stop(format!("read {}", path));
    timer.note(format!(
        "Found {} nodes, {} ways, {} relations",
        prettyprint_usize(doc.nodes.len()),
        prettyprint_usize(doc.ways.len()),
        prettyprint_usize(doc.relations.len())
    ));
    Ok(doc)
}

pub fn read_str(raw_string: &str) -> Result<Document> {
    let tree = roxmltree::Document::parse(raw_string)?;
    let mut doc = Document::empty();

    for obj in tree.descendants() {
        if !obj.is_element() {
            continue;
        }
        match obj.tag_name().name() {
            "node" => {
                let id = NodeID(obj.attribute("id").unwrap().parse::<i64>()?);
                if doc.nodes.contains_key(&id) {
                    bail!("Duplicate {}, your .osm is corrupt", id);
                }
                let pt = LonLat::new(
                    obj.attribute("lon").unwrap().parse::<f64>()?,
                    obj.attribute("lat").unwrap().parse::<f64>()?,
                );
                let tags = read_tags(obj);
                doc.nodes.insert(id, Node { pt, tags });
            }
            "way" => {
                let id = WayID(obj.attribute("id").unwrap().parse::<i64>()?);
                if doc.ways.contains_key(&id) {
                    bail!("Duplicate {}, your .osm is corrupt", id);
                }
                let tags = read_tags(obj);
                let mut nodes = Vec::new();
                for child in obj.children() {
                    if child.tag_name().name() == "nd" {
                        nodes.push(NodeID(child.attribute("ref").unwrap().parse::<i64>()?));
                    }
                }
                doc.ways.insert(id, Way { tags, nodes });
            }
            "relation" => {
                let id = RelationID(obj.attribute("id").unwrap().parse::<i64>()?);
                if doc.relations.contains_key(&id) {
                    bail!("Duplicate {}, your .osm is corrupt", id);
                }
                let tags = read_tags(obj);
                let mut members = Vec::new();
                for child in obj.children() {
                    if child.tag_name().name() == "member" {
                        let reference = child.attribute("ref").unwrap().parse::<i64>()?;
                        let member = match child.attribute("type").unwrap() {
                            "node" => OsmID::Node(NodeID(reference)),
                            "way" => OsmID::Way(WayID(reference)),
                            "relation" => OsmID::Relation(RelationID(reference)),
                            _ => continue,
                        };
                        members.push((child.attribute("role").unwrap_or("").to_string(), member));
                    }
                }
                doc.relations.insert(id, Relation { tags, members });
            }
            _ => {}
        }
    }
    Ok(doc)
}

fn read_tags(obj: roxmltree::Node) -> Tags {
    let mut tags = Tags::empty();
    for child in obj.children() {
        if child.tag_name().name() == "tag" {
            let key = child.attribute("k").unwrap();
            // Filter out editor bookkeeping
            if key.starts_with("tiger:") || key.starts_with("old_name:") {
                continue;
            }
            tags.insert(key, child.attribute("v").unwrap());
        }
    }
    tags
}
