//! Building levels and the OSM `level` tag syntax. Tags in the wild use
//! single values ("2"), lists ("1;2" or "1, 2"), ranges ("1 to 3"), and
//! fractional mezzanines ("1.5"); this module round-trips all of them.

use std::collections::BTreeSet;
use std::fmt;

use log::warn;
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};

/// A single floor of a building. Fractional levels are allowed, so mezzanines
/// like 1.5 work. Total ordering lets levels key maps and sort ranges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Level(NotNan<f64>);

impl Level {
    /// Panics on NaN.
    pub fn new(x: f64) -> Level {
        match NotNan::new(x) {
            Ok(x) => Level(x),
            Err(_) => panic!("Level can't be NaN"),
        }
    }

    pub fn inner(self) -> f64 {
        self.0.into_inner()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", format_float(self.inner()))
    }
}

/// Formats a float the way OSM tag values spell them: integral values without
/// a decimal point.
pub fn format_float(x: f64) -> String {
    if x % 1.0 == 0.0 {
        format!("{}", x as i64)
    } else {
        format!("{}", x)
    }
}

/// Parses an OSM `level` tag into the set of levels it names. Accepts single
/// values, `;` or `,` separated lists, and "a to b" ranges in either order.
/// Unparseable chunks are skipped with a warning instead of failing the whole
/// tag.
pub fn parse_levels(raw: &str) -> BTreeSet<Level> {
    let mut levels = BTreeSet::new();
    for chunk in raw.replace(',', ";").replace(' ', "").split(';') {
        if chunk.is_empty() {
            continue;
        }
        if let Ok(x) = chunk.parse::<f64>() {
            levels.insert(Level::new(x));
            continue;
        }
        // Ranges are whole levels only; "1.5 to 3" doesn't occur in the data.
        let endpoints: Vec<Option<i64>> = chunk.split("to").map(|x| x.parse().ok()).collect();
        match (endpoints.first(), endpoints.get(1)) {
            (Some(Some(a)), Some(Some(b))) if endpoints.len() == 2 => {
                for x in (*a.min(b))..=(*a.max(b)) {
                    levels.insert(Level::new(x as f64));
                }
            }
            _ => {
                warn!("Can't parse level chunk {:?} from {:?}", chunk, raw);
            }
        }
    }
    levels
}

/// Formats a set of levels back into tag syntax, collapsing runs of levels at
/// most 1 apart into ranges: {-2, -1, 1, 1.5, 4} becomes "-2--1;1-1.5;4".
pub fn format_levels(levels: &BTreeSet<Level>) -> String {
    let sorted: Vec<Level> = levels.iter().cloned().collect();
    if sorted.is_empty() {
        return String::new();
    }
    let mut chunks: Vec<String> = Vec::new();
    let mut range_start = sorted[0];
    let mut prev = sorted[0];
    for lvl in &sorted[1..] {
        if lvl.inner() - prev.inner() > 1.0 {
            chunks.push(format_range(range_start, prev));
            range_start = *lvl;
        }
        prev = *lvl;
    }
    chunks.push(format_range(range_start, prev));
    chunks.join(";")
}

fn format_range(start: Level, end: Level) -> String {
    if start == end {
        format!("{}", start)
    } else {
        format!("{}-{}", start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(xs: &[f64]) -> BTreeSet<Level> {
        xs.iter().map(|x| Level::new(*x)).collect()
    }

    #[test]
    fn test_parse_single() {
        assert_eq!(parse_levels("1"), levels(&[1.0]));
        assert_eq!(parse_levels("-0.5"), levels(&[-0.5]));
    }

    #[test]
    fn test_parse_lists() {
        assert_eq!(parse_levels("1;2"), levels(&[1.0, 2.0]));
        assert_eq!(parse_levels("1, 2, 3"), levels(&[1.0, 2.0, 3.0]));
        // A trailing separator is tolerated.
        assert_eq!(parse_levels("1,"), levels(&[1.0]));
    }

    #[test]
    fn test_parse_ranges() {
        assert_eq!(parse_levels("1 to 3"), levels(&[1.0, 2.0, 3.0]));
        assert_eq!(parse_levels("3 to 1"), levels(&[1.0, 2.0, 3.0]));
        assert_eq!(parse_levels("1;3 to4"), levels(&[1.0, 3.0, 4.0]));
        assert_eq!(parse_levels("-2 to -1"), levels(&[-2.0, -1.0]));
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(parse_levels("attic"), levels(&[]));
        assert_eq!(parse_levels("attic;2"), levels(&[2.0]));
    }

    #[test]
    fn test_format() {
        assert_eq!(format_levels(&levels(&[1.0])), "1");
        assert_eq!(format_levels(&levels(&[1.5])), "1.5");
        assert_eq!(format_levels(&levels(&[1.0, 2.0, 3.0])), "1-3");
        assert_eq!(
            format_levels(&levels(&[-1.0, -2.0, 1.0, 1.5, 4.0, 6.0, 7.0, 7.5, 8.0])),
            "-2--1;1-1.5;4;6-8"
        );
        assert_eq!(format_levels(&levels(&[])), "");
    }

    #[test]
    fn test_roundtrip() {
        // Sets without runs format as plain lists, which parse back exactly.
        let set = levels(&[1.0, 3.0, 5.5]);
        assert_eq!(parse_levels(&format_levels(&set)), set);
    }
}
