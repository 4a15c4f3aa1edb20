// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Owner/reference element pairs of the mirroring constraints.
//!
//! Wire format: `owner,reference|owner,reference|...`. Parsing is lenient,
//! entries without exactly two numeric ids are dropped.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::types::{remap_id, ElementId, IdMap};

pub const CORRESPONDENCE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementPair {
    pub owner: ElementId,
    pub reference: ElementId,
}

impl ElementPair {
    pub fn new(owner: ElementId, reference: ElementId) -> Self {
        Self { owner, reference }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correspondence {
    version: u32,
    pairs: Vec<ElementPair>,
}

impl Default for Correspondence {
    fn default() -> Self {
        Self {
            version: CORRESPONDENCE_FORMAT_VERSION,
            pairs: Vec::new(),
        }
    }
}

impl Correspondence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(encoded: &str) -> Self {
        let pairs = encoded
            .split('|')
            .filter_map(|entry| {
                let parts: Vec<&str> = entry.split(',').collect();
                match parts.as_slice() {
                    [owner, reference] => Some(ElementPair::new(owner.parse().ok()?, reference.parse().ok()?)),
                    _ => None,
                }
            })
            .collect();
        Self {
            version: CORRESPONDENCE_FORMAT_VERSION,
            pairs,
        }
    }

    pub fn encode(&self) -> String {
        self.pairs
            .iter()
            .map(|p| format!("{},{}", p.owner, p.reference))
            .collect::<Vec<_>>()
            .join("|")
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn pairs(&self) -> &[ElementPair] {
        &self.pairs
    }

    pub fn push(&mut self, owner: ElementId, reference: ElementId) {
        self.pairs.push(ElementPair::new(owner, reference));
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn reference_of(&self, owner: ElementId) -> Option<ElementId> {
        self.pairs.iter().find(|p| p.owner == owner).map(|p| p.reference)
    }

    pub fn owner_of(&self, reference: ElementId) -> Option<ElementId> {
        self.pairs.iter().find(|p| p.reference == reference).map(|p| p.owner)
    }

    pub fn remap(&mut self, map: &IdMap) {
        for pair in self.pairs.iter_mut() {
            pair.owner = remap_id(map, pair.owner);
            pair.reference = remap_id(map, pair.reference);
        }
    }
}

impl FromIterator<ElementPair> for Correspondence {
    fn from_iter<I: IntoIterator<Item = ElementPair>>(iter: I) -> Self {
        Self {
            version: CORRESPONDENCE_FORMAT_VERSION,
            pairs: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Correspondence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Correspondence {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Correspondence::parse(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_skips_malformed_entries() {
        let c = Correspondence::parse("10,20|abc,3|4|5,6,7| 8 ,9|");
        assert_eq!(
            c.pairs(),
            &[
                ElementPair::new(ElementId(10), ElementId(20)),
                ElementPair::new(ElementId(8), ElementId(9)),
            ]
        );
        assert_eq!(c.encode(), "10,20|8,9");
    }

    #[test]
    fn test_lookup_both_directions() {
        let c: Correspondence = "1,2|3,4".parse().unwrap();
        assert_eq!(c.reference_of(ElementId(3)), Some(ElementId(4)));
        assert_eq!(c.owner_of(ElementId(2)), Some(ElementId(1)));
        assert_eq!(c.owner_of(ElementId(1)), None);
    }

    #[test]
    fn test_remap_rewrites_both_sides() {
        let mut c = Correspondence::parse("1,2");
        let mut map = IdMap::new();
        map.insert(ElementId(2), ElementId(12));
        c.remap(&map);
        assert_eq!(c.to_string(), "1,12");
    }

    proptest! {
        #[test]
        fn parse_never_panics(input in ".*") {
            let c = Correspondence::parse(&input);
            prop_assert_eq!(c.version(), CORRESPONDENCE_FORMAT_VERSION);
        }

        #[test]
        fn encoded_pairs_parse_back(pairs in proptest::collection::vec((1u64..10_000, 1u64..10_000), 0..20)) {
            let c: Correspondence = pairs
                .iter()
                .map(|(o, r)| ElementPair::new(ElementId(*o), ElementId(*r)))
                .collect();
            prop_assert_eq!(Correspondence::parse(&c.encode()), c);
        }
    }
}
