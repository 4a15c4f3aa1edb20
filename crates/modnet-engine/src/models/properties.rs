// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
String-keyed property bag carried by every element.

Tags are properties whose presence matters more than their value; a tag set
without a value is stored with an empty string.
*/

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tags;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, String>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Set `key` to `value`, returning whether the stored value changed
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let value = value.into();
        match self.0.insert(key.into(), value.clone()) {
            Some(previous) => previous != value,
            None => true,
        }
    }

    /// Set a value-less tag
    pub fn tag(&mut self, key: &str) -> bool {
        if self.has(key) {
            return false;
        }
        self.set(key, "")
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn remove_with_prefix(&mut self, prefix: &str) -> usize {
        let before = self.0.len();
        self.0.retain(|k, _| !k.starts_with(prefix));
        before - self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True for the `input` and `output` interface tags
    pub fn is_interface(&self) -> bool {
        self.has(tags::INPUT) || self.has(tags::OUTPUT)
    }

    /// Copy every `+`-prefixed property of `source`; returns whether anything changed
    pub fn copy_user_properties_from(&mut self, source: &Properties) -> bool {
        let mut changed = false;
        for (key, value) in source.iter() {
            if key.starts_with(tags::USER_PROPERTY_PREFIX) {
                changed |= self.set(key, value);
            }
        }
        changed
    }

    /// Add single-letter flags to the value of `key`, keeping each letter once
    pub fn add_letters(&mut self, key: &str, letters: &str) -> bool {
        let mut current = self.get(key).unwrap_or_default().to_string();
        let mut changed = !self.has(key);
        for letter in letters.chars() {
            if !current.contains(letter) {
                current.push(letter);
                changed = true;
            }
        }
        if changed {
            self.set(key, current);
        }
        changed
    }
}

impl FromIterator<(String, String)> for Properties {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Properties(iter.into_iter().collect())
    }
}
