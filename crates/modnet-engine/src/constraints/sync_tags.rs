// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Writes a fixed set of property tags to the selected elements of a group.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::selection::{select_elements, SelectionMode};
use super::{
    format_id_list, format_optional_id, parse_bool, parse_id_list, parse_optional_id,
    ConstraintError, ConstraintResult, ConstraintRule, ConstraintScope, Resolution, ResolveContext,
};
use crate::models::Properties;
use crate::network::ModularNetwork;
use crate::tags;
use crate::types::{remap_id, ElementId, IdMap, NetworkError};

const PARAMETERS: &[&str] = &[
    "TagList",
    "PrototypeId",
    "Mode",
    "ModeParams",
    "Recursive",
    "RequiredTags",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynchronizeTagsConstraint {
    /// Tags as `{key=value}{key}`
    pub tag_list: String,
    /// Element whose properties replace the tag list
    pub prototype: Option<ElementId>,
    pub mode: String,
    pub mode_params: Vec<ElementId>,
    pub recursive: bool,
    /// Filter as `+{key=value}&+{key}`
    pub required_tags: String,
}

impl Default for SynchronizeTagsConstraint {
    fn default() -> Self {
        Self {
            tag_list: String::new(),
            prototype: None,
            mode: "s".to_string(),
            mode_params: Vec::new(),
            recursive: false,
            required_tags: String::new(),
        }
    }
}

/// Contents of each `{...}` item
fn curly_items(list: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut start = None;
    for (i, c) in list.char_indices() {
        match c {
            '{' if start.is_none() => start = Some(i + 1),
            '}' => {
                if let Some(s) = start.take() {
                    items.push(&list[s..i]);
                }
            }
            _ => {}
        }
    }
    items
}

/// Split `key=value` or `key`; `None` for more than one `=`
fn split_tag(item: &str) -> Option<(&str, &str)> {
    let mut parts = item.split('=');
    let key = parts.next()?;
    let value = parts.next().unwrap_or("");
    if parts.next().is_some() {
        return None;
    }
    Some((key, value))
}

impl SynchronizeTagsConstraint {
    pub fn with_tags(tag_list: &str) -> Self {
        Self {
            tag_list: tag_list.to_string(),
            ..Self::default()
        }
    }

    /// Tags to write, from the prototype or the tag list
    pub fn tags(&self, network: &ModularNetwork) -> ConstraintResult<BTreeMap<String, String>> {
        if let Some(prototype) = self.prototype {
            let properties = network.element_properties(prototype).ok_or_else(|| {
                ConstraintError::Unsatisfied(format!(
                    "Could not find prototype network element with id [{}]!",
                    prototype
                ))
            })?;
            return Ok(properties
                .iter()
                .filter(|(k, _)| !tags::is_managed_tag(k))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect());
        }

        let mut result = BTreeMap::new();
        let mut errors = Vec::new();
        for item in curly_items(&self.tag_list) {
            match split_tag(item) {
                Some((key, value)) => {
                    result.insert(key.to_string(), value.to_string());
                }
                None => errors.push(format!("Could not parse property tag list [{}]!", item)),
            }
        }
        if errors.is_empty() {
            Ok(result)
        } else {
            Err(ConstraintError::Unsatisfied(errors.join("\n")))
        }
    }

    /// True when `properties` carry every required tag
    pub fn has_required_tags(&self, properties: &Properties) -> bool {
        self.required_tags
            .split('&')
            .filter_map(|t| t.trim().strip_prefix("+{").and_then(|t| t.strip_suffix('}')))
            .all(|t| match split_tag(t) {
                Some((key, "")) if !t.contains('=') => properties.has(key),
                Some((key, value)) => properties.get(key) == Some(value),
                None => true,
            })
    }

    fn synchronize(&self, properties: &mut Properties, tags: &BTreeMap<String, String>) -> bool {
        if tags.is_empty() || !self.has_required_tags(properties) {
            return false;
        }
        let mut changed = false;
        for (key, value) in tags {
            changed |= properties.set(key.as_str(), value.as_str());
        }
        changed
    }
}

impl ConstraintRule for SynchronizeTagsConstraint {
    fn name(&self) -> &'static str {
        "SynchronizeTags"
    }

    fn check(&mut self, network: &ModularNetwork, scope: ConstraintScope) -> ConstraintResult<()> {
        if network.group(scope.group).is_none() {
            return Err(NetworkError::UnknownGroup(scope.group).into());
        }
        self.tags(network).map(|_| ())
    }

    fn enforce(&mut self, ctx: &mut ResolveContext<'_>, scope: ConstraintScope) -> ConstraintResult<Resolution> {
        let tags = self.tags(ctx.network)?;
        let mode = SelectionMode::parse(&self.mode, false);
        let selected = select_elements(ctx.network, scope.group, &self.mode_params, self.recursive);
        let mut changed = false;

        for id in selected.synapses(&mode) {
            if let Some(s) = ctx.network.synapse_mut(id) {
                changed |= self.synchronize(&mut s.properties, &tags);
            }
        }
        if mode.neurons {
            for id in &selected.neurons {
                if let Some(n) = ctx.network.neuron_mut(*id) {
                    changed |= self.synchronize(&mut n.properties, &tags);
                }
            }
        }
        Ok(Resolution::from_changed(changed))
    }

    fn remap_ids(&mut self, map: &IdMap) {
        self.prototype = self.prototype.map(|p| remap_id(map, p));
        for id in self.mode_params.iter_mut() {
            *id = remap_id(map, *id);
        }
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        PARAMETERS
    }

    fn parameter(&self, name: &str) -> Option<String> {
        match name {
            "TagList" => Some(self.tag_list.clone()),
            "PrototypeId" => Some(format_optional_id(self.prototype)),
            "Mode" => Some(self.mode.clone()),
            "ModeParams" => Some(format_id_list(&self.mode_params)),
            "Recursive" => Some(self.recursive.to_string()),
            "RequiredTags" => Some(self.required_tags.clone()),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> ConstraintResult<()> {
        match name {
            "TagList" => self.tag_list = value.to_string(),
            "PrototypeId" => self.prototype = parse_optional_id(name, value)?,
            "Mode" => self.mode = value.trim().to_string(),
            "ModeParams" => self.mode_params = parse_id_list(name, value)?,
            "Recursive" => self.recursive = parse_bool(name, value)?,
            "RequiredTags" => self.required_tags = value.to_string(),
            other => return Err(ConstraintError::UnknownParameter(other.to_string())),
        }
        Ok(())
    }
}
