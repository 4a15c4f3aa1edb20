// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
NeuronGroup - named collection of neurons that owns constraints.

A group carrying a [`ModuleLayout`] is a neuro module: it has a size, may be
nested inside another group and claims its neurons exclusively.
*/

use serde::{Deserialize, Serialize};

use super::properties::Properties;
use crate::constraints::GroupConstraint;
use crate::tags;
use crate::types::{ElementId, Size2, Vector3};

/// Geometry that turns a group into a module
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleLayout {
    pub size: Size2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuronGroup {
    pub id: ElementId,
    pub name: String,
    pub position: Vector3,
    pub properties: Properties,
    pub(crate) neurons: Vec<ElementId>,
    pub(crate) sub_modules: Vec<ElementId>,
    pub(crate) parent: Option<ElementId>,
    pub(crate) constraints: Vec<GroupConstraint>,
    pub(crate) module: Option<ModuleLayout>,
}

impl NeuronGroup {
    /// Plain group
    pub fn new(id: ElementId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            position: Vector3::ZERO,
            properties: Properties::new(),
            neurons: Vec::new(),
            sub_modules: Vec::new(),
            parent: None,
            constraints: Vec::new(),
            module: None,
        }
    }

    /// Module of the default type
    pub fn new_module(id: ElementId, name: impl Into<String>) -> Self {
        let mut group = Self::new(id, name);
        group.module = Some(ModuleLayout::default());
        group
            .properties
            .set(tags::MODULE_TYPE, tags::DEFAULT_MODULE_TYPE);
        group
    }

    pub fn is_module(&self) -> bool {
        self.module.is_some()
    }

    /// Size of a module, `None` for plain groups
    pub fn size(&self) -> Option<Size2> {
        self.module.map(|layout| layout.size)
    }

    pub fn neurons(&self) -> &[ElementId] {
        &self.neurons
    }

    pub fn contains_neuron(&self, neuron: ElementId) -> bool {
        self.neurons.contains(&neuron)
    }

    pub fn sub_modules(&self) -> &[ElementId] {
        &self.sub_modules
    }

    /// Group this module is nested in
    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    pub fn constraints(&self) -> &[GroupConstraint] {
        &self.constraints
    }

    pub fn constraint(&self, id: ElementId) -> Option<&GroupConstraint> {
        self.constraints.iter().find(|c| c.id() == id)
    }

    pub fn constraint_mut(&mut self, id: ElementId) -> Option<&mut GroupConstraint> {
        self.constraints.iter_mut().find(|c| c.id() == id)
    }
}
