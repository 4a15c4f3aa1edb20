// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
ModularNetwork - id-keyed store of neurons, synapses and groups.

All elements share one id space. The network is the single lookup service
for "does this element still exist"; callers hold ids, never references.

The graph operations are split over several files:
- this file: storage, lookups, id generation, membership, constraints
- `hierarchy`: module tree and enclosure queries
- `removal`: cascading removal and restore
- `merge`: bulk renumbering and network merging
*/

mod hierarchy;
mod merge;
mod removal;

pub use removal::{RemovedElement, Trashcan};

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::trace;

use crate::constraints::{ConstraintKind, ConstraintResult, GroupConstraint};
use crate::models::{
    ActivationFunction, Neuron, NeuronGroup, Properties, Synapse, SynapseTarget,
    TransferFunction,
};
use crate::types::{ElementId, ElementKind, IdMap, NetworkError, NetworkResult, Size2, Vector3};

/// Name of the permanent group every neuron joins on insertion
pub const DEFAULT_GROUP_NAME: &str = "Default";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModularNetwork {
    neurons: BTreeMap<ElementId, Neuron>,
    synapses: BTreeMap<ElementId, Synapse>,
    groups: BTreeMap<ElementId, NeuronGroup>,
    default_group: ElementId,
    next_id: u64,
    pub default_transfer_function: TransferFunction,
    pub default_activation_function: ActivationFunction,
}

impl Default for ModularNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl ModularNetwork {
    pub fn new() -> Self {
        let default_group = ElementId(1);
        let mut groups = BTreeMap::new();
        groups.insert(default_group, NeuronGroup::new(default_group, DEFAULT_GROUP_NAME));
        Self {
            neurons: BTreeMap::new(),
            synapses: BTreeMap::new(),
            groups,
            default_group,
            next_id: default_group.0 + 1,
            default_transfer_function: TransferFunction::default(),
            default_activation_function: ActivationFunction::default(),
        }
    }

    // ======================================================================
    // Identity
    // ======================================================================

    /// Hand out a fresh id
    pub fn generate_next_id(&mut self) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Move the id counter past every id in use, constraints included
    pub fn adjust_id_counter(&mut self) {
        let highest = self
            .neurons
            .keys()
            .chain(self.synapses.keys())
            .chain(self.groups.keys())
            .copied()
            .chain(
                self.groups
                    .values()
                    .flat_map(|g| g.constraints.iter().map(|c| c.id())),
            )
            .max()
            .map_or(0, |id| id.0);
        self.next_id = self.next_id.max(highest + 1);
    }

    fn reserve_id(&mut self, id: ElementId) {
        if id.0 >= self.next_id {
            self.next_id = id.0 + 1;
        }
    }

    /// True when any element, constraints included, uses `id`
    pub fn contains(&self, id: ElementId) -> bool {
        self.element_kind(id).is_some()
    }

    pub fn element_kind(&self, id: ElementId) -> Option<ElementKind> {
        if self.neurons.contains_key(&id) {
            Some(ElementKind::Neuron)
        } else if self.synapses.contains_key(&id) {
            Some(ElementKind::Synapse)
        } else if let Some(group) = self.groups.get(&id) {
            Some(if group.is_module() {
                ElementKind::Module
            } else {
                ElementKind::Group
            })
        } else if self.select_constraint_by_id(id).is_some() {
            Some(ElementKind::Constraint)
        } else {
            None
        }
    }

    // ======================================================================
    // Lookups
    // ======================================================================

    pub fn neuron(&self, id: ElementId) -> Option<&Neuron> {
        self.neurons.get(&id)
    }

    pub fn neuron_mut(&mut self, id: ElementId) -> Option<&mut Neuron> {
        self.neurons.get_mut(&id)
    }

    pub fn synapse(&self, id: ElementId) -> Option<&Synapse> {
        self.synapses.get(&id)
    }

    pub fn synapse_mut(&mut self, id: ElementId) -> Option<&mut Synapse> {
        self.synapses.get_mut(&id)
    }

    pub fn group(&self, id: ElementId) -> Option<&NeuronGroup> {
        self.groups.get(&id)
    }

    pub fn group_mut(&mut self, id: ElementId) -> Option<&mut NeuronGroup> {
        self.groups.get_mut(&id)
    }

    /// Group `id` if it is a module
    pub fn module(&self, id: ElementId) -> Option<&NeuronGroup> {
        self.groups.get(&id).filter(|g| g.is_module())
    }

    pub fn select_neuron_by_id(&self, id: ElementId) -> Option<&Neuron> {
        self.neuron(id)
    }

    pub fn select_module_by_id(&self, id: ElementId) -> Option<&NeuronGroup> {
        self.module(id)
    }

    pub fn select_constraint_by_id(&self, id: ElementId) -> Option<&GroupConstraint> {
        self.groups.values().find_map(|g| g.constraint(id))
    }

    pub fn select_constraint_by_id_mut(&mut self, id: ElementId) -> Option<&mut GroupConstraint> {
        self.groups.values_mut().find_map(|g| g.constraint_mut(id))
    }

    pub fn neurons(&self) -> impl Iterator<Item = &Neuron> {
        self.neurons.values()
    }

    pub fn synapses(&self) -> impl Iterator<Item = &Synapse> {
        self.synapses.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &NeuronGroup> {
        self.groups.values()
    }

    pub fn group_ids(&self) -> Vec<ElementId> {
        self.groups.keys().copied().collect()
    }

    pub fn neuron_count(&self) -> usize {
        self.neurons.len()
    }

    pub fn synapse_count(&self) -> usize {
        self.synapses.len()
    }

    pub fn default_group_id(&self) -> ElementId {
        self.default_group
    }

    pub fn default_group(&self) -> &NeuronGroup {
        &self.groups[&self.default_group]
    }

    /// Position of a neuron, synapse or group
    pub fn element_position(&self, id: ElementId) -> Option<Vector3> {
        if let Some(n) = self.neurons.get(&id) {
            Some(n.position)
        } else if let Some(s) = self.synapses.get(&id) {
            Some(s.position)
        } else {
            self.groups.get(&id).map(|g| g.position)
        }
    }

    /// Set a position, returning whether it moved by more than `tolerance`
    pub fn set_element_position(&mut self, id: ElementId, position: Vector3, tolerance: f64) -> bool {
        let slot = if let Some(n) = self.neurons.get_mut(&id) {
            &mut n.position
        } else if let Some(s) = self.synapses.get_mut(&id) {
            &mut s.position
        } else if let Some(g) = self.groups.get_mut(&id) {
            &mut g.position
        } else {
            return false;
        };
        if slot.approx_eq(&position, tolerance) {
            return false;
        }
        *slot = position;
        true
    }

    pub fn element_properties(&self, id: ElementId) -> Option<&Properties> {
        if let Some(n) = self.neurons.get(&id) {
            Some(&n.properties)
        } else if let Some(s) = self.synapses.get(&id) {
            Some(&s.properties)
        } else {
            self.groups.get(&id).map(|g| &g.properties)
        }
    }

    pub fn element_properties_mut(&mut self, id: ElementId) -> Option<&mut Properties> {
        if let Some(n) = self.neurons.get_mut(&id) {
            Some(&mut n.properties)
        } else if let Some(s) = self.synapses.get_mut(&id) {
            Some(&mut s.properties)
        } else {
            self.groups.get_mut(&id).map(|g| &mut g.properties)
        }
    }

    /// Drop every property starting with `prefix` on all elements
    pub fn remove_properties_with_prefix(&mut self, prefix: &str) -> usize {
        let mut removed = 0;
        for n in self.neurons.values_mut() {
            removed += n.properties.remove_with_prefix(prefix);
        }
        for s in self.synapses.values_mut() {
            removed += s.properties.remove_with_prefix(prefix);
        }
        for g in self.groups.values_mut() {
            removed += g.properties.remove_with_prefix(prefix);
        }
        removed
    }

    // ======================================================================
    // Neurons and synapses
    // ======================================================================

    /// Insert a neuron and make it a member of the default group
    ///
    /// # Errors
    ///
    /// Returns `DuplicateId` if the id is already in use
    pub fn add_neuron(&mut self, mut neuron: Neuron) -> NetworkResult<ElementId> {
        let id = neuron.id;
        if self.contains(id) {
            return Err(NetworkError::DuplicateId(id));
        }
        neuron.incoming.clear();
        neuron.outgoing.clear();
        self.reserve_id(id);
        self.neurons.insert(id, neuron);
        if let Some(default_group) = self.groups.get_mut(&self.default_group) {
            default_group.neurons.push(id);
        }
        trace!(target: "modnet-engine", "Added neuron {}", id);
        Ok(id)
    }

    /// Create a neuron with the network's default functions
    pub fn create_neuron(&mut self, name: &str) -> ElementId {
        let id = self.generate_next_id();
        let mut neuron = Neuron::new(id, name);
        neuron.transfer_function = self.default_transfer_function;
        neuron.activation_function = self.default_activation_function;
        self.neurons.insert(id, neuron);
        if let Some(default_group) = self.groups.get_mut(&self.default_group) {
            default_group.neurons.push(id);
        }
        id
    }

    /// Insert a synapse and link it to its endpoints
    ///
    /// # Errors
    ///
    /// Returns an error if the id is taken or an endpoint does not exist
    pub fn add_synapse(&mut self, mut synapse: Synapse) -> NetworkResult<ElementId> {
        let id = synapse.id;
        if self.contains(id) {
            return Err(NetworkError::DuplicateId(id));
        }
        if !self.neurons.contains_key(&synapse.source) {
            return Err(NetworkError::UnknownNeuron(synapse.source));
        }
        match synapse.target {
            SynapseTarget::Neuron(t) if !self.neurons.contains_key(&t) => {
                return Err(NetworkError::UnknownNeuron(t));
            }
            SynapseTarget::Synapse(t) if !self.synapses.contains_key(&t) => {
                return Err(NetworkError::InvalidSynapse(format!(
                    "target synapse {} does not exist",
                    t
                )));
            }
            _ => {}
        }

        synapse.incoming.clear();
        let (source, target) = (synapse.source, synapse.target);
        self.reserve_id(id);
        self.synapses.insert(id, synapse);
        self.link_synapse(id, source, target);
        trace!(target: "modnet-engine", "Added synapse {} ({} -> {:?})", id, source, target);
        Ok(id)
    }

    pub(crate) fn link_synapse(&mut self, id: ElementId, source: ElementId, target: SynapseTarget) {
        if let Some(n) = self.neurons.get_mut(&source) {
            n.outgoing.push(id);
        }
        match target {
            SynapseTarget::Neuron(t) => {
                if let Some(n) = self.neurons.get_mut(&t) {
                    n.incoming.push(id);
                }
            }
            SynapseTarget::Synapse(t) => {
                if let Some(s) = self.synapses.get_mut(&t) {
                    s.incoming.push(id);
                }
            }
        }
    }

    /// Connect two existing elements with a new synapse
    pub fn connect(
        &mut self,
        source: ElementId,
        target: SynapseTarget,
        strength: f64,
    ) -> NetworkResult<ElementId> {
        let id = self.generate_next_id();
        self.add_synapse(Synapse::new(id, source, target, strength))
    }

    /// Existing synapse from `source` to `target`
    pub fn find_synapse(&self, source: ElementId, target: SynapseTarget) -> Option<ElementId> {
        self.neurons.get(&source)?.outgoing.iter().copied().find(|s| {
            self.synapses
                .get(s)
                .map_or(false, |syn| syn.target == target)
        })
    }

    /// Incoming synapses of `target` plus, transitively, the synapses targeting those
    pub fn incoming_synapses_recursive(&self, target: SynapseTarget) -> Vec<ElementId> {
        let direct: &[ElementId] = match target {
            SynapseTarget::Neuron(id) => self
                .neurons
                .get(&id)
                .map(|n| n.incoming.as_slice())
                .unwrap_or(&[]),
            SynapseTarget::Synapse(id) => self
                .synapses
                .get(&id)
                .map(|s| s.incoming.as_slice())
                .unwrap_or(&[]),
        };
        let mut queue: VecDeque<ElementId> = direct.iter().copied().collect();
        let mut visited = AHashSet::new();
        let mut result = Vec::new();
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            result.push(id);
            if let Some(s) = self.synapses.get(&id) {
                queue.extend(s.incoming.iter().copied());
            }
        }
        result
    }

    /// Position of a synapse endpoint
    pub fn target_position(&self, target: SynapseTarget) -> Option<Vector3> {
        match target {
            SynapseTarget::Neuron(id) => self.neurons.get(&id).map(|n| n.position),
            SynapseTarget::Synapse(id) => self.synapses.get(&id).map(|s| s.position),
        }
    }

    /// Midpoint between a synapse's source and target
    pub fn synapse_center(&self, synapse: ElementId) -> Option<Vector3> {
        let s = self.synapses.get(&synapse)?;
        let source = self.neurons.get(&s.source)?.position;
        let target = self.target_position(s.target)?;
        Some(source.midpoint(&target))
    }

    // ======================================================================
    // Groups and membership
    // ======================================================================

    /// Insert a group as-is
    pub fn add_group(&mut self, group: NeuronGroup) -> NetworkResult<ElementId> {
        let id = group.id;
        if self.contains(id) {
            return Err(NetworkError::DuplicateId(id));
        }
        for c in &group.constraints {
            if self.contains(c.id()) {
                return Err(NetworkError::DuplicateId(c.id()));
            }
        }
        self.reserve_id(id);
        for c in &group.constraints {
            self.reserve_id(c.id());
        }
        self.groups.insert(id, group);
        Ok(id)
    }

    pub fn create_group(&mut self, name: &str) -> ElementId {
        let id = self.generate_next_id();
        self.groups.insert(id, NeuronGroup::new(id, name));
        id
    }

    pub fn create_module(&mut self, name: &str, position: Vector3, size: Size2) -> ElementId {
        let id = self.generate_next_id();
        let mut module = NeuronGroup::new_module(id, name);
        module.position = position;
        module.module = Some(crate::models::ModuleLayout { size });
        self.groups.insert(id, module);
        id
    }

    /// Direct module member of `neuron`, if any
    pub fn module_of_neuron(&self, neuron: ElementId) -> Option<ElementId> {
        self.groups
            .values()
            .find(|g| g.is_module() && g.contains_neuron(neuron))
            .map(|g| g.id)
    }

    pub fn groups_containing(&self, neuron: ElementId) -> Vec<ElementId> {
        self.groups
            .values()
            .filter(|g| g.contains_neuron(neuron))
            .map(|g| g.id)
            .collect()
    }

    /// Add a neuron to a group; returns `false` when it already was a member
    ///
    /// # Errors
    ///
    /// Fails for unknown ids and when a module would share a neuron with another module
    pub fn add_neuron_to_group(&mut self, group: ElementId, neuron: ElementId) -> NetworkResult<bool> {
        if !self.neurons.contains_key(&neuron) {
            return Err(NetworkError::UnknownNeuron(neuron));
        }
        let is_module = self
            .groups
            .get(&group)
            .ok_or(NetworkError::UnknownGroup(group))?
            .is_module();
        if is_module {
            if let Some(module) = self.module_of_neuron(neuron) {
                if module != group {
                    return Err(NetworkError::NeuronAlreadyInModule { neuron, module });
                }
            }
        }
        let g = self
            .groups
            .get_mut(&group)
            .ok_or(NetworkError::UnknownGroup(group))?;
        if g.neurons.contains(&neuron) {
            return Ok(false);
        }
        g.neurons.push(neuron);
        Ok(true)
    }

    pub fn remove_neuron_from_group(&mut self, group: ElementId, neuron: ElementId) -> bool {
        match self.groups.get_mut(&group) {
            Some(g) => {
                let before = g.neurons.len();
                g.neurons.retain(|n| *n != neuron);
                before != g.neurons.len()
            }
            None => false,
        }
    }

    // ======================================================================
    // Constraint management
    // ======================================================================

    /// Attach `constraint` to `group`
    ///
    /// # Errors
    ///
    /// Fails when the group is unknown, the constraint id is in use, or the
    /// constraint refuses the attachment
    pub fn add_constraint(
        &mut self,
        group: ElementId,
        mut constraint: GroupConstraint,
    ) -> ConstraintResult<ElementId> {
        if !self.groups.contains_key(&group) {
            return Err(NetworkError::UnknownGroup(group).into());
        }
        let id = constraint.id();
        if self.contains(id) {
            return Err(NetworkError::DuplicateId(id).into());
        }
        constraint.attach(self, group)?;
        self.reserve_id(id);
        self.groups
            .get_mut(&group)
            .ok_or(NetworkError::UnknownGroup(group))?
            .constraints
            .push(constraint);
        Ok(id)
    }

    /// Build a constraint of `kind` under a fresh id and attach it
    pub fn create_constraint(
        &mut self,
        group: ElementId,
        kind: ConstraintKind,
    ) -> ConstraintResult<ElementId> {
        let id = self.generate_next_id();
        self.add_constraint(group, GroupConstraint::new(id, kind))
    }

    /// Detach and return a constraint
    pub fn remove_constraint(&mut self, constraint: ElementId) -> Option<GroupConstraint> {
        let group = self.constraint_owner(constraint)?;
        let (_, mut removed) = self.take_constraint(group, constraint)?;
        removed.detach(self);
        Some(removed)
    }

    /// Group a constraint is attached to
    pub fn constraint_owner(&self, constraint: ElementId) -> Option<ElementId> {
        self.groups
            .values()
            .find(|g| g.constraint(constraint).is_some())
            .map(|g| g.id)
    }

    /// All constraints with their groups, in group order
    pub fn all_constraints(&self) -> impl Iterator<Item = (ElementId, &GroupConstraint)> {
        self.groups
            .values()
            .flat_map(|g| g.constraints.iter().map(move |c| (g.id, c)))
    }

    /// Temporarily move a constraint out of its group
    pub(crate) fn take_constraint(
        &mut self,
        group: ElementId,
        constraint: ElementId,
    ) -> Option<(usize, GroupConstraint)> {
        let g = self.groups.get_mut(&group)?;
        let index = g.constraints.iter().position(|c| c.id() == constraint)?;
        Some((index, g.constraints.remove(index)))
    }

    /// Put a taken constraint back; hands it back if its group is gone
    pub(crate) fn put_constraint(
        &mut self,
        group: ElementId,
        index: usize,
        constraint: GroupConstraint,
    ) -> Option<GroupConstraint> {
        match self.groups.get_mut(&group) {
            Some(g) => {
                let index = index.min(g.constraints.len());
                g.constraints.insert(index, constraint);
                None
            }
            None => Some(constraint),
        }
    }

    /// Rewrite the ids stored by every constraint
    pub fn notify_member_ids_changed(&mut self, map: &IdMap) {
        for g in self.groups.values_mut() {
            for c in g.constraints.iter_mut() {
                c.group_ids_changed(map);
            }
        }
    }
}
