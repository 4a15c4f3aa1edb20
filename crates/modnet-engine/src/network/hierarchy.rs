// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Module tree of a modular network.

Parent links are validated on insertion so the tree never contains cycles
and a module is enclosed by at most one group.
*/

use ahash::AHashSet;
use tracing::trace;

use super::ModularNetwork;
use crate::models::SynapseTarget;
use crate::types::{ElementId, NetworkError, NetworkResult, Size2, Vector3};

impl ModularNetwork {
    /// Nest module `child` inside `parent`
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - either id is unknown or `child` is not a module
    /// - `child` is `parent`, already listed, or already nested elsewhere
    /// - `child` encloses `parent` (cycle)
    /// - a direct neuron of `child` is already enclosed by `parent`
    pub fn add_sub_module(&mut self, parent: ElementId, child: ElementId) -> NetworkResult<()> {
        let parent_group = self
            .groups
            .get(&parent)
            .ok_or(NetworkError::UnknownGroup(parent))?;
        let child_group = self
            .groups
            .get(&child)
            .ok_or(NetworkError::UnknownGroup(child))?;
        if !child_group.is_module() {
            return Err(NetworkError::NotAModule(child));
        }

        let reject = |reason: &str| NetworkError::InvalidSubModule {
            parent,
            child,
            reason: reason.to_string(),
        };
        if parent == child {
            return Err(reject("a module cannot contain itself"));
        }
        if parent_group.sub_modules.contains(&child) {
            return Err(reject("already a submodule"));
        }
        if self.all_enclosed_modules(child).contains(&parent) {
            return Err(NetworkError::ModuleCycle { parent, child });
        }
        if child_group.parent.is_some() {
            return Err(reject("already enclosed by another group"));
        }
        let enclosed: AHashSet<ElementId> = self.all_enclosed_neurons(parent).into_iter().collect();
        if child_group.neurons.iter().any(|n| enclosed.contains(n)) {
            return Err(reject("shares neurons with the enclosing group"));
        }

        if let Some(g) = self.groups.get_mut(&parent) {
            g.sub_modules.push(child);
        }
        if let Some(g) = self.groups.get_mut(&child) {
            g.parent = Some(parent);
        }
        trace!(target: "modnet-engine", "Nested module {} in {}", child, parent);
        Ok(())
    }

    /// Un-nest `child` from `parent`; returns whether it was nested there
    pub fn remove_sub_module(&mut self, parent: ElementId, child: ElementId) -> bool {
        let removed = match self.groups.get_mut(&parent) {
            Some(g) => {
                let before = g.sub_modules.len();
                g.sub_modules.retain(|m| *m != child);
                before != g.sub_modules.len()
            }
            None => false,
        };
        if removed {
            if let Some(g) = self.groups.get_mut(&child) {
                g.parent = None;
            }
        }
        removed
    }

    /// Move `module` under `parent` (or to the top level for `None`)
    pub fn set_parent_module(&mut self, module: ElementId, parent: Option<ElementId>) -> NetworkResult<()> {
        let current = self
            .groups
            .get(&module)
            .ok_or(NetworkError::UnknownGroup(module))?
            .parent;
        if current == parent {
            return Ok(());
        }
        if let Some(old) = current {
            self.remove_sub_module(old, module);
        }
        match parent {
            Some(new_parent) => self.add_sub_module(new_parent, module),
            None => Ok(()),
        }
    }

    pub fn parent_module(&self, module: ElementId) -> Option<ElementId> {
        self.groups.get(&module)?.parent
    }

    /// True when `ancestor` encloses `module` at any depth
    pub fn is_ancestor(&self, ancestor: ElementId, module: ElementId) -> bool {
        let mut seen = AHashSet::new();
        let mut current = self.parent_module(module);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            if !seen.insert(id) {
                return false;
            }
            current = self.parent_module(id);
        }
        false
    }

    /// Every module nested in `group` at any depth, breadth first, excluding `group`
    pub fn all_enclosed_modules(&self, group: ElementId) -> Vec<ElementId> {
        let mut result = Vec::new();
        let mut visited = AHashSet::new();
        visited.insert(group);
        let mut frontier = vec![group];
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for id in frontier {
                if let Some(g) = self.groups.get(&id) {
                    for sub in &g.sub_modules {
                        if visited.insert(*sub) {
                            result.push(*sub);
                            next.push(*sub);
                        }
                    }
                }
            }
            frontier = next;
        }
        result
    }

    /// Direct neurons of `group` followed by those of all nested modules
    pub fn all_enclosed_neurons(&self, group: ElementId) -> Vec<ElementId> {
        let mut seen = AHashSet::new();
        let mut result = Vec::new();
        let groups = std::iter::once(group).chain(self.all_enclosed_modules(group));
        for id in groups {
            if let Some(g) = self.groups.get(&id) {
                for n in &g.neurons {
                    if seen.insert(*n) {
                        result.push(*n);
                    }
                }
            }
        }
        result
    }

    /// Synapses whose connected neurons are all enclosed by `group`
    ///
    /// Higher-order synapses count when their target synapse counts.
    pub fn all_enclosed_synapses(&self, group: ElementId) -> Vec<ElementId> {
        let neurons: AHashSet<ElementId> = self.all_enclosed_neurons(group).into_iter().collect();
        let mut result = Vec::new();
        let mut seen = AHashSet::new();
        for n in self.all_enclosed_neurons(group) {
            let Some(neuron) = self.neurons.get(&n) else {
                continue;
            };
            for s in &neuron.outgoing {
                if self.synapse_is_enclosed(*s, &neurons) && seen.insert(*s) {
                    result.push(*s);
                }
            }
        }
        result
    }

    fn synapse_is_enclosed(&self, synapse: ElementId, neurons: &AHashSet<ElementId>) -> bool {
        let mut current = synapse;
        let mut seen = AHashSet::new();
        loop {
            let Some(s) = self.synapses.get(&current) else {
                return false;
            };
            if !neurons.contains(&s.source) || !seen.insert(current) {
                return false;
            }
            match s.target {
                SynapseTarget::Neuron(t) => return neurons.contains(&t),
                SynapseTarget::Synapse(t) => current = t,
            }
        }
    }

    /// Deepest group among `base` and its nested modules directly holding `neuron`
    pub fn neuron_owner_group(&self, neuron: ElementId, base: ElementId) -> Option<ElementId> {
        let modules = self.all_enclosed_modules(base);
        modules
            .iter()
            .rev()
            .copied()
            .find(|m| self.groups.get(m).map_or(false, |g| g.contains_neuron(neuron)))
            .or_else(|| {
                self.groups
                    .get(&base)
                    .filter(|g| g.contains_neuron(neuron))
                    .map(|g| g.id)
            })
    }

    pub fn module_size(&self, module: ElementId) -> Option<Size2> {
        self.groups.get(&module)?.size()
    }

    /// Resize a module; returns whether the size changed beyond `tolerance`
    pub fn set_module_size(&mut self, module: ElementId, size: Size2, tolerance: f64) -> NetworkResult<bool> {
        let group = self
            .groups
            .get_mut(&module)
            .ok_or(NetworkError::UnknownGroup(module))?;
        let layout = group.module.as_mut().ok_or(NetworkError::NotAModule(module))?;
        if layout.size.approx_eq(&size, tolerance) {
            return Ok(false);
        }
        layout.size = size;
        Ok(true)
    }

    /// Move a group and everything it encloses so the group lands on `location`
    pub fn move_group_to(&mut self, group: ElementId, location: Vector3) -> NetworkResult<()> {
        let origin = self
            .groups
            .get(&group)
            .ok_or(NetworkError::UnknownGroup(group))?
            .position;
        let delta = location - origin;

        let modules = self.all_enclosed_modules(group);
        let neurons = self.all_enclosed_neurons(group);
        let synapses = self.all_enclosed_synapses(group);

        for id in std::iter::once(group).chain(modules) {
            if let Some(g) = self.groups.get_mut(&id) {
                g.position = g.position + delta;
            }
        }
        for id in neurons {
            if let Some(n) = self.neurons.get_mut(&id) {
                n.position = n.position + delta;
            }
        }
        for id in synapses {
            if let Some(s) = self.synapses.get_mut(&id) {
                s.position = s.position + delta;
            }
        }
        Ok(())
    }
}
