// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Cascading removal and restore.

Removed elements are handed to the caller as a trashcan; the network never
drops them on its own. Restoring a trashcan re-inserts the elements and
re-links whatever they were connected to, as far as it still exists.
*/

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::ModularNetwork;
use crate::constraints::GroupConstraint;
use crate::models::{Neuron, NeuronGroup, Synapse, SynapseTarget};
use crate::types::{ElementId, NetworkError, NetworkResult};

/// An element detached from the network, with what it was attached to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RemovedElement {
    Neuron { neuron: Neuron, groups: Vec<ElementId> },
    Synapse(Synapse),
    Group(NeuronGroup),
    Constraint { constraint: GroupConstraint, group: ElementId },
}

impl RemovedElement {
    pub fn id(&self) -> ElementId {
        match self {
            RemovedElement::Neuron { neuron, .. } => neuron.id,
            RemovedElement::Synapse(synapse) => synapse.id,
            RemovedElement::Group(group) => group.id,
            RemovedElement::Constraint { constraint, .. } => constraint.id(),
        }
    }
}

/// Elements removed by one operation, in removal order
pub type Trashcan = Vec<RemovedElement>;

impl ModularNetwork {
    /// Remove a synapse and every higher-order synapse targeting it
    pub fn remove_synapse(&mut self, id: ElementId) -> NetworkResult<Trashcan> {
        let incoming = self
            .synapses
            .get(&id)
            .ok_or(NetworkError::UnknownSynapse(id))?
            .incoming
            .clone();
        let mut trashcan = Trashcan::new();
        for higher in incoming {
            if self.synapses.contains_key(&higher) {
                trashcan.extend(self.remove_synapse(higher)?);
            }
        }

        let synapse = self
            .synapses
            .remove(&id)
            .ok_or(NetworkError::UnknownSynapse(id))?;
        if let Some(n) = self.neurons.get_mut(&synapse.source) {
            n.outgoing.retain(|s| *s != id);
        }
        match synapse.target {
            SynapseTarget::Neuron(t) => {
                if let Some(n) = self.neurons.get_mut(&t) {
                    n.incoming.retain(|s| *s != id);
                }
            }
            SynapseTarget::Synapse(t) => {
                if let Some(s) = self.synapses.get_mut(&t) {
                    s.incoming.retain(|x| *x != id);
                }
            }
        }
        trace!(target: "modnet-engine", "Removed synapse {}", id);
        trashcan.push(RemovedElement::Synapse(synapse));
        Ok(trashcan)
    }

    /// Remove a neuron, its synapses and its group memberships
    pub fn remove_neuron(&mut self, id: ElementId) -> NetworkResult<Trashcan> {
        let neuron = self.neurons.get(&id).ok_or(NetworkError::UnknownNeuron(id))?;
        let attached: Vec<ElementId> = neuron
            .incoming
            .iter()
            .chain(neuron.outgoing.iter())
            .copied()
            .collect();

        let mut trashcan = Trashcan::new();
        for s in attached {
            if self.synapses.contains_key(&s) {
                trashcan.extend(self.remove_synapse(s)?);
            }
        }

        let groups = self.groups_containing(id);
        for g in &groups {
            self.remove_neuron_from_group(*g, id);
        }
        let neuron = self.neurons.remove(&id).ok_or(NetworkError::UnknownNeuron(id))?;
        trace!(target: "modnet-engine", "Removed neuron {}", id);
        trashcan.push(RemovedElement::Neuron { neuron, groups });
        Ok(trashcan)
    }

    /// Remove a group
    ///
    /// Modules take their neurons and nested modules with them; a plain group
    /// only releases its members.
    ///
    /// # Errors
    ///
    /// Refuses the default group
    pub fn remove_group(&mut self, id: ElementId) -> NetworkResult<Trashcan> {
        self.remove_group_with(id, false)
    }

    /// Cascading removal that keeps interface neurons alive
    ///
    /// Cascade order is module, nested modules, neurons, synapses, then group
    /// memberships. Interface neurons inside a removed module are only detached
    /// from it; asking for an interface neuron directly is an error.
    pub fn safely_remove(&mut self, id: ElementId) -> NetworkResult<Trashcan> {
        if let Some(neuron) = self.neurons.get(&id) {
            if neuron.is_interface() {
                return Err(NetworkError::ProtectedInterfaceNeuron(id));
            }
            return self.remove_neuron(id);
        }
        if self.synapses.contains_key(&id) {
            return self.remove_synapse(id);
        }
        if self.groups.contains_key(&id) {
            return self.remove_group_with(id, true);
        }
        if let Some(group) = self.constraint_owner(id) {
            if let Some(constraint) = self.remove_constraint(id) {
                return Ok(vec![RemovedElement::Constraint { constraint, group }]);
            }
        }
        Err(NetworkError::UnknownElement(id))
    }

    fn remove_group_with(&mut self, id: ElementId, keep_interfaces: bool) -> NetworkResult<Trashcan> {
        if id == self.default_group {
            return Err(NetworkError::DefaultGroupRemoval);
        }
        let snapshot = self
            .groups
            .get(&id)
            .ok_or(NetworkError::UnknownGroup(id))?
            .clone();

        let mut trashcan = Trashcan::new();
        if snapshot.is_module() {
            for sub in &snapshot.sub_modules {
                if self.groups.contains_key(sub) {
                    trashcan.extend(self.remove_group_with(*sub, keep_interfaces)?);
                }
            }
            for n in &snapshot.neurons {
                let Some(neuron) = self.neurons.get(n) else {
                    continue;
                };
                if keep_interfaces && neuron.is_interface() {
                    self.remove_neuron_from_group(id, *n);
                } else {
                    trashcan.extend(self.remove_neuron(*n)?);
                }
            }
        } else {
            for sub in &snapshot.sub_modules {
                if let Some(g) = self.groups.get_mut(sub) {
                    g.parent = None;
                }
            }
        }

        if let Some(parent) = snapshot.parent {
            if let Some(g) = self.groups.get_mut(&parent) {
                g.sub_modules.retain(|m| *m != id);
            }
        }
        self.groups.remove(&id);
        debug!(target: "modnet-engine", "Removed group {} ({})", snapshot.name, id);
        trashcan.push(RemovedElement::Group(snapshot));
        Ok(trashcan)
    }

    /// Re-insert the contents of a trashcan
    ///
    /// Elements come back in reverse removal order. Links to elements that no
    /// longer exist are dropped.
    pub fn restore(&mut self, trashcan: Trashcan) -> NetworkResult<()> {
        for element in trashcan.into_iter().rev() {
            match element {
                RemovedElement::Group(group) => {
                    let id = group.id;
                    let parent = group.parent;
                    self.add_group(group)?;
                    if let Some(parent) = parent {
                        if let Some(g) = self.groups.get_mut(&parent) {
                            if !g.sub_modules.contains(&id) {
                                g.sub_modules.push(id);
                            }
                        }
                    }
                }
                RemovedElement::Neuron { neuron, groups } => {
                    let id = neuron.id;
                    if self.contains(id) {
                        return Err(NetworkError::DuplicateId(id));
                    }
                    let mut neuron = neuron;
                    neuron.incoming.clear();
                    neuron.outgoing.clear();
                    self.reserve_id(id);
                    self.neurons.insert(id, neuron);
                    for g in groups {
                        if let Some(group) = self.groups.get_mut(&g) {
                            if !group.neurons.contains(&id) {
                                group.neurons.push(id);
                            }
                        }
                    }
                }
                RemovedElement::Synapse(synapse) => {
                    let endpoints_exist = self.neurons.contains_key(&synapse.source)
                        && match synapse.target {
                            SynapseTarget::Neuron(t) => self.neurons.contains_key(&t),
                            SynapseTarget::Synapse(t) => self.synapses.contains_key(&t),
                        };
                    if endpoints_exist {
                        self.add_synapse(synapse)?;
                    }
                }
                RemovedElement::Constraint { constraint, group } => {
                    if self.groups.contains_key(&group) {
                        self.add_constraint(group, constraint)
                            .map_err(|e| NetworkError::ConstraintRejected(e.to_string()))?;
                    }
                }
            }
        }
        self.prune_dangling_links();
        Ok(())
    }

    /// Drop member and parent links to elements that do not exist
    fn prune_dangling_links(&mut self) {
        let neurons = &self.neurons;
        let existing_groups: ahash::AHashSet<ElementId> = self.groups.keys().copied().collect();
        for g in self.groups.values_mut() {
            g.neurons.retain(|n| neurons.contains_key(n));
            g.sub_modules.retain(|m| existing_groups.contains(m));
            if g.parent.map_or(false, |p| !existing_groups.contains(&p)) {
                g.parent = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags;
    use crate::types::{Size2, Vector3};

    #[test]
    fn test_remove_neuron_cascades_to_synapses() {
        let mut net = ModularNetwork::new();
        let a = net.create_neuron("a");
        let b = net.create_neuron("b");
        let s = net.connect(a, SynapseTarget::Neuron(b), 1.0).unwrap();
        let h = net.connect(b, SynapseTarget::Synapse(s), 1.0).unwrap();

        let trash = net.remove_neuron(a).unwrap();

        let ids: Vec<ElementId> = trash.iter().map(RemovedElement::id).collect();
        assert_eq!(ids, vec![h, s, a]);
        assert!(net.synapse(h).is_none());
        assert!(net.neuron(b).unwrap().incoming().is_empty());
        assert!(net.neuron(b).unwrap().outgoing().is_empty());
    }

    #[test]
    fn test_default_group_is_permanent() {
        let mut net = ModularNetwork::new();
        let default = net.default_group_id();
        assert!(matches!(net.remove_group(default), Err(NetworkError::DefaultGroupRemoval)));
        assert!(matches!(net.safely_remove(default), Err(NetworkError::DefaultGroupRemoval)));
    }

    #[test]
    fn test_safely_remove_keeps_interface_neurons() {
        let mut net = ModularNetwork::new();
        let m = net.create_module("m", Vector3::ZERO, Size2::new(5.0, 5.0));
        let plain = net.create_neuron("plain");
        let io = net.create_neuron("io");
        net.neuron_mut(io).unwrap().properties.tag(tags::INPUT);
        net.add_neuron_to_group(m, plain).unwrap();
        net.add_neuron_to_group(m, io).unwrap();

        let trash = net.safely_remove(m).unwrap();

        assert_eq!(trash.len(), 2);
        assert!(net.neuron(plain).is_none());
        assert!(net.neuron(io).is_some());
        assert!(net.group(m).is_none());
        assert!(matches!(
            net.safely_remove(io),
            Err(NetworkError::ProtectedInterfaceNeuron(id)) if id == io
        ));
    }

    #[test]
    fn test_restore_undoes_module_removal() {
        let mut net = ModularNetwork::new();
        let outer = net.create_module("outer", Vector3::ZERO, Size2::new(5.0, 5.0));
        let inner = net.create_module("inner", Vector3::ZERO, Size2::new(2.0, 2.0));
        net.add_sub_module(outer, inner).unwrap();
        let a = net.create_neuron("a");
        let b = net.create_neuron("b");
        net.add_neuron_to_group(outer, a).unwrap();
        net.add_neuron_to_group(inner, b).unwrap();
        let s = net.connect(a, SynapseTarget::Neuron(b), 0.3).unwrap();

        let trash = net.safely_remove(outer).unwrap();
        assert_eq!(net.neuron_count(), 0);

        net.restore(trash).unwrap();

        assert_eq!(net.parent_module(inner), Some(outer));
        assert_eq!(net.all_enclosed_neurons(outer), vec![a, b]);
        assert_eq!(net.synapse(s).unwrap().strength, 0.3);
        assert_eq!(net.neuron(b).unwrap().incoming(), &[s]);
        assert!(net.default_group().contains_neuron(a));
    }
}
