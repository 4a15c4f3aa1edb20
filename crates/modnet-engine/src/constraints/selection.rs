// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Element selection for the value and tag constraints.
//!
//! Mode letters: `s`/`w` synapses, `n`/`b` neurons, `i` incoming, `o`
//! outgoing, `g` group-internal. Without an element letter synapses are
//! selected; without a direction letter group-internal synapses are.

use ahash::AHashSet;

use crate::network::ModularNetwork;
use crate::types::ElementId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionMode {
    pub neurons: bool,
    pub synapses: bool,
    pub incoming: bool,
    pub outgoing: bool,
    pub internal: bool,
}

impl SelectionMode {
    /// Parse mode letters; `bias_letters` also accepts `w`/`b` aliases
    pub fn parse(letters: &str, bias_letters: bool) -> Self {
        let lower = letters.to_lowercase();
        let mut mode = SelectionMode {
            neurons: lower.contains('n') || (bias_letters && lower.contains('b')),
            synapses: lower.contains('s') || (bias_letters && lower.contains('w')),
            incoming: lower.contains('i'),
            outgoing: lower.contains('o'),
            internal: lower.contains('g'),
        };
        if !mode.neurons && !mode.synapses {
            mode.synapses = true;
        }
        if !mode.incoming && !mode.outgoing && !mode.internal {
            mode.internal = true;
        }
        mode
    }
}

/// Neurons of a group and its synapses split by direction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectedElements {
    pub neurons: Vec<ElementId>,
    pub internal: Vec<ElementId>,
    pub incoming: Vec<ElementId>,
    pub outgoing: Vec<ElementId>,
}

impl SelectedElements {
    /// Synapses enabled by `mode`, in internal, incoming, outgoing order
    pub fn synapses(&self, mode: &SelectionMode) -> Vec<ElementId> {
        if !mode.synapses {
            return Vec::new();
        }
        let mut result = Vec::new();
        if mode.internal {
            result.extend(&self.internal);
        }
        if mode.incoming {
            result.extend(&self.incoming);
        }
        if mode.outgoing {
            result.extend(&self.outgoing);
        }
        result
    }
}

/// Collect the neurons of `group` and classify their synapses
///
/// `valid_groups` limits external synapses to those connecting neurons
/// enclosed by one of the listed groups; an empty list allows all.
pub fn select_elements(
    network: &ModularNetwork,
    group: ElementId,
    valid_groups: &[ElementId],
    recursive: bool,
) -> SelectedElements {
    let neurons: Vec<ElementId> = if recursive {
        network.all_enclosed_neurons(group)
    } else {
        network
            .group(group)
            .map(|g| g.neurons().to_vec())
            .unwrap_or_default()
    };
    let members: AHashSet<ElementId> = neurons.iter().copied().collect();
    let valid_external: AHashSet<ElementId> = valid_groups
        .iter()
        .flat_map(|g| network.all_enclosed_neurons(*g))
        .collect();
    let is_valid_external = |n: ElementId| valid_groups.is_empty() || valid_external.contains(&n);

    let mut selected = SelectedElements {
        neurons: neurons.clone(),
        ..SelectedElements::default()
    };
    for id in &neurons {
        let Some(neuron) = network.neuron(*id) else {
            continue;
        };
        for s in neuron.incoming() {
            let Some(synapse) = network.synapse(*s) else {
                continue;
            };
            if members.contains(&synapse.source) {
                selected.internal.push(*s);
            } else if is_valid_external(synapse.source) {
                selected.incoming.push(*s);
            }
        }
        for s in neuron.outgoing() {
            let Some(target) = network.synapse(*s).and_then(|syn| syn.target.neuron()) else {
                continue;
            };
            if !members.contains(&target) && is_valid_external(target) {
                selected.outgoing.push(*s);
            }
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SynapseTarget;

    #[test]
    fn test_mode_defaults() {
        let mode = SelectionMode::parse("", true);
        assert!(mode.synapses && mode.internal);
        assert!(!mode.neurons && !mode.incoming && !mode.outgoing);

        let mode = SelectionMode::parse("bI", true);
        assert!(mode.neurons && mode.incoming && !mode.synapses);
        assert!(!SelectionMode::parse("b", false).neurons);
    }

    #[test]
    fn test_synapses_classified_by_direction() {
        let mut net = ModularNetwork::new();
        let g = net.create_group("g");
        let other = net.create_group("other");
        let a = net.create_neuron("a");
        let b = net.create_neuron("b");
        let x = net.create_neuron("x");
        let y = net.create_neuron("y");
        net.add_neuron_to_group(g, a).unwrap();
        net.add_neuron_to_group(g, b).unwrap();
        net.add_neuron_to_group(other, x).unwrap();

        let internal = net.connect(a, SynapseTarget::Neuron(b), 1.0).unwrap();
        let from_x = net.connect(x, SynapseTarget::Neuron(a), 1.0).unwrap();
        let from_y = net.connect(y, SynapseTarget::Neuron(a), 1.0).unwrap();
        let to_y = net.connect(b, SynapseTarget::Neuron(y), 1.0).unwrap();

        let all = select_elements(&net, g, &[], false);
        assert_eq!(all.internal, vec![internal]);
        assert_eq!(all.incoming, vec![from_x, from_y]);
        assert_eq!(all.outgoing, vec![to_y]);

        let limited = select_elements(&net, g, &[other], false);
        assert_eq!(limited.incoming, vec![from_x]);
        assert!(limited.outgoing.is_empty());
    }
}
