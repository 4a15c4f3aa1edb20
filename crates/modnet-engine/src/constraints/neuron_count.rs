// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bounds on the number of neurons of a group.
//!
//! Modules count all enclosed neurons, plain groups their direct members.
//! With `AutoAdapt` the group is grown with default neurons or shrunk by
//! removing the newest non-interface neurons.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    parse_bool, ConstraintError, ConstraintResult, ConstraintRule, ConstraintScope, Resolution,
    ResolveContext,
};
use crate::network::ModularNetwork;
use crate::tags;
use crate::types::{ElementId, NetworkError};

const PARAMETERS: &[&str] = &["Min", "Max", "AutoAdapt"];

const TOO_MANY: &str = "Too many neurons found in this group.";
const TOO_FEW: &str = "Too few neurons found in this group.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeuronCountConstraint {
    pub min: i64,
    pub max: i64,
    pub auto_adapt: bool,
}

impl Default for NeuronCountConstraint {
    fn default() -> Self {
        Self {
            min: 0,
            max: 100,
            auto_adapt: false,
        }
    }
}

impl NeuronCountConstraint {
    pub fn new(min: i64, max: i64) -> Self {
        Self {
            min,
            max,
            auto_adapt: false,
        }
    }

    pub fn with_auto_adapt(mut self, auto_adapt: bool) -> Self {
        self.auto_adapt = auto_adapt;
        self
    }

    /// Effective bounds: `min >= 0` and `max >= min`
    pub fn bounds(&self) -> (usize, usize) {
        let min = self.min.max(0);
        let max = self.max.max(min);
        (min as usize, max as usize)
    }
}

fn counted_neurons(network: &ModularNetwork, group: ElementId) -> ConstraintResult<Vec<ElementId>> {
    let g = network
        .group(group)
        .ok_or(NetworkError::UnknownGroup(group))?;
    Ok(if g.is_module() {
        network.all_enclosed_neurons(group)
    } else {
        g.neurons().to_vec()
    })
}

/// Newest removable neuron: highest creation date, undated ones count as oldest
fn newest_removable(network: &ModularNetwork, neurons: &[ElementId]) -> Option<ElementId> {
    neurons
        .iter()
        .filter_map(|id| network.neuron(*id))
        .filter(|n| !n.is_interface())
        .max_by_key(|n| {
            let date = n
                .properties
                .get(tags::CREATION_DATE)
                .and_then(|d| d.trim().parse::<i64>().ok())
                .unwrap_or(i64::MIN);
            (date, n.id)
        })
        .map(|n| n.id)
}

impl ConstraintRule for NeuronCountConstraint {
    fn name(&self) -> &'static str {
        "NumberOfNeurons"
    }

    fn check(&mut self, network: &ModularNetwork, scope: ConstraintScope) -> ConstraintResult<()> {
        counted_neurons(network, scope.group).map(|_| ())
    }

    fn enforce(&mut self, ctx: &mut ResolveContext<'_>, scope: ConstraintScope) -> ConstraintResult<Resolution> {
        let (min, max) = self.bounds();
        let mut neurons = counted_neurons(ctx.network, scope.group)?;

        if neurons.len() > max {
            if !self.auto_adapt {
                return Err(ConstraintError::Unsatisfied(TOO_MANY.to_string()));
            }
            while neurons.len() > max {
                let victim = newest_removable(ctx.network, &neurons)
                    .ok_or_else(|| ConstraintError::Unsatisfied(TOO_MANY.to_string()))?;
                ctx.trashcan.extend(ctx.network.safely_remove(victim)?);
                neurons.retain(|n| *n != victim);
            }
            debug!(target: "modnet-engine", "Shrunk group {} to {} neurons", scope.group, neurons.len());
            return Ok(Resolution::Changed);
        }

        if neurons.len() < min {
            if !self.auto_adapt {
                return Err(ConstraintError::Unsatisfied(TOO_FEW.to_string()));
            }
            while neurons.len() < min {
                let neuron = ctx.network.create_neuron("");
                ctx.network.add_neuron_to_group(scope.group, neuron)?;
                neurons.push(neuron);
            }
            debug!(target: "modnet-engine", "Grew group {} to {} neurons", scope.group, neurons.len());
            return Ok(Resolution::Changed);
        }

        Ok(Resolution::Unchanged)
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        PARAMETERS
    }

    fn parameter(&self, name: &str) -> Option<String> {
        match name {
            "Min" => Some(self.min.to_string()),
            "Max" => Some(self.max.to_string()),
            "AutoAdapt" => Some(self.auto_adapt.to_string()),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> ConstraintResult<()> {
        let parse_count = |value: &str| {
            value
                .trim()
                .parse::<i64>()
                .map_err(|_| ConstraintError::invalid(name, format!("'{}' is not an integer", value)))
        };
        match name {
            "Min" => self.min = parse_count(value)?,
            "Max" => self.max = parse_count(value)?,
            "AutoAdapt" => self.auto_adapt = parse_bool(name, value)?,
            other => return Err(ConstraintError::UnknownParameter(other.to_string())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{ConstraintKind, GroupConstraint};
    use crate::network::Trashcan;
    use crate::types::{Size2, Vector3};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn apply(net: &mut ModularNetwork, group: ElementId, constraint: ElementId) -> (bool, GroupConstraint, Trashcan) {
        let (index, mut c) = net.take_constraint(group, constraint).unwrap();
        let mut trash = Trashcan::new();
        let mut rng = StdRng::seed_from_u64(1);
        let ok = {
            let mut ctx = ResolveContext::new(net, &mut trash, &mut rng, 0.1);
            c.apply(&mut ctx)
        };
        net.put_constraint(group, index, c.clone());
        (ok, c, trash)
    }

    #[test]
    fn test_bounds_are_clamped() {
        assert_eq!(NeuronCountConstraint::new(-3, -5).bounds(), (0, 0));
        assert_eq!(NeuronCountConstraint::new(4, 2).bounds(), (4, 4));
    }

    #[test]
    fn test_too_few_without_auto_adapt_fails() {
        let mut net = ModularNetwork::new();
        let g = net.create_group("g");
        let c = net
            .create_constraint(g, ConstraintKind::NeuronCount(NeuronCountConstraint::new(2, 5)))
            .unwrap();

        let (ok, c, _) = apply(&mut net, g, c);
        assert!(!ok);
        assert_eq!(c.error_message(), TOO_FEW);
    }

    #[test]
    fn test_auto_adapt_grows_group() {
        let mut net = ModularNetwork::new();
        let g = net.create_group("g");
        let c = net
            .create_constraint(
                g,
                ConstraintKind::NeuronCount(NeuronCountConstraint::new(3, 5).with_auto_adapt(true)),
            )
            .unwrap();

        let (ok, c_after, _) = apply(&mut net, g, c);
        assert!(!ok);
        assert!(c_after.error_message().is_empty());
        assert_eq!(net.group(g).unwrap().neurons().len(), 3);

        let (ok, _, _) = apply(&mut net, g, c);
        assert!(ok);
    }

    #[test]
    fn test_auto_adapt_removes_newest_non_interface() {
        let mut net = ModularNetwork::new();
        let m = net.create_module("m", Vector3::ZERO, Size2::new(10.0, 10.0));
        let old = net.create_neuron("old");
        let newest = net.create_neuron("newest");
        let io = net.create_neuron("io");
        for n in [old, newest, io] {
            net.add_neuron_to_group(m, n).unwrap();
        }
        net.neuron_mut(old).unwrap().properties.set(tags::CREATION_DATE, "10");
        net.neuron_mut(newest).unwrap().properties.set(tags::CREATION_DATE, "20");
        net.neuron_mut(io).unwrap().properties.set(tags::CREATION_DATE, "30");
        net.neuron_mut(io).unwrap().properties.tag(tags::OUTPUT);

        let c = net
            .create_constraint(
                m,
                ConstraintKind::NeuronCount(NeuronCountConstraint::new(0, 2).with_auto_adapt(true)),
            )
            .unwrap();
        let (ok, _, trash) = apply(&mut net, m, c);
        assert!(!ok);
        assert!(net.neuron(newest).is_none());
        assert!(net.neuron(old).is_some() && net.neuron(io).is_some());
        assert_eq!(trash.len(), 1);
    }

    #[test]
    fn test_plain_group_counts_direct_members() {
        let mut net = ModularNetwork::new();
        let g = net.create_group("g");
        let n = net.create_neuron("n");
        net.add_neuron_to_group(g, n).unwrap();
        let c = net
            .create_constraint(g, ConstraintKind::NeuronCount(NeuronCountConstraint::new(1, 1)))
            .unwrap();
        assert!(apply(&mut net, g, c).0);
    }
}
