// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use super::functions::{ActivationFunction, TransferFunction};
use super::properties::Properties;
use crate::tags;
use crate::types::{ElementId, Vector3};

/// A neuron of a modular network
///
/// Synapse links are maintained by the owning network and are reset whenever
/// a neuron is inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neuron {
    pub id: ElementId,
    pub name: String,
    pub position: Vector3,
    pub properties: Properties,
    /// Activation steps this neuron needs before its output is valid
    pub required_iterations: u32,
    pub bias: f64,
    /// Current activation value
    #[serde(default)]
    pub activation: f64,
    /// Current output value
    #[serde(default)]
    pub output: f64,
    pub transfer_function: TransferFunction,
    pub activation_function: ActivationFunction,
    pub(crate) incoming: Vec<ElementId>,
    pub(crate) outgoing: Vec<ElementId>,
}

impl Neuron {
    pub fn new(id: ElementId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            position: Vector3::ZERO,
            properties: Properties::new(),
            required_iterations: 1,
            bias: 0.0,
            activation: 0.0,
            output: 0.0,
            transfer_function: TransferFunction::default(),
            activation_function: ActivationFunction::default(),
            incoming: Vec::new(),
            outgoing: Vec::new(),
        }
    }

    pub fn with_position(mut self, position: Vector3) -> Self {
        self.position = position;
        self
    }

    pub fn with_bias(mut self, bias: f64) -> Self {
        self.bias = bias;
        self
    }

    /// Synapses targeting this neuron
    pub fn incoming(&self) -> &[ElementId] {
        &self.incoming
    }

    /// Synapses with this neuron as source
    pub fn outgoing(&self) -> &[ElementId] {
        &self.outgoing
    }

    pub fn is_interface(&self) -> bool {
        self.properties.is_interface()
    }

    /// Unlinked copy under a new id, without interface tags
    pub fn mirror_copy(&self, id: ElementId) -> Neuron {
        let mut copy = Neuron {
            id,
            incoming: Vec::new(),
            outgoing: Vec::new(),
            ..self.clone()
        };
        copy.properties.remove(tags::INPUT);
        copy.properties.remove(tags::OUTPUT);
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_copy_strips_interface_tags() {
        let mut neuron = Neuron::new(ElementId(3), "in").with_bias(0.2);
        neuron.properties.tag(tags::INPUT);
        neuron.properties.set("+color", "blue");
        neuron.outgoing.push(ElementId(9));

        let copy = neuron.mirror_copy(ElementId(4));

        assert_eq!(copy.id, ElementId(4));
        assert_eq!(copy.bias, 0.2);
        assert!(!copy.is_interface());
        assert_eq!(copy.properties.get("+color"), Some("blue"));
        assert!(copy.outgoing().is_empty());
    }
}
