// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Neuron and synapse functions.
//!
//! Functions are plain values: two neurons share a transfer function when the
//! enum values compare equal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maps the accumulated activation of a neuron to its output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferFunction {
    #[default]
    Tanh,
    Sigmoid,
    Linear,
    Ramp,
    Step,
}

impl TransferFunction {
    pub fn name(&self) -> &'static str {
        match self {
            TransferFunction::Tanh => "Tanh",
            TransferFunction::Sigmoid => "Sigmoid",
            TransferFunction::Linear => "Linear",
            TransferFunction::Ramp => "Ramp",
            TransferFunction::Step => "Step",
        }
    }

    pub fn transfer(&self, activation: f64) -> f64 {
        match self {
            TransferFunction::Tanh => activation.tanh(),
            TransferFunction::Sigmoid => 1.0 / (1.0 + (-activation).exp()),
            TransferFunction::Linear => activation,
            TransferFunction::Ramp => activation.clamp(-1.0, 1.0),
            TransferFunction::Step => {
                if activation > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Combines the weighted inputs and the bias of a neuron
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivationFunction {
    #[default]
    AdditiveTimeDiscrete,
    Multiplicative,
    Maximum,
}

impl ActivationFunction {
    pub fn name(&self) -> &'static str {
        match self {
            ActivationFunction::AdditiveTimeDiscrete => "AdditiveTimeDiscrete",
            ActivationFunction::Multiplicative => "Multiplicative",
            ActivationFunction::Maximum => "Maximum",
        }
    }

    pub fn activate(&self, weighted_inputs: &[f64], bias: f64) -> f64 {
        match self {
            ActivationFunction::AdditiveTimeDiscrete => weighted_inputs.iter().sum::<f64>() + bias,
            ActivationFunction::Multiplicative => weighted_inputs.iter().product::<f64>() + bias,
            ActivationFunction::Maximum => {
                weighted_inputs.iter().copied().fold(f64::NEG_INFINITY, f64::max).max(bias)
            }
        }
    }
}

/// How a synapse forwards the signal of its source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SynapseFunction {
    #[default]
    Simple,
    /// Strength is scaled by the signal of higher-order synapses targeting it
    Modulated,
}

impl SynapseFunction {
    pub fn name(&self) -> &'static str {
        match self {
            SynapseFunction::Simple => "Simple",
            SynapseFunction::Modulated => "Modulated",
        }
    }
}

impl fmt::Display for TransferFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for ActivationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for SynapseFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
