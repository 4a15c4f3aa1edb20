// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Element model of a modular network.
*/

pub mod functions;
pub mod neuron;
pub mod neuron_group;
pub mod properties;
pub mod synapse;

pub use functions::{ActivationFunction, SynapseFunction, TransferFunction};
pub use neuron::Neuron;
pub use neuron_group::{ModuleLayout, NeuronGroup};
pub use properties::Properties;
pub use synapse::{Synapse, SynapseTarget};
