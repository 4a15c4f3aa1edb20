// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use super::functions::SynapseFunction;
use super::properties::Properties;
use crate::types::{ElementId, IdMap, Vector3};

/// What a synapse connects to
///
/// Synapses may target other synapses (higher-order synapses).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SynapseTarget {
    Neuron(ElementId),
    Synapse(ElementId),
}

impl SynapseTarget {
    pub fn id(&self) -> ElementId {
        match self {
            SynapseTarget::Neuron(id) | SynapseTarget::Synapse(id) => *id,
        }
    }

    pub fn neuron(&self) -> Option<ElementId> {
        match self {
            SynapseTarget::Neuron(id) => Some(*id),
            SynapseTarget::Synapse(_) => None,
        }
    }

    pub(crate) fn remapped(&self, map: &IdMap) -> SynapseTarget {
        match self {
            SynapseTarget::Neuron(id) => SynapseTarget::Neuron(crate::types::remap_id(map, *id)),
            SynapseTarget::Synapse(id) => SynapseTarget::Synapse(crate::types::remap_id(map, *id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synapse {
    pub id: ElementId,
    pub source: ElementId,
    pub target: SynapseTarget,
    pub strength: f64,
    pub enabled: bool,
    pub function: SynapseFunction,
    pub position: Vector3,
    pub properties: Properties,
    pub(crate) incoming: Vec<ElementId>,
}

impl Synapse {
    pub fn new(id: ElementId, source: ElementId, target: SynapseTarget, strength: f64) -> Self {
        Self {
            id,
            source,
            target,
            strength,
            enabled: true,
            function: SynapseFunction::default(),
            position: Vector3::ZERO,
            properties: Properties::new(),
            incoming: Vec::new(),
        }
    }

    /// Higher-order synapses targeting this synapse
    pub fn incoming(&self) -> &[ElementId] {
        &self.incoming
    }

    /// Unlinked copy with new endpoints
    pub fn rewired_copy(&self, id: ElementId, source: ElementId, target: SynapseTarget) -> Synapse {
        Synapse {
            id,
            source,
            target,
            incoming: Vec::new(),
            ..self.clone()
        }
    }
}
