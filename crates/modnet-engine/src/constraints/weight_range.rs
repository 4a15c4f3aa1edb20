// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Keeps synapse weights and neuron biases of a group inside `[Min, Max]`.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::selection::{select_elements, SelectionMode};
use super::{
    format_id_list, parse_bool, parse_id_list, ConstraintError, ConstraintResult, ConstraintRule,
    ConstraintScope, Resolution, ResolveContext,
};
use crate::network::ModularNetwork;
use crate::types::{remap_id, ElementId, IdMap, NetworkError};

const PARAMETERS: &[&str] = &["Mode", "ModeParams", "Min", "Max", "Recursive"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightRangeConstraint {
    /// Selection letters, see [`SelectionMode`]
    pub mode: String,
    /// Groups external synapses must connect to; empty allows all
    pub mode_params: Vec<ElementId>,
    pub min: f64,
    pub max: f64,
    pub recursive: bool,
}

impl Default for WeightRangeConstraint {
    fn default() -> Self {
        Self {
            mode: "s".to_string(),
            mode_params: Vec::new(),
            min: -1.0,
            max: 1.0,
            recursive: false,
        }
    }
}

impl WeightRangeConstraint {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: &str) -> Self {
        self.mode = mode.to_string();
        self
    }

    /// `value` itself if in range, else its negation if that fits, else clamped
    pub fn restrict(&self, value: f64) -> f64 {
        let in_range = |v: f64| v >= self.min && v <= self.max;
        if in_range(value) {
            value
        } else if in_range(-value) {
            -value
        } else {
            value.max(self.min).min(self.max)
        }
    }
}

impl ConstraintRule for WeightRangeConstraint {
    fn name(&self) -> &'static str {
        "RestrictWeightAndBiasRange"
    }

    fn check(&mut self, network: &ModularNetwork, scope: ConstraintScope) -> ConstraintResult<()> {
        if network.group(scope.group).is_none() {
            return Err(NetworkError::UnknownGroup(scope.group).into());
        }
        if self.min.is_nan() || self.max.is_nan() || self.min > self.max {
            return Err(ConstraintError::invalid(
                "Min",
                format!("minimum {} exceeds maximum {}", self.min, self.max),
            ));
        }
        Ok(())
    }

    fn enforce(&mut self, ctx: &mut ResolveContext<'_>, scope: ConstraintScope) -> ConstraintResult<Resolution> {
        let mode = SelectionMode::parse(&self.mode, true);
        let selected = select_elements(ctx.network, scope.group, &self.mode_params, self.recursive);
        let mut changed = false;

        for id in selected.synapses(&mode) {
            if let Some(synapse) = ctx.network.synapse_mut(id) {
                let restricted = self.restrict(synapse.strength);
                if restricted != synapse.strength {
                    trace!(target: "modnet-engine", "Weight of {} {} -> {}", id, synapse.strength, restricted);
                    synapse.strength = restricted;
                    changed = true;
                }
            }
        }

        if mode.neurons {
            for id in &selected.neurons {
                let Some(neuron) = ctx.network.neuron_mut(*id) else {
                    continue;
                };
                if neuron.bias == 0.0 {
                    continue;
                }
                let restricted = self.restrict(neuron.bias);
                if restricted != neuron.bias {
                    trace!(target: "modnet-engine", "Bias of {} {} -> {}", id, neuron.bias, restricted);
                    neuron.bias = restricted;
                    changed = true;
                }
            }
        }

        Ok(Resolution::from_changed(changed))
    }

    fn remap_ids(&mut self, map: &IdMap) {
        for id in self.mode_params.iter_mut() {
            *id = remap_id(map, *id);
        }
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        PARAMETERS
    }

    fn parameter(&self, name: &str) -> Option<String> {
        match name {
            "Mode" => Some(self.mode.clone()),
            "ModeParams" => Some(format_id_list(&self.mode_params)),
            "Min" => Some(self.min.to_string()),
            "Max" => Some(self.max.to_string()),
            "Recursive" => Some(self.recursive.to_string()),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> ConstraintResult<()> {
        let parse_value = |value: &str| {
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| ConstraintError::invalid(name, format!("'{}' is not a number", value)))
        };
        match name {
            "Mode" => self.mode = value.trim().to_string(),
            "ModeParams" => self.mode_params = parse_id_list(name, value)?,
            "Min" => self.min = parse_value(value)?,
            "Max" => self.max = parse_value(value)?,
            "Recursive" => self.recursive = parse_bool(name, value)?,
            other => return Err(ConstraintError::UnknownParameter(other.to_string())),
        }
        Ok(())
    }
}
