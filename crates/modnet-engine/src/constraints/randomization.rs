// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Draws biases, activations, outputs and incoming weights of a group from
//! uniform ranges.
//!
//! Each draw uses a fresh seed that can be stored on the group
//! (`randomization-seed`) and replayed later with `RestoreValuesFromNetwork`.
//! A range of `0,0` leaves its value untouched. The constraint runs at most
//! once per resolver run; with `SingleShot` only on its first run.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::selection::select_elements;
use super::{
    parse_bool, ConstraintError, ConstraintResult, ConstraintRule, ConstraintScope, Resolution,
    ResolveContext,
};
use crate::network::ModularNetwork;
use crate::tags;
use crate::types::NetworkError;

const PARAMETERS: &[&str] = &[
    "GlobalBiasRange",
    "GlobalOutputRange",
    "GlobalActivationRange",
    "GlobalWeightRange",
    "StoreValuesInNetwork",
    "RestoreValuesFromNetwork",
    "SingleShot",
];

/// Closed interval written as `min,max`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `0,0` disables drawing
    pub fn is_active(&self) -> bool {
        self.min != 0.0 || self.max != 0.0
    }

    fn is_ordered(&self) -> bool {
        !self.min.is_nan() && !self.max.is_nan() && self.min <= self.max
    }

    fn draw(&self, rng: &mut StdRng) -> f64 {
        rng.gen_range(self.min..=self.max)
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.min, self.max)
    }
}

impl FromStr for ValueRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (min, max) = s
            .split_once(',')
            .ok_or_else(|| format!("'{}' is not a range", s))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<f64>()
                .map_err(|_| format!("'{}' is not a number", v.trim()))
        };
        Ok(ValueRange::new(parse(min)?, parse(max)?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomizationConstraint {
    pub bias_range: ValueRange,
    pub output_range: ValueRange,
    pub activation_range: ValueRange,
    pub weight_range: ValueRange,
    /// Write the seed of each draw to the group
    pub store_values: bool,
    /// Replay the seed stored on the group instead of drawing a new one
    pub restore_values: bool,
    pub single_shot: bool,
    #[serde(default)]
    done: bool,
}

impl Default for RandomizationConstraint {
    fn default() -> Self {
        Self {
            bias_range: ValueRange::new(-0.1, 0.1),
            output_range: ValueRange::new(-1.0, 1.0),
            activation_range: ValueRange::new(0.0, 0.0),
            weight_range: ValueRange::new(-0.1, 0.1),
            store_values: true,
            restore_values: false,
            single_shot: true,
            done: false,
        }
    }
}

impl RandomizationConstraint {
    pub fn with_restore(mut self, restore: bool) -> Self {
        self.restore_values = restore;
        self
    }

    pub fn with_single_shot(mut self, single_shot: bool) -> Self {
        self.single_shot = single_shot;
        self
    }

    /// True once values were drawn; a single-shot constraint then stays idle
    pub fn has_run(&self) -> bool {
        self.done
    }

    fn ranges(&self) -> [(&'static str, ValueRange); 4] {
        [
            ("GlobalBiasRange", self.bias_range),
            ("GlobalOutputRange", self.output_range),
            ("GlobalActivationRange", self.activation_range),
            ("GlobalWeightRange", self.weight_range),
        ]
    }

    /// Seed of this run, or `None` (with a warning) when a replay is impossible
    fn seed(&self, ctx: &mut ResolveContext<'_>, scope: ConstraintScope) -> Option<u64> {
        if !self.restore_values {
            return Some(ctx.rng.gen());
        }
        let stored = ctx
            .network
            .group(scope.group)
            .and_then(|g| g.properties.get(tags::RANDOMIZATION_SEED).map(str::to_string));
        match stored {
            None => {
                ctx.warn(format!(
                    "Could not find a stored randomization seed in neuron group [{}]. Skipping randomization.",
                    scope.group
                ));
                None
            }
            Some(s) => match s.trim().parse::<u64>() {
                Ok(seed) => Some(seed),
                Err(_) => {
                    ctx.warn(format!(
                        "Could not parse stored randomization seed in neuron group [{}]. Skipping randomization.",
                        scope.group
                    ));
                    None
                }
            },
        }
    }
}

impl ConstraintRule for RandomizationConstraint {
    fn name(&self) -> &'static str {
        "Randomization"
    }

    fn check(&mut self, network: &ModularNetwork, scope: ConstraintScope) -> ConstraintResult<()> {
        if network.group(scope.group).is_none() {
            return Err(NetworkError::UnknownGroup(scope.group).into());
        }
        for (name, range) in self.ranges() {
            if !range.is_ordered() {
                return Err(ConstraintError::invalid(
                    name,
                    format!("minimum {} exceeds maximum {}", range.min, range.max),
                ));
            }
        }
        Ok(())
    }

    fn enforce(&mut self, ctx: &mut ResolveContext<'_>, scope: ConstraintScope) -> ConstraintResult<Resolution> {
        if self.single_shot && self.done {
            return Ok(Resolution::Unchanged);
        }
        let marker = format!("{}randomized-{}", tags::CONSTRAINT_TEMP_PREFIX, scope.constraint);
        let group = ctx
            .network
            .group_mut(scope.group)
            .ok_or(NetworkError::UnknownGroup(scope.group))?;
        if !group.properties.tag(&marker) {
            return Ok(Resolution::Unchanged);
        }

        let Some(seed) = self.seed(ctx, scope) else {
            return Ok(Resolution::Unchanged);
        };
        if self.store_values {
            if let Some(group) = ctx.network.group_mut(scope.group) {
                group.properties.set(tags::RANDOMIZATION_SEED, seed.to_string());
            }
        }

        let recursive = ctx.network.group(scope.group).map_or(false, |g| g.is_module());
        let selected = select_elements(ctx.network, scope.group, &[], recursive);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut changed = false;

        for id in &selected.neurons {
            let Some(neuron) = ctx.network.neuron_mut(*id) else {
                continue;
            };
            for (range, value) in [
                (self.activation_range, &mut neuron.activation),
                (self.output_range, &mut neuron.output),
                (self.bias_range, &mut neuron.bias),
            ] {
                if range.is_active() {
                    let drawn = range.draw(&mut rng);
                    changed |= drawn != *value;
                    *value = drawn;
                }
            }
        }

        if self.weight_range.is_active() {
            for id in selected.internal.iter().chain(&selected.incoming) {
                if let Some(synapse) = ctx.network.synapse_mut(*id) {
                    let drawn = self.weight_range.draw(&mut rng);
                    changed |= drawn != synapse.strength;
                    synapse.strength = drawn;
                }
            }
        }

        self.done = true;
        debug!(
            target: "modnet-engine",
            "Randomized {} neurons of group {} with seed {}",
            selected.neurons.len(),
            scope.group,
            seed
        );
        Ok(Resolution::from_changed(changed))
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        PARAMETERS
    }

    fn parameter(&self, name: &str) -> Option<String> {
        match name {
            "GlobalBiasRange" => Some(self.bias_range.to_string()),
            "GlobalOutputRange" => Some(self.output_range.to_string()),
            "GlobalActivationRange" => Some(self.activation_range.to_string()),
            "GlobalWeightRange" => Some(self.weight_range.to_string()),
            "StoreValuesInNetwork" => Some(self.store_values.to_string()),
            "RestoreValuesFromNetwork" => Some(self.restore_values.to_string()),
            "SingleShot" => Some(self.single_shot.to_string()),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> ConstraintResult<()> {
        let parse_range = |value: &str| {
            value
                .parse::<ValueRange>()
                .map_err(|reason| ConstraintError::invalid(name, reason))
        };
        match name {
            "GlobalBiasRange" => self.bias_range = parse_range(value)?,
            "GlobalOutputRange" => self.output_range = parse_range(value)?,
            "GlobalActivationRange" => self.activation_range = parse_range(value)?,
            "GlobalWeightRange" => self.weight_range = parse_range(value)?,
            "StoreValuesInNetwork" => self.store_values = parse_bool(name, value)?,
            "RestoreValuesFromNetwork" => self.restore_values = parse_bool(name, value)?,
            "SingleShot" => self.single_shot = parse_bool(name, value)?,
            other => return Err(ConstraintError::UnknownParameter(other.to_string())),
        }
        self.done = false;
        Ok(())
    }
}
