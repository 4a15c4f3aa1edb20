// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
ConstraintManager - fixpoint driver for group constraints.

One run verifies the constraints of the requested groups, resets all
per-run state and then applies every constraint, group by group, until a
whole pass completes without any constraint reporting a change or an error.

## Run outline

1. Verify (optional, see `ResolverOptions::verify_before_run`)
2. Clear `reduced-degrees-of-freedom` below the groups, re-tag protected elements
3. Reset constraint caches
4. Up to `max_iterations` passes of `run_group_constraints`
5. Drop `constraint-temp:` properties, also on failure

The manager owns no network; callers pass the network they hold the
modification lock for.
*/

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constraints::{ConstraintKind, GroupConstraint, ResolveContext};
use crate::models::Properties;
use crate::network::{ModularNetwork, Trashcan};
use crate::tags::{self, rdof};
use crate::types::ElementId;
use modnet_config::ModnetConfig;

/// Resolver settings taken from `[resolver]` and `[geometry]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverOptions {
    pub max_iterations: usize,
    pub group_retry_budget: usize,
    pub collect_only_last_run: bool,
    pub verify_before_run: bool,
    /// `None` seeds from entropy
    pub random_seed: Option<u64>,
    pub position_tolerance: f64,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self::from_config(&ModnetConfig::default())
    }
}

impl ResolverOptions {
    pub fn from_config(config: &ModnetConfig) -> Self {
        let resolver = &config.resolver;
        Self {
            max_iterations: resolver.max_iterations.max(1),
            group_retry_budget: resolver.group_retry_budget.max(1),
            collect_only_last_run: resolver.collect_only_last_run,
            verify_before_run: resolver.verify_before_run,
            random_seed: (resolver.random_seed != 0).then_some(resolver.random_seed),
            position_tolerance: config.geometry.position_tolerance,
        }
    }
}

/// Outcome of one resolver run
#[derive(Debug, Default)]
pub struct ResolverReport {
    pub success: bool,
    /// Passes performed
    pub iterations: usize,
    /// Verification errors or the per-pass resolver log
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Elements removed by the constraints, owned by the caller
    pub trashcan: Trashcan,
}

impl ResolverReport {
    fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            errors,
            ..Self::default()
        }
    }
}

/// Explicit resolver service with a registry of constraint prototypes
pub struct ConstraintManager {
    options: ResolverOptions,
    rng: StdRng,
    prototypes: Vec<GroupConstraint>,
}

impl Default for ConstraintManager {
    fn default() -> Self {
        Self::new(ResolverOptions::default())
    }
}

impl ConstraintManager {
    /// Manager with one default prototype per constraint variant
    pub fn new(options: ResolverOptions) -> Self {
        let rng = match options.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let prototypes = ConstraintKind::defaults()
            .into_iter()
            .map(|kind| GroupConstraint::new(ElementId(0), kind))
            .collect();
        Self {
            options,
            rng,
            prototypes,
        }
    }

    pub fn from_config(config: &ModnetConfig) -> Self {
        Self::new(ResolverOptions::from_config(config))
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    // ========================================================================
    // Prototype registry
    // ========================================================================

    /// Register a prototype; returns `false` if the name is taken
    pub fn add_constraint_prototype(&mut self, prototype: GroupConstraint) -> bool {
        if self.constraint_prototype(prototype.name()).is_some() {
            warn!(target: "modnet-engine", "Constraint prototype [{}] already registered", prototype.name());
            return false;
        }
        self.prototypes.push(prototype);
        true
    }

    pub fn remove_constraint_prototype(&mut self, name: &str) -> Option<GroupConstraint> {
        let index = self.prototypes.iter().position(|p| p.name() == name)?;
        Some(self.prototypes.remove(index))
    }

    pub fn constraint_prototype(&self, name: &str) -> Option<&GroupConstraint> {
        self.prototypes.iter().find(|p| p.name() == name)
    }

    pub fn constraint_prototypes(&self) -> &[GroupConstraint] {
        &self.prototypes
    }

    /// Unattached copy of a prototype under `id`, parameters preserved
    pub fn create_constraint(&self, name: &str, id: ElementId) -> Option<GroupConstraint> {
        let mut constraint = self.constraint_prototype(name)?.clone();
        constraint.set_id(id);
        constraint.set_group(None);
        constraint.reset();
        Some(constraint)
    }

    // ========================================================================
    // Verification
    // ========================================================================

    /// Validate every constraint of `group`; empty when all are valid
    pub fn verify_constraints(&self, network: &mut ModularNetwork, group: ElementId) -> Vec<String> {
        let mut errors = Vec::new();
        let Some(g) = network.group(group) else {
            errors.push(format!("NeuronGroup [{}] does not exist!", group));
            return errors;
        };
        let group_name = g.name.clone();
        let ids: Vec<ElementId> = g.constraints().iter().map(GroupConstraint::id).collect();

        for id in ids {
            let Some((index, mut constraint)) = network.take_constraint(group, id) else {
                continue;
            };
            if !constraint.is_valid(network) {
                errors.push(format!(
                    "Constraint [{}] of NeuronGroup [{}][{}] is invalid!",
                    constraint.name(),
                    group_name,
                    group
                ));
                errors.push(constraint.error_message().to_string());
            }
            network.put_constraint(group, index, constraint);
        }
        errors
    }

    pub fn verify_all_constraints(&self, network: &mut ModularNetwork) -> Vec<String> {
        network
            .group_ids()
            .into_iter()
            .flat_map(|g| self.verify_constraints(network, g))
            .collect()
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Resolve the constraints of `groups` within `max_iterations` passes
    pub fn run_constraints(
        &mut self,
        network: &mut ModularNetwork,
        groups: &[ElementId],
        max_iterations: usize,
    ) -> ResolverReport {
        let report = self.resolve(network, groups, max_iterations);
        let removed = network.remove_properties_with_prefix(tags::CONSTRAINT_TEMP_PREFIX);
        if removed > 0 {
            debug!(target: "modnet-engine", "Removed {} transient constraint properties", removed);
        }
        info!(
            target: "modnet-engine",
            "Constraint resolution {} after {} pass(es) over {} group(s)",
            if report.success { "succeeded" } else { "failed" },
            report.iterations,
            groups.len()
        );
        report
    }

    /// Resolve every group of the network with the configured pass limit
    pub fn run_all_constraints(&mut self, network: &mut ModularNetwork) -> ResolverReport {
        let groups = network.group_ids();
        let max_iterations = self.options.max_iterations;
        self.run_constraints(network, &groups, max_iterations)
    }

    fn resolve(&mut self, network: &mut ModularNetwork, groups: &[ElementId], max_iterations: usize) -> ResolverReport {
        if self.options.verify_before_run {
            let errors: Vec<String> = groups
                .iter()
                .flat_map(|g| self.verify_constraints(network, *g))
                .collect();
            if !errors.is_empty() {
                warn!(target: "modnet-engine", "Constraint verification failed with {} message(s)", errors.len());
                return ResolverReport::failed(errors);
            }
        }

        clear_degrees_of_freedom(network, groups);
        for group in groups {
            if let Some(g) = network.group_mut(*group) {
                for c in g.constraints.iter_mut() {
                    c.reset();
                }
            }
        }

        let mut report = ResolverReport::default();
        for pass in 0..max_iterations {
            if self.options.collect_only_last_run {
                report.errors.clear();
                report.warnings.clear();
            }
            report.iterations = pass + 1;
            report.errors.push(format!("-- Resolver Run {} --", pass));

            let mut all_ok = true;
            for group in groups {
                let mut messages = Vec::new();
                let ok = self.run_group_constraints(
                    network,
                    *group,
                    &mut report.trashcan,
                    &mut messages,
                    &mut report.warnings,
                );
                all_ok &= ok;
                if !messages.is_empty() {
                    let name = network.group(*group).map(|g| g.name.clone()).unwrap_or_default();
                    report.errors.push(format!("> {} ({}) :", name, group));
                    report.errors.append(&mut messages);
                }
            }
            debug!(target: "modnet-engine", "Resolver pass {} finished, all ok: {}", pass, all_ok);

            if all_ok {
                report.success = true;
                return report;
            }
        }
        report
    }

    /// Apply all constraints of `group`, retrying up to the group retry budget
    ///
    /// Returns `true` once a round completes with every constraint unchanged.
    /// Error messages of the last failed round are appended to `errors`.
    pub fn run_group_constraints(
        &mut self,
        network: &mut ModularNetwork,
        group: ElementId,
        trashcan: &mut Trashcan,
        errors: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) -> bool {
        let tolerance = self.options.position_tolerance;
        let mut messages = Vec::new();

        for _ in 0..self.options.group_retry_budget {
            messages.clear();
            let Some(g) = network.group(group) else {
                // removed by an earlier constraint of this pass
                return true;
            };
            let ids: Vec<ElementId> = g.constraints().iter().map(GroupConstraint::id).collect();

            let mut all_ok = true;
            for id in ids {
                let Some((index, mut constraint)) = network.take_constraint(group, id) else {
                    continue;
                };
                let ok = {
                    let mut ctx = ResolveContext::new(network, trashcan, &mut self.rng, tolerance);
                    constraint.apply(&mut ctx)
                };
                if !ok {
                    all_ok = false;
                    if !constraint.error_message().is_empty() {
                        messages.push(constraint.error_message().to_string());
                    }
                }
                if !constraint.warning_message().is_empty() {
                    warnings.push(format!("{} ({}): {}", constraint.name(), id, constraint.warning_message()));
                }
                if let Some(orphan) = network.put_constraint(group, index, constraint) {
                    warn!(target: "modnet-engine", "Group {} vanished while applying constraint {}", group, orphan.id());
                    return false;
                }
            }
            if all_ok {
                return true;
            }
        }
        errors.append(&mut messages);
        false
    }
}

/// Add one letter of [`rdof`] to an element's reduced degrees of freedom
pub fn mark_element_as_constrained(properties: &mut Properties, letter: char) -> bool {
    properties.add_letters(tags::REDUCED_DEGREES_OF_FREEDOM, &letter.to_string())
}

/// Reset the degrees-of-freedom tags below `groups`
fn clear_degrees_of_freedom(network: &mut ModularNetwork, groups: &[ElementId]) {
    let mut elements = Vec::new();
    for group in groups {
        elements.push(*group);
        elements.extend(network.all_enclosed_modules(*group));
        for n in network.all_enclosed_neurons(*group) {
            elements.push(n);
            if let Some(neuron) = network.neuron(n) {
                elements.extend(neuron.incoming().iter().chain(neuron.outgoing()).copied());
            }
        }
    }
    for id in elements {
        let Some(properties) = network.element_properties_mut(id) else {
            continue;
        };
        properties.remove(tags::REDUCED_DEGREES_OF_FREEDOM);
        if properties.has(tags::PROTECTED) {
            properties.set(tags::REDUCED_DEGREES_OF_FREEDOM, rdof::ALL);
        } else if properties.has(tags::PROTECT_EXISTENCE) {
            mark_element_as_constrained(properties, rdof::EXISTENCE);
        }
    }
}
