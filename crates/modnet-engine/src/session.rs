// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! A network shared behind a lock, paired with the manager resolving it.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

use crate::constraint_manager::{ConstraintManager, ResolverReport};
use crate::network::ModularNetwork;
use crate::types::ElementId;
use modnet_config::ModnetConfig;

pub struct Session {
    network: Arc<RwLock<ModularNetwork>>,
    manager: ConstraintManager,
}

impl Session {
    pub fn new(network: ModularNetwork, config: &ModnetConfig) -> Self {
        Self::with_manager(network, ConstraintManager::from_config(config))
    }

    pub fn with_manager(network: ModularNetwork, manager: ConstraintManager) -> Self {
        info!(
            target: "modnet-engine",
            "Session started: {} neurons, {} synapses, {} groups",
            network.neuron_count(),
            network.synapse_count(),
            network.group_ids().len()
        );
        Self {
            network: Arc::new(RwLock::new(network)),
            manager,
        }
    }

    /// Shared handle; editors take the write lock for each modification
    pub fn network(&self) -> Arc<RwLock<ModularNetwork>> {
        Arc::clone(&self.network)
    }

    pub fn manager(&self) -> &ConstraintManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ConstraintManager {
        &mut self.manager
    }

    /// Resolve the constraints of `groups`, holding the write lock for the whole run
    pub fn resolve(&mut self, groups: &[ElementId]) -> ResolverReport {
        let max_iterations = self.manager.options().max_iterations;
        let mut network = self.network.write();
        self.manager.run_constraints(&mut network, groups, max_iterations)
    }

    pub fn resolve_all(&mut self) -> ResolverReport {
        let mut network = self.network.write();
        self.manager.run_all_constraints(&mut network)
    }

    pub fn verify_all(&self) -> Vec<String> {
        let mut network = self.network.write();
        self.manager.verify_all_constraints(&mut network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{ConstraintKind, NeuronCountConstraint};

    #[test]
    fn test_resolve_through_shared_handle() {
        let mut net = ModularNetwork::new();
        let g = net.create_group("g");
        net.create_constraint(
            g,
            ConstraintKind::NeuronCount(NeuronCountConstraint::new(2, 2).with_auto_adapt(true)),
        )
        .unwrap();

        let mut config = ModnetConfig::default();
        config.resolver.random_seed = 5;
        let mut session = Session::new(net, &config);
        let handle = session.network();

        let report = session.resolve(&[g]);
        assert!(report.success);
        assert_eq!(handle.read().group(g).unwrap().neurons().len(), 2);
        assert!(session.verify_all().is_empty());
    }
}
