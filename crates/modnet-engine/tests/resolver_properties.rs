// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Resolver-level properties: idempotence, convergence bound, correspondence
//! symmetry, mirror completeness, slave tag discipline and stability across
//! id renumbering and merging.

use modnet_engine::constraints::ConnectionMode;
use modnet_engine::prelude::*;
use modnet_engine::tags;
use proptest::prelude::*;

fn manager() -> ConstraintManager {
    ConstraintManager::new(ResolverOptions {
        random_seed: Some(3),
        ..ResolverOptions::default()
    })
}

/// Owner module with `count` neurons in a ring, empty reference module
fn ring(count: usize, mode: &str) -> (ModularNetwork, ElementId, ElementId, ElementId) {
    let mut net = ModularNetwork::new();
    let owner = net.create_module("owner", Vector3::ZERO, Size2::new(20.0, 20.0));
    let reference = net.create_module("reference", Vector3::new(50.0, 0.0, 0.0), Size2::new(20.0, 20.0));
    let neurons: Vec<ElementId> = (0..count)
        .map(|i| {
            let n = net.create_neuron(&format!("n{}", i));
            net.add_neuron_to_group(owner, n).unwrap();
            net.set_element_position(n, Vector3::new(i as f64, 1.0, 0.0), 0.0);
            n
        })
        .collect();
    for (i, n) in neurons.iter().enumerate() {
        let next = neurons[(i + 1) % count];
        if next != *n {
            net.connect(*n, SynapseTarget::Neuron(next), 0.1 * (i as f64 + 1.0)).unwrap();
        }
    }
    let rule = SymmetryConstraint::new(owner).with_mode(ConnectionMode::parse(mode).unwrap());
    let constraint = net
        .create_constraint(reference, ConstraintKind::Symmetry(rule))
        .unwrap();
    (net, owner, reference, constraint)
}

fn symmetry_of(net: &ModularNetwork, constraint: ElementId) -> SymmetryConstraint {
    match net.select_constraint_by_id(constraint).map(|c| c.kind().clone()) {
        Some(ConstraintKind::Symmetry(s)) => s,
        _ => panic!("missing symmetry constraint"),
    }
}

#[test]
fn test_successful_run_is_idempotent() {
    let (mut net, _, reference, _) = ring(3, "");
    assert!(manager().run_constraints(&mut net, &[reference], 10).success);
    let before = serde_json::to_string(&net).unwrap();

    let again = manager().run_constraints(&mut net, &[reference], 10);
    assert!(again.success);
    assert_eq!(again.iterations, 1);
    assert!(again.trashcan.is_empty());
    assert_eq!(serde_json::to_string(&net).unwrap(), before);
}

#[test]
fn test_mirror_completeness() {
    let (mut net, owner, reference, constraint) = ring(4, "");
    assert!(manager().run_constraints(&mut net, &[reference], 10).success);

    let sym = symmetry_of(&net, constraint);
    let owner_synapses = net.all_enclosed_synapses(owner);
    assert_eq!(owner_synapses.len(), 4);
    assert_eq!(net.all_enclosed_synapses(reference).len(), 4);
    for sid in owner_synapses {
        let s = net.synapse(sid).unwrap();
        let target = s.target.neuron().unwrap();
        let source = sym.matching_reference_neuron(s.source).unwrap();
        let target = sym.matching_reference_neuron(target).unwrap();
        let mirror = net.find_synapse(source, SynapseTarget::Neuron(target)).unwrap();
        assert_eq!(net.synapse(mirror).unwrap().strength, s.strength);
    }
}

#[test]
fn test_slave_tags_follow_attachment() {
    let (mut net, _, reference, constraint) = ring(3, "");
    assert!(manager().run_constraints(&mut net, &[reference], 10).success);

    let neurons = net.all_enclosed_neurons(reference);
    let synapses = net.all_enclosed_synapses(reference);
    let slave = |net: &ModularNetwork, id: ElementId| {
        net.element_properties(id).map_or(false, |p| p.has(tags::SLAVE))
    };
    assert!(neurons.iter().chain(&synapses).all(|id| slave(&net, *id)));

    let detached = net.remove_constraint(constraint).unwrap();
    assert!(neurons.iter().chain(&synapses).all(|id| !slave(&net, *id)));

    net.add_constraint(reference, detached).unwrap();
    assert!(neurons.iter().chain(&synapses).all(|id| slave(&net, *id)));
}

#[test]
fn test_session_resolve_all() {
    let (net, _, reference, _) = ring(2, "");
    let mut config = modnet_config::ModnetConfig::default();
    config.resolver.random_seed = 9;
    let mut session = Session::new(net, &config);
    let report = session.resolve_all();
    assert!(report.success, "resolver log: {:?}", report.errors);
    assert_eq!(session.network().read().all_enclosed_neurons(reference).len(), 2);
}

#[test]
fn test_renumbered_modules_stay_resolved() {
    let (mut net, owner, reference, constraint) = ring(3, "");
    assert!(manager().run_constraints(&mut net, &[reference], 10).success);
    let (neurons, synapses) = (net.neuron_count(), net.synapse_count());

    let owner_map = net.renew_module_ids(owner).unwrap();
    let reference_map = net.renew_module_ids(reference).unwrap();
    let owner = owner_map[&owner];
    let reference = reference_map[&reference];
    assert!(net.group(owner).is_some() && net.group(reference).is_some());

    let report = manager().run_constraints(&mut net, &[reference], 10);
    assert!(report.success, "resolver log: {:?}", report.errors);
    assert_eq!(report.iterations, 1);
    assert!(report.trashcan.is_empty());
    assert_eq!(net.neuron_count(), neurons);
    assert_eq!(net.synapse_count(), synapses);

    let sym = symmetry_of(&net, constraint);
    let reference_neurons = net.all_enclosed_neurons(reference);
    for n in net.all_enclosed_neurons(owner) {
        let mirror = sym.matching_reference_neuron(n).expect("renumbered pair");
        assert!(reference_neurons.contains(&mirror));
    }
}

#[test]
fn test_merged_network_stays_resolved() {
    let (mut net, owner, reference, constraint) = ring(3, "");
    let left = net.create_group("left");
    let right = net.create_group("right");
    let a = net.create_neuron("a");
    let c = net.create_neuron("a");
    net.add_neuron_to_group(left, a).unwrap();
    net.add_neuron_to_group(right, c).unwrap();
    let sensor = net.create_neuron("sensor");
    net.connect(sensor, SynapseTarget::Neuron(a), 0.5).unwrap();
    let modes = ConnectionModes::parse("i").unwrap();
    net.create_constraint(
        right,
        ConstraintKind::ConnectionSymmetry(ConnectionSymmetryConstraint::new(left).with_mode(modes)),
    )
    .unwrap();
    assert!(manager().run_all_constraints(&mut net).success);
    assert!(net.find_synapse(sensor, SynapseTarget::Neuron(c)).is_some());
    let (neurons, synapses) = (net.neuron_count(), net.synapse_count());

    let mut host = ModularNetwork::new();
    let host_neuron = host.create_neuron("host");
    let map = host.merge(net);

    let report = manager().run_all_constraints(&mut host);
    assert!(report.success, "resolver log: {:?}", report.errors);
    assert_eq!(report.iterations, 1);
    assert!(report.trashcan.is_empty());
    assert_eq!(host.neuron_count(), neurons + 1);
    assert_eq!(host.synapse_count(), synapses);
    assert!(host.neuron(host_neuron).is_some());

    let sym = symmetry_of(&host, map[&constraint]);
    assert_eq!(sym.target, Some(map[&owner]));
    for n in host.all_enclosed_neurons(map[&owner]) {
        assert!(sym.matching_reference_neuron(n).is_some());
    }
    assert_eq!(host.all_enclosed_neurons(map[&reference]).len(), 3);
}

proptest! {
    #[test]
    fn convergence_is_bounded(k in 1usize..8) {
        let mut net = ModularNetwork::new();
        let g = net.create_group("never");
        net.create_constraint(g, ConstraintKind::NeuronCount(NeuronCountConstraint::new(1, 1))).unwrap();

        let report = manager().run_constraints(&mut net, &[g], k);
        prop_assert!(!report.success);
        prop_assert_eq!(report.iterations, k);
        let headers = report.errors.iter().filter(|e| e.starts_with("-- Resolver Run")).count();
        prop_assert_eq!(headers, k);
    }

    #[test]
    fn correspondence_is_symmetric(count in 1usize..6) {
        let (mut net, owner, reference, constraint) = ring(count, "");
        prop_assert!(manager().run_constraints(&mut net, &[reference], 10).success);

        let sym = symmetry_of(&net, constraint);
        for n in net.all_enclosed_neurons(owner) {
            let mirror = sym.matching_reference_neuron(n);
            prop_assert!(mirror.is_some());
            prop_assert_eq!(mirror.and_then(|m| sym.matching_owner_neuron(m)), Some(n));
        }
    }
}
