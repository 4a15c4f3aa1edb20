// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Resolution through the umbrella crate: sessions shared between threads,
//! constraints combined on one network and configuration driving the resolver.

use std::sync::Arc;
use std::thread;

use modnet::prelude::*;

fn seeded_config() -> ModnetConfig {
    let mut config = ModnetConfig::default();
    config.resolver.random_seed = 11;
    config
}

#[test]
fn test_edit_from_another_thread_then_resolve() {
    let mut net = ModularNetwork::new();
    let left = net.create_module("left", Vector3::ZERO, Size2::new(10.0, 10.0));
    let right = net.create_module("right", Vector3::new(30.0, 0.0, 0.0), Size2::new(10.0, 10.0));
    net.create_constraint(right, ConstraintKind::Symmetry(SymmetryConstraint::new(left)))
        .unwrap();

    let mut session = Session::new(net, &seeded_config());
    let handle = session.network();
    let editor = {
        let handle = Arc::clone(&handle);
        thread::spawn(move || {
            let mut net = handle.write();
            let a = net.create_neuron("a");
            let b = net.create_neuron("b");
            net.add_neuron_to_group(left, a).unwrap();
            net.add_neuron_to_group(left, b).unwrap();
            net.set_element_position(a, Vector3::new(1.0, 1.0, 0.0), 0.0);
            net.set_element_position(b, Vector3::new(4.0, 1.0, 0.0), 0.0);
            net.connect(a, SynapseTarget::Neuron(b), 0.25).unwrap();
        })
    };
    editor.join().unwrap();

    let report = session.resolve(&[right]);
    assert!(report.success, "resolver log: {:?}", report.errors);

    let net = handle.read();
    assert_eq!(net.all_enclosed_neurons(right).len(), 2);
    let mirrored: Vec<f64> = net
        .all_enclosed_synapses(right)
        .into_iter()
        .filter_map(|s| net.synapse(s).map(|s| s.strength))
        .collect();
    assert_eq!(mirrored, vec![0.25]);
}

#[test]
fn test_weight_range_and_neuron_count_together() {
    let mut net = ModularNetwork::new();
    let g = net.create_group("limited");
    net.create_constraint(
        g,
        ConstraintKind::NeuronCount(NeuronCountConstraint::new(3, 3).with_auto_adapt(true)),
    )
    .unwrap();
    net.create_constraint(g, ConstraintKind::WeightRange(WeightRangeConstraint::new(-1.0, 1.0)))
        .unwrap();

    let a = net.create_neuron("a");
    let b = net.create_neuron("b");
    net.add_neuron_to_group(g, a).unwrap();
    net.add_neuron_to_group(g, b).unwrap();
    let strong = net.connect(a, SynapseTarget::Neuron(b), 3.0).unwrap();

    let mut session = Session::new(net, &seeded_config());
    let report = session.resolve_all();
    assert!(report.success, "resolver log: {:?}", report.errors);

    let network = session.network();
    let net = network.read();
    assert_eq!(net.group(g).unwrap().neurons().len(), 3);
    assert_eq!(net.synapse(strong).unwrap().strength, 1.0);
}

#[test]
fn test_iteration_limit_comes_from_config() {
    let mut net = ModularNetwork::new();
    let g = net.create_group("never");
    net.create_constraint(g, ConstraintKind::NeuronCount(NeuronCountConstraint::new(1, 1)))
        .unwrap();

    let mut config = seeded_config();
    config.resolver.max_iterations = 3;
    let mut session = Session::new(net, &config);
    let report = session.resolve(&[g]);
    assert!(!report.success);
    assert_eq!(report.iterations, 3);
}

#[test]
fn test_resolved_network_survives_serialization() {
    let mut net = ModularNetwork::new();
    let left = net.create_module("left", Vector3::ZERO, Size2::new(8.0, 8.0));
    let right = net.create_module("right", Vector3::new(20.0, 0.0, 0.0), Size2::new(8.0, 8.0));
    let n = net.create_neuron("solo");
    net.add_neuron_to_group(left, n).unwrap();
    net.create_constraint(right, ConstraintKind::Symmetry(SymmetryConstraint::new(left)))
        .unwrap();

    let mut session = Session::new(net, &seeded_config());
    assert!(session.resolve_all().success);

    let json = serde_json::to_string(&*session.network().read()).unwrap();
    let restored: ModularNetwork = serde_json::from_str(&json).unwrap();
    let mut again = Session::new(restored, &seeded_config());
    let report = again.resolve_all();
    assert!(report.success);
    assert_eq!(report.iterations, 1);
    assert!(report.trashcan.is_empty());
}

#[test]
fn test_shared_handle_is_a_parking_lot_lock() {
    let session = Session::new(ModularNetwork::new(), &seeded_config());
    let handle: Arc<parking_lot::RwLock<ModularNetwork>> = session.network();
    let first = handle.read();
    let second = handle.read();
    assert_eq!(first.neuron_count(), second.neuron_count());
}
