// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Mirror Scenarios
//!
//! End-to-end runs of the symmetry constraints through the resolver:
//! - Empty reference module is built as a mirror of its owner
//! - Horizontal, vertical and combined layouts flip the reference frame
//! - Nested submodules are mirrored under the reference module
//! - Orphaned reference synapses are removed on the next run
//! - Input, output and crossing synapses are mirrored with the mode's sign
//! - Connection symmetry mirrors cross-boundary synapses with the mode's sign

use modnet_engine::constraints::{ConnectionMode, FlipMode};
use modnet_engine::prelude::*;
use modnet_engine::tags;

struct Scenario {
    net: ModularNetwork,
    m1: ElementId,
    m2: ElementId,
    n1: ElementId,
    n2: ElementId,
    constraint: ElementId,
}

/// Owner `M1` with `N1 -> N2` (0.4), empty reference `M2` at x = 20
fn two_modules(layout: &str, mode: &str) -> Scenario {
    let mut net = ModularNetwork::new();
    let m1 = net.create_module("M1", Vector3::ZERO, Size2::new(10.0, 10.0));
    let m2 = net.create_module("M2", Vector3::new(20.0, 0.0, 0.0), Size2::new(2.0, 2.0));
    let n1 = net.create_neuron("N1");
    let n2 = net.create_neuron("N2");
    net.add_neuron_to_group(m1, n1).expect("add N1");
    net.add_neuron_to_group(m1, n2).expect("add N2");
    net.set_element_position(n1, Vector3::new(2.0, 3.0, 0.0), 0.0);
    net.set_element_position(n2, Vector3::new(6.0, 7.0, 0.0), 0.0);
    net.connect(n1, SynapseTarget::Neuron(n2), 0.4).expect("connect");

    let symmetry = SymmetryConstraint::new(m1)
        .with_layout(FlipMode::parse(layout).expect("layout"))
        .with_mode(ConnectionMode::parse(mode).expect("mode"));
    let constraint = net
        .create_constraint(m2, ConstraintKind::Symmetry(symmetry))
        .expect("attach symmetry");
    Scenario {
        net,
        m1,
        m2,
        n1,
        n2,
        constraint,
    }
}

fn manager() -> ConstraintManager {
    ConstraintManager::new(ResolverOptions {
        random_seed: Some(42),
        ..ResolverOptions::default()
    })
}

fn symmetry_of(net: &ModularNetwork, constraint: ElementId) -> &SymmetryConstraint {
    match net.select_constraint_by_id(constraint).map(GroupConstraint::kind) {
        Some(ConstraintKind::Symmetry(s)) => s,
        _ => panic!("constraint {} is not a symmetry constraint", constraint),
    }
}

#[test]
fn test_empty_reference_module_becomes_mirror() {
    let mut s = two_modules("", "");
    let report = manager().run_constraints(&mut s.net, &[s.m2], 10);
    assert!(report.success, "resolver log: {:?}", report.errors);
    assert_eq!(report.iterations, 2);

    let reference_neurons = s.net.all_enclosed_neurons(s.m2);
    assert_eq!(reference_neurons.len(), 2);
    assert_eq!(s.net.all_enclosed_synapses(s.m2).len(), 1);
    assert_eq!(s.net.module_size(s.m2), s.net.module_size(s.m1));

    let sym = symmetry_of(&s.net, s.constraint);
    let r1 = sym.matching_reference_neuron(s.n1).expect("N1 mirrored");
    let r2 = sym.matching_reference_neuron(s.n2).expect("N2 mirrored");
    let m1_origin = s.net.element_position(s.m1).unwrap();
    let m2_origin = s.net.element_position(s.m2).unwrap();
    for (owner, mirror) in [(s.n1, r1), (s.n2, r2)] {
        let local_owner = s.net.element_position(owner).unwrap() - m1_origin;
        let local_mirror = s.net.element_position(mirror).unwrap() - m2_origin;
        assert!(local_owner.approx_eq(&local_mirror, 1e-9));
    }
    let mirror = s.net.find_synapse(r1, SynapseTarget::Neuron(r2)).expect("mirror synapse");
    assert_eq!(s.net.synapse(mirror).unwrap().strength, 0.4);

    let again = manager().run_constraints(&mut s.net, &[s.m2], 10);
    assert!(again.success);
    assert_eq!(again.iterations, 1);
}

#[test]
fn test_horizontal_layout_flips_x() {
    let mut s = two_modules("h", "");
    assert!(manager().run_constraints(&mut s.net, &[s.m2], 10).success);

    let sym = symmetry_of(&s.net, s.constraint);
    let r1 = sym.matching_reference_neuron(s.n1).unwrap();
    let r2 = sym.matching_reference_neuron(s.n2).unwrap();
    // origin.x + width - local x
    assert!(s.net.element_position(r1).unwrap().approx_eq(&Vector3::new(28.0, 3.0, 0.0), 1e-9));
    assert!(s.net.element_position(r2).unwrap().approx_eq(&Vector3::new(24.0, 7.0, 0.0), 1e-9));
}

#[test]
fn test_orphaned_reference_synapse_removed() {
    let mut s = two_modules("", "");
    assert!(manager().run_constraints(&mut s.net, &[s.m2], 10).success);

    let sym = symmetry_of(&s.net, s.constraint);
    let r1 = sym.matching_reference_neuron(s.n1).unwrap();
    let r2 = sym.matching_reference_neuron(s.n2).unwrap();
    let orphan = s.net.connect(r2, SynapseTarget::Neuron(r1), 1.0).unwrap();

    let report = manager().run_constraints(&mut s.net, &[s.m2], 10);
    assert!(report.success);
    assert!(s.net.synapse(orphan).is_none());
    assert!(report.trashcan.iter().any(|e| e.id() == orphan));
}

#[test]
fn test_unlicensed_input_synapse_survives_until_input_mode() {
    let mut s = two_modules("", "");
    assert!(manager().run_constraints(&mut s.net, &[s.m2], 10).success);
    let r1 = symmetry_of(&s.net, s.constraint).matching_reference_neuron(s.n1).unwrap();
    let outside = s.net.create_neuron("outside");
    let input = s.net.connect(outside, SynapseTarget::Neuron(r1), 0.7).unwrap();

    assert!(manager().run_constraints(&mut s.net, &[s.m2], 10).success);
    assert!(s.net.synapse(input).is_some());

    s.net
        .select_constraint_by_id_mut(s.constraint)
        .unwrap()
        .set_parameter("Mode", "i")
        .unwrap();
    assert!(manager().run_constraints(&mut s.net, &[s.m2], 10).success);
    assert!(s.net.synapse(input).is_none());
}

#[test]
fn test_structural_mode_leaves_no_slave_tags() {
    let mut s = two_modules("", "s");
    assert!(manager().run_constraints(&mut s.net, &[s.m2], 10).success);
    for n in s.net.all_enclosed_neurons(s.m2) {
        assert!(!s.net.neuron(n).unwrap().properties.has(tags::SLAVE));
    }
}

#[test]
fn test_connection_symmetry_negates_output_mirrors() {
    let mut net = ModularNetwork::new();
    let left = net.create_group("left");
    let right = net.create_group("right");
    let a = net.create_neuron("a");
    let b = net.create_neuron("b");
    let x = net.create_neuron("motor");
    net.add_neuron_to_group(left, a).unwrap();
    net.add_neuron_to_group(right, b).unwrap();
    let out = net.connect(a, SynapseTarget::Neuron(x), 0.5).unwrap();

    let mut rule = ConnectionSymmetryConstraint::new(left).with_mode(ConnectionModes::parse("O").unwrap());
    rule.references = format!("{},{}", a, b).parse().unwrap();
    let c = net
        .create_constraint(right, ConstraintKind::ConnectionSymmetry(rule))
        .unwrap();

    let report = manager().run_constraints(&mut net, &[right], 10);
    assert!(report.success, "resolver log: {:?}", report.errors);
    let mirror = net.find_synapse(b, SynapseTarget::Neuron(x)).expect("output mirrored");
    assert_eq!(net.synapse(mirror).unwrap().strength, -0.5);
    assert_eq!(net.synapse(out).unwrap().strength, 0.5);
    assert_eq!(
        net.select_constraint_by_id(c).unwrap().parameter("References").as_deref(),
        Some(format!("{},{}", a, b).as_str())
    );
}

#[test]
fn test_vertical_layout_flips_y() {
    let mut s = two_modules("v", "");
    assert!(manager().run_constraints(&mut s.net, &[s.m2], 10).success);

    let sym = symmetry_of(&s.net, s.constraint);
    let r1 = sym.matching_reference_neuron(s.n1).unwrap();
    let r2 = sym.matching_reference_neuron(s.n2).unwrap();
    // origin.y + height - local y
    assert!(s.net.element_position(r1).unwrap().approx_eq(&Vector3::new(22.0, 7.0, 0.0), 1e-9));
    assert!(s.net.element_position(r2).unwrap().approx_eq(&Vector3::new(26.0, 3.0, 0.0), 1e-9));
}

#[test]
fn test_both_flips_mirror_x_and_y() {
    let mut s = two_modules("hv", "");
    assert!(manager().run_constraints(&mut s.net, &[s.m2], 10).success);

    let sym = symmetry_of(&s.net, s.constraint);
    let r1 = sym.matching_reference_neuron(s.n1).unwrap();
    let r2 = sym.matching_reference_neuron(s.n2).unwrap();
    assert!(s.net.element_position(r1).unwrap().approx_eq(&Vector3::new(28.0, 7.0, 0.0), 1e-9));
    assert!(s.net.element_position(r2).unwrap().approx_eq(&Vector3::new(24.0, 3.0, 0.0), 1e-9));
}

/// Mirrors of an input `x -> N1`, an output `N2 -> y` and a crossing `R2 -> N1`
struct CrossBoundary {
    input: f64,
    output: f64,
    mutual: f64,
}

fn cross_boundary_mirrors(mode: &str) -> CrossBoundary {
    let mut s = two_modules("", mode);
    assert!(manager().run_constraints(&mut s.net, &[s.m2], 10).success);
    let sym = symmetry_of(&s.net, s.constraint);
    let r1 = sym.matching_reference_neuron(s.n1).unwrap();
    let r2 = sym.matching_reference_neuron(s.n2).unwrap();

    let x = s.net.create_neuron("x");
    let y = s.net.create_neuron("y");
    s.net.connect(x, SynapseTarget::Neuron(s.n1), 0.9).unwrap();
    s.net.connect(s.n2, SynapseTarget::Neuron(y), 0.5).unwrap();
    s.net.connect(r2, SynapseTarget::Neuron(s.n1), 0.3).unwrap();

    let report = manager().run_constraints(&mut s.net, &[s.m2], 10);
    assert!(report.success, "resolver log: {:?}", report.errors);
    assert_eq!(manager().run_constraints(&mut s.net, &[s.m2], 10).iterations, 1);

    let strength = |net: &ModularNetwork, source: ElementId, target: ElementId| {
        let id = net
            .find_synapse(source, SynapseTarget::Neuron(target))
            .unwrap_or_else(|| panic!("no mirror {} -> {}", source, target));
        net.synapse(id).unwrap().strength
    };
    CrossBoundary {
        input: strength(&s.net, x, r1),
        output: strength(&s.net, r2, y),
        mutual: strength(&s.net, s.n2, r1),
    }
}

#[test]
fn test_cross_boundary_modes_keep_sign() {
    let mirrors = cross_boundary_mirrors("iom");
    assert_eq!(mirrors.input, 0.9);
    assert_eq!(mirrors.output, 0.5);
    assert_eq!(mirrors.mutual, 0.3);
}

#[test]
fn test_anti_symmetric_modes_negate_mirrors() {
    let mirrors = cross_boundary_mirrors("IOM");
    assert_eq!(mirrors.input, -0.9);
    assert_eq!(mirrors.output, -0.5);
    assert_eq!(mirrors.mutual, -0.3);
}

#[test]
fn test_crossing_synapse_not_mirrored_without_mutual_mode() {
    let mut s = two_modules("", "io");
    assert!(manager().run_constraints(&mut s.net, &[s.m2], 10).success);
    let sym = symmetry_of(&s.net, s.constraint);
    let r1 = sym.matching_reference_neuron(s.n1).unwrap();
    let r2 = sym.matching_reference_neuron(s.n2).unwrap();
    let crossing = s.net.connect(r2, SynapseTarget::Neuron(s.n1), 0.3).unwrap();

    assert!(manager().run_constraints(&mut s.net, &[s.m2], 10).success);
    assert!(s.net.synapse(crossing).is_some());
    assert!(s.net.find_synapse(s.n2, SynapseTarget::Neuron(r1)).is_none());
}

#[test]
fn test_nested_submodule_mirrored_with_both_flips() {
    let mut net = ModularNetwork::new();
    let m1 = net.create_module("M1", Vector3::ZERO, Size2::new(10.0, 10.0));
    let m2 = net.create_module("M2", Vector3::new(20.0, 0.0, 0.0), Size2::new(10.0, 10.0));
    let sub = net.create_module("S", Vector3::new(1.0, 1.0, 0.0), Size2::new(2.0, 2.0));
    net.add_sub_module(m1, sub).unwrap();
    let inner = net.create_neuron("inner");
    net.add_neuron_to_group(sub, inner).unwrap();
    net.set_element_position(inner, Vector3::new(2.0, 2.0, 0.0), 0.0);
    let x = net.create_neuron("x");
    net.connect(x, SynapseTarget::Neuron(inner), 0.9).unwrap();

    let rule = SymmetryConstraint::new(m1)
        .with_layout(FlipMode::parse("hv").unwrap())
        .with_mode(ConnectionMode::parse("I").unwrap());
    let constraint = net.create_constraint(m2, ConstraintKind::Symmetry(rule)).unwrap();

    let report = manager().run_constraints(&mut net, &[m2], 10);
    assert!(report.success, "resolver log: {:?}", report.errors);

    let sym = symmetry_of(&net, constraint);
    let mirror_sub = sym.matching_module(sub).expect("submodule mirrored");
    let mirror_inner = sym.matching_reference_neuron(inner).expect("neuron mirrored");
    assert_eq!(net.parent_module(mirror_sub), Some(m2));
    assert_eq!(net.module_size(mirror_sub), Some(Size2::new(2.0, 2.0)));
    assert_eq!(net.module_of_neuron(mirror_inner), Some(mirror_sub));
    // corner: origin + size - element size - local offset
    assert!(net.element_position(mirror_sub).unwrap().approx_eq(&Vector3::new(27.0, 7.0, 0.0), 1e-9));
    assert!(net.element_position(mirror_inner).unwrap().approx_eq(&Vector3::new(28.0, 8.0, 0.0), 1e-9));
    let input = net.find_synapse(x, SynapseTarget::Neuron(mirror_inner)).expect("input mirrored");
    assert_eq!(net.synapse(input).unwrap().strength, -0.9);

    assert_eq!(manager().run_constraints(&mut net, &[m2], 10).iterations, 1);

    net.safely_remove(sub).unwrap();
    assert!(manager().run_constraints(&mut net, &[m2], 10).success);
    assert!(net.group(mirror_sub).is_none());
    assert!(net.neuron(mirror_inner).is_none());
    assert!(net.all_enclosed_neurons(m2).is_empty());
}
