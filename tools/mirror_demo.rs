// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Builds a two-module network, attaches a symmetry constraint to the empty
//! module and resolves it.
//!
//! Usage: mirror_demo [--layout <h|v|hv>] [--mode <letters>] [--key=value ...] [--debug-{crate}]
//!
//! `--key=value` pairs are applied as configuration overrides, e.g.
//! `--max_iterations=5` or `--random_seed=7`.

use std::collections::HashMap;
use std::env;
use std::process;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use modnet::engine::constraints::{ConnectionMode, FlipMode};
use modnet::prelude::*;

struct DemoArgs {
    layout: String,
    mode: String,
    overrides: HashMap<String, String>,
}

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: mirror_demo [--layout <h|v|hv>] [--mode <letters>] [--key=value ...]\n\n{}",
        modnet::observability::debug_flags_help()
    );
    process::exit(2);
}

fn parse_args() -> DemoArgs {
    let mut parsed = DemoArgs {
        layout: String::new(),
        mode: String::new(),
        overrides: HashMap::new(),
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--layout" => parsed.layout = args.next().unwrap_or_else(|| usage_and_exit()),
            "--mode" => parsed.mode = args.next().unwrap_or_else(|| usage_and_exit()),
            "-h" | "--help" => usage_and_exit(),
            other if other.starts_with("--debug-") => {}
            other => match other.strip_prefix("--").and_then(|kv| kv.split_once('=')) {
                Some((key, value)) => {
                    parsed.overrides.insert(key.to_string(), value.to_string());
                }
                None => {
                    eprintln!("Unknown argument: {other}");
                    usage_and_exit();
                }
            },
        }
    }
    parsed
}

/// Owner `left` with a small feed-forward chain, empty reference `right`
fn build_network(layout: FlipMode, mode: ConnectionMode) -> Result<(ModularNetwork, ElementId, ElementId)> {
    let mut net = ModularNetwork::new();
    let left = net.create_module("left", Vector3::ZERO, Size2::new(10.0, 10.0));
    let right = net.create_module("right", Vector3::new(20.0, 0.0, 0.0), Size2::new(10.0, 10.0));

    let positions = [(2.0, 2.0), (5.0, 5.0), (8.0, 2.0)];
    let mut chain = Vec::with_capacity(positions.len());
    for (i, (x, y)) in positions.iter().enumerate() {
        let n = net.create_neuron(&format!("L{}", i));
        net.add_neuron_to_group(left, n)?;
        net.set_element_position(n, Vector3::new(*x, *y, 0.0), 0.0);
        chain.push(n);
    }
    for pair in chain.windows(2) {
        net.connect(pair[0], SynapseTarget::Neuron(pair[1]), 0.5)?;
    }

    let symmetry = SymmetryConstraint::new(left).with_layout(layout).with_mode(mode);
    net.create_constraint(right, ConstraintKind::Symmetry(symmetry))?;
    Ok((net, left, right))
}

fn main() -> Result<()> {
    let args = parse_args();
    let config = modnet::config::load_config_or_default(Some(&args.overrides))
        .context("Failed to load configuration")?;
    modnet::config::validate_config(&config).context("Invalid configuration")?;
    modnet::init_logging_from_config(&config)?;

    let layout = FlipMode::parse(&args.layout).map_err(|c| anyhow!("Unknown layout letter '{c}'"))?;
    let mode = ConnectionMode::parse(&args.mode).map_err(|c| anyhow!("Unknown mode letter '{c}'"))?;
    let (net, left, right) = build_network(layout, mode)?;

    let mut session = Session::new(net, &config);
    let report = session.resolve(&[right]);

    for line in &report.warnings {
        warn!(target: "modnet", "{}", line);
    }
    if !report.success {
        for line in &report.errors {
            eprintln!("{line}");
        }
        return Err(anyhow!("Constraints did not converge after {} passes", report.iterations));
    }

    let network = session.network();
    let net = network.read();
    info!(
        target: "modnet",
        "Resolved in {} passes, {} elements discarded",
        report.iterations,
        report.trashcan.len()
    );
    for (label, group) in [("owner", left), ("mirror", right)] {
        println!("{label}:");
        for n in net.all_enclosed_neurons(group) {
            if let (Some(neuron), Some(p)) = (net.neuron(n), net.element_position(n)) {
                println!("  {} {:<6} ({:.1}, {:.1}, {:.1})", n, neuron.name, p.x, p.y, p.z);
            }
        }
        for s in net.all_enclosed_synapses(group) {
            if let Some(synapse) = net.synapse(s) {
                println!("  {} -> {:?} {:+.2}", synapse.source, synapse.target, synapse.strength);
            }
        }
    }
    Ok(())
}
