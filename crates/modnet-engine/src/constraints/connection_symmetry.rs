// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Connection symmetry - mirrors only the connectivity between paired neurons
//! of two otherwise independent groups. Geometry and module structure are
//! left alone.

use ahash::{AHashMap, AHashSet};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{
    format_optional_id, parse_bool, parse_optional_id, ConstraintError, ConstraintResult,
    ConstraintRule, ConstraintScope, Correspondence, ElementPair, Resolution, ResolveContext,
};
use crate::models::SynapseTarget;
use crate::network::ModularNetwork;
use crate::tags::{self, rdof};
use crate::types::{remap_id, ElementId, IdMap};

const PARAMETERS: &[&str] = &["TargetId", "References", "Mode", "AutoSelectPairs"];

/// Mode bits of one synapse class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMode {
    pub enabled: bool,
    /// Mirror with inverted sign
    pub negate: bool,
    pub structural: bool,
    /// Random, persisted sign flip per mirror synapse
    pub random: bool,
}

/// Per-class modes, parsed from letters like `iOs mr`
///
/// `i`, `o` and `m` select the input, output and mutual class (upper case
/// negates); `s` and `r` apply to the class named last. The normal class is
/// always mirrored as is, so `s` or `r` before any class letter is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionModes {
    pub normal: ClassMode,
    pub input: ClassMode,
    pub output: ClassMode,
    pub mutual: ClassMode,
}

impl Default for ConnectionModes {
    fn default() -> Self {
        Self {
            normal: ClassMode {
                enabled: true,
                ..ClassMode::default()
            },
            input: ClassMode::default(),
            output: ClassMode::default(),
            mutual: ClassMode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SynapseClass {
    Normal,
    Input,
    Output,
    Mutual,
}

impl ConnectionModes {
    pub fn parse(letters: &str) -> Result<Self, char> {
        let mut modes = ConnectionModes::default();
        let mut current = None;
        for c in letters.chars() {
            let class = match c.to_ascii_lowercase() {
                'i' => Some(SynapseClass::Input),
                'o' => Some(SynapseClass::Output),
                'm' => Some(SynapseClass::Mutual),
                _ => None,
            };
            if let Some(class) = class {
                current = Some(class);
                let mode = modes.class_mut(class);
                mode.enabled = true;
                mode.negate |= c.is_ascii_uppercase();
                continue;
            }
            match (c.to_ascii_lowercase(), current) {
                ('s', Some(class)) => modes.class_mut(class).structural = true,
                ('r', Some(class)) => modes.class_mut(class).random = true,
                (w, _) if w.is_whitespace() => {}
                _ => return Err(c),
            }
        }
        Ok(modes)
    }

    pub fn letters(&self) -> String {
        let suffix = |mode: &ClassMode| {
            let mut s = String::new();
            if mode.structural {
                s.push('s');
            }
            if mode.random {
                s.push('r');
            }
            s
        };
        let mut letters = String::new();
        for (mode, letter) in [(&self.input, 'i'), (&self.output, 'o'), (&self.mutual, 'm')] {
            if mode.enabled {
                letters.push(if mode.negate { letter.to_ascii_uppercase() } else { letter });
                letters.push_str(&suffix(mode));
            }
        }
        letters
    }

    fn class(&self, class: SynapseClass) -> &ClassMode {
        match class {
            SynapseClass::Normal => &self.normal,
            SynapseClass::Input => &self.input,
            SynapseClass::Output => &self.output,
            SynapseClass::Mutual => &self.mutual,
        }
    }

    fn class_mut(&mut self, class: SynapseClass) -> &mut ClassMode {
        match class {
            SynapseClass::Normal => &mut self.normal,
            SynapseClass::Input => &mut self.input,
            SynapseClass::Output => &mut self.output,
            SynapseClass::Mutual => &mut self.mutual,
        }
    }
}

/// Paired neuron sets of one pass
struct Pairing {
    owner: AHashSet<ElementId>,
    reference: AHashSet<ElementId>,
    to_reference: AHashMap<ElementId, ElementId>,
    to_owner: AHashMap<ElementId, ElementId>,
}

impl Pairing {
    fn new(pairs: &[ElementPair]) -> Self {
        Self {
            owner: pairs.iter().map(|p| p.owner).collect(),
            reference: pairs.iter().map(|p| p.reference).collect(),
            to_reference: pairs.iter().map(|p| (p.owner, p.reference)).collect(),
            to_owner: pairs.iter().map(|p| (p.reference, p.owner)).collect(),
        }
    }

    fn is_paired(&self, neuron: ElementId) -> bool {
        self.owner.contains(&neuron) || self.reference.contains(&neuron)
    }

    /// Class of a synapse as seen from `side`
    fn classify(&self, side: &AHashSet<ElementId>, other: &AHashSet<ElementId>, source: ElementId, target: ElementId) -> Option<SynapseClass> {
        if side.contains(&source) && side.contains(&target) {
            Some(SynapseClass::Normal)
        } else if (side.contains(&source) && other.contains(&target))
            || (other.contains(&source) && side.contains(&target))
        {
            Some(SynapseClass::Mutual)
        } else if side.contains(&source) && !self.is_paired(target) {
            Some(SynapseClass::Output)
        } else if side.contains(&target) && !self.is_paired(source) {
            Some(SynapseClass::Input)
        } else {
            None
        }
    }

    /// Counterpart of a paired neuron on the other side
    fn counterpart(&self, neuron: ElementId) -> Option<ElementId> {
        self.to_reference
            .get(&neuron)
            .or_else(|| self.to_owner.get(&neuron))
            .copied()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionSymmetryConstraint {
    /// Owner group
    pub target: Option<ElementId>,
    pub references: Correspondence,
    pub mode: ConnectionModes,
    pub auto_select_pairs: bool,
    #[serde(skip)]
    pairs: Vec<ElementPair>,
}

impl ConnectionSymmetryConstraint {
    pub fn new(owner: ElementId) -> Self {
        Self {
            target: Some(owner),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: ConnectionModes) -> Self {
        self.mode = mode;
        self
    }

    /// Pairs of the last validation
    pub fn pairs(&self) -> &[ElementPair] {
        &self.pairs
    }

    pub fn matching_reference_neuron(&self, owner_neuron: ElementId) -> Option<ElementId> {
        self.pairs
            .iter()
            .find(|p| p.owner == owner_neuron)
            .map(|p| p.reference)
    }

    pub fn matching_owner_neuron(&self, reference_neuron: ElementId) -> Option<ElementId> {
        self.pairs
            .iter()
            .find(|p| p.reference == reference_neuron)
            .map(|p| p.owner)
    }

    fn owner_group(&self, network: &ModularNetwork, scope: ConstraintScope) -> ConstraintResult<ElementId> {
        let owner = self
            .target
            .ok_or_else(|| ConstraintError::invalid("TargetId", "no owner group set"))?;
        if network.group(owner).is_none() {
            return Err(ConstraintError::MissingTarget(owner));
        }
        if owner == scope.group {
            return Err(ConstraintError::invalid(
                "TargetId",
                "owner and reference group must differ",
            ));
        }
        Ok(owner)
    }

    /// Pair still unpaired neurons of equal name
    fn auto_pair(&mut self, network: &ModularNetwork, owner: ElementId, reference: ElementId, used: &mut AHashSet<ElementId>) {
        let mut candidates: Vec<ElementId> = network
            .all_enclosed_neurons(reference)
            .into_iter()
            .filter(|n| !used.contains(n))
            .collect();
        for o in network.all_enclosed_neurons(owner) {
            if used.contains(&o) {
                continue;
            }
            let Some(name) = network.neuron(o).map(|n| n.name.as_str()) else {
                continue;
            };
            let found = candidates
                .iter()
                .position(|r| network.neuron(*r).map_or(false, |n| n.name == name));
            if let Some(index) = found {
                let r = candidates.remove(index);
                used.insert(o);
                used.insert(r);
                self.pairs.push(ElementPair::new(o, r));
            }
        }
    }

    /// Sign of a mirror under random mode, drawing and storing it on first use
    fn random_flip(ctx: &mut ResolveContext<'_>, mirror: ElementId) -> bool {
        let stored = ctx
            .network
            .synapse(mirror)
            .and_then(|s| s.properties.get(tags::RANDOM_FLIP))
            .map(|v| v == "true");
        match stored {
            Some(flip) => flip,
            None => {
                let flip = ctx.rng.gen_bool(0.5);
                if let Some(s) = ctx.network.synapse_mut(mirror) {
                    s.properties.set(tags::RANDOM_FLIP, flip.to_string());
                }
                flip
            }
        }
    }
}

/// Direct synapses of `neurons` with a neuron target
fn neuron_synapses(network: &ModularNetwork, neurons: &AHashSet<ElementId>) -> Vec<ElementId> {
    let mut ordered: Vec<ElementId> = neurons.iter().copied().collect();
    ordered.sort();
    let mut seen = AHashSet::new();
    let mut result = Vec::new();
    for n in ordered {
        let Some(neuron) = network.neuron(n) else {
            continue;
        };
        for s in neuron.incoming().iter().chain(neuron.outgoing()) {
            let targets_neuron = network
                .synapse(*s)
                .map_or(false, |syn| syn.target.neuron().is_some());
            if targets_neuron && seen.insert(*s) {
                result.push(*s);
            }
        }
    }
    result
}

impl ConstraintRule for ConnectionSymmetryConstraint {
    fn name(&self) -> &'static str {
        "ConnectionSymmetry"
    }

    fn check(&mut self, network: &ModularNetwork, scope: ConstraintScope) -> ConstraintResult<()> {
        self.pairs.clear();
        let owner = self.owner_group(network, scope)?;

        let mut used = AHashSet::new();
        for pair in self.references.pairs() {
            if used.contains(&pair.owner) || used.contains(&pair.reference) {
                continue;
            }
            if network.neuron(pair.owner).is_some() && network.neuron(pair.reference).is_some() {
                used.insert(pair.owner);
                used.insert(pair.reference);
                self.pairs.push(*pair);
            }
        }
        if self.auto_select_pairs {
            self.auto_pair(network, owner, scope.group, &mut used);
        }
        Ok(())
    }

    fn enforce(&mut self, ctx: &mut ResolveContext<'_>, scope: ConstraintScope) -> ConstraintResult<Resolution> {
        let owner = self.owner_group(ctx.network, scope)?;
        let modes = self.mode;
        let pairing = Pairing::new(&self.pairs);
        let mut handled: AHashSet<ElementId> = AHashSet::new();
        let mut changed = false;

        for sid in neuron_synapses(ctx.network, &pairing.owner) {
            if handled.contains(&sid) {
                continue;
            }
            let Some(synapse) = ctx.network.synapse(sid).cloned() else {
                continue;
            };
            let Some(target) = synapse.target.neuron() else {
                continue;
            };
            let Some(class) = pairing.classify(&pairing.owner, &pairing.reference, synapse.source, target) else {
                continue;
            };
            let mode = *modes.class(class);
            if !mode.enabled {
                continue;
            }
            let (source, target) = match class {
                SynapseClass::Normal | SynapseClass::Mutual => {
                    (pairing.counterpart(synapse.source), pairing.counterpart(target))
                }
                SynapseClass::Output => (pairing.counterpart(synapse.source), Some(target)),
                SynapseClass::Input => (Some(synapse.source), pairing.counterpart(target)),
            };
            let (Some(source), Some(target)) = (source, target) else {
                continue;
            };
            let target = SynapseTarget::Neuron(target);

            let (mirror, created) = match ctx.network.find_synapse(source, target) {
                Some(existing) => (existing, false),
                None => {
                    let id = ctx.network.generate_next_id();
                    let mut copy = synapse.rewired_copy(id, source, target);
                    copy.properties.remove(tags::RANDOM_FLIP);
                    copy.properties.tag(tags::NEW_ELEMENT);
                    ctx.network.add_synapse(copy)?;
                    trace!(target: "modnet-engine", "Created connection mirror {} for {}", id, sid);
                    (id, true)
                }
            };

            if !mode.structural {
                let mut strength = if mode.negate { -synapse.strength } else { synapse.strength };
                if mode.random && Self::random_flip(ctx, mirror) {
                    strength = -synapse.strength;
                }
                if let Some(m) = ctx.network.synapse_mut(mirror) {
                    if m.enabled != synapse.enabled {
                        m.enabled = synapse.enabled;
                        changed = true;
                    }
                    if m.function != synapse.function {
                        m.function = synapse.function;
                        changed = true;
                    }
                    if m.strength != strength {
                        m.strength = strength;
                        changed = true;
                    }
                }
            }

            if created {
                if let Some(center) = ctx.network.synapse_center(mirror) {
                    ctx.network.set_element_position(mirror, center, 0.0);
                }
                changed = true;
            }
            if let Some(m) = ctx.network.synapse_mut(mirror) {
                m.properties.remove(tags::NEW_ELEMENT);
                let mut letters = rdof::EXISTENCE.to_string();
                if !mode.structural {
                    letters.push(rdof::WEIGHT);
                    letters.push(rdof::SYNAPSE_FUNCTION);
                }
                m.properties.add_letters(tags::REDUCED_DEGREES_OF_FREEDOM, &letters);
            }
            handled.insert(sid);
            handled.insert(mirror);
        }

        for sid in neuron_synapses(ctx.network, &pairing.reference) {
            if handled.contains(&sid) {
                continue;
            }
            let removable = {
                let Some(synapse) = ctx.network.synapse(sid) else {
                    continue;
                };
                let Some(target) = synapse.target.neuron() else {
                    continue;
                };
                pairing
                    .classify(&pairing.reference, &pairing.owner, synapse.source, target)
                    .map_or(false, |class| modes.class(class).enabled)
            };
            if removable {
                ctx.trashcan.extend(ctx.network.safely_remove(sid)?);
                trace!(target: "modnet-engine", "Removed unmatched connection mirror {}", sid);
                changed = true;
            }
        }

        self.references = self.pairs.iter().copied().collect();
        debug!(
            target: "modnet-engine",
            "ConnectionSymmetry [{}] -> [{}]: {} pairs, changed={}",
            owner,
            scope.group,
            self.pairs.len(),
            changed
        );
        Ok(Resolution::from_changed(changed))
    }

    fn reset(&mut self) {
        self.pairs.clear();
    }

    fn remap_ids(&mut self, map: &IdMap) {
        self.target = self.target.map(|t| remap_id(map, t));
        self.references.remap(map);
        for pair in self.pairs.iter_mut() {
            pair.owner = remap_id(map, pair.owner);
            pair.reference = remap_id(map, pair.reference);
        }
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        PARAMETERS
    }

    fn parameter(&self, name: &str) -> Option<String> {
        match name {
            "TargetId" => Some(format_optional_id(self.target)),
            "References" => Some(self.references.encode()),
            "Mode" => Some(self.mode.letters()),
            "AutoSelectPairs" => Some(self.auto_select_pairs.to_string()),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> ConstraintResult<()> {
        match name {
            "TargetId" => self.target = parse_optional_id(name, value)?,
            "References" => self.references = Correspondence::parse(value),
            "Mode" => {
                self.mode = ConnectionModes::parse(value)
                    .map_err(|c| ConstraintError::invalid(name, format!("unknown mode letter '{}'", c)))?
            }
            "AutoSelectPairs" => self.auto_select_pairs = parse_bool(name, value)?,
            other => return Err(ConstraintError::UnknownParameter(other.to_string())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{ConstraintKind, GroupConstraint};
    use crate::network::Trashcan;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_mode_letters_bind_to_last_class() {
        let modes = ConnectionModes::parse("Ir os").unwrap();
        assert!(modes.normal.enabled && !modes.normal.structural && !modes.normal.random);
        assert!(modes.input.enabled && modes.input.negate && modes.input.random);
        assert!(modes.output.enabled && !modes.output.negate && modes.output.structural);
        assert!(!modes.mutual.enabled);
        assert_eq!(modes.letters(), "Iros");
        assert_eq!(ConnectionModes::parse("q"), Err('q'));
    }

    #[test]
    fn test_structural_or_random_without_class_rejected() {
        assert_eq!(ConnectionModes::parse("s"), Err('s'));
        assert_eq!(ConnectionModes::parse(" R i"), Err('R'));
        assert_eq!(ConnectionModes::parse("ms").map(|m| m.mutual.structural), Ok(true));
    }

    struct Pair {
        net: ModularNetwork,
        reference: ElementId,
        constraint: ElementId,
        a: ElementId,
        b: ElementId,
        c: ElementId,
        d: ElementId,
    }

    fn two_groups(mode: &str) -> Pair {
        let mut net = ModularNetwork::new();
        let owner = net.create_group("left");
        let reference = net.create_group("right");
        let a = net.create_neuron("a");
        let b = net.create_neuron("b");
        let c = net.create_neuron("a");
        let d = net.create_neuron("b");
        net.add_neuron_to_group(owner, a).unwrap();
        net.add_neuron_to_group(owner, b).unwrap();
        net.add_neuron_to_group(reference, c).unwrap();
        net.add_neuron_to_group(reference, d).unwrap();

        let mut constraint = ConnectionSymmetryConstraint::new(owner)
            .with_mode(ConnectionModes::parse(mode).unwrap());
        constraint.auto_select_pairs = true;
        let constraint = net
            .create_constraint(reference, ConstraintKind::ConnectionSymmetry(constraint))
            .unwrap();
        Pair {
            net,
            reference,
            constraint,
            a,
            b,
            c,
            d,
        }
    }

    fn apply(net: &mut ModularNetwork, group: ElementId, constraint: ElementId, seed: u64) -> (bool, GroupConstraint) {
        let (index, mut c) = net.take_constraint(group, constraint).unwrap();
        let mut trash = Trashcan::new();
        let mut rng = StdRng::seed_from_u64(seed);
        let ok = {
            let mut ctx = ResolveContext::new(net, &mut trash, &mut rng, 0.1);
            c.apply(&mut ctx)
        };
        net.put_constraint(group, index, c.clone());
        (ok, c)
    }

    #[test]
    fn test_auto_pairs_by_name_and_mirrors_connection() {
        let mut p = two_groups("");
        p.net.connect(p.a, SynapseTarget::Neuron(p.b), 0.8).unwrap();

        let (ok, c) = apply(&mut p.net, p.reference, p.constraint, 1);
        assert!(!ok);
        assert_eq!(c.parameter("References").unwrap(), format!("{},{}|{},{}", p.a, p.c, p.b, p.d));

        let mirror = p.net.find_synapse(p.c, SynapseTarget::Neuron(p.d)).unwrap();
        let props = &p.net.synapse(mirror).unwrap().properties;
        assert_eq!(props.get(tags::REDUCED_DEGREES_OF_FREEDOM), Some("EWS"));

        let (ok, _) = apply(&mut p.net, p.reference, p.constraint, 1);
        assert!(ok);
    }

    #[test]
    fn test_unmatched_reference_synapse_removed() {
        let mut p = two_groups("");
        let stray = p.net.connect(p.d, SynapseTarget::Neuron(p.c), 0.3).unwrap();

        let (ok, _) = apply(&mut p.net, p.reference, p.constraint, 1);
        assert!(!ok);
        assert!(p.net.synapse(stray).is_none());
    }

    #[test]
    fn test_random_flip_is_persisted() {
        let mut p = two_groups("ir");
        let sensor = p.net.create_neuron("sensor");
        p.net.connect(sensor, SynapseTarget::Neuron(p.a), 0.5).unwrap();

        apply(&mut p.net, p.reference, p.constraint, 3);
        let mirror = p.net.find_synapse(sensor, SynapseTarget::Neuron(p.c)).unwrap();
        let flip = p.net.synapse(mirror).unwrap().properties.get(tags::RANDOM_FLIP).map(str::to_string);
        let strength = p.net.synapse(mirror).unwrap().strength;
        assert!(flip.is_some());
        assert_eq!(strength, if flip.as_deref() == Some("true") { -0.5 } else { 0.5 });

        for seed in 10..15 {
            let (ok, _) = apply(&mut p.net, p.reference, p.constraint, seed);
            assert!(ok);
            assert_eq!(p.net.synapse(mirror).unwrap().strength, strength);
        }
    }
}
