// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Symmetry constraint - keeps a reference group a geometric and connective
mirror of an owner group.

The constraint is attached to the reference group; `TargetId` names the
owner. Each pass rebuilds the owner/reference correspondence from the stored
pairs of every symmetry constraint in the network, then:

1. removes, creates and re-parents reference modules
2. copies sizes and mirrors positions
3. creates, removes and synchronises reference neurons
4. mirrors every synapse touching the owner neurons
5. removes reference synapses that are neither mirrors nor licensed by the mode
*/

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::iter;
use tracing::{debug, trace};

use super::{
    format_optional_id, parse_optional_id, ConstraintError, ConstraintKind, ConstraintResult,
    ConstraintRule, ConstraintScope, Correspondence, ElementPair, Resolution, ResolveContext,
};
use crate::models::{Neuron, Properties, SynapseTarget};
use crate::network::ModularNetwork;
use crate::tags;
use crate::types::{remap_id, ElementId, IdMap, Size2, Vector3};

const PARAMETERS: &[&str] = &["TargetId", "References", "Layout", "Mode"];

/// Axes along which the reference side is flipped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlipMode {
    pub horizontal: bool,
    pub vertical: bool,
}

impl FlipMode {
    /// Parse `h`/`v` letters, case-insensitive
    ///
    /// Returns the first letter that is not a flip letter as error.
    pub fn parse(letters: &str) -> Result<Self, char> {
        let mut mode = FlipMode::default();
        for c in letters.chars() {
            match c {
                'h' | 'H' => mode.horizontal = true,
                'v' | 'V' => mode.vertical = true,
                c if c.is_whitespace() => {}
                other => return Err(other),
            }
        }
        Ok(mode)
    }

    pub fn letters(&self) -> String {
        let mut s = String::new();
        if self.horizontal {
            s.push('h');
        }
        if self.vertical {
            s.push('v');
        }
        s
    }
}

/// Which cross-boundary synapses are mirrored, and with which sign
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionMode {
    pub input: bool,
    pub output: bool,
    pub mutual: bool,
    pub input_anti: bool,
    pub output_anti: bool,
    pub mutual_anti: bool,
    /// Mirror topology only, never parameter values
    pub structural: bool,
}

impl ConnectionMode {
    /// Parse `i`/`o`/`m` (upper case for anti-symmetric) and `s`
    pub fn parse(letters: &str) -> Result<Self, char> {
        let mut mode = ConnectionMode::default();
        for c in letters.chars() {
            match c {
                'i' => mode.input = true,
                'I' => {
                    mode.input = true;
                    mode.input_anti = true;
                }
                'o' => mode.output = true,
                'O' => {
                    mode.output = true;
                    mode.output_anti = true;
                }
                'm' => mode.mutual = true,
                'M' => {
                    mode.mutual = true;
                    mode.mutual_anti = true;
                }
                's' | 'S' => mode.structural = true,
                c if c.is_whitespace() => {}
                other => return Err(other),
            }
        }
        Ok(mode)
    }

    pub fn letters(&self) -> String {
        let mut s = String::new();
        let mut push = |enabled: bool, anti: bool, letter: char| {
            if enabled {
                s.push(if anti { letter.to_ascii_uppercase() } else { letter });
            }
        };
        push(self.input, self.input_anti, 'i');
        push(self.output, self.output_anti, 'o');
        push(self.mutual, self.mutual_anti, 'm');
        if self.structural {
            s.push('s');
        }
        s
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairKind {
    Neuron,
    Module,
}

/// One correspondence entry resolved against the current graph
///
/// A missing reference means "create", a missing owner means "delete".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPair {
    pub owner: Option<ElementId>,
    pub reference: Option<ElementId>,
    pub kind: PairKind,
}

impl ResolvedPair {
    fn matched(owner: ElementId, reference: ElementId, kind: PairKind) -> Self {
        Self {
            owner: Some(owner),
            reference: Some(reference),
            kind,
        }
    }
}

/// Neurons and modules enclosed by one side
struct Side {
    neurons: Vec<ElementId>,
    neuron_set: AHashSet<ElementId>,
    /// Enclosed modules, the root excluded
    modules: Vec<ElementId>,
    /// Enclosed modules plus the root when it is a module
    module_set: AHashSet<ElementId>,
}

impl Side {
    fn collect(network: &ModularNetwork, root: ElementId) -> Self {
        let neurons = network.all_enclosed_neurons(root);
        let modules = network.all_enclosed_modules(root);
        let mut module_set: AHashSet<ElementId> = modules.iter().copied().collect();
        if network.module(root).is_some() {
            module_set.insert(root);
        }
        Self {
            neuron_set: neurons.iter().copied().collect(),
            neurons,
            modules,
            module_set,
        }
    }

    fn resolve(owner: &Side, reference: &Side, a: ElementId, b: ElementId) -> Option<PairKind> {
        if owner.module_set.contains(&a) && reference.module_set.contains(&b) {
            Some(PairKind::Module)
        } else if owner.neuron_set.contains(&a) && reference.neuron_set.contains(&b) {
            Some(PairKind::Neuron)
        } else {
            None
        }
    }
}

/// Owner and reference origins of one pass
struct Frame {
    owner_origin: Vector3,
    reference_origin: Vector3,
    reference_size: Size2,
    layout: FlipMode,
}

impl Frame {
    /// Reference-side position of an owner element at `position`
    ///
    /// `element_size` is set for modules, whose position is their corner.
    fn mirror(&self, position: Vector3, element_size: Option<Size2>) -> Vector3 {
        let mut offset = position - self.owner_origin;
        let mut origin = self.reference_origin;
        if self.layout.horizontal {
            origin.x += self.reference_size.width;
            if let Some(size) = element_size {
                origin.x -= size.width;
            }
            offset.x = -offset.x;
        }
        if self.layout.vertical {
            origin.y += self.reference_size.height;
            if let Some(size) = element_size {
                origin.y -= size.height;
            }
            offset.y = -offset.y;
        }
        origin + offset
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymmetryConstraint {
    /// Owner group
    pub target: Option<ElementId>,
    pub references: Correspondence,
    pub layout: FlipMode,
    pub mode: ConnectionMode,
    #[serde(skip)]
    pairs: Vec<ResolvedPair>,
}

impl SymmetryConstraint {
    pub fn new(owner: ElementId) -> Self {
        Self {
            target: Some(owner),
            ..Self::default()
        }
    }

    pub fn with_layout(mut self, layout: FlipMode) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_mode(mut self, mode: ConnectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Pairs of the last validation, in processing order
    pub fn resolved_pairs(&self) -> &[ResolvedPair] {
        &self.pairs
    }

    pub fn matching_reference_neuron(&self, owner_neuron: ElementId) -> Option<ElementId> {
        self.pairs
            .iter()
            .find(|p| p.kind == PairKind::Neuron && p.owner == Some(owner_neuron))
            .and_then(|p| p.reference)
    }

    pub fn matching_owner_neuron(&self, reference_neuron: ElementId) -> Option<ElementId> {
        self.pairs
            .iter()
            .find(|p| p.kind == PairKind::Neuron && p.reference == Some(reference_neuron))
            .and_then(|p| p.owner)
    }

    /// Counterpart of a neuron on either side
    pub fn matching_neuron(&self, neuron: ElementId) -> Option<ElementId> {
        self.matching_reference_neuron(neuron)
            .or_else(|| self.matching_owner_neuron(neuron))
    }

    /// Counterpart of a module on either side
    pub fn matching_module(&self, module: ElementId) -> Option<ElementId> {
        self.pairs
            .iter()
            .filter(|p| p.kind == PairKind::Module)
            .find_map(|p| match (p.owner, p.reference) {
                (Some(o), r) if o == module => r,
                (o, Some(r)) if r == module => o,
                _ => None,
            })
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

    fn reference_module(&self, network: &ModularNetwork, owner_module: ElementId) -> Option<ElementId> {
        self.pairs
            .iter()
            .find(|p| p.kind == PairKind::Module && p.owner == Some(owner_module))
            .and_then(|p| p.reference)
            .filter(|r| network.group(*r).is_some())
    }

    /// Reference-side group a mirror of `owner_neuron` belongs in
    fn reference_group_for(
        &self,
        network: &ModularNetwork,
        owner_neuron: ElementId,
        owner: ElementId,
        reference: ElementId,
    ) -> ElementId {
        match network.neuron_owner_group(owner_neuron, owner) {
            Some(group) if group != owner => self.reference_module(network, group).unwrap_or(reference),
            _ => reference,
        }
    }

    // ======================================================================
    // Modules
    // ======================================================================

    fn enforce_modules(
        &mut self,
        ctx: &mut ResolveContext<'_>,
        owner: ElementId,
        reference: ElementId,
    ) -> ConstraintResult<bool> {
        let mut changed = false;

        for pair in self
            .pairs
            .iter_mut()
            .filter(|p| p.kind == PairKind::Module && p.owner.is_none())
        {
            if let Some(orphan) = pair.reference.take() {
                if ctx.network.group(orphan).is_some() {
                    ctx.trashcan.extend(ctx.network.safely_remove(orphan)?);
                    trace!(target: "modnet-engine", "Removed orphaned mirror module {}", orphan);
                    changed = true;
                }
            }
        }

        for i in 0..self.pairs.len() {
            let pair = self.pairs[i];
            if pair.kind != PairKind::Module {
                continue;
            }
            let Some(o) = pair.owner else {
                continue;
            };
            if pair.reference.map_or(false, |r| ctx.network.group(r).is_some()) {
                continue;
            }
            let Some(owner_module) = ctx.network.module(o) else {
                continue;
            };
            let (name, position, size) = (
                owner_module.name.clone(),
                owner_module.position,
                owner_module.size().unwrap_or_default(),
            );
            let created = ctx.network.create_module(&name, position, size);
            trace!(target: "modnet-engine", "Created mirror module {} for {}", created, o);
            self.pairs[i].reference = Some(created);
            changed = true;
        }

        for pair in self.pairs.iter().filter(|p| p.kind == PairKind::Module) {
            let (Some(o), Some(r)) = (pair.owner, pair.reference) else {
                continue;
            };
            if o != owner {
                let desired = match ctx.network.parent_module(o) {
                    Some(p) if p == owner => Some(reference),
                    Some(p) => match self.reference_module(ctx.network, p) {
                        Some(mirror) => Some(mirror),
                        None => continue,
                    },
                    None => None,
                };
                if ctx.network.parent_module(r) != desired {
                    ctx.network.set_parent_module(r, desired)?;
                    changed = true;
                }
            }

            if let Some(properties) = ctx.network.group(o).map(|g| g.properties.clone()) {
                if let Some(g) = ctx.network.group_mut(r) {
                    changed |= g.properties.copy_user_properties_from(&properties);
                }
            }
            if let Some(size) = ctx.network.module_size(o) {
                if ctx.network.module(r).is_some() {
                    changed |= ctx.network.set_module_size(r, size, ctx.tolerance)?;
                }
            }
        }
        Ok(changed)
    }

    fn frame(&self, ctx: &mut ResolveContext<'_>, owner: ElementId, reference: ElementId) -> Frame {
        let network = &*ctx.network;
        let origins = match (network.module(owner), network.module(reference)) {
            (Some(o), Some(r)) => Some((o.position, r.position)),
            _ => self.pairs.iter().find_map(|p| {
                let (o, r) = (p.owner?, p.reference?);
                Some((network.element_position(o)?, network.element_position(r)?))
            }),
        };
        let reference_size = network.module_size(reference).unwrap_or_default();
        let (owner_origin, reference_origin) = match origins {
            Some(origins) => origins,
            None => {
                ctx.warn(format!(
                    "Could not determine the origins of groups [{}] and [{}], using zero",
                    owner, reference
                ));
                (Vector3::ZERO, Vector3::ZERO)
            }
        };
        Frame {
            owner_origin,
            reference_origin,
            reference_size,
            layout: self.layout,
        }
    }

    fn position_modules(&self, network: &mut ModularNetwork, frame: &Frame, owner: ElementId, tolerance: f64) -> bool {
        let mut changed = false;
        for pair in self.pairs.iter().filter(|p| p.kind == PairKind::Module) {
            let (Some(o), Some(r)) = (pair.owner, pair.reference) else {
                continue;
            };
            if o == owner {
                continue;
            }
            let Some(owner_module) = network.module(o) else {
                continue;
            };
            let position = frame.mirror(owner_module.position, owner_module.size());
            changed |= network.set_element_position(r, position, tolerance);
        }
        changed
    }

    // ======================================================================
    // Neurons
    // ======================================================================

    fn enforce_neurons(
        &mut self,
        ctx: &mut ResolveContext<'_>,
        owner: ElementId,
        reference: ElementId,
        frame: &Frame,
    ) -> ConstraintResult<bool> {
        let mut changed = false;
        for i in 0..self.pairs.len() {
            let pair = self.pairs[i];
            if pair.kind != PairKind::Neuron {
                continue;
            }
            match (pair.owner, pair.reference) {
                (None, Some(orphan)) => {
                    self.pairs[i].reference = None;
                    let Some(neuron) = ctx.network.neuron(orphan) else {
                        continue;
                    };
                    if neuron.is_interface() {
                        if let Some(group) = ctx.network.neuron_owner_group(orphan, reference) {
                            ctx.network.remove_neuron_from_group(group, orphan);
                            changed = true;
                        }
                    } else {
                        ctx.trashcan.extend(ctx.network.safely_remove(orphan)?);
                        trace!(target: "modnet-engine", "Removed orphaned mirror neuron {}", orphan);
                        changed = true;
                    }
                }
                (Some(o), existing) => {
                    let Some(owner_neuron) = ctx.network.neuron(o).cloned() else {
                        continue;
                    };
                    let group = self.reference_group_for(ctx.network, o, owner, reference);
                    let mirror = match existing.filter(|r| ctx.network.neuron(*r).is_some()) {
                        Some(r) => r,
                        None => {
                            let id = ctx.network.generate_next_id();
                            ctx.network.add_neuron(owner_neuron.mirror_copy(id))?;
                            trace!(target: "modnet-engine", "Created mirror neuron {} for {}", id, o);
                            self.pairs[i].reference = Some(id);
                            changed = true;
                            id
                        }
                    };
                    changed |= self.sync_neuron(ctx, &owner_neuron, mirror, group, reference, frame)?;
                }
                (None, None) => {}
            }
        }
        Ok(changed)
    }

    fn sync_neuron(
        &self,
        ctx: &mut ResolveContext<'_>,
        source: &Neuron,
        mirror: ElementId,
        group: ElementId,
        reference: ElementId,
        frame: &Frame,
    ) -> ConstraintResult<bool> {
        let mut changed = false;
        if let Some(neuron) = ctx.network.neuron_mut(mirror) {
            if !self.mode.structural && !neuron.properties.has(tags::INPUT) {
                if neuron.bias != source.bias {
                    neuron.bias = source.bias;
                    changed = true;
                }
                if neuron.transfer_function != source.transfer_function {
                    neuron.transfer_function = source.transfer_function;
                    changed = true;
                }
                if neuron.activation_function != source.activation_function {
                    neuron.activation_function = source.activation_function;
                    changed = true;
                }
            }
            changed |= neuron.properties.copy_user_properties_from(&source.properties);
        }

        let current = ctx.network.neuron_owner_group(mirror, reference);
        if current != Some(group) {
            if let Some(current) = current {
                ctx.network.remove_neuron_from_group(current, mirror);
            }
            ctx.network.add_neuron_to_group(group, mirror)?;
            changed = true;
        }

        let position = frame.mirror(source.position, None);
        changed |= ctx.network.set_element_position(mirror, position, ctx.tolerance);
        Ok(changed)
    }

    // ======================================================================
    // Synapses
    // ======================================================================

    fn enforce_synapses(
        &mut self,
        ctx: &mut ResolveContext<'_>,
        owner: ElementId,
        reference: ElementId,
        frame: &Frame,
    ) -> ConstraintResult<bool> {
        let mode = self.mode;
        let owner_list = ctx.network.all_enclosed_neurons(owner);
        let owner_neurons: AHashSet<ElementId> = owner_list.iter().copied().collect();
        let reference_list = ctx.network.all_enclosed_neurons(reference);
        let reference_neurons: AHashSet<ElementId> = reference_list.iter().copied().collect();

        let mut to_reference = AHashMap::new();
        let mut to_owner = AHashMap::new();
        for pair in self.pairs.iter().filter(|p| p.kind == PairKind::Neuron) {
            if let (Some(o), Some(r)) = (pair.owner, pair.reference) {
                to_reference.insert(o, r);
                to_owner.insert(r, o);
            }
        }

        let owner_synapses = touching_synapses(ctx.network, &owner_list);
        let owner_synapse_set: AHashSet<ElementId> = owner_synapses.iter().copied().collect();
        let mut mirrors: AHashMap<ElementId, ElementId> = AHashMap::new();
        let mut internal: AHashSet<ElementId> = AHashSet::new();
        let mut handled: AHashSet<ElementId> = owner_synapse_set.clone();
        let mut changed = false;

        for sid in owner_synapses {
            let Some(synapse) = ctx.network.synapse(sid).cloned() else {
                continue;
            };
            let target_neuron = final_target_neuron(ctx.network, synapse.target);
            let src_in_owner = owner_neurons.contains(&synapse.source);
            let src_in_reference = reference_neurons.contains(&synapse.source);
            let tgt_in_owner = target_neuron.map_or(false, |t| owner_neurons.contains(&t));
            let tgt_in_reference = target_neuron.map_or(false, |t| reference_neurons.contains(&t));

            if src_in_owner && tgt_in_reference {
                continue;
            }
            let crossing = src_in_reference && tgt_in_owner;
            if crossing && !mode.mutual {
                continue;
            }
            let external_source = !src_in_owner && !src_in_reference;
            let external_target = !tgt_in_owner && !tgt_in_reference;

            let source = if src_in_owner {
                to_reference.get(&synapse.source).copied()
            } else if src_in_reference {
                to_owner.get(&synapse.source).copied()
            } else if mode.input {
                Some(synapse.source)
            } else {
                None
            };
            let target = match synapse.target {
                SynapseTarget::Neuron(t) if owner_neurons.contains(&t) => {
                    to_reference.get(&t).map(|m| SynapseTarget::Neuron(*m))
                }
                SynapseTarget::Neuron(t) if reference_neurons.contains(&t) => {
                    to_owner.get(&t).map(|m| SynapseTarget::Neuron(*m))
                }
                SynapseTarget::Synapse(t) if owner_synapse_set.contains(&t) => {
                    mirrors.get(&t).map(|m| SynapseTarget::Synapse(*m))
                }
                other if mode.output => Some(other),
                _ => None,
            };
            let (Some(source), Some(target)) = (source, target) else {
                continue;
            };
            if source == synapse.source && target == synapse.target {
                continue;
            }

            let anti = if crossing {
                mode.mutual_anti
            } else if external_source {
                mode.input_anti
            } else if external_target {
                mode.output_anti
            } else {
                false
            };
            let is_internal = src_in_owner
                && match synapse.target {
                    SynapseTarget::Neuron(t) => owner_neurons.contains(&t),
                    SynapseTarget::Synapse(t) => internal.contains(&t),
                };

            let (mirror, created) = match ctx.network.find_synapse(source, target) {
                Some(existing) => (existing, false),
                None => {
                    let id = ctx.network.generate_next_id();
                    let mut copy = synapse.rewired_copy(id, source, target);
                    copy.properties.tag(tags::NEW_ELEMENT);
                    ctx.network.add_synapse(copy)?;
                    trace!(target: "modnet-engine", "Created mirror synapse {} for {}", id, sid);
                    (id, true)
                }
            };

            let strength = if anti { -synapse.strength } else { synapse.strength };
            if let Some(m) = ctx.network.synapse_mut(mirror) {
                if !mode.structural {
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
                changed |= m.properties.copy_user_properties_from(&synapse.properties);
            }

            if is_internal {
                let position = frame.mirror(synapse.position, None);
                changed |= ctx.network.set_element_position(mirror, position, ctx.tolerance);
                internal.insert(sid);
            } else if created {
                if let Some(center) = ctx.network.synapse_center(mirror) {
                    ctx.network.set_element_position(mirror, center, 0.0);
                }
            }
            if let Some(m) = ctx.network.synapse_mut(mirror) {
                m.properties.remove(tags::NEW_ELEMENT);
            }

            changed |= created;
            mirrors.insert(sid, mirror);
            handled.insert(mirror);
        }

        for sid in touching_synapses(ctx.network, &reference_list) {
            if handled.contains(&sid) {
                continue;
            }
            let licensed = {
                let Some(synapse) = ctx.network.synapse(sid) else {
                    continue;
                };
                if owner_neurons.contains(&synapse.source) {
                    continue;
                }
                let target_neuron = final_target_neuron(ctx.network, synapse.target);
                let src_in_reference = reference_neurons.contains(&synapse.source);
                let tgt_in_owner = target_neuron.map_or(false, |t| owner_neurons.contains(&t));
                let tgt_in_reference = target_neuron.map_or(false, |t| reference_neurons.contains(&t));
                let crossing = src_in_reference && tgt_in_owner;
                let external_source = !src_in_reference;
                let external_target = !tgt_in_owner && !tgt_in_reference;
                (crossing && !mode.mutual)
                    || (external_source && !mode.input)
                    || (external_target && !mode.output)
            };
            if licensed {
                continue;
            }
            ctx.trashcan.extend(ctx.network.safely_remove(sid)?);
            trace!(target: "modnet-engine", "Removed unmatched mirror synapse {}", sid);
            changed = true;
        }
        Ok(changed)
    }

    fn write_back(&mut self, owner: ElementId, reference: ElementId) {
        self.references = self
            .pairs
            .iter()
            .filter_map(|p| match (p.owner, p.reference) {
                (Some(o), Some(r)) if !(o == owner && r == reference) => Some(ElementPair::new(o, r)),
                _ => None,
            })
            .collect();
    }
}

impl ConstraintRule for SymmetryConstraint {
    fn name(&self) -> &'static str {
        "Symmetry"
    }

    fn check(&mut self, network: &ModularNetwork, scope: ConstraintScope) -> ConstraintResult<()> {
        self.pairs.clear();
        let owner = self.owner_group(network, scope)?;
        let reference = scope.group;
        if network.group(reference).is_none() {
            return Err(ConstraintError::MissingTarget(reference));
        }

        let mut raw: Vec<(ElementId, ElementId)> = vec![(owner, reference)];
        raw.extend(self.references.pairs().iter().map(|p| (p.owner, p.reference)));
        for (group, constraint) in network.all_constraints() {
            if constraint.id() == scope.constraint {
                continue;
            }
            if let ConstraintKind::Symmetry(other) = constraint.kind() {
                if let Some(other_owner) = other.target {
                    raw.push((other_owner, group));
                }
                raw.extend(other.references.pairs().iter().map(|p| (p.owner, p.reference)));
            }
        }

        let owner_side = Side::collect(network, owner);
        let reference_side = Side::collect(network, reference);

        let mut used = AHashSet::new();
        let mut neuron_pairs = Vec::new();
        let mut module_pairs = Vec::new();
        for (a, b) in raw {
            if used.contains(&a) || used.contains(&b) {
                continue;
            }
            let resolved = Side::resolve(&owner_side, &reference_side, a, b)
                .map(|kind| (a, b, kind))
                .or_else(|| Side::resolve(&owner_side, &reference_side, b, a).map(|kind| (b, a, kind)));
            let Some((o, r, kind)) = resolved else {
                continue;
            };
            used.insert(o);
            used.insert(r);
            let pair = ResolvedPair::matched(o, r, kind);
            match kind {
                PairKind::Neuron => neuron_pairs.push(pair),
                PairKind::Module => module_pairs.push(pair),
            }
        }

        let unmatched = |ids: &[ElementId], on_owner_side: bool, kind: PairKind| -> Vec<ResolvedPair> {
            ids.iter()
                .filter(|id| !used.contains(*id))
                .map(|id| ResolvedPair {
                    owner: on_owner_side.then_some(*id),
                    reference: (!on_owner_side).then_some(*id),
                    kind,
                })
                .collect()
        };
        let pairs: Vec<ResolvedPair> = neuron_pairs
            .into_iter()
            .chain(unmatched(&owner_side.neurons, true, PairKind::Neuron))
            .chain(unmatched(&reference_side.neurons, false, PairKind::Neuron))
            .chain(module_pairs)
            .chain(unmatched(&owner_side.modules, true, PairKind::Module))
            .chain(unmatched(&reference_side.modules, false, PairKind::Module))
            .collect();
        self.pairs = pairs;
        Ok(())
    }

    fn enforce(&mut self, ctx: &mut ResolveContext<'_>, scope: ConstraintScope) -> ConstraintResult<Resolution> {
        let owner = self.owner_group(ctx.network, scope)?;
        let reference = scope.group;
        let tolerance = ctx.tolerance;

        let mut changed = self.enforce_modules(ctx, owner, reference)?;
        let frame = self.frame(ctx, owner, reference);
        changed |= self.position_modules(ctx.network, &frame, owner, tolerance);
        changed |= self.enforce_neurons(ctx, owner, reference, &frame)?;
        changed |= self.enforce_synapses(ctx, owner, reference, &frame)?;

        self.write_back(owner, reference);
        mark_slaves(ctx.network, Some(owner), reference, !self.mode.structural);
        debug!(
            target: "modnet-engine",
            "Symmetry [{}] -> [{}]: {} pairs, changed={}",
            owner,
            reference,
            self.references.len(),
            changed
        );
        Ok(Resolution::from_changed(changed))
    }

    fn on_attach(&mut self, network: &mut ModularNetwork, scope: ConstraintScope) -> ConstraintResult<()> {
        mark_slaves(network, self.target, scope.group, !self.mode.structural);
        Ok(())
    }

    fn on_detach(&mut self, network: &mut ModularNetwork, scope: ConstraintScope) {
        mark_slaves(network, self.target, scope.group, false);
    }

    fn reset(&mut self) {
        self.pairs.clear();
    }

    fn remap_ids(&mut self, map: &IdMap) {
        self.target = self.target.map(|t| remap_id(map, t));
        self.references.remap(map);
        for pair in self.pairs.iter_mut() {
            pair.owner = pair.owner.map(|id| remap_id(map, id));
            pair.reference = pair.reference.map(|id| remap_id(map, id));
        }
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        PARAMETERS
    }

    fn parameter(&self, name: &str) -> Option<String> {
        match name {
            "TargetId" => Some(format_optional_id(self.target)),
            "References" => Some(self.references.encode()),
            "Layout" => Some(self.layout.letters()),
            "Mode" => Some(self.mode.letters()),
            _ => None,
        }
    }

    fn set_parameter(&mut self, name: &str, value: &str) -> ConstraintResult<()> {
        match name {
            "TargetId" => self.target = parse_optional_id(name, value)?,
            "References" => self.references = Correspondence::parse(value),
            "Layout" => {
                self.layout = FlipMode::parse(value)
                    .map_err(|c| ConstraintError::invalid(name, format!("unknown flip letter '{}'", c)))?
            }
            "Mode" => {
                self.mode = ConnectionMode::parse(value)
                    .map_err(|c| ConstraintError::invalid(name, format!("unknown mode letter '{}'", c)))?
            }
            other => return Err(ConstraintError::UnknownParameter(other.to_string())),
        }
        Ok(())
    }
}

/// Every synapse attached to `neurons`: incoming chains, outgoing synapses and
/// the higher-order synapses on those, ordered so targets precede the
/// synapses targeting them
fn touching_synapses(network: &ModularNetwork, neurons: &[ElementId]) -> Vec<ElementId> {
    let mut seen = AHashSet::new();
    let mut result = Vec::new();
    for n in neurons {
        let mut found = network.incoming_synapses_recursive(SynapseTarget::Neuron(*n));
        if let Some(neuron) = network.neuron(*n) {
            for s in neuron.outgoing() {
                found.push(*s);
                found.extend(network.incoming_synapses_recursive(SynapseTarget::Synapse(*s)));
            }
        }
        for s in found {
            if seen.insert(s) {
                result.push(s);
            }
        }
    }
    result.sort_by_key(|s| synapse_depth(network, *s));
    result
}

/// Number of synapse hops before a synapse chain reaches a neuron
fn synapse_depth(network: &ModularNetwork, synapse: ElementId) -> usize {
    let mut depth = 0;
    let mut current = synapse;
    let mut seen = AHashSet::new();
    while let Some(SynapseTarget::Synapse(next)) = network.synapse(current).map(|s| s.target) {
        if !seen.insert(current) {
            break;
        }
        depth += 1;
        current = next;
    }
    depth
}

/// Neuron at the end of a synapse chain
fn final_target_neuron(network: &ModularNetwork, target: SynapseTarget) -> Option<ElementId> {
    let mut current = target;
    let mut seen = AHashSet::new();
    loop {
        match current {
            SynapseTarget::Neuron(n) => return Some(n),
            SynapseTarget::Synapse(s) => {
                if !seen.insert(s) {
                    return None;
                }
                current = network.synapse(s)?.target;
            }
        }
    }
}

fn set_slave(properties: &mut Properties, slave: bool) {
    if slave {
        properties.tag(tags::SLAVE);
    } else {
        properties.remove(tags::SLAVE);
    }
}

/// Tag or untag the reference side of a symmetry
///
/// Covers the reference group, its enclosed neurons and modules, and its
/// internal synapses whose source is not an owner neuron.
pub(crate) fn mark_slaves(network: &mut ModularNetwork, owner: Option<ElementId>, reference: ElementId, slave: bool) {
    let owner_neurons: AHashSet<ElementId> = owner
        .map(|o| network.all_enclosed_neurons(o))
        .unwrap_or_default()
        .into_iter()
        .collect();
    let neurons = network.all_enclosed_neurons(reference);
    let synapses: Vec<ElementId> = network
        .all_enclosed_synapses(reference)
        .into_iter()
        .filter(|s| {
            network
                .synapse(*s)
                .map_or(false, |syn| !owner_neurons.contains(&syn.source))
        })
        .collect();
    let modules = network.all_enclosed_modules(reference);

    for id in iter::once(reference)
        .chain(neurons)
        .chain(synapses)
        .chain(modules)
    {
        if let Some(properties) = network.element_properties_mut(id) {
            set_slave(properties, slave);
        }
    }
}
