// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Structural constraints attached to neuron groups.

A [`GroupConstraint`] is the stable envelope (id, owning group, last messages)
around one [`ConstraintKind`] variant. Every variant implements
[`ConstraintRule`]; the envelope folds rule results into the boolean
"satisfied without changes" contract the resolver works with.

Lifecycle: unattached -> attached (`attach`, may fail) -> detached (`detach`,
reverses any marking done on attach).
*/

pub mod connection_symmetry;
pub mod correspondence;
pub mod neuron_count;
pub mod randomization;
pub mod selection;
pub mod symmetry;
pub mod sync_tags;
pub mod weight_range;

pub use connection_symmetry::{ClassMode, ConnectionModes, ConnectionSymmetryConstraint};
pub use correspondence::{Correspondence, ElementPair, CORRESPONDENCE_FORMAT_VERSION};
pub use neuron_count::NeuronCountConstraint;
pub use randomization::{RandomizationConstraint, ValueRange};
pub use selection::{SelectionMode, SelectedElements};
pub use symmetry::{ConnectionMode, FlipMode, PairKind, ResolvedPair, SymmetryConstraint};
pub use sync_tags::SynchronizeTagsConstraint;
pub use weight_range::WeightRangeConstraint;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::network::{ModularNetwork, Trashcan};
use crate::types::{remap_id, ElementId, IdMap, NetworkError};

/// Result type for constraint rules
pub type ConstraintResult<T> = Result<T, ConstraintError>;

/// Errors raised while validating or enforcing a constraint
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConstraintError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("Could not find target group with id [{0}]")]
    MissingTarget(ElementId),

    #[error("Constraint is not attached to a group")]
    Unattached,

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("{0}")]
    Unsatisfied(String),

    #[error("Constraint {constraint} is already attached to group {group}")]
    AlreadyAttached { constraint: ElementId, group: ElementId },
}

impl ConstraintError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        ConstraintError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Outcome of one enforcement step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The graph already satisfied the rule
    Unchanged,
    /// The graph was modified
    Changed,
}

impl Resolution {
    pub fn from_changed(changed: bool) -> Self {
        if changed {
            Resolution::Changed
        } else {
            Resolution::Unchanged
        }
    }
}

/// Ids a rule needs to know about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintScope {
    pub constraint: ElementId,
    pub group: ElementId,
}

/// Mutable state handed to a rule during enforcement
pub struct ResolveContext<'a> {
    pub network: &'a mut ModularNetwork,
    pub trashcan: &'a mut Trashcan,
    pub rng: &'a mut StdRng,
    /// Epsilon for position and size comparisons
    pub tolerance: f64,
    warnings: Vec<String>,
}

impl<'a> ResolveContext<'a> {
    pub fn new(
        network: &'a mut ModularNetwork,
        trashcan: &'a mut Trashcan,
        rng: &'a mut StdRng,
        tolerance: f64,
    ) -> Self {
        Self {
            network,
            trashcan,
            rng,
            tolerance,
            warnings: Vec::new(),
        }
    }

    /// Record a non-fatal problem for the constraint being applied
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub(crate) fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}

/// Behaviour shared by all constraint variants
pub trait ConstraintRule {
    /// Registry name of the variant
    fn name(&self) -> &'static str;

    /// Read-only validation; may rebuild internal caches
    fn check(&mut self, network: &ModularNetwork, scope: ConstraintScope) -> ConstraintResult<()>;

    /// Modify the graph until the rule holds
    ///
    /// Always called right after a successful [`ConstraintRule::check`].
    fn enforce(&mut self, ctx: &mut ResolveContext<'_>, scope: ConstraintScope) -> ConstraintResult<Resolution>;

    fn on_attach(&mut self, _network: &mut ModularNetwork, _scope: ConstraintScope) -> ConstraintResult<()> {
        Ok(())
    }

    fn on_detach(&mut self, _network: &mut ModularNetwork, _scope: ConstraintScope) {}

    /// Drop per-run caches
    fn reset(&mut self) {}

    /// Rewrite stored element ids
    fn remap_ids(&mut self, _map: &IdMap) {}

    fn parameter_names(&self) -> &'static [&'static str];

    fn parameter(&self, name: &str) -> Option<String>;

    fn set_parameter(&mut self, name: &str, value: &str) -> ConstraintResult<()>;
}

/// Closed set of constraint variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConstraintKind {
    Symmetry(SymmetryConstraint),
    ConnectionSymmetry(ConnectionSymmetryConstraint),
    NeuronCount(NeuronCountConstraint),
    WeightRange(WeightRangeConstraint),
    SynchronizeTags(SynchronizeTagsConstraint),
    Randomization(RandomizationConstraint),
}

impl ConstraintKind {
    pub fn rule(&self) -> &dyn ConstraintRule {
        match self {
            ConstraintKind::Symmetry(c) => c,
            ConstraintKind::ConnectionSymmetry(c) => c,
            ConstraintKind::NeuronCount(c) => c,
            ConstraintKind::WeightRange(c) => c,
            ConstraintKind::SynchronizeTags(c) => c,
            ConstraintKind::Randomization(c) => c,
        }
    }

    pub fn rule_mut(&mut self) -> &mut dyn ConstraintRule {
        match self {
            ConstraintKind::Symmetry(c) => c,
            ConstraintKind::ConnectionSymmetry(c) => c,
            ConstraintKind::NeuronCount(c) => c,
            ConstraintKind::WeightRange(c) => c,
            ConstraintKind::SynchronizeTags(c) => c,
            ConstraintKind::Randomization(c) => c,
        }
    }

    pub fn name(&self) -> &'static str {
        self.rule().name()
    }

    /// One default-configured instance of every variant
    pub fn defaults() -> Vec<ConstraintKind> {
        vec![
            ConstraintKind::Symmetry(SymmetryConstraint::default()),
            ConstraintKind::ConnectionSymmetry(ConnectionSymmetryConstraint::default()),
            ConstraintKind::NeuronCount(NeuronCountConstraint::default()),
            ConstraintKind::WeightRange(WeightRangeConstraint::default()),
            ConstraintKind::SynchronizeTags(SynchronizeTagsConstraint::default()),
            ConstraintKind::Randomization(RandomizationConstraint::default()),
        ]
    }
}

/// A constraint as owned by a neuron group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConstraint {
    id: ElementId,
    name: String,
    group: Option<ElementId>,
    #[serde(skip)]
    error_message: String,
    #[serde(skip)]
    warning_message: String,
    kind: ConstraintKind,
}

impl GroupConstraint {
    pub fn new(id: ElementId, kind: ConstraintKind) -> Self {
        Self {
            id,
            name: kind.name().to_string(),
            group: None,
            error_message: String::new(),
            warning_message: String::new(),
            kind,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Group the constraint is attached to
    pub fn group(&self) -> Option<ElementId> {
        self.group
    }

    /// Error of the last `is_valid` / `apply`; empty on success
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn warning_message(&self) -> &str {
        &self.warning_message
    }

    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut ConstraintKind {
        &mut self.kind
    }

    pub(crate) fn set_id(&mut self, id: ElementId) {
        self.id = id;
    }

    pub(crate) fn set_group(&mut self, group: Option<ElementId>) {
        self.group = group;
    }

    fn scope(&self) -> ConstraintResult<ConstraintScope> {
        let group = self.group.ok_or(ConstraintError::Unattached)?;
        Ok(ConstraintScope {
            constraint: self.id,
            group,
        })
    }

    // ======================================================================
    // Validation and enforcement
    // ======================================================================

    /// Check the constraint against `network` without modifying it
    ///
    /// On failure the reason is available from [`GroupConstraint::error_message`].
    pub fn is_valid(&mut self, network: &ModularNetwork) -> bool {
        self.error_message.clear();
        let result = self
            .scope()
            .and_then(|scope| self.kind.rule_mut().check(network, scope));
        match result {
            Ok(()) => true,
            Err(e) => {
                self.error_message = e.to_string();
                false
            }
        }
    }

    /// Validate, then modify the graph until the rule holds
    ///
    /// Returns `true` only when nothing had to change. A `false` result with
    /// an empty error message means the graph was modified.
    pub fn apply(&mut self, ctx: &mut ResolveContext<'_>) -> bool {
        self.error_message.clear();
        self.warning_message.clear();

        let result = match self.scope() {
            Ok(scope) => self
                .kind
                .rule_mut()
                .check(ctx.network, scope)
                .and_then(|()| self.kind.rule_mut().enforce(ctx, scope)),
            Err(e) => Err(e),
        };

        let warnings = ctx.take_warnings();
        if !warnings.is_empty() {
            self.warning_message = warnings.join("\n");
        }

        match result {
            Ok(Resolution::Unchanged) => true,
            Ok(Resolution::Changed) => {
                trace!(target: "modnet-engine", "Constraint {} ({}) changed the network", self.name, self.id);
                false
            }
            Err(e) => {
                self.error_message = e.to_string();
                false
            }
        }
    }

    // ======================================================================
    // Lifecycle
    // ======================================================================

    /// Bind the constraint to `group`
    ///
    /// # Errors
    ///
    /// Fails when already attached to another group or when the variant
    /// rejects the attachment.
    pub fn attach(&mut self, network: &mut ModularNetwork, group: ElementId) -> ConstraintResult<()> {
        if let Some(current) = self.group {
            if current != group {
                return Err(ConstraintError::AlreadyAttached {
                    constraint: self.id,
                    group: current,
                });
            }
        }
        self.group = Some(group);
        let scope = ConstraintScope {
            constraint: self.id,
            group,
        };
        if let Err(e) = self.kind.rule_mut().on_attach(network, scope) {
            self.group = None;
            return Err(e);
        }
        Ok(())
    }

    /// Unbind the constraint, undoing any marking done by `attach`
    pub fn detach(&mut self, network: &mut ModularNetwork) {
        if let Ok(scope) = self.scope() {
            self.kind.rule_mut().on_detach(network, scope);
        }
        self.group = None;
    }

    pub fn reset(&mut self) {
        self.error_message.clear();
        self.warning_message.clear();
        self.kind.rule_mut().reset();
    }

    /// Rewrite the owning group id and all ids stored in the parameters
    pub fn group_ids_changed(&mut self, map: &IdMap) {
        self.group = self.group.map(|g| remap_id(map, g));
        self.kind.rule_mut().remap_ids(map);
    }

    // ======================================================================
    // Parameters
    // ======================================================================

    pub fn parameter_names(&self) -> &'static [&'static str] {
        self.kind.rule().parameter_names()
    }

    pub fn parameter(&self, name: &str) -> Option<String> {
        self.kind.rule().parameter(name)
    }

    /// Set a parameter from its string form
    ///
    /// # Errors
    ///
    /// Unknown names and unparseable values are rejected; the previous value
    /// is kept.
    pub fn set_parameter(&mut self, name: &str, value: &str) -> ConstraintResult<()> {
        self.kind.rule_mut().set_parameter(name, value)
    }

    /// Value equality of id, variant and parameters; caches and messages are ignored
    pub fn equals(&self, other: &GroupConstraint) -> bool {
        self.id == other.id
            && self.kind.name() == other.kind.name()
            && self
                .parameter_names()
                .iter()
                .all(|p| self.parameter(p) == other.parameter(p))
    }
}

/// Parse a boolean parameter the way editors write them
pub(crate) fn parse_bool(name: &str, value: &str) -> ConstraintResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(ConstraintError::invalid(name, format!("'{}' is not a boolean", other))),
    }
}

/// Parse an optional element id; empty and `0` mean unset
pub(crate) fn parse_optional_id(name: &str, value: &str) -> ConstraintResult<Option<ElementId>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let id: ElementId = trimmed
        .parse()
        .map_err(|_| ConstraintError::invalid(name, format!("'{}' is not an element id", trimmed)))?;
    Ok(if id.value() == 0 { None } else { Some(id) })
}

pub(crate) fn format_optional_id(id: Option<ElementId>) -> String {
    id.map_or_else(|| "0".to_string(), |id| id.to_string())
}

/// Parse a group id list such as `12,15` or `12,15|20`
pub(crate) fn parse_id_list(name: &str, value: &str) -> ConstraintResult<Vec<ElementId>> {
    value
        .split(|c: char| c == ',' || c == '|' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<ElementId>()
                .map_err(|_| ConstraintError::invalid(name, format!("'{}' is not an element id", s)))
        })
        .collect()
}

pub(crate) fn format_id_list(ids: &[ElementId]) -> String {
    ids.iter().map(ElementId::to_string).collect::<Vec<_>>().join(",")
}
