// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
# Modnet Engine

Graph model of modular neural networks and the structural constraint
resolver that keeps it consistent while it is edited:
- Neurons, synapses (including higher-order synapses) and neuron groups,
  with modules forming an explicit tree
- Group constraints: symmetry, connection symmetry, neuron count,
  weight/bias range, tag synchronisation, randomization
- A fixpoint driver (`ConstraintManager`) and a locked `Session`

## Architecture

- `network` stores every element under one id space and is the only lookup
  service; constraints and correspondences hold ids, never references
- `constraints` is a closed enum of variants behind the `ConstraintRule` trait
- Removed elements are handed back in a `Trashcan` for disposal or undo

The engine is single threaded; callers serialise access through the
`Session` lock.
*/

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod constraint_manager;
pub mod constraints;
pub mod models;
pub mod network;
pub mod session;
pub mod tags;
pub mod types;

pub use constraint_manager::{
    mark_element_as_constrained, ConstraintManager, ResolverOptions, ResolverReport,
};
pub use constraints::{
    ConstraintError, ConstraintKind, ConstraintResult, ConstraintRule, Correspondence,
    GroupConstraint, Resolution, ResolveContext,
};
pub use models::{Neuron, NeuronGroup, Properties, Synapse, SynapseTarget};
pub use network::{ModularNetwork, RemovedElement, Trashcan, DEFAULT_GROUP_NAME};
pub use session::Session;
pub use types::{ElementId, ElementKind, IdMap, NetworkError, NetworkResult, Size2, Vector3};

/// Common imports for building and resolving networks
pub mod prelude {
    pub use crate::constraints::{
        ConnectionModes, ConnectionSymmetryConstraint, ConstraintKind, FlipMode,
        GroupConstraint, NeuronCountConstraint, RandomizationConstraint, SymmetryConstraint,
        SynchronizeTagsConstraint, WeightRangeConstraint,
    };
    pub use crate::constraint_manager::{ConstraintManager, ResolverOptions, ResolverReport};
    pub use crate::models::SynapseTarget;
    pub use crate::network::ModularNetwork;
    pub use crate::session::Session;
    pub use crate::types::{ElementId, Size2, Vector3};
}
