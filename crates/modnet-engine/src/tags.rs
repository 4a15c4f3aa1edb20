// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Property keys with engine-defined meaning.

/// Element is driven by an attached constraint
pub const SLAVE: &str = "slave";

/// Element may not be altered in any aspect
pub const PROTECTED: &str = "protected";

/// Element may not be removed
pub const PROTECT_EXISTENCE: &str = "protect-existence";

/// Letters naming the aspects a constraint controls, see [`rdof`]
pub const REDUCED_DEGREES_OF_FREEDOM: &str = "reduced-degrees-of-freedom";

/// Marks a synapse that is created but not yet finalised
pub const NEW_ELEMENT: &str = "__new__";

/// Interface neuron receiving external input
pub const INPUT: &str = "input";

/// Interface neuron providing external output
pub const OUTPUT: &str = "output";

/// Module type, carried but not interpreted
pub const MODULE_TYPE: &str = "module-type";
pub const DEFAULT_MODULE_TYPE: &str = "Default";

/// Integer creation order used to pick the newest neurons
pub const CREATION_DATE: &str = "creation-date";

/// Persisted random sign decision of a mirrored synapse
pub const RANDOM_FLIP: &str = "random-flip";

/// Seed of the last randomization of a group
pub const RANDOMIZATION_SEED: &str = "randomization-seed";

/// Properties with this prefix live only for one resolver run
pub const CONSTRAINT_TEMP_PREFIX: &str = "constraint-temp:";

/// Properties with this prefix are copied between mirrored elements
pub const USER_PROPERTY_PREFIX: &str = "+";

/// Letters of [`REDUCED_DEGREES_OF_FREEDOM`]
pub mod rdof {
    pub const EXISTENCE: char = 'E';
    pub const WEIGHT: char = 'W';
    pub const SYNAPSE_FUNCTION: char = 'S';
    pub const BIAS: char = 'B';
    pub const ACTIVATION_FUNCTION: char = 'A';
    pub const TRANSFER_FUNCTION: char = 'T';

    pub const ALL: &str = "EWSBAT";
}

/// Tags managed by the engine itself; never copied from prototypes
pub fn is_managed_tag(key: &str) -> bool {
    matches!(key, SLAVE | REDUCED_DEGREES_OF_FREEDOM | NEW_ELEMENT | RANDOM_FLIP | RANDOMIZATION_SEED)
        || key.starts_with(CONSTRAINT_TEMP_PREFIX)
}
