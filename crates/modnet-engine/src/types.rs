// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Core value types shared by the network graph and the constraints.
*/

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use std::str::FromStr;

/// Network-wide element identifier
///
/// Ids are handed out monotonically by the owning network and are never
/// reissued, so a stale id can never resolve to a different element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u64);

impl ElementId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ElementId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(ElementId)
    }
}

impl From<u64> for ElementId {
    fn from(value: u64) -> Self {
        ElementId(value)
    }
}

/// Old id -> new id, produced by bulk renumbering
pub type IdMap = AHashMap<ElementId, ElementId>;

/// Look up `id` in `map`, keeping it when unmapped
pub fn remap_id(map: &IdMap, id: ElementId) -> ElementId {
    map.get(&id).copied().unwrap_or(id)
}

/// 3D position
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// True when no coordinate differs by more than `tolerance`
    pub fn approx_eq(&self, other: &Vector3, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.z - other.z).abs() <= tolerance
    }

    pub fn midpoint(&self, other: &Vector3) -> Vector3 {
        (*self + *other) * 0.5
    }
}

impl Add for Vector3 {
    type Output = Vector3;
    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;
    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vector3 {
    type Output = Vector3;
    fn mul(self, rhs: f64) -> Vector3 {
        Vector3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vector3 {
    type Output = Vector3;
    fn neg(self) -> Vector3 {
        Vector3::new(-self.x, -self.y, -self.z)
    }
}

/// 2D extent of a module
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size2 {
    pub width: f64,
    pub height: f64,
}

impl Size2 {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn approx_eq(&self, other: &Size2, tolerance: f64) -> bool {
        (self.width - other.width).abs() <= tolerance
            && (self.height - other.height).abs() <= tolerance
    }
}

/// Kind of element an id resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Neuron,
    Synapse,
    Group,
    Module,
    Constraint,
}

/// Result type for graph operations
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Errors raised by the network graph
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NetworkError {
    #[error("Unknown element: {0}")]
    UnknownElement(ElementId),

    #[error("Unknown neuron: {0}")]
    UnknownNeuron(ElementId),

    #[error("Unknown synapse: {0}")]
    UnknownSynapse(ElementId),

    #[error("Unknown neuron group: {0}")]
    UnknownGroup(ElementId),

    #[error("Element {0} is not a neuro module")]
    NotAModule(ElementId),

    #[error("Element id {0} is already in use")]
    DuplicateId(ElementId),

    #[error("The default neuron group cannot be removed")]
    DefaultGroupRemoval,

    #[error("Adding module {child} to {parent} would create a cycle")]
    ModuleCycle { parent: ElementId, child: ElementId },

    #[error("Module {child} cannot be added to {parent}: {reason}")]
    InvalidSubModule {
        parent: ElementId,
        child: ElementId,
        reason: String,
    },

    #[error("Neuron {neuron} already belongs to module {module}")]
    NeuronAlreadyInModule { neuron: ElementId, module: ElementId },

    #[error("Invalid synapse: {0}")]
    InvalidSynapse(String),

    #[error("Interface neuron {0} cannot be removed")]
    ProtectedInterfaceNeuron(ElementId),

    #[error("Constraint rejected: {0}")]
    ConstraintRejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_id_parse_trims() {
        assert_eq!(" 42 ".parse::<ElementId>().unwrap(), ElementId(42));
        assert!("x1".parse::<ElementId>().is_err());
    }

    #[test]
    fn test_vector_tolerance() {
        let a = Vector3::new(1.0, 2.0, 3.0);
        assert!(a.approx_eq(&Vector3::new(1.05, 1.95, 3.0), 0.1));
        assert!(!a.approx_eq(&Vector3::new(1.2, 2.0, 3.0), 0.1));
        assert_eq!(a.midpoint(&Vector3::ZERO), Vector3::new(0.5, 1.0, 1.5));
    }

    #[test]
    fn test_remap_keeps_unmapped_ids() {
        let mut map = IdMap::new();
        map.insert(ElementId(1), ElementId(10));
        assert_eq!(remap_id(&map, ElementId(1)), ElementId(10));
        assert_eq!(remap_id(&map, ElementId(2)), ElementId(2));
    }
}
