use super::protocol::MovePhase;
use crate::core::definitions::DefinitionError;
use crate::core::geometry::GeometryError;
use crate::core::models::ids::RestraintId;
use crate::core::models::system::SystemError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Definition compilation failed: {source}")]
    Definition {
        #[from]
        source: DefinitionError,
    },

    #[error("Geometry evaluation failed: {source}")]
    Geometry {
        #[from]
        source: GeometryError,
    },

    #[error("Atomic system update failed: {source}")]
    System {
        #[from]
        source: SystemError,
    },

    #[error("Restraint is not attached to an atomic system")]
    NotAttached,

    #[error("Operation '{operation}' is not allowed in phase {phase:?}")]
    Protocol {
        operation: &'static str,
        phase: MovePhase,
    },

    #[error("Atom indexes passed to '{operation}' differ from the open trial move")]
    MoveMismatch { operation: &'static str },

    #[error("Atom index {index} is out of range for {len} atoms")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Atom {0} appears more than once in the same move")]
    DuplicateAtom(usize),

    #[error("Atom {0} is collected")]
    AtomCollected(usize),

    #[error("Atom {0} is not collected")]
    AtomNotCollected(usize),

    #[error("Operation '{operation}' requires every atom to be active, but {collected} are collected")]
    AtomsCollected {
        operation: &'static str,
        collected: usize,
    },

    #[error("Trial move has {positions} positions for {atoms} atoms")]
    TrialLength { atoms: usize, positions: usize },

    #[error("Coordinate layout holds {found} positions but {expected} atoms are active")]
    LayoutMismatch { expected: usize, found: usize },

    #[error("Committed data is out of date after an atom restoration")]
    DataOutOfDate,

    #[error("Committed data has not been computed")]
    NotComputed,

    #[error("Restraint not found: {0:?}")]
    RestraintNotFound(RestraintId),

    #[error("Snapshot cannot be restored: {0}")]
    InvalidSnapshot(String),

    #[error("Internal logic error: {0}")]
    Internal(String),
}
