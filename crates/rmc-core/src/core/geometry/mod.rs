//! Geometry kernels operating on the shared coordinate store.
//!
//! All kernels are pure functions over a slice of Cartesian positions in the current
//! (collection-aware) layout, a [`SimulationBox`](cell::SimulationBox) and index arrays.
//! Full-system and moved-subset variants share the same per-pair arithmetic so that
//! their results agree exactly on identical inputs.
//!
//! - [`cell`] - Simulation box and minimum-image displacements
//! - [`coordination`] - Shell neighbour counting with explicit double-count normalization
//! - [`improper`] - Improper angles and their reduction against angular bounds

pub mod cell;
pub mod coordination;
pub mod improper;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Box vector {0} has zero length")]
    ZeroLengthVector(usize),

    #[error("Box basis is singular and cannot be inverted")]
    SingularBasis,

    #[error("Box basis contains non-finite components")]
    NonFiniteBasis,

    #[error("Degenerate geometry for improper angle definition {definition}: {reason}")]
    DegenerateAngle {
        definition: usize,
        reason: &'static str,
    },

    #[error("Position index {index} is outside the coordinate store of {len} atoms")]
    PositionOutOfRange { index: usize, len: usize },
}
