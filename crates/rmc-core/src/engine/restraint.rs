use super::collector::AtomsCollector;
use super::diagnostics::Diagnostics;
use super::error::EngineError;
use super::protocol::MovePhase;
use super::transaction::with_trial_coordinates;
use crate::core::definitions::AtomMembership;
use crate::core::models::system::AtomicSystem;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RestraintKind {
    Coordination,
    ImproperAngle,
}

impl fmt::Display for RestraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestraintKind::Coordination => write!(f, "coordination"),
            RestraintKind::ImproperAngle => write!(f, "improper-angle"),
        }
    }
}

/// Lifecycle notifications a restraint reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineEvent {
    /// The restraint was attached to an atomic system.
    EngineSet,
    /// Molecule indexes or names of the atom table changed.
    UpdateMoleculesIndexes,
    /// The simulation box changed.
    UpdateBoundaryConditions,
}

/// A restraint evaluated incrementally against trial moves.
///
/// All atom indexes passed in are real indexes. The system handed to a restraint must use
/// the same collection-aware layout as the restraint's own collector.
pub trait Restraint: Send + Sync {
    fn kind(&self) -> RestraintKind;

    fn is_attached(&self) -> bool;

    /// Reacts to a lifecycle event of the surrounding engine.
    fn listen(
        &mut self,
        event: EngineEvent,
        system: &AtomicSystem,
        diagnostics: &Diagnostics,
    ) -> Result<(), EngineError>;

    /// Sets the length below which geometry is treated as degenerate.
    fn set_geometry_tolerance(&mut self, _tolerance: f64) {}

    /// Recomputes committed data from scratch and returns the standard error.
    fn compute_data(&mut self, system: &AtomicSystem) -> Result<f64, EngineError>;

    /// Measures the definitions touched by `reals` on current coordinates.
    fn compute_before_move(
        &mut self,
        system: &AtomicSystem,
        reals: &[usize],
    ) -> Result<(), EngineError>;

    /// Measures the same definitions with `trial` positions written in place, restoring
    /// the coordinate store before returning. Returns the tentative standard error.
    fn compute_after_move(
        &mut self,
        system: &mut AtomicSystem,
        reals: &[usize],
        trial: &[Point3<f64>],
    ) -> Result<f64, EngineError> {
        let relative = self.collector().relative_indexes(reals)?;
        with_trial_coordinates(system, &relative, trial, |system| {
            self.evaluate_after_move(system, reals)
        })
    }

    /// Measures the open move's definitions on a system that already holds the trial
    /// positions. Returns the tentative standard error.
    fn evaluate_after_move(
        &mut self,
        system: &AtomicSystem,
        reals: &[usize],
    ) -> Result<f64, EngineError>;

    fn accept_move(&mut self, reals: &[usize]) -> Result<(), EngineError>;

    fn reject_move(&mut self, reals: &[usize]) -> Result<(), EngineError>;

    /// Standard error the restraint would have if `real` were collected.
    fn compute_as_if_amputated(
        &mut self,
        system: &AtomicSystem,
        real: usize,
    ) -> Result<f64, EngineError>;

    /// Collects `real`, removing its contribution from committed data. The atom's position
    /// must still be present in `system`.
    fn accept_amputation(
        &mut self,
        system: &AtomicSystem,
        real: usize,
        diagnostics: &Diagnostics,
    ) -> Result<(), EngineError>;

    fn reject_amputation(&mut self, real: usize) -> Result<(), EngineError>;

    /// Returns a collected atom to the restraint. Committed data is out of date until the
    /// next [`compute_data`](Restraint::compute_data).
    fn restore_atom(&mut self, real: usize, diagnostics: &Diagnostics)
    -> Result<(), EngineError>;

    /// Committed standard error, if committed data is current.
    fn standard_error(&self) -> Option<f64>;

    fn tentative_standard_error(&self) -> Option<f64>;

    fn collector(&self) -> &AtomsCollector<AtomMembership>;

    fn move_phase(&self) -> MovePhase;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
