use super::error::EngineError;
use crate::core::models::system::{AtomicSystem, SystemError};
use nalgebra::Point3;
use std::ops::Deref;

/// Trial positions written into the shared coordinate store for the lifetime of the guard.
///
/// The original positions are put back in reverse write order when the guard is dropped,
/// whichever way the enclosing scope is left.
pub struct TrialCoordinates<'a> {
    system: &'a mut AtomicSystem,
    saved: Vec<(usize, Point3<f64>)>,
}

impl<'a> TrialCoordinates<'a> {
    /// Validates and writes `trial` at the given relative indexes.
    ///
    /// Nothing is written if the lengths differ, an index is out of range or a trial
    /// position is not finite.
    pub fn write(
        system: &'a mut AtomicSystem,
        relative: &[usize],
        trial: &[Point3<f64>],
    ) -> Result<Self, EngineError> {
        if relative.len() != trial.len() {
            return Err(EngineError::TrialLength {
                atoms: relative.len(),
                positions: trial.len(),
            });
        }
        system.check_index(relative)?;
        if let Some(position) = trial
            .iter()
            .position(|p| p.coords.iter().any(|v| !v.is_finite()))
        {
            return Err(SystemError::NonFinitePosition(relative[position]).into());
        }

        let mut saved = Vec::with_capacity(relative.len());
        for (&index, position) in relative.iter().zip(trial) {
            if let Some(slot) = system.position_mut(index) {
                saved.push((index, *slot));
                *slot = *position;
            }
        }
        Ok(Self { system, saved })
    }
}

impl Deref for TrialCoordinates<'_> {
    type Target = AtomicSystem;

    fn deref(&self) -> &Self::Target {
        self.system
    }
}

impl Drop for TrialCoordinates<'_> {
    fn drop(&mut self) {
        for (index, original) in self.saved.drain(..).rev() {
            if let Some(slot) = self.system.position_mut(index) {
                *slot = original;
            }
        }
    }
}

/// Runs `action` against the system with trial positions in place.
pub fn with_trial_coordinates<F, R>(
    system: &mut AtomicSystem,
    relative: &[usize],
    trial: &[Point3<f64>],
    action: F,
) -> Result<R, EngineError>
where
    F: FnOnce(&AtomicSystem) -> Result<R, EngineError>,
{
    // 1. Write the trial positions, recording the originals.
    let guard = TrialCoordinates::write(system, relative, trial)?;

    // 2. Execute the action against the trial state.
    let result = action(&*guard);

    // 3. Put the original positions back before reporting the outcome.
    drop(guard);

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::cell::SimulationBox;
    use crate::core::models::atom::AtomRecord;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    fn system() -> AtomicSystem {
        let atoms = (0..3).map(|_| AtomRecord::new("Ar", "AR", 0, "AR")).collect();
        let positions = (0..3).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect();
        AtomicSystem::new(atoms, positions, SimulationBox::open()).unwrap()
    }

    #[test]
    fn action_sees_trial_and_store_is_restored() {
        let mut system = system();
        let original = system.positions().to_vec();
        let seen = with_trial_coordinates(&mut system, &[1], &[Point3::new(9.0, 9.0, 9.0)], |s| {
            Ok(s.positions()[1])
        })
        .unwrap();
        assert_eq!(seen, Point3::new(9.0, 9.0, 9.0));
        assert_eq!(system.positions(), original.as_slice());
    }

    #[test]
    fn store_is_restored_when_action_fails() {
        let mut system = system();
        let original = system.positions().to_vec();
        let result: Result<(), _> =
            with_trial_coordinates(&mut system, &[0, 2], &[Point3::origin(); 2], |_| {
                Err(EngineError::Internal("kernel failure".into()))
            });
        assert!(result.is_err());
        assert_eq!(system.positions(), original.as_slice());
    }

    #[test]
    fn store_is_restored_when_action_panics() {
        let mut system = system();
        let original = system.positions().to_vec();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), EngineError> =
                with_trial_coordinates(&mut system, &[2], &[Point3::origin()], |_| {
                    panic!("kernel panic")
                });
        }));
        assert!(outcome.is_err());
        assert_eq!(system.positions(), original.as_slice());
    }

    #[test]
    fn repeated_indexes_restore_the_first_original() {
        let mut system = system();
        let original = system.positions().to_vec();
        with_trial_coordinates(
            &mut system,
            &[1, 1],
            &[Point3::new(5.0, 0.0, 0.0), Point3::new(6.0, 0.0, 0.0)],
            |_| Ok(()),
        )
        .unwrap();
        assert_eq!(system.positions(), original.as_slice());
    }

    #[test]
    fn invalid_input_writes_nothing() {
        let mut system = system();
        let original = system.positions().to_vec();
        assert!(matches!(
            TrialCoordinates::write(&mut system, &[0, 1], &[Point3::origin()]),
            Err(EngineError::TrialLength {
                atoms: 2,
                positions: 1
            })
        ));
        assert!(TrialCoordinates::write(&mut system, &[0, 5], &[Point3::origin(); 2]).is_err());
        assert_eq!(system.positions(), original.as_slice());
    }
}
