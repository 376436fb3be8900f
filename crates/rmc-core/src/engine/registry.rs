use super::collector::AtomsCollector;
use super::config::EngineConfig;
use super::diagnostics::Diagnostics;
use super::error::EngineError;
use super::protocol::MovePhase;
use super::restraint::{EngineEvent, Restraint};
use super::restraints::ensure_unique;
use super::transaction::with_trial_coordinates;
use crate::core::geometry::cell::SimulationBox;
use crate::core::models::ids::RestraintId;
use crate::core::models::system::AtomicSystem;
use nalgebra::Point3;
use slotmap::SlotMap;
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

type Restraints = SlotMap<RestraintId, Box<dyn Restraint>>;

/// Worker threads an operation is spread over, one restraint per task.
#[derive(Default)]
struct Workers {
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl Workers {
    fn new(workers: Option<usize>) -> Result<Self, EngineError> {
        #[cfg(feature = "parallel")]
        {
            let pool = match workers {
                Some(n) => Some(
                    rayon::ThreadPoolBuilder::new()
                        .num_threads(n)
                        .build()
                        .map_err(|e| {
                            EngineError::Initialization(format!("worker pool: {e}"))
                        })?,
                ),
                None => None,
            };
            Ok(Self { pool })
        }

        #[cfg(not(feature = "parallel"))]
        {
            if workers.is_some_and(|n| n > 1) {
                warn!(
                    workers,
                    "Built without the parallel feature; restraints run sequentially."
                );
            }
            Ok(Self {})
        }
    }

    /// Applies `op` to every restraint, collecting one result per restraint in slot order.
    fn dispatch<F, R>(
        &self,
        restraints: &mut Restraints,
        op: F,
    ) -> Vec<(RestraintId, Result<R, EngineError>)>
    where
        F: Fn(&mut dyn Restraint) -> Result<R, EngineError> + Send + Sync,
        R: Send,
    {
        let targets: Vec<(RestraintId, &mut Box<dyn Restraint>)> = restraints.iter_mut().collect();

        #[cfg(feature = "parallel")]
        {
            let run = || {
                targets
                    .into_par_iter()
                    .map(|(id, restraint)| (id, op(restraint.as_mut())))
                    .collect()
            };
            match &self.pool {
                Some(pool) => pool.install(run),
                None => run(),
            }
        }

        #[cfg(not(feature = "parallel"))]
        {
            targets
                .into_iter()
                .map(|(id, restraint)| (id, op(restraint.as_mut())))
                .collect()
        }
    }
}

/// Splits dispatch results into the successful restraints and the first failure.
fn partition<R>(
    results: Vec<(RestraintId, Result<R, EngineError>)>,
) -> (Vec<(RestraintId, R)>, Option<(RestraintId, EngineError)>) {
    let mut ok = Vec::with_capacity(results.len());
    let mut failure = None;
    for (id, result) in results {
        match result {
            Ok(value) => ok.push((id, value)),
            Err(e) if failure.is_none() => failure = Some((id, e)),
            Err(_) => {}
        }
    }
    (ok, failure)
}

fn total<R: Into<f64>>(results: Vec<(RestraintId, Result<R, EngineError>)>) -> Result<f64, EngineError> {
    let (ok, failure) = partition(results);
    match failure {
        Some((_, e)) => Err(e),
        None => Ok(ok.into_iter().map(|(_, v)| v.into()).sum()),
    }
}

#[derive(Debug, Clone)]
struct PendingMove {
    reals: Vec<usize>,
    relative: Vec<usize>,
    trial: Option<Vec<Point3<f64>>>,
}

/// The atomic system together with every restraint evaluated against it.
///
/// The set owns the shared coordinate store and keeps it in the packed layout of active
/// atoms: amputation removes an atom's position and restoration inserts it back. Every
/// operation is fanned out to all registered restraints; the total standard error is the
/// sum of the restraints' standard errors.
pub struct RestraintSet<'a> {
    system: AtomicSystem,
    layout: AtomsCollector<Point3<f64>>,
    restraints: Restraints,
    config: EngineConfig,
    diagnostics: &'a Diagnostics<'a>,
    workers: Workers,
    pending: Option<PendingMove>,
}

impl<'a> RestraintSet<'a> {
    pub fn new(
        system: AtomicSystem,
        config: EngineConfig,
        diagnostics: &'a Diagnostics<'a>,
    ) -> Result<Self, EngineError> {
        let workers = Workers::new(config.workers)?;
        let layout = AtomsCollector::new(system.num_atoms());
        info!(
            atoms = system.num_atoms(),
            periodic = system.cell().is_periodic(),
            "Restraint set created."
        );
        Ok(Self {
            system,
            layout,
            restraints: SlotMap::with_key(),
            config,
            diagnostics,
            workers,
            pending: None,
        })
    }

    pub fn system(&self) -> &AtomicSystem {
        &self.system
    }

    /// Real/relative index translation of the shared coordinate store.
    pub fn layout(&self) -> &AtomsCollector<Point3<f64>> {
        &self.layout
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.restraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.restraints.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = RestraintId> + '_ {
        self.restraints.keys()
    }

    pub fn get(&self, id: RestraintId) -> Option<&dyn Restraint> {
        self.restraints.get(id).map(|r| r.as_ref())
    }

    /// Looks up a restraint by id and concrete type.
    pub fn get_as<T: Restraint + 'static>(&self, id: RestraintId) -> Option<&T> {
        self.restraints.get(id)?.as_any().downcast_ref::<T>()
    }

    fn ensure_nothing_collected(&self, operation: &'static str) -> Result<(), EngineError> {
        match self.layout.collected().count() {
            0 => Ok(()),
            collected => Err(EngineError::AtomsCollected {
                operation,
                collected,
            }),
        }
    }

    fn ensure_no_move(&self, operation: &'static str) -> Result<(), EngineError> {
        match &self.pending {
            None => Ok(()),
            Some(pending) => Err(EngineError::Protocol {
                operation,
                phase: if pending.trial.is_some() {
                    MovePhase::AfterMove
                } else {
                    MovePhase::BeforeMove
                },
            }),
        }
    }

    /// Attaches a restraint to the system, compiles its definitions and computes its data.
    pub fn register<R: Restraint + 'static>(&mut self, restraint: R) -> Result<RestraintId, EngineError> {
        self.ensure_no_move("register")?;
        self.ensure_nothing_collected("register")?;
        let mut restraint = Box::new(restraint);
        restraint.set_geometry_tolerance(self.config.geometry_tolerance);
        restraint.listen(EngineEvent::EngineSet, &self.system, self.diagnostics)?;
        let error = restraint.compute_data(&self.system)?;
        let kind = restraint.kind();
        let id = self.restraints.insert(restraint);
        info!(%kind, standard_error = error, "Restraint registered.");
        Ok(id)
    }

    pub fn unregister(&mut self, id: RestraintId) -> Result<Box<dyn Restraint>, EngineError> {
        self.ensure_no_move("unregister")?;
        self.restraints
            .remove(id)
            .ok_or(EngineError::RestraintNotFound(id))
    }

    /// Mutates a registered restraint of type `T`, typically to redefine it, and recomputes
    /// its data if the change left it without committed data.
    ///
    /// Fails with [`EngineError::RestraintNotFound`] if `id` does not hold a `T`.
    pub fn with_restraint_mut<T, F, R>(&mut self, id: RestraintId, f: F) -> Result<R, EngineError>
    where
        T: Restraint + 'static,
        F: FnOnce(&mut T, &AtomicSystem, &Diagnostics) -> Result<R, EngineError>,
    {
        self.ensure_no_move("with_restraint_mut")?;
        let restraint = self
            .restraints
            .get_mut(id)
            .ok_or(EngineError::RestraintNotFound(id))?;
        let concrete = restraint
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(EngineError::RestraintNotFound(id))?;
        let result = f(concrete, &self.system, self.diagnostics)?;
        if restraint.is_attached() && restraint.standard_error().is_none() {
            restraint.compute_data(&self.system)?;
        }
        Ok(result)
    }

    fn notify(&mut self, event: EngineEvent) -> Result<(), EngineError> {
        let system = &self.system;
        let diagnostics = self.diagnostics;
        let results = self.workers.dispatch(&mut self.restraints, |r| {
            r.listen(event, system, diagnostics)?;
            if r.standard_error().is_none() {
                r.compute_data(system)?;
            }
            Ok(())
        });
        match partition(results).1 {
            Some((_, e)) => Err(e),
            None => Ok(()),
        }
    }

    /// Replaces the simulation box and recomputes every restraint.
    pub fn set_cell(&mut self, cell: SimulationBox) -> Result<(), EngineError> {
        self.ensure_no_move("set_cell")?;
        self.system.set_cell(cell);
        debug!(periodic = self.system.cell().is_periodic(), "Boundary conditions updated.");
        self.notify(EngineEvent::UpdateBoundaryConditions)
    }

    /// Reassigns molecule indexes and names, then recompiles and recomputes every restraint.
    pub fn reassign_molecules(&mut self, assignments: Vec<(usize, String)>) -> Result<(), EngineError> {
        self.ensure_no_move("reassign_molecules")?;
        self.ensure_nothing_collected("reassign_molecules")?;
        self.system.reassign_molecules(assignments)?;
        debug!(molecules = self.system.molecules().len(), "Molecule indexes updated.");
        self.notify(EngineEvent::UpdateMoleculesIndexes)
    }

    /// Recomputes committed data of every restraint and returns the total standard error.
    pub fn compute_data(&mut self) -> Result<f64, EngineError> {
        self.ensure_no_move("compute_data")?;
        let system = &self.system;
        let results = self.workers.dispatch(&mut self.restraints, |r| r.compute_data(system));
        total(results)
    }

    /// Rejects the open move on every restraint that has one.
    fn abort_move(&mut self, reals: &[usize]) {
        for (id, restraint) in self.restraints.iter_mut() {
            if restraint.move_phase() != MovePhase::Idle {
                if let Err(e) = restraint.reject_move(reals) {
                    warn!(?id, error = %e, "Failed to abort trial move.");
                }
            }
        }
        self.pending = None;
    }

    pub fn compute_before_move(&mut self, reals: &[usize]) -> Result<(), EngineError> {
        self.ensure_no_move("compute_before_move")?;
        ensure_unique(reals)?;
        let relative = self.layout.relative_indexes(reals)?;

        let system = &self.system;
        let results = self
            .workers
            .dispatch(&mut self.restraints, |r| r.compute_before_move(system, reals));
        if let Some((_, e)) = partition(results).1 {
            self.abort_move(reals);
            return Err(e);
        }
        self.pending = Some(PendingMove {
            reals: reals.to_vec(),
            relative,
            trial: None,
        });
        Ok(())
    }

    /// Evaluates the open move with `trial` positions and returns the total tentative
    /// standard error. On any failure the move is rejected on every restraint.
    pub fn compute_after_move(
        &mut self,
        reals: &[usize],
        trial: &[Point3<f64>],
    ) -> Result<f64, EngineError> {
        let relative = match &self.pending {
            Some(pending) if pending.trial.is_none() && pending.reals == reals => {
                pending.relative.clone()
            }
            Some(pending) if pending.reals != reals => {
                return Err(EngineError::MoveMismatch {
                    operation: "compute_after_move",
                });
            }
            Some(_) => {
                return Err(EngineError::Protocol {
                    operation: "compute_after_move",
                    phase: MovePhase::AfterMove,
                });
            }
            None => {
                return Err(EngineError::Protocol {
                    operation: "compute_after_move",
                    phase: MovePhase::Idle,
                });
            }
        };

        let Self {
            system,
            restraints,
            workers,
            ..
        } = self;
        let outcome = with_trial_coordinates(system, &relative, trial, |system| {
            total(workers.dispatch(restraints, |r| r.evaluate_after_move(system, reals)))
        });

        match outcome {
            Ok(tentative) => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.trial = Some(trial.to_vec());
                }
                Ok(tentative)
            }
            Err(e) => {
                self.abort_move(reals);
                Err(e)
            }
        }
    }

    /// Commits the evaluated move on every restraint and writes the trial positions into
    /// the coordinate store.
    pub fn accept_move(&mut self, reals: &[usize]) -> Result<(), EngineError> {
        let pending = match self.pending.take() {
            Some(pending) if pending.reals != reals => {
                self.pending = Some(pending);
                return Err(EngineError::MoveMismatch {
                    operation: "accept_move",
                });
            }
            Some(PendingMove {
                relative,
                trial: Some(trial),
                ..
            }) => (relative, trial),
            Some(pending) => {
                self.pending = Some(pending);
                return Err(EngineError::Protocol {
                    operation: "accept_move",
                    phase: MovePhase::BeforeMove,
                });
            }
            None => {
                return Err(EngineError::Protocol {
                    operation: "accept_move",
                    phase: MovePhase::Idle,
                });
            }
        };
        let (relative, trial) = pending;

        let results = self
            .workers
            .dispatch(&mut self.restraints, |r| r.accept_move(reals));
        self.system.set_positions(&relative, &trial)?;
        match partition(results).1 {
            Some((id, e)) => Err(EngineError::Internal(format!(
                "restraint {id:?} failed to accept a move the others committed: {e}"
            ))),
            None => Ok(()),
        }
    }

    pub fn reject_move(&mut self, reals: &[usize]) -> Result<(), EngineError> {
        match &self.pending {
            Some(pending) if pending.reals == reals => {
                self.abort_move(reals);
                Ok(())
            }
            Some(_) => Err(EngineError::MoveMismatch {
                operation: "reject_move",
            }),
            None => Err(EngineError::Protocol {
                operation: "reject_move",
                phase: MovePhase::Idle,
            }),
        }
    }

    /// Total standard error the set would have if `real` were collected.
    pub fn compute_as_if_amputated(&mut self, real: usize) -> Result<f64, EngineError> {
        self.ensure_no_move("compute_as_if_amputated")?;
        self.layout.relative_index(real)?;
        let system = &self.system;
        let results = self
            .workers
            .dispatch(&mut self.restraints, |r| r.compute_as_if_amputated(system, real));
        total(results)
    }

    /// Collects `real` on every restraint and removes its position from the store.
    pub fn accept_amputation(&mut self, real: usize) -> Result<(), EngineError> {
        self.ensure_no_move("accept_amputation")?;
        let relative = self.layout.relative_index(real)?;

        let system = &self.system;
        let diagnostics = self.diagnostics;
        let results = self.workers.dispatch(&mut self.restraints, |r| {
            r.accept_amputation(system, real, diagnostics)
        });
        let (collected, failure) = partition(results);
        if let Some((_, e)) = failure {
            // Put back the restraints that already collected the atom.
            for (id, ()) in collected {
                if let Some(restraint) = self.restraints.get_mut(id) {
                    let restored = restraint
                        .restore_atom(real, self.diagnostics)
                        .and_then(|()| restraint.compute_data(&self.system));
                    if let Err(rollback) = restored {
                        warn!(?id, error = %rollback, "Failed to roll back amputation.");
                    }
                }
            }
            return Err(e);
        }

        let position = self.system.remove_position(relative)?;
        self.layout.collect(real, position)?;
        debug!(atom = real, active = self.layout.num_active(), "Atom amputated.");
        Ok(())
    }

    pub fn reject_amputation(&mut self, real: usize) -> Result<(), EngineError> {
        self.ensure_no_move("reject_amputation")?;
        let results = self
            .workers
            .dispatch(&mut self.restraints, |r| r.reject_amputation(real));
        match partition(results).1 {
            Some((_, e)) => Err(e),
            None => Ok(()),
        }
    }

    /// Returns a collected atom to the store and every restraint.
    ///
    /// Committed data is out of date afterwards, so [`standard_error`](Self::standard_error)
    /// is `None` until the next [`compute_data`](Self::compute_data).
    pub fn restore_atom(&mut self, real: usize) -> Result<(), EngineError> {
        self.ensure_no_move("restore_atom")?;
        if !self.layout.is_collected(real) {
            self.layout.relative_index(real)?;
            return Err(EngineError::AtomNotCollected(real));
        }

        let diagnostics = self.diagnostics;
        let results = self
            .workers
            .dispatch(&mut self.restraints, |r| r.restore_atom(real, diagnostics));
        let failure = partition(results).1;

        let relative = self.layout.insertion_index(real)?;
        let position = self.layout.restore(real)?;
        self.system.insert_position(relative, position)?;
        debug!(atom = real, active = self.layout.num_active(), "Atom restored.");
        match failure {
            Some((_, e)) => Err(e),
            None => Ok(()),
        }
    }

    /// Sum of committed standard errors, or `None` if any restraint lacks current data.
    pub fn standard_error(&self) -> Option<f64> {
        self.restraints.values().map(|r| r.standard_error()).sum()
    }

    /// Sum of tentative standard errors, or `None` if any restraint has none.
    pub fn tentative_standard_error(&self) -> Option<f64> {
        self.restraints
            .values()
            .map(|r| r.tentative_standard_error())
            .sum()
    }
}
