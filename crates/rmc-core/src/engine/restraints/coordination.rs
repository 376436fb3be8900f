use super::{Bookkeeping, IDLE, ensure_unique};
use crate::core::definitions::AtomMembership;
use crate::core::definitions::shell::{CompiledShells, ShellDefinition, ShellSpec, compile_shells};
use crate::core::geometry::coordination::{
    PairHits, ShellQuery, ShellRoles, full_pair_hits, moved_atom_pair_hits,
};
use crate::core::models::system::AtomicSystem;
use crate::core::standard_error::{shell_deviation, shell_standard_error};
use crate::engine::collector::AtomsCollector;
use crate::engine::diagnostics::{Diagnostics, Notice};
use crate::engine::error::EngineError;
use crate::engine::protocol::{MovePhase, TrialCycle};
use crate::engine::restraint::{EngineEvent, Restraint, RestraintKind};
use serde::{Deserialize, Serialize};
use std::any::Any;
use tracing::{debug, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Committed neighbour counts of every shell definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellData {
    /// Normalized neighbour count summed over the active core atoms.
    pub counts: Vec<f64>,
    /// Number of core atoms not collected.
    pub active_cores: Vec<usize>,
}

impl ShellData {
    /// Mean neighbour count per active core atom, or `None` without active core atoms.
    pub fn mean(&self, definition: usize) -> Option<f64> {
        match (self.counts.get(definition), self.active_cores.get(definition)) {
            (Some(&count), Some(&cores)) if cores > 0 => Some(count / cores as f64),
            _ => None,
        }
    }
}

/// Serializable state sufficient to rebuild a [`CoordinationRestraint`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationSnapshot {
    pub specs: Vec<ShellSpec>,
    pub collected: Vec<usize>,
    pub data: Option<ShellData>,
}

#[derive(Debug, Clone, Default)]
struct ActiveShell {
    core: Vec<usize>,
    shell: Vec<usize>,
}

#[derive(Debug, Clone)]
struct ShellPartial {
    definitions: Vec<usize>,
    counts: Vec<f64>,
}

/// Restrains the mean number of shell atoms found around core atoms.
#[derive(Debug, Default)]
pub struct CoordinationRestraint {
    specs: Vec<ShellSpec>,
    definitions: Vec<ShellDefinition>,
    active: Vec<ActiveShell>,
    books: Bookkeeping,
    data: Option<ShellData>,
    cycle: TrialCycle<ShellPartial>,
}

impl CoordinationRestraint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw specs as last supplied, compiled or not.
    pub fn specs(&self) -> &[ShellSpec] {
        &self.specs
    }

    pub fn definitions(&self) -> &[ShellDefinition] {
        &self.definitions
    }

    pub fn membership(&self, real: usize) -> Option<&AtomMembership> {
        self.books.membership().get(real)
    }

    /// Committed data, if computed and not out of date.
    pub fn data(&self) -> Option<&ShellData> {
        if self.books.is_out_of_date() {
            None
        } else {
            self.data.as_ref()
        }
    }

    /// Compiles `specs` against `system` and publishes them, or stores them for later when
    /// no system is given.
    ///
    /// On failure the previously published definitions stay active.
    pub fn set_definition(
        &mut self,
        specs: Vec<ShellSpec>,
        system: Option<&AtomicSystem>,
        diagnostics: &Diagnostics,
    ) -> Result<(), EngineError> {
        let Some(system) = system else {
            diagnostics.report(Notice::DefinitionsDeferred {
                restraint: self.kind(),
                specs: specs.len(),
            });
            self.specs = specs;
            return Ok(());
        };
        self.cycle.ensure_phase("set_definition", IDLE)?;
        let compiled = compile_shells(&specs, system.atoms())?;
        self.publish(compiled, system, diagnostics)?;
        self.specs = specs;
        Ok(())
    }

    fn publish(
        &mut self,
        compiled: CompiledShells,
        system: &AtomicSystem,
        diagnostics: &Diagnostics,
    ) -> Result<(), EngineError> {
        self.books.install(compiled.membership, system)?;
        self.definitions = compiled.definitions;
        self.refresh_active();
        self.data = None;
        self.cycle.reset();
        for note in compiled.notes {
            diagnostics.report(Notice::from_compile_note(self.kind(), note));
        }
        debug!(
            definitions = self.definitions.len(),
            "Coordination definitions published."
        );
        Ok(())
    }

    fn refresh_active(&mut self) {
        let collector = self.books.collector();
        self.active = self
            .definitions
            .iter()
            .map(|d| ActiveShell {
                core: collector.active_relative(&d.core),
                shell: collector.active_relative(&d.shell),
            })
            .collect();
    }

    fn query(&self, definition: usize) -> ShellQuery<'_> {
        let active = &self.active[definition];
        ShellQuery {
            core: &active.core,
            shell: &active.shell,
            window: self.definitions[definition].window(),
        }
    }

    fn roles(&self, real: usize, definition: usize) -> ShellRoles {
        match self.books.membership().get(real) {
            Some(m) => ShellRoles {
                as_core: m.primary.binary_search(&definition).is_ok(),
                in_shell: m.secondary.binary_search(&definition).is_ok(),
            },
            None => ShellRoles::default(),
        }
    }

    /// Neighbour counts of `definitions` restricted to pairs touching the moved atoms.
    fn partial_counts(
        &self,
        system: &AtomicSystem,
        reals: &[usize],
        definitions: &[usize],
    ) -> Result<Vec<f64>, EngineError> {
        let relative = self.books.collector().relative_indexes(reals)?;
        let mut moved = vec![false; system.num_active()];
        for &index in &relative {
            moved[index] = true;
        }
        let positions = system.positions();
        let cell = system.cell();

        let count = |&definition: &usize| -> f64 {
            let query = self.query(definition);
            reals
                .iter()
                .zip(&relative)
                .map(|(&real, &atom)| {
                    let roles = self.roles(real, definition);
                    moved_atom_pair_hits(positions, cell, &query, atom, roles, &moved)
                })
                .sum::<PairHits>()
                .into_count()
        };

        #[cfg(not(feature = "parallel"))]
        let counts = definitions.iter().map(count).collect();

        #[cfg(feature = "parallel")]
        let counts = definitions.par_iter().map(count).collect();

        Ok(counts)
    }

    /// Per-definition `(definition, count, is_core)` contributions of a single atom.
    fn atom_contributions(
        &self,
        system: &AtomicSystem,
        real: usize,
    ) -> Result<Vec<(usize, f64, bool)>, EngineError> {
        let definitions: Vec<usize> = match self.books.membership().get(real) {
            Some(membership) => membership.definitions().collect(),
            None => Vec::new(),
        };
        let counts = self.partial_counts(system, &[real], &definitions)?;
        Ok(definitions
            .into_iter()
            .zip(counts)
            .map(|(d, count)| (d, count, self.roles(real, d).as_core))
            .collect())
    }

    fn without_atom(data: &ShellData, contributions: &[(usize, f64, bool)]) -> ShellData {
        let mut patched = data.clone();
        for &(definition, count, is_core) in contributions {
            patched.counts[definition] -= count;
            if is_core {
                patched.active_cores[definition] -= 1;
            }
        }
        patched
    }

    fn committed(&self) -> Result<&ShellData, EngineError> {
        self.data.as_ref().ok_or(EngineError::NotComputed)
    }

    /// Weighted deviation of each definition under committed data.
    pub fn deviations(&self) -> Option<Vec<f64>> {
        let data = self.data()?;
        Some(
            self.definitions
                .iter()
                .enumerate()
                .map(|(i, d)| shell_deviation(d, data.counts[i], data.active_cores[i]))
                .collect(),
        )
    }

    pub fn snapshot(&self) -> CoordinationSnapshot {
        CoordinationSnapshot {
            specs: self.specs.clone(),
            collected: self.books.collector().collected().collect(),
            data: self.data().cloned(),
        }
    }

    /// Rebuilds a restraint from a snapshot against a system whose coordinate store
    /// already lacks the collected atoms.
    pub fn from_snapshot(
        snapshot: CoordinationSnapshot,
        system: &AtomicSystem,
        diagnostics: &Diagnostics,
    ) -> Result<Self, EngineError> {
        let compiled = compile_shells(&snapshot.specs, system.atoms())?;
        let mut books = Bookkeeping::with_collected(system.num_atoms(), &snapshot.collected)?;
        books.install(compiled.membership, system)?;

        let mut restraint = Self {
            specs: snapshot.specs,
            books,
            ..Self::default()
        };
        restraint.definitions = compiled.definitions;
        restraint.refresh_active();
        for note in compiled.notes {
            diagnostics.report(Notice::from_compile_note(restraint.kind(), note));
        }

        if let Some(data) = snapshot.data {
            let n = restraint.definitions.len();
            if data.counts.len() != n || data.active_cores.len() != n {
                return Err(EngineError::InvalidSnapshot(format!(
                    "expected data for {n} shell definitions, got {} counts and {} core totals",
                    data.counts.len(),
                    data.active_cores.len()
                )));
            }
            let error = shell_standard_error(&restraint.definitions, &data.counts, &data.active_cores);
            restraint.data = Some(data);
            restraint.books.commit(error);
        }
        Ok(restraint)
    }
}

impl Restraint for CoordinationRestraint {
    fn kind(&self) -> RestraintKind {
        RestraintKind::Coordination
    }

    fn is_attached(&self) -> bool {
        self.books.is_attached()
    }

    fn listen(
        &mut self,
        event: EngineEvent,
        system: &AtomicSystem,
        diagnostics: &Diagnostics,
    ) -> Result<(), EngineError> {
        match event {
            EngineEvent::EngineSet | EngineEvent::UpdateMoleculesIndexes => {
                let compiled = compile_shells(&self.specs, system.atoms())?;
                self.publish(compiled, system, diagnostics)?;
                diagnostics.report(Notice::DefinitionsRecompiled {
                    restraint: self.kind(),
                    event,
                    definitions: self.definitions.len(),
                });
                Ok(())
            }
            EngineEvent::UpdateBoundaryConditions => {
                self.cycle.reset();
                self.books.set_tentative(None);
                if self.books.is_attached() {
                    self.compute_data(system)?;
                }
                Ok(())
            }
        }
    }

    fn compute_data(&mut self, system: &AtomicSystem) -> Result<f64, EngineError> {
        self.books.ensure_attached()?;
        self.books.ensure_layout(system)?;
        self.cycle.reset();

        let positions = system.positions();
        let cell = system.cell();
        let counts: Vec<f64> = (0..self.definitions.len())
            .map(|d| full_pair_hits(positions, cell, &self.query(d)).into_count())
            .collect();
        let active_cores: Vec<usize> = self.active.iter().map(|a| a.core.len()).collect();

        let error = shell_standard_error(&self.definitions, &counts, &active_cores);
        self.data = Some(ShellData {
            counts,
            active_cores,
        });
        self.books.commit(error);
        debug!(standard_error = error, "Coordination data computed.");
        Ok(error)
    }

    fn compute_before_move(
        &mut self,
        system: &AtomicSystem,
        reals: &[usize],
    ) -> Result<(), EngineError> {
        self.books.ensure_ready(system, self.data.is_some())?;
        self.cycle.ensure_phase("compute_before_move", IDLE)?;
        ensure_unique(reals)?;

        let definitions = self.books.membership().definitions_touching(reals);
        let counts = self.partial_counts(system, reals, &definitions)?;
        trace!(
            atoms = reals.len(),
            definitions = definitions.len(),
            "Coordination before move."
        );
        self.cycle.begin(reals, ShellPartial { definitions, counts })
    }

    fn evaluate_after_move(
        &mut self,
        system: &AtomicSystem,
        reals: &[usize],
    ) -> Result<f64, EngineError> {
        self.books.ensure_ready(system, self.data.is_some())?;
        self.cycle.ensure_after_move(reals)?;
        let before = self
            .cycle
            .before()
            .ok_or_else(|| EngineError::Internal("missing before-move data".to_string()))?;

        let after_counts = self.partial_counts(system, reals, &before.definitions)?;
        let committed = self.committed()?;
        let mut patched = committed.counts.clone();
        for ((&d, &b), &a) in before
            .definitions
            .iter()
            .zip(&before.counts)
            .zip(&after_counts)
        {
            patched[d] += a - b;
        }
        let tentative = shell_standard_error(&self.definitions, &patched, &committed.active_cores);
        let after = ShellPartial {
            definitions: before.definitions.clone(),
            counts: after_counts,
        };

        self.cycle.record_after(reals, after, tentative)?;
        self.books.set_tentative(Some(tentative));
        trace!(tentative, "Coordination after move.");
        Ok(tentative)
    }

    fn accept_move(&mut self, reals: &[usize]) -> Result<(), EngineError> {
        self.committed()?;
        let (before, after, tentative) = self.cycle.finish(reals)?;
        let data = self
            .data
            .as_mut()
            .ok_or(EngineError::NotComputed)?;
        for ((&d, &b), &a) in before
            .definitions
            .iter()
            .zip(&before.counts)
            .zip(&after.counts)
        {
            data.counts[d] += a - b;
        }
        self.books.commit(tentative);
        Ok(())
    }

    fn reject_move(&mut self, reals: &[usize]) -> Result<(), EngineError> {
        self.cycle.abort(reals)?;
        self.books.set_tentative(None);
        Ok(())
    }

    fn compute_as_if_amputated(
        &mut self,
        system: &AtomicSystem,
        real: usize,
    ) -> Result<f64, EngineError> {
        self.books.ensure_ready(system, self.data.is_some())?;
        self.cycle.ensure_phase("compute_as_if_amputated", IDLE)?;
        let contributions = self.atom_contributions(system, real)?;
        let patched = Self::without_atom(self.committed()?, &contributions);
        let tentative =
            shell_standard_error(&self.definitions, &patched.counts, &patched.active_cores);
        self.books.set_tentative(Some(tentative));
        Ok(tentative)
    }

    fn accept_amputation(
        &mut self,
        system: &AtomicSystem,
        real: usize,
        diagnostics: &Diagnostics,
    ) -> Result<(), EngineError> {
        self.books.ensure_ready(system, self.data.is_some())?;
        self.cycle.ensure_phase("accept_amputation", IDLE)?;
        let contributions = self.atom_contributions(system, real)?;
        let patched = Self::without_atom(self.committed()?, &contributions);

        self.books.collect(real)?;
        self.refresh_active();
        let error = shell_standard_error(&self.definitions, &patched.counts, &patched.active_cores);
        self.data = Some(patched);
        self.books.commit(error);
        diagnostics.report(Notice::AtomCollected {
            restraint: self.kind(),
            atom: real,
        });
        Ok(())
    }

    fn reject_amputation(&mut self, real: usize) -> Result<(), EngineError> {
        self.cycle.ensure_phase("reject_amputation", IDLE)?;
        self.books.collector().relative_index(real)?;
        self.books.set_tentative(None);
        Ok(())
    }

    fn restore_atom(&mut self, real: usize, diagnostics: &Diagnostics) -> Result<(), EngineError> {
        self.cycle.ensure_phase("restore_atom", IDLE)?;
        self.books.restore(real)?;
        self.refresh_active();
        diagnostics.report(Notice::AtomRestored {
            restraint: self.kind(),
            atom: real,
        });
        Ok(())
    }

    fn standard_error(&self) -> Option<f64> {
        self.books.standard_error()
    }

    fn tentative_standard_error(&self) -> Option<f64> {
        self.books.tentative()
    }

    fn collector(&self) -> &AtomsCollector<AtomMembership> {
        self.books.collector()
    }

    fn move_phase(&self) -> MovePhase {
        self.cycle.phase()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{aluminium_chloride, assert_close};
    use super::*;
    use crate::core::definitions::selector::AtomSelector;
    use crate::core::geometry::cell::SimulationBox;
    use nalgebra::Point3;
    use std::sync::Mutex;

    fn al_cl_spec() -> ShellSpec {
        ShellSpec::new(
            AtomSelector::element("Al"),
            AtomSelector::element("Cl"),
            0.5,
            2.0,
            2.0,
            2.0,
        )
    }

    fn attached(system: &AtomicSystem, specs: Vec<ShellSpec>) -> CoordinationRestraint {
        let mut restraint = CoordinationRestraint::new();
        restraint
            .set_definition(specs, Some(system), &Diagnostics::new())
            .unwrap();
        restraint.compute_data(system).unwrap();
        restraint
    }

    fn trial_move(
        restraint: &mut CoordinationRestraint,
        system: &mut AtomicSystem,
        reals: &[usize],
        trial: &[Point3<f64>],
    ) -> f64 {
        restraint.compute_before_move(system, reals).unwrap();
        restraint.compute_after_move(system, reals, trial).unwrap()
    }

    #[test]
    fn moving_a_shell_atom_into_the_window_raises_the_standard_error() {
        let mut system = aluminium_chloride(&[1.0, 1.0, 5.0]);
        let mut restraint = attached(&system, vec![al_cl_spec()]);
        assert_eq!(restraint.standard_error(), Some(0.0));
        assert_eq!(restraint.data().unwrap().mean(0), Some(2.0));

        let trial = [Point3::new(0.0, 1.2, 0.0)];
        let tentative = trial_move(&mut restraint, &mut system, &[3], &trial);
        assert_eq!(tentative, 1.0);
        assert_eq!(restraint.standard_error(), Some(0.0));

        restraint.accept_move(&[3]).unwrap();
        system.set_positions(&[3], &trial).unwrap();
        assert_eq!(restraint.standard_error(), Some(1.0));
        assert_eq!(restraint.data().unwrap().mean(0), Some(3.0));
        assert_eq!(restraint.deviations(), Some(vec![1.0]));
    }

    #[test]
    fn accepted_moves_stay_consistent_with_full_recompute() {
        let mut system = aluminium_chloride(&[1.0, 1.1, 1.5, 2.2, 0.9, 1.7]);
        system.set_cell(SimulationBox::orthorhombic(6.0, 6.0, 6.0).unwrap());
        let specs = vec![
            al_cl_spec(),
            ShellSpec::new(
                AtomSelector::element("Cl"),
                AtomSelector::indexes(0..7),
                0.8,
                2.4,
                1.0,
                3.0,
            ),
        ];
        let mut restraint = attached(&system, specs.clone());

        let mut state = 0x2545_f491_4f6c_dd1du64;
        let mut next = move || {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (state >> 11) as f64 / (1u64 << 53) as f64
        };

        for step in 0..60 {
            let a = (next() * 7.0) as usize;
            let b = (a + 1 + (next() * 6.0) as usize) % 7;
            let reals = if step % 2 == 0 { vec![a] } else { vec![a, b] };
            let trial: Vec<Point3<f64>> = reals
                .iter()
                .map(|_| Point3::new(next() * 6.0, next() * 6.0, next() * 6.0))
                .collect();

            trial_move(&mut restraint, &mut system, &reals, &trial);
            if step % 3 == 0 {
                restraint.reject_move(&reals).unwrap();
            } else {
                restraint.accept_move(&reals).unwrap();
                system.set_positions(&reals, &trial).unwrap();
            }
        }

        let fresh = attached(&system, specs);
        assert_eq!(restraint.data(), fresh.data());
        assert_close(
            restraint.standard_error().unwrap(),
            fresh.standard_error().unwrap(),
        );
    }

    #[test]
    fn reject_leaves_committed_state_and_coordinates_untouched() {
        let mut system = aluminium_chloride(&[1.0, 1.0, 5.0]);
        let mut restraint = attached(&system, vec![al_cl_spec()]);
        let data = restraint.data().cloned();
        let error = restraint.standard_error();
        let positions = system.positions().to_vec();

        trial_move(
            &mut restraint,
            &mut system,
            &[1, 3],
            &[Point3::new(9.0, 0.0, 0.0), Point3::new(0.0, 1.2, 0.0)],
        );
        assert_eq!(system.positions(), positions.as_slice());
        restraint.reject_move(&[1, 3]).unwrap();

        assert_eq!(restraint.data().cloned(), data);
        assert_eq!(restraint.standard_error(), error);
        assert_eq!(restraint.tentative_standard_error(), None);
        assert_eq!(restraint.move_phase(), MovePhase::Idle);
    }

    #[test]
    fn protocol_misuse_fails_fast() {
        let mut system = aluminium_chloride(&[1.0, 1.0, 5.0]);
        let mut detached = CoordinationRestraint::new();
        assert!(matches!(
            detached.compute_data(&system),
            Err(EngineError::NotAttached)
        ));

        let mut restraint = CoordinationRestraint::new();
        restraint
            .set_definition(vec![al_cl_spec()], Some(&system), &Diagnostics::new())
            .unwrap();
        assert!(matches!(
            restraint.compute_before_move(&system, &[1]),
            Err(EngineError::NotComputed)
        ));
        restraint.compute_data(&system).unwrap();

        assert!(matches!(
            restraint.compute_after_move(&mut system, &[1], &[Point3::origin()]),
            Err(EngineError::Protocol {
                operation: "compute_after_move",
                phase: MovePhase::Idle
            })
        ));
        assert!(matches!(
            restraint.accept_move(&[1]),
            Err(EngineError::Protocol { .. })
        ));
        assert!(matches!(
            restraint.compute_before_move(&system, &[1, 1]),
            Err(EngineError::DuplicateAtom(1))
        ));

        restraint.compute_before_move(&system, &[1]).unwrap();
        assert!(matches!(
            restraint.compute_before_move(&system, &[2]),
            Err(EngineError::Protocol { .. })
        ));
        assert!(matches!(
            restraint.compute_after_move(&mut system, &[2], &[Point3::origin()]),
            Err(EngineError::MoveMismatch { .. })
        ));
        assert!(matches!(
            restraint.compute_after_move(&mut system, &[1], &[]),
            Err(EngineError::TrialLength { .. })
        ));
        assert_eq!(restraint.move_phase(), MovePhase::BeforeMove);
        restraint.reject_move(&[1]).unwrap();
    }

    #[test]
    fn definitions_are_deferred_until_attached() {
        let system = aluminium_chloride(&[1.0, 1.0, 5.0]);
        let notices = Mutex::new(Vec::new());
        let diagnostics = Diagnostics::with_callback(Box::new(|n: &Notice| {
            notices.lock().unwrap().push(n.clone());
        }));

        let mut restraint = CoordinationRestraint::new();
        restraint
            .set_definition(vec![al_cl_spec()], None, &diagnostics)
            .unwrap();
        assert!(!restraint.is_attached());
        assert!(restraint.definitions().is_empty());
        assert_eq!(restraint.specs().len(), 1);

        restraint
            .listen(EngineEvent::EngineSet, &system, &diagnostics)
            .unwrap();
        assert!(restraint.is_attached());
        assert_eq!(restraint.definitions()[0].shell, vec![1, 2, 3]);
        assert_eq!(restraint.compute_data(&system).unwrap(), 0.0);

        drop(diagnostics);
        let notices = notices.into_inner().unwrap();
        assert!(matches!(notices[0], Notice::DefinitionsDeferred { specs: 1, .. }));
        assert!(matches!(
            notices[1],
            Notice::DefinitionsRecompiled {
                event: EngineEvent::EngineSet,
                ..
            }
        ));
    }

    #[test]
    fn invalid_redefinition_keeps_previous_definitions() {
        let system = aluminium_chloride(&[1.0, 1.0, 5.0]);
        let mut restraint = attached(&system, vec![al_cl_spec()]);
        let before = restraint.definitions().to_vec();

        let mut bad = al_cl_spec();
        bad.upper = 0.1;
        let result = restraint.set_definition(
            vec![al_cl_spec(), bad],
            Some(&system),
            &Diagnostics::new(),
        );
        assert!(matches!(result, Err(EngineError::Definition { .. })));
        assert_eq!(restraint.definitions(), before.as_slice());
        assert_eq!(restraint.specs().len(), 1);
        assert_eq!(restraint.standard_error(), Some(0.0));
    }

    #[test]
    fn collect_then_restore_matches_never_collecting() {
        let mut system = aluminium_chloride(&[1.0, 1.0, 5.0, 1.5]);
        let mut restraint = attached(&system, vec![al_cl_spec()]);
        let pristine = restraint.data().cloned();

        let as_if = restraint.compute_as_if_amputated(&system, 1).unwrap();
        assert_eq!(restraint.tentative_standard_error(), Some(as_if));

        let relative = restraint.collector().relative_index(1).unwrap();
        restraint
            .accept_amputation(&system, 1, &Diagnostics::new())
            .unwrap();
        let removed = system.remove_position(relative).unwrap();
        assert_eq!(restraint.standard_error(), Some(as_if));
        assert_eq!(restraint.data().unwrap().counts, vec![2.0]);
        assert!(restraint.membership(1).unwrap().is_empty());

        let fresh = attached(&system_without(&system), vec![al_cl_spec()]);
        assert_eq!(fresh.data().unwrap().counts, vec![2.0]);

        assert!(matches!(
            restraint.compute_before_move(&system, &[1]),
            Err(EngineError::AtomCollected(1))
        ));
        restraint.compute_before_move(&system, &[4]).unwrap();
        restraint.reject_move(&[4]).unwrap();

        restraint.restore_atom(1, &Diagnostics::new()).unwrap();
        system.insert_position(relative, removed).unwrap();
        assert_eq!(restraint.data(), None);
        assert!(matches!(
            restraint.compute_before_move(&system, &[2]),
            Err(EngineError::DataOutOfDate)
        ));

        restraint.compute_data(&system).unwrap();
        assert_eq!(restraint.data().cloned(), pristine);
    }

    // The same structure with the first chlorine atom physically absent.
    fn system_without(system: &AtomicSystem) -> AtomicSystem {
        let mut atoms = system.atoms().to_vec();
        atoms.remove(1);
        AtomicSystem::new(atoms, system.positions().to_vec(), system.cell().clone()).unwrap()
    }

    #[test]
    fn amputating_a_core_atom_drops_it_from_the_mean() {
        let system = aluminium_chloride(&[1.0, 1.0, 5.0]);
        let mut restraint = attached(&system, vec![al_cl_spec()]);
        restraint
            .accept_amputation(&system, 0, &Diagnostics::new())
            .unwrap();
        let data = restraint.data().unwrap();
        assert_eq!(data.active_cores, vec![0]);
        assert_eq!(data.counts, vec![0.0]);
        assert_eq!(data.mean(0), None);
        assert_eq!(restraint.standard_error(), Some(0.0));
    }

    #[test]
    fn reject_amputation_keeps_committed_state() {
        let system = aluminium_chloride(&[1.0, 1.0, 5.0]);
        let mut restraint = attached(&system, vec![al_cl_spec()]);
        restraint.compute_as_if_amputated(&system, 2).unwrap();
        restraint.reject_amputation(2).unwrap();
        assert_eq!(restraint.standard_error(), Some(0.0));
        assert_eq!(restraint.tentative_standard_error(), None);
        assert!(!restraint.collector().is_collected(2));
    }

    #[test]
    fn snapshot_rebuilds_an_equivalent_restraint() {
        let mut system = aluminium_chloride(&[1.0, 1.0, 5.0, 1.5]);
        let mut restraint = attached(&system, vec![al_cl_spec()]);
        let relative = restraint.collector().relative_index(2).unwrap();
        restraint
            .accept_amputation(&system, 2, &Diagnostics::new())
            .unwrap();
        system.remove_position(relative).unwrap();

        let snapshot = restraint.snapshot();
        let encoded = toml::to_string(&snapshot).unwrap();
        let decoded: CoordinationSnapshot = toml::from_str(&encoded).unwrap();
        let rebuilt =
            CoordinationRestraint::from_snapshot(decoded, &system, &Diagnostics::new()).unwrap();

        assert_eq!(rebuilt.data(), restraint.data());
        assert_eq!(rebuilt.standard_error(), restraint.standard_error());
        assert!(rebuilt.collector().is_collected(2));
        assert!(rebuilt.membership(2).unwrap().is_empty());
        assert_eq!(rebuilt.definitions(), restraint.definitions());
    }

    #[test]
    fn boundary_update_recomputes_committed_data() {
        let mut system = aluminium_chloride(&[1.0, 1.0, 5.0]);
        let mut restraint = attached(&system, vec![al_cl_spec()]);
        system.set_cell(SimulationBox::orthorhombic(4.0, 4.0, 4.0).unwrap());
        restraint
            .listen(
                EngineEvent::UpdateBoundaryConditions,
                &system,
                &Diagnostics::new(),
            )
            .unwrap();
        // Atom 3 at y = 5 is now 1 away from the origin through the boundary.
        assert_eq!(restraint.data().unwrap().counts, vec![3.0]);
        assert_eq!(restraint.standard_error(), Some(1.0));
    }
}
