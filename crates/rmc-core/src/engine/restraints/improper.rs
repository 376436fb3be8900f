use super::{Bookkeeping, IDLE, ensure_unique};
use crate::core::definitions::AtomMembership;
use crate::core::definitions::angle::{
    AngleDefinition, AngleSource, AngleSpec, AngleTemplate, CompiledAngles,
};
use crate::core::geometry::improper::{
    AngleMeasure, DEFAULT_GEOMETRY_TOLERANCE, ImproperQuad, measure_impropers,
};
use crate::core::models::system::AtomicSystem;
use crate::core::standard_error::angle_standard_error;
use crate::engine::collector::AtomsCollector;
use crate::engine::diagnostics::{Diagnostics, Notice};
use crate::engine::error::EngineError;
use crate::engine::protocol::{MovePhase, TrialCycle};
use crate::engine::restraint::{EngineEvent, Restraint, RestraintKind};
use serde::{Deserialize, Serialize};
use std::any::Any;
use tracing::{debug, trace};

/// Serializable state sufficient to rebuild an [`ImproperRestraint`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImproperSnapshot {
    pub source: AngleSource,
    pub collected: Vec<usize>,
    pub data: Option<Vec<AngleMeasure>>,
}

#[derive(Debug, Clone)]
struct AnglePartial {
    definitions: Vec<usize>,
    measures: Vec<AngleMeasure>,
}

/// Restrains improper angles of four-atom tuples to lie within angular bounds.
///
/// A definition with any collected atom is excluded: its committed measure is zero and it
/// is never measured until the atom is restored.
#[derive(Debug)]
pub struct ImproperRestraint {
    source: AngleSource,
    definitions: Vec<AngleDefinition>,
    quads: Vec<Option<ImproperQuad>>,
    books: Bookkeeping,
    data: Option<Vec<AngleMeasure>>,
    cycle: TrialCycle<AnglePartial>,
    tolerance: f64,
}

impl Default for ImproperRestraint {
    fn default() -> Self {
        Self {
            source: AngleSource::default(),
            definitions: Vec::new(),
            quads: Vec::new(),
            books: Bookkeeping::default(),
            data: None,
            cycle: TrialCycle::default(),
            tolerance: DEFAULT_GEOMETRY_TOLERANCE,
        }
    }
}

impl ImproperRestraint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self) -> &AngleSource {
        &self.source
    }

    pub fn definitions(&self) -> &[AngleDefinition] {
        &self.definitions
    }

    pub fn membership(&self, real: usize) -> Option<&AtomMembership> {
        self.books.membership().get(real)
    }

    /// Committed measures, if computed and not out of date.
    pub fn data(&self) -> Option<&[AngleMeasure]> {
        if self.books.is_out_of_date() {
            None
        } else {
            self.data.as_deref()
        }
    }

    /// Whether a definition is excluded because one of its atoms is collected.
    pub fn is_excluded(&self, definition: usize) -> bool {
        matches!(self.quads.get(definition), Some(None))
    }

    pub fn set_definition(
        &mut self,
        specs: Vec<AngleSpec>,
        system: Option<&AtomicSystem>,
        diagnostics: &Diagnostics,
    ) -> Result<(), EngineError> {
        self.set_source(AngleSource::Explicit(specs), system, diagnostics)
    }

    pub fn set_template(
        &mut self,
        template: AngleTemplate,
        system: Option<&AtomicSystem>,
        diagnostics: &Diagnostics,
    ) -> Result<(), EngineError> {
        self.set_source(AngleSource::Template(template), system, diagnostics)
    }

    /// Compiles `source` against `system` and publishes it, or stores it for later when
    /// no system is given.
    ///
    /// On failure the previously published definitions stay active.
    pub fn set_source(
        &mut self,
        source: AngleSource,
        system: Option<&AtomicSystem>,
        diagnostics: &Diagnostics,
    ) -> Result<(), EngineError> {
        let Some(system) = system else {
            let specs = match &source {
                AngleSource::Explicit(specs) => specs.len(),
                AngleSource::Template(template) => {
                    template.molecules.values().map(Vec::len).sum()
                }
            };
            diagnostics.report(Notice::DefinitionsDeferred {
                restraint: self.kind(),
                specs,
            });
            self.source = source;
            return Ok(());
        };
        self.cycle.ensure_phase("set_definition", IDLE)?;
        let compiled = source.compile(system.atoms())?;
        self.publish(compiled, system, diagnostics)?;
        self.source = source;
        Ok(())
    }

    fn publish(
        &mut self,
        compiled: CompiledAngles,
        system: &AtomicSystem,
        diagnostics: &Diagnostics,
    ) -> Result<(), EngineError> {
        self.books.install(compiled.membership, system)?;
        self.definitions = compiled.definitions;
        self.refresh_quads()?;
        self.data = None;
        self.cycle.reset();
        for note in compiled.notes {
            diagnostics.report(Notice::from_compile_note(self.kind(), note));
        }
        debug!(
            definitions = self.definitions.len(),
            "Improper angle definitions published."
        );
        Ok(())
    }

    /// Rebuilds relative-index quads, leaving `None` for definitions touching a collected atom.
    fn refresh_quads(&mut self) -> Result<(), EngineError> {
        let collector = self.books.collector();
        let mut quads = Vec::with_capacity(self.definitions.len());
        for (index, d) in self.definitions.iter().enumerate() {
            if d.atoms().iter().any(|&real| collector.is_collected(real)) {
                quads.push(None);
                continue;
            }
            quads.push(Some(ImproperQuad {
                definition: index,
                improper: collector.relative_index(d.improper)?,
                origin: collector.relative_index(d.origin)?,
                x: collector.relative_index(d.x)?,
                y: collector.relative_index(d.y)?,
                lower: d.lower,
                upper: d.upper,
            }));
        }
        self.quads = quads;
        Ok(())
    }

    /// Non-excluded definitions among those touched by `reals`.
    fn touched(&self, reals: &[usize]) -> Vec<usize> {
        self.books
            .membership()
            .definitions_touching(reals)
            .into_iter()
            .filter(|&d| !self.is_excluded(d))
            .collect()
    }

    fn measure(
        &self,
        system: &AtomicSystem,
        definitions: &[usize],
    ) -> Result<Vec<AngleMeasure>, EngineError> {
        let quads: Vec<ImproperQuad> = definitions
            .iter()
            .filter_map(|&d| self.quads.get(d).copied().flatten())
            .collect();
        if quads.len() != definitions.len() {
            return Err(EngineError::Internal(
                "measured an excluded improper angle definition".to_string(),
            ));
        }
        Ok(measure_impropers(
            system.positions(),
            system.cell(),
            &quads,
            self.tolerance,
        )?)
    }

    fn committed(&self) -> Result<&[AngleMeasure], EngineError> {
        self.data.as_deref().ok_or(EngineError::NotComputed)
    }

    /// Committed measures with the definitions of `real` zeroed.
    fn without_atom(&self, real: usize) -> Result<(Vec<usize>, Vec<AngleMeasure>), EngineError> {
        let mut patched = self.committed()?.to_vec();
        let definitions = self.touched(&[real]);
        for &d in &definitions {
            patched[d] = AngleMeasure::default();
        }
        Ok((definitions, patched))
    }

    pub fn snapshot(&self) -> ImproperSnapshot {
        ImproperSnapshot {
            source: self.source.clone(),
            collected: self.books.collector().collected().collect(),
            data: self.data().map(<[AngleMeasure]>::to_vec),
        }
    }

    /// Rebuilds a restraint from a snapshot against a system whose coordinate store
    /// already lacks the collected atoms.
    pub fn from_snapshot(
        snapshot: ImproperSnapshot,
        system: &AtomicSystem,
        diagnostics: &Diagnostics,
    ) -> Result<Self, EngineError> {
        let compiled = snapshot.source.compile(system.atoms())?;
        let mut books = Bookkeeping::with_collected(system.num_atoms(), &snapshot.collected)?;
        books.install(compiled.membership, system)?;

        let mut restraint = Self {
            source: snapshot.source,
            books,
            ..Self::default()
        };
        restraint.definitions = compiled.definitions;
        restraint.refresh_quads()?;
        for note in compiled.notes {
            diagnostics.report(Notice::from_compile_note(restraint.kind(), note));
        }

        if let Some(data) = snapshot.data {
            if data.len() != restraint.definitions.len() {
                return Err(EngineError::InvalidSnapshot(format!(
                    "expected {} angle measures, got {}",
                    restraint.definitions.len(),
                    data.len()
                )));
            }
            let error = angle_standard_error(&data);
            restraint.data = Some(data);
            restraint.books.commit(error);
        }
        Ok(restraint)
    }
}

impl Restraint for ImproperRestraint {
    fn kind(&self) -> RestraintKind {
        RestraintKind::ImproperAngle
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
                let compiled = self.source.compile(system.atoms())?;
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

    fn set_geometry_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance;
    }

    fn compute_data(&mut self, system: &AtomicSystem) -> Result<f64, EngineError> {
        self.books.ensure_attached()?;
        self.books.ensure_layout(system)?;
        self.cycle.reset();

        let included: Vec<usize> = (0..self.definitions.len())
            .filter(|&d| !self.is_excluded(d))
            .collect();
        let measured = self.measure(system, &included)?;
        let mut data = vec![AngleMeasure::default(); self.definitions.len()];
        for (d, measure) in included.into_iter().zip(measured) {
            data[d] = measure;
        }

        let error = angle_standard_error(&data);
        self.data = Some(data);
        self.books.commit(error);
        debug!(standard_error = error, "Improper angle data computed.");
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
        self.books.collector().relative_indexes(reals)?;

        let definitions = self.touched(reals);
        let measures = self.measure(system, &definitions)?;
        trace!(
            atoms = reals.len(),
            definitions = definitions.len(),
            "Improper angles before move."
        );
        self.cycle.begin(
            reals,
            AnglePartial {
                definitions,
                measures,
            },
        )
    }

    fn evaluate_after_move(
        &mut self,
        system: &AtomicSystem,
        reals: &[usize],
    ) -> Result<f64, EngineError> {
        self.books.ensure_ready(system, self.data.is_some())?;
        self.cycle.ensure_after_move(reals)?;
        let definitions = self
            .cycle
            .before()
            .map(|before| before.definitions.clone())
            .ok_or_else(|| EngineError::Internal("missing before-move data".to_string()))?;

        let measures = self.measure(system, &definitions)?;
        let mut patched = self.committed()?.to_vec();
        for (&d, &measure) in definitions.iter().zip(&measures) {
            patched[d] = measure;
        }
        let tentative = angle_standard_error(&patched);

        self.cycle.record_after(
            reals,
            AnglePartial {
                definitions,
                measures,
            },
            tentative,
        )?;
        self.books.set_tentative(Some(tentative));
        trace!(tentative, "Improper angles after move.");
        Ok(tentative)
    }

    fn accept_move(&mut self, reals: &[usize]) -> Result<(), EngineError> {
        self.committed()?;
        let (_, after, tentative) = self.cycle.finish(reals)?;
        let data = self.data.as_mut().ok_or(EngineError::NotComputed)?;
        for (&d, &measure) in after.definitions.iter().zip(&after.measures) {
            data[d] = measure;
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
        self.books.collector().relative_index(real)?;
        let (_, patched) = self.without_atom(real)?;
        let tentative = angle_standard_error(&patched);
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
        let (definitions, patched) = self.without_atom(real)?;

        self.books.collect(real)?;
        self.refresh_quads()?;
        let error = angle_standard_error(&patched);
        self.data = Some(patched);
        self.books.commit(error);
        trace!(excluded = definitions.len(), "Improper angles excluded.");
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
        self.refresh_quads()?;
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
