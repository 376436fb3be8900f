use crate::core::definitions::angle::{AngleDefinition, AngleSource};
use crate::core::definitions::shell::{ShellDefinition, ShellSpec, compile_shells};
use crate::core::geometry::improper::AngleMeasure;
use crate::core::models::system::AtomicSystem;
use crate::engine::config::EngineConfig;
use crate::engine::diagnostics::{Diagnostics, Notice};
use crate::engine::error::EngineError;
use crate::engine::registry::RestraintSet;
use crate::engine::restraint::{Restraint, RestraintKind};
use crate::engine::restraints::coordination::{CoordinationRestraint, ShellData};
use crate::engine::restraints::improper::ImproperRestraint;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Restraint definitions to evaluate against one atomic system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EvaluationPlan {
    #[serde(default)]
    pub coordination: Vec<ShellSpec>,
    #[serde(default)]
    pub impropers: AngleSource,
}

impl EvaluationPlan {
    fn has_impropers(&self) -> bool {
        match &self.impropers {
            AngleSource::Explicit(specs) => !specs.is_empty(),
            AngleSource::Template(template) => !template.molecules.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestraintDetails {
    Coordination {
        definitions: Vec<ShellDefinition>,
        data: ShellData,
        deviations: Vec<f64>,
    },
    ImproperAngle {
        definitions: Vec<AngleDefinition>,
        measures: Vec<AngleMeasure>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestraintReport {
    pub kind: RestraintKind,
    pub standard_error: f64,
    pub details: RestraintDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Sum of the standard errors of every restraint.
    pub standard_error: f64,
    pub restraints: Vec<RestraintReport>,
}

/// Number of definitions a plan compiles to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckReport {
    pub shell_definitions: usize,
    pub angle_definitions: usize,
}

#[instrument(skip_all, name = "evaluate_workflow")]
pub fn run(
    system: AtomicSystem,
    plan: &EvaluationPlan,
    config: EngineConfig,
    diagnostics: &Diagnostics,
) -> Result<EvaluationReport, EngineError> {
    info!(
        atoms = system.num_atoms(),
        shells = plan.coordination.len(),
        "Starting restraint evaluation."
    );
    let mut set = RestraintSet::new(system, config, diagnostics)?;

    // === Phase 1: Attach restraints (compiles and computes committed data) ===
    let shells = if plan.coordination.is_empty() {
        None
    } else {
        let mut restraint = CoordinationRestraint::new();
        restraint.set_definition(plan.coordination.clone(), None, diagnostics)?;
        Some(set.register(restraint)?)
    };
    let angles = if plan.has_impropers() {
        let mut restraint = ImproperRestraint::new();
        restraint.set_source(plan.impropers.clone(), None, diagnostics)?;
        Some(set.register(restraint)?)
    } else {
        None
    };

    // === Phase 2: Collect per-definition results ===
    let mut restraints = Vec::new();
    if let Some(restraint) = shells.and_then(|id| set.get_as::<CoordinationRestraint>(id)) {
        restraints.push(coordination_report(restraint)?);
    }
    if let Some(restraint) = angles.and_then(|id| set.get_as::<ImproperRestraint>(id)) {
        restraints.push(improper_report(restraint)?);
    }

    let standard_error = restraints.iter().map(|r| r.standard_error).sum();
    info!(
        standard_error,
        restraints = restraints.len(),
        "Evaluation complete."
    );
    Ok(EvaluationReport {
        standard_error,
        restraints,
    })
}

fn coordination_report(restraint: &CoordinationRestraint) -> Result<RestraintReport, EngineError> {
    let (Some(standard_error), Some(data), Some(deviations)) = (
        restraint.standard_error(),
        restraint.data(),
        restraint.deviations(),
    ) else {
        return Err(EngineError::NotComputed);
    };
    Ok(RestraintReport {
        kind: restraint.kind(),
        standard_error,
        details: RestraintDetails::Coordination {
            definitions: restraint.definitions().to_vec(),
            data: data.clone(),
            deviations,
        },
    })
}

fn improper_report(restraint: &ImproperRestraint) -> Result<RestraintReport, EngineError> {
    let (Some(standard_error), Some(measures)) = (restraint.standard_error(), restraint.data())
    else {
        return Err(EngineError::NotComputed);
    };
    Ok(RestraintReport {
        kind: restraint.kind(),
        standard_error,
        details: RestraintDetails::ImproperAngle {
            definitions: restraint.definitions().to_vec(),
            measures: measures.to_vec(),
        },
    })
}

/// Compiles every definition of `plan` without computing anything, reporting compile
/// notes through `diagnostics`.
#[instrument(skip_all, name = "check_workflow")]
pub fn check(
    system: &AtomicSystem,
    plan: &EvaluationPlan,
    diagnostics: &Diagnostics,
) -> Result<CheckReport, EngineError> {
    let shells = compile_shells(&plan.coordination, system.atoms())?;
    for note in shells.notes {
        diagnostics.report(Notice::from_compile_note(RestraintKind::Coordination, note));
    }
    let angles = plan.impropers.compile(system.atoms())?;
    for note in angles.notes {
        diagnostics.report(Notice::from_compile_note(RestraintKind::ImproperAngle, note));
    }

    let report = CheckReport {
        shell_definitions: shells.definitions.len(),
        angle_definitions: angles.definitions.len(),
    };
    info!(
        shells = report.shell_definitions,
        angles = report.angle_definitions,
        "Definitions compiled."
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::definitions::angle::AngleSpec;
    use crate::core::definitions::selector::AtomSelector;
    use crate::core::geometry::cell::SimulationBox;
    use crate::core::models::atom::AtomRecord;
    use nalgebra::Point3;

    fn system() -> AtomicSystem {
        let atoms = vec![
            AtomRecord::new("Al", "AL", 0, "ALC"),
            AtomRecord::new("Cl", "CL1", 0, "ALC"),
            AtomRecord::new("Cl", "CL2", 0, "ALC"),
            AtomRecord::new("Cl", "CL3", 0, "ALC"),
        ];
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.3, 0.2, 1.0),
        ];
        AtomicSystem::new(atoms, positions, SimulationBox::open()).unwrap()
    }

    fn plan() -> EvaluationPlan {
        EvaluationPlan {
            coordination: vec![ShellSpec::new(
                AtomSelector::element("Al"),
                AtomSelector::element("Cl"),
                0.5,
                2.0,
                4.0,
                6.0,
            )],
            impropers: AngleSource::Explicit(vec![AngleSpec::new(3, 0, 1, 2, -10.0, 10.0)]),
        }
    }

    #[test]
    fn run_reports_every_restraint() {
        let report = run(system(), &plan(), EngineConfig::default(), &Diagnostics::new()).unwrap();
        assert_eq!(report.restraints.len(), 2);

        let shells = &report.restraints[0];
        assert_eq!(shells.kind, RestraintKind::Coordination);
        assert_eq!(shells.standard_error, 1.0);
        match &shells.details {
            RestraintDetails::Coordination {
                data, deviations, ..
            } => {
                assert_eq!(data.counts, vec![3.0]);
                assert_eq!(deviations, &vec![1.0]);
            }
            other => panic!("unexpected details {other:?}"),
        }

        let angles = &report.restraints[1];
        assert_eq!(angles.kind, RestraintKind::ImproperAngle);
        assert!(angles.standard_error > 0.0);
        assert!((report.standard_error - 1.0 - angles.standard_error).abs() < 1e-15);
    }

    #[test]
    fn empty_plan_reports_nothing() {
        let report = run(
            system(),
            &EvaluationPlan::default(),
            EngineConfig::default(),
            &Diagnostics::new(),
        )
        .unwrap();
        assert!(report.restraints.is_empty());
        assert_eq!(report.standard_error, 0.0);
    }

    #[test]
    fn check_counts_definitions_and_rejects_bad_plans() {
        let counts = check(&system(), &plan(), &Diagnostics::new()).unwrap();
        assert_eq!(
            counts,
            CheckReport {
                shell_definitions: 1,
                angle_definitions: 1
            }
        );

        let mut bad = plan();
        bad.coordination[0].core = AtomSelector::element("Xe");
        assert!(matches!(
            check(&system(), &bad, &Diagnostics::new()),
            Err(EngineError::Definition { .. })
        ));
    }

    #[test]
    fn plan_reads_from_toml() {
        let parsed: EvaluationPlan = toml::from_str(
            r#"
            [[coordination]]
            core = { by-element = "Al" }
            shell = { by-element = "Cl" }
            lower = 0.5
            upper = 2.0
            min_neighbours = 4.0
            max_neighbours = 6.0

            [impropers]
            explicit = [
                { improper = 3, origin = 0, x = 1, y = 2, lower = -10.0, upper = 10.0 },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(parsed, plan());
    }
}
