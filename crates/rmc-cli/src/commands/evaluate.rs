use crate::cli::EvaluateArgs;
use crate::config::{Overrides, PartialRunConfig};
use crate::error::{CliError, Result};
use crate::utils::notices::CliNoticeHandler;
use rmcore::engine::diagnostics::Diagnostics;
use rmcore::workflows::{self, evaluate::EvaluationReport, evaluate::RestraintDetails};
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

pub fn run(args: EvaluateArgs, threads: Option<usize>) -> Result<()> {
    let overrides = Overrides {
        workers: threads,
        geometry_tolerance: args.geometry_tolerance,
        set_values: &args.set_values,
    };
    info!("Merging run file {:?} with CLI arguments...", &args.config);
    let config = PartialRunConfig::from_file(&args.config)?.merge_with_cli(&overrides)?;

    let handler = CliNoticeHandler::new();
    let diagnostics = Diagnostics::with_callback(handler.get_callback());

    println!(
        "Evaluating restraints on {} atoms...",
        config.system.num_atoms()
    );
    let report = workflows::evaluate::run(config.system, &config.plan, config.engine, &diagnostics)?;

    for message in handler.messages() {
        println!("Warning: {message}");
    }
    print!("{}", format_report(&report)?);

    if let Some(path) = &args.output {
        write_report(&report, path)?;
        info!("Report written to {:?}", path);
        println!("Report written to {}", path.display());
    }
    Ok(())
}

/// Renders a report as one block per restraint and one line per definition.
pub fn format_report(report: &EvaluationReport) -> Result<String> {
    let mut out = String::new();
    for restraint in &report.restraints {
        writeln!(
            out,
            "[{}] standard error {:.6}",
            restraint.kind, restraint.standard_error
        )?;
        match &restraint.details {
            RestraintDetails::Coordination {
                definitions,
                data,
                deviations,
            } => {
                for (i, definition) in definitions.iter().enumerate() {
                    let mean = data
                        .mean(i)
                        .map_or_else(|| "-".to_string(), |m| format!("{m:.4}"));
                    writeln!(
                        out,
                        "  shell {i}: mean {mean} in [{}, {}] over {} cores, deviation {:.6}",
                        definition.min_neighbours,
                        definition.max_neighbours,
                        data.active_cores[i],
                        deviations[i]
                    )?;
                }
            }
            RestraintDetails::ImproperAngle {
                definitions,
                measures,
            } => {
                for (i, (definition, measure)) in definitions.iter().zip(measures).enumerate() {
                    writeln!(
                        out,
                        "  angle {i} {:?}: {:.3} deg in [{:.3}, {:.3}], reduced {:.3} deg",
                        definition.atoms(),
                        measure.angle.to_degrees(),
                        definition.lower.to_degrees(),
                        definition.upper.to_degrees(),
                        measure.reduced.to_degrees()
                    )?;
                }
            }
        }
    }
    writeln!(out, "Total standard error: {:.6}", report.standard_error)?;
    Ok(out)
}

fn write_report(report: &EvaluationReport, path: &Path) -> Result<()> {
    let failed = |source: anyhow::Error| CliError::ReportWrite {
        path: path.to_path_buf(),
        source,
    };
    let content = toml::to_string(report).map_err(|e| failed(e.into()))?;
    std::fs::write(path, content).map_err(|e| failed(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const RUN_FILE: &str = r#"
        [system]
        [[system.atoms]]
        element = "O"
        name = "O1"
        position = [0.9396926207859084, 0.0, 0.3420201433256687]
        [[system.atoms]]
        element = "C"
        name = "C1"
        position = [0.0, 0.0, 0.0]
        [[system.atoms]]
        element = "C"
        name = "C2"
        position = [1.0, 0.0, 0.0]
        [[system.atoms]]
        element = "C"
        name = "C3"
        position = [0.0, 1.0, 0.0]

        [[coordination]]
        core = { by-element = "O" }
        shell = { by-element = "C" }
        lower = 0.5
        upper = 1.2
        min_neighbours = 1.0
        max_neighbours = 1.0

        [impropers]
        explicit = [
            { improper = 0, origin = 1, x = 2, y = 3, lower = -10.0, upper = 10.0 },
        ]
    "#;

    fn args(config: &Path, output: Option<&Path>) -> EvaluateArgs {
        EvaluateArgs {
            config: config.to_path_buf(),
            output: output.map(Path::to_path_buf),
            geometry_tolerance: None,
            set_values: vec![],
        }
    }

    #[test]
    fn evaluate_writes_a_readable_report() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("run.toml");
        let output = dir.path().join("report.toml");
        fs::write(&config, RUN_FILE).unwrap();

        run(args(&config, Some(&output)), Some(1)).unwrap();

        let report: EvaluationReport =
            toml::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(report.restraints.len(), 2);
        let ten = 10f64.to_radians();
        assert!((report.standard_error - ten * ten).abs() < 1e-12);

        let text = format_report(&report).unwrap();
        assert!(text.contains("[coordination] standard error 0.000000"));
        assert!(text.contains("angle 0 [0, 1, 2, 3]: 20.000 deg in [-10.000, 10.000], reduced 10.000 deg"));
        assert!(text.ends_with(&format!("Total standard error: {:.6}\n", ten * ten)));
    }

    #[test]
    fn unwritable_report_path_names_the_report() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("run.toml");
        fs::write(&config, RUN_FILE).unwrap();

        let result = run(args(&config, Some(dir.path())), None);
        assert!(matches!(
            result,
            Err(CliError::ReportWrite { path, .. }) if path == dir.path()
        ));
    }

    #[test]
    fn missing_run_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let result = run(args(&dir.path().join("absent.toml"), None), None);
        assert!(matches!(result, Err(CliError::Io(_))));
    }

    #[test]
    fn definition_errors_surface_as_core_errors() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("run.toml");
        fs::write(&config, RUN_FILE.replace("lower = 0.5", "lower = 2.0")).unwrap();
        let result = run(args(&config, None), None);
        assert!(matches!(result, Err(CliError::Core(_))));
    }
}
