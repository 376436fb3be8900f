use crate::cli::CheckArgs;
use crate::config::{Overrides, PartialRunConfig};
use crate::error::Result;
use crate::utils::notices::CliNoticeHandler;
use rmcore::engine::diagnostics::Diagnostics;
use rmcore::workflows;
use tracing::info;

pub fn run(args: CheckArgs) -> Result<()> {
    let config = PartialRunConfig::from_file(&args.config)?.merge_with_cli(&Overrides::default())?;

    let handler = CliNoticeHandler::new();
    let diagnostics = Diagnostics::with_callback(handler.get_callback());
    let counts = workflows::evaluate::check(&config.system, &config.plan, &diagnostics)?;
    info!("Run file {:?} compiled.", &args.config);

    for message in handler.messages() {
        println!("Warning: {message}");
    }
    println!(
        "{} atoms, {} shell definition(s), {} improper angle definition(s).",
        config.system.num_atoms(),
        counts.shell_definitions,
        counts.angle_definitions
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use std::fs;
    use tempfile::tempdir;

    const ATOMS: &str = r#"
        [system]
        [[system.atoms]]
        element = "Al"
        name = "AL"
        position = [0.0, 0.0, 0.0]
        [[system.atoms]]
        element = "Cl"
        name = "CL"
        position = [1.0, 0.0, 0.0]
    "#;

    #[test]
    fn valid_run_file_passes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.toml");
        let content = format!(
            "{ATOMS}\n[[coordination]]\ncore = {{ by-element = \"Al\" }}\nshell = {{ by-index-set = [1] }}\nlower = 0.0\nupper = 2.0\nmin_neighbours = 1.0\nmax_neighbours = 4.0\n"
        );
        fs::write(&path, content).unwrap();
        run(CheckArgs { config: path }).unwrap();
    }

    #[test]
    fn selector_without_match_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.toml");
        let content = format!(
            "{ATOMS}\n[[coordination]]\ncore = {{ by-element = \"Xe\" }}\nshell = {{ by-element = \"Cl\" }}\nlower = 0.0\nupper = 2.0\nmin_neighbours = 1.0\nmax_neighbours = 4.0\n"
        );
        fs::write(&path, content).unwrap();
        assert!(matches!(
            run(CheckArgs { config: path }),
            Err(CliError::Core(_))
        ));
    }
}
