use crate::error::{CliError, Result};
use nalgebra::Point3;
use rmcore::core::definitions::angle::AngleSource;
use rmcore::core::definitions::shell::ShellSpec;
use rmcore::core::geometry::cell::SimulationBox;
use rmcore::core::models::atom::AtomRecord;
use rmcore::core::models::system::AtomicSystem;
use rmcore::engine::config::{EngineConfig, EngineConfigBuilder};
use rmcore::workflows::evaluate::EvaluationPlan;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct FileAtom {
    element: String,
    name: String,
    #[serde(default)]
    molecule: usize,
    #[serde(rename = "molecule-name", default)]
    molecule_name: String,
    position: [f64; 3],
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
struct FileSystem {
    /// Box vectors `a`, `b` and `c`; an absent cell means open boundaries.
    cell: Option<[[f64; 3]; 3]>,
    #[serde(default)]
    atoms: Vec<FileAtom>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
struct PartialEngineConfig {
    workers: Option<usize>,
    #[serde(rename = "geometry-tolerance")]
    geometry_tolerance: Option<f64>,
}

/// A run file as written by the user, before command-line overrides.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialRunConfig {
    engine: Option<PartialEngineConfig>,
    system: FileSystem,
    #[serde(default)]
    coordination: Vec<ShellSpec>,
    impropers: Option<AngleSource>,
}

/// Everything a command needs to set up the restraint engine.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub system: AtomicSystem,
    pub plan: EvaluationPlan,
    pub engine: EngineConfig,
}

/// Command-line values that take precedence over the run file.
#[derive(Debug, Default, Clone)]
pub struct Overrides<'a> {
    pub workers: Option<usize>,
    pub geometry_tolerance: Option<f64>,
    pub set_values: &'a [String],
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading run file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| CliError::RunFile {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn merge_with_cli(mut self, overrides: &Overrides) -> Result<RunConfig> {
        self.apply_set_values(overrides.set_values)?;
        let file_engine = self.engine.take().unwrap_or_default();

        let mut builder = EngineConfigBuilder::new();
        if let Some(workers) = overrides.workers.or(file_engine.workers) {
            builder = builder.workers(workers);
        }
        if let Some(tolerance) = overrides
            .geometry_tolerance
            .or(file_engine.geometry_tolerance)
        {
            builder = builder.geometry_tolerance(tolerance);
        }
        let engine = builder
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;

        let system = build_system(self.system)?;
        let plan = EvaluationPlan {
            coordination: self.coordination,
            impropers: self.impropers.unwrap_or_default(),
        };
        debug!(
            atoms = system.num_atoms(),
            shells = plan.coordination.len(),
            "Run configuration resolved."
        );
        Ok(RunConfig {
            system,
            plan,
            engine,
        })
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::InvalidOverride {
                    key: kv_pair.clone(),
                    reason: "expected KEY=VALUE".to_string(),
                });
            };
            let invalid = |reason: String| CliError::InvalidOverride {
                key: key.to_string(),
                reason,
            };

            match key {
                "engine.workers" => {
                    self.engine.get_or_insert_with(Default::default).workers =
                        Some(value_str.parse().map_err(|e| {
                            invalid(format!("'{value_str}' is not a worker count ({e})"))
                        })?);
                }
                "engine.geometry-tolerance" => {
                    self.engine
                        .get_or_insert_with(Default::default)
                        .geometry_tolerance = Some(value_str.parse().map_err(|e| {
                        invalid(format!("'{value_str}' is not a number ({e})"))
                    })?);
                }
                _ => return Err(invalid("unsupported key".to_string())),
            }
        }
        Ok(())
    }
}

fn build_system(file: FileSystem) -> Result<AtomicSystem> {
    if file.atoms.is_empty() {
        return Err(CliError::Config(
            "The run file must list at least one atom under [[system.atoms]].".to_string(),
        ));
    }
    let cell = match file.cell {
        Some([a, b, c]) => SimulationBox::from_vectors(a, b, c)
            .map_err(|e| CliError::Config(format!("Invalid simulation box: {e}")))?,
        None => SimulationBox::open(),
    };
    let (atoms, positions): (Vec<_>, Vec<_>) = file
        .atoms
        .into_iter()
        .map(|atom| {
            let [x, y, z] = atom.position;
            (
                AtomRecord::new(&atom.element, &atom.name, atom.molecule, &atom.molecule_name),
                Point3::new(x, y, z),
            )
        })
        .unzip();
    AtomicSystem::new(atoms, positions, cell)
        .map_err(|e| CliError::Config(format!("Invalid atomic system: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const RUN_FILE: &str = r#"
        [engine]
        workers = 2

        [system]
        cell = [[10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]]

        [[system.atoms]]
        element = "Al"
        name = "AL"
        molecule-name = "ALC"
        position = [0.0, 0.0, 0.0]

        [[system.atoms]]
        element = "Cl"
        name = "CL1"
        molecule-name = "ALC"
        position = [1.0, 0.0, 0.0]

        [[system.atoms]]
        element = "Cl"
        name = "CL2"
        molecule-name = "ALC"
        position = [9.5, 0.0, 0.0]

        [[coordination]]
        core = { by-element = "Al" }
        shell = { by-element = "Cl" }
        lower = 0.2
        upper = 1.5
        min_neighbours = 2.0
        max_neighbours = 2.0
    "#;

    #[test]
    fn run_file_is_read_and_merged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, RUN_FILE).unwrap();

        let config = PartialRunConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&Overrides::default())
            .unwrap();
        assert_eq!(config.engine.workers, Some(2));
        assert_eq!(config.system.num_atoms(), 3);
        assert!(config.system.cell().is_periodic());
        assert_eq!(config.system.atoms()[1].molecule_name, "ALC");
        assert_eq!(config.plan.coordination.len(), 1);
        assert!(matches!(&config.plan.impropers, AngleSource::Explicit(specs) if specs.is_empty()));
    }

    #[test]
    fn cli_overrides_file_values() {
        let set_values = vec!["engine.geometry-tolerance=0.001".to_string()];
        let overrides = Overrides {
            workers: Some(8),
            geometry_tolerance: None,
            set_values: &set_values,
        };
        let config = PartialRunConfig::from_toml(RUN_FILE)
            .unwrap()
            .merge_with_cli(&overrides)
            .unwrap();
        assert_eq!(config.engine.workers, Some(8));
        assert_eq!(config.engine.geometry_tolerance, 0.001);
    }

    fn merge_with_set(set_values: &[&str]) -> Result<RunConfig> {
        let set_values: Vec<String> = set_values.iter().map(|s| s.to_string()).collect();
        PartialRunConfig::from_toml(RUN_FILE).unwrap().merge_with_cli(&Overrides {
            set_values: &set_values,
            ..Overrides::default()
        })
    }

    #[test]
    fn bad_set_overrides_name_the_failing_key() {
        assert!(matches!(
            merge_with_set(&["engine.speed=3"]),
            Err(CliError::InvalidOverride { key, .. }) if key == "engine.speed"
        ));
        assert!(matches!(
            merge_with_set(&["engine.workers=many"]),
            Err(CliError::InvalidOverride { key, reason })
                if key == "engine.workers" && reason.contains("many")
        ));
        assert!(matches!(
            merge_with_set(&["engine.workers"]),
            Err(CliError::InvalidOverride { key, .. }) if key == "engine.workers"
        ));
        assert_eq!(
            merge_with_set(&["engine.workers=3"]).unwrap().engine.workers,
            Some(3)
        );
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let result = PartialRunConfig::from_toml(RUN_FILE).unwrap().merge_with_cli(&Overrides {
            workers: Some(0),
            ..Overrides::default()
        });
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn unknown_fields_fail_to_parse() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(&path, format!("{RUN_FILE}\n[extra]\nvalue = 1\n")).unwrap();
        assert!(matches!(
            PartialRunConfig::from_file(&path),
            Err(CliError::RunFile { .. })
        ));
    }

    #[test]
    fn empty_system_is_rejected() {
        let result = PartialRunConfig::from_toml("[system]\n")
            .unwrap()
            .merge_with_cli(&Overrides::default());
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
