use crate::core::geometry::improper::DEFAULT_GEOMETRY_TOLERANCE;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },
}

/// Settings shared by every restraint of a [`RestraintSet`](super::registry::RestraintSet).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Number of worker threads used to dispatch across restraints. `None` uses the
    /// global pool.
    pub workers: Option<usize>,
    /// Length below which improper vectors and plane normals are treated as degenerate.
    pub geometry_tolerance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: None,
            geometry_tolerance: DEFAULT_GEOMETRY_TOLERANCE,
        }
    }
}

#[derive(Default)]
pub struct EngineConfigBuilder {
    workers: Option<usize>,
    geometry_tolerance: Option<f64>,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }
    pub fn geometry_tolerance(mut self, tolerance: f64) -> Self {
        self.geometry_tolerance = Some(tolerance);
        self
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        if self.workers == Some(0) {
            return Err(ConfigError::InvalidParameter {
                parameter: "workers",
                reason: "at least one worker is required".to_string(),
            });
        }
        let geometry_tolerance = self
            .geometry_tolerance
            .unwrap_or(DEFAULT_GEOMETRY_TOLERANCE);
        if !geometry_tolerance.is_finite() || geometry_tolerance <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "geometry_tolerance",
                reason: format!("expected a positive finite number, got {geometry_tolerance}"),
            });
        }
        Ok(EngineConfig {
            workers: self.workers,
            geometry_tolerance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_uses_defaults_for_unset_parameters() {
        let config = EngineConfigBuilder::new().build().unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn build_rejects_zero_workers_and_bad_tolerance() {
        assert!(matches!(
            EngineConfigBuilder::new().workers(0).build(),
            Err(ConfigError::InvalidParameter {
                parameter: "workers",
                ..
            })
        ));
        for tolerance in [0.0, -1e-6, f64::NAN] {
            assert!(matches!(
                EngineConfigBuilder::new()
                    .geometry_tolerance(tolerance)
                    .build(),
                Err(ConfigError::InvalidParameter {
                    parameter: "geometry_tolerance",
                    ..
                })
            ));
        }
    }

    #[test]
    fn build_keeps_explicit_values() {
        let config = EngineConfigBuilder::new()
            .workers(3)
            .geometry_tolerance(1e-8)
            .build()
            .unwrap();
        assert_eq!(config.workers, Some(3));
        assert_eq!(config.geometry_tolerance, 1e-8);
    }
}
