//! Reduction of per-definition data into one scalar objective per restraint kind.
//!
//! These functions only read their inputs, so they can be evaluated against committed
//! data or against a patched copy describing a hypothetical state.

use super::definitions::shell::ShellDefinition;
use super::geometry::improper::AngleMeasure;

/// Weighted deviation of a mean neighbour count from `[min_neighbours, max_neighbours]`.
///
/// A definition with no active core atom has no mean and contributes nothing.
#[inline]
pub fn shell_deviation(definition: &ShellDefinition, count: f64, active_cores: usize) -> f64 {
    if active_cores == 0 {
        return 0.0;
    }
    let mean = count / active_cores as f64;
    if mean < definition.min_neighbours {
        definition.weight * (definition.min_neighbours - mean)
    } else if mean > definition.max_neighbours {
        definition.weight * (mean - definition.max_neighbours)
    } else {
        0.0
    }
}

/// Sum of shell deviations over all definitions.
pub fn shell_standard_error(
    definitions: &[ShellDefinition],
    counts: &[f64],
    active_cores: &[usize],
) -> f64 {
    definitions
        .iter()
        .zip(counts)
        .zip(active_cores)
        .map(|((definition, &count), &cores)| shell_deviation(definition, count, cores))
        .sum()
}

/// Sum of squared reduced deviations over all angles.
pub fn angle_standard_error(measures: &[AngleMeasure]) -> f64 {
    measures.iter().map(|m| m.reduced * m.reduced).sum()
}
