use super::membership::MembershipIndex;
use super::selector::AtomSelector;
use super::{CompileNote, DefinitionError, ensure_finite};
use crate::core::geometry::coordination::ShellWindow;
use crate::core::models::atom::AtomRecord;
use serde::{Deserialize, Serialize};
use tracing::debug;

fn default_weight() -> f64 {
    1.0
}

/// Coordination shell as written by the user, before selectors are resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellSpec {
    /// Atoms whose neighbours are counted.
    pub core: AtomSelector,
    /// Atoms counted as neighbours.
    pub shell: AtomSelector,
    /// Inclusive lower distance bound.
    pub lower: f64,
    /// Exclusive upper distance bound.
    pub upper: f64,
    /// Minimum mean number of neighbours per core atom.
    pub min_neighbours: f64,
    /// Maximum mean number of neighbours per core atom.
    pub max_neighbours: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl ShellSpec {
    pub fn new(
        core: AtomSelector,
        shell: AtomSelector,
        lower: f64,
        upper: f64,
        min_neighbours: f64,
        max_neighbours: f64,
    ) -> Self {
        Self {
            core,
            shell,
            lower,
            upper,
            min_neighbours,
            max_neighbours,
            weight: default_weight(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// A compiled coordination shell with resolved real atom indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellDefinition {
    pub core: Vec<usize>,
    pub shell: Vec<usize>,
    pub lower: f64,
    pub upper: f64,
    pub min_neighbours: f64,
    pub max_neighbours: f64,
    pub weight: f64,
}

impl ShellDefinition {
    pub fn window(&self) -> ShellWindow {
        ShellWindow::new(self.lower, self.upper)
    }

    /// Whether both definitions count the same core/shell pairs.
    pub fn same_tuple(&self, other: &ShellDefinition) -> bool {
        self.core == other.core && self.shell == other.shell
    }

    fn take_bounds_from(&mut self, other: ShellDefinition) {
        self.lower = other.lower;
        self.upper = other.upper;
        self.min_neighbours = other.min_neighbours;
        self.max_neighbours = other.max_neighbours;
        self.weight = other.weight;
    }
}

/// Result of compiling a batch of shell specs.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledShells {
    pub definitions: Vec<ShellDefinition>,
    /// `primary` is the as-core role, `secondary` the in-shell role.
    pub membership: MembershipIndex,
    pub notes: Vec<CompileNote>,
}

fn validate_bounds(definition: usize, spec: &ShellSpec) -> Result<(), DefinitionError> {
    ensure_finite(definition, "lower", spec.lower)?;
    ensure_finite(definition, "upper", spec.upper)?;
    ensure_finite(definition, "min_neighbours", spec.min_neighbours)?;
    ensure_finite(definition, "max_neighbours", spec.max_neighbours)?;
    ensure_finite(definition, "weight", spec.weight)?;

    let invalid = |reason: String| Err(DefinitionError::InvalidBounds { definition, reason });
    if spec.lower < 0.0 {
        return invalid(format!("lower distance {} is negative", spec.lower));
    }
    if spec.upper <= spec.lower {
        return invalid(format!(
            "upper distance {} must exceed lower distance {}",
            spec.upper, spec.lower
        ));
    }
    if spec.min_neighbours < 0.0 {
        return invalid(format!(
            "minimum neighbours {} is negative",
            spec.min_neighbours
        ));
    }
    if spec.max_neighbours < spec.min_neighbours {
        return invalid(format!(
            "maximum neighbours {} is below minimum {}",
            spec.max_neighbours, spec.min_neighbours
        ));
    }
    if spec.weight <= 0.0 {
        return invalid(format!("weight {} must be positive", spec.weight));
    }
    Ok(())
}

/// Compiles shell specs against the frozen atom table.
///
/// A spec repeating the core/shell sets of an earlier one overwrites that definition's
/// bounds in place and is reported as [`CompileNote::Redundant`].
pub fn compile_shells(
    specs: &[ShellSpec],
    atoms: &[AtomRecord],
) -> Result<CompiledShells, DefinitionError> {
    let mut definitions: Vec<ShellDefinition> = Vec::with_capacity(specs.len());
    let mut notes = Vec::new();

    for (index, spec) in specs.iter().enumerate() {
        let resolve = |selector: &AtomSelector| {
            selector
                .resolve(atoms)
                .map_err(|source| DefinitionError::InvalidSelector {
                    definition: index,
                    source,
                })
        };
        let core = resolve(&spec.core)?;
        let shell = resolve(&spec.shell)?;
        validate_bounds(index, spec)?;

        let candidate = ShellDefinition {
            core,
            shell,
            lower: spec.lower,
            upper: spec.upper,
            min_neighbours: spec.min_neighbours,
            max_neighbours: spec.max_neighbours,
            weight: spec.weight,
        };

        match definitions.iter().position(|d| d.same_tuple(&candidate)) {
            Some(existing) => {
                definitions[existing].take_bounds_from(candidate);
                notes.push(CompileNote::Redundant {
                    definition: index,
                    replaces: existing,
                });
            }
            None => definitions.push(candidate),
        }
    }

    let membership = MembershipIndex::build(
        atoms.len(),
        definitions
            .iter()
            .enumerate()
            .map(|(i, d)| (i, d.core.as_slice(), d.shell.as_slice())),
    );
    debug!(
        definitions = definitions.len(),
        redundant = notes.len(),
        "Compiled coordination shells."
    );

    Ok(CompiledShells {
        definitions,
        membership,
        notes,
    })
}
