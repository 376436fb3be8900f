use super::membership::MembershipIndex;
use super::selector::SelectionError;
use super::{CompileNote, DefinitionError, ensure_finite};
use crate::core::models::atom::AtomRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

const MAX_IMPROPER_DEGREES: f64 = 90.0;

/// Improper angle as written by the user, with bounds in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleSpec {
    pub improper: usize,
    pub origin: usize,
    pub x: usize,
    pub y: usize,
    pub lower: f64,
    pub upper: f64,
}

impl AngleSpec {
    pub fn new(improper: usize, origin: usize, x: usize, y: usize, lower: f64, upper: f64) -> Self {
        Self {
            improper,
            origin,
            x,
            y,
            lower,
            upper,
        }
    }
}

/// A compiled improper angle with bounds in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleDefinition {
    pub improper: usize,
    pub origin: usize,
    pub x: usize,
    pub y: usize,
    pub lower: f64,
    pub upper: f64,
}

impl AngleDefinition {
    pub fn atoms(&self) -> [usize; 4] {
        [self.improper, self.origin, self.x, self.y]
    }

    /// Whether both angles use the same improper atom and the same three plane atoms.
    pub fn same_tuple(&self, other: &AngleDefinition) -> bool {
        let mut a = [self.origin, self.x, self.y];
        let mut b = [other.origin, other.x, other.y];
        a.sort_unstable();
        b.sort_unstable();
        self.improper == other.improper && a == b
    }
}

/// One entry of an angle template, atoms referred to by name inside a molecule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateEntry {
    pub improper: String,
    pub origin: String,
    pub x: String,
    pub y: String,
    pub lower: f64,
    pub upper: f64,
}

impl TemplateEntry {
    fn same_tuple(&self, other: &TemplateEntry) -> bool {
        let mut a = [&self.origin, &self.x, &self.y];
        let mut b = [&other.origin, &other.x, &other.y];
        a.sort_unstable();
        b.sort_unstable();
        self.improper == other.improper && a == b
    }
}

/// Angle definitions written once per molecule name and applied to every molecule
/// instance carrying that name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AngleTemplate {
    pub molecules: BTreeMap<String, Vec<TemplateEntry>>,
}

impl AngleTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, molecule: &str, entry: TemplateEntry) -> Self {
        self.molecules
            .entry(molecule.to_string())
            .or_default()
            .push(entry);
        self
    }

    /// Expands the template into explicit specs, one per entry and molecule instance.
    pub fn expand(
        &self,
        atoms: &[AtomRecord],
    ) -> Result<(Vec<AngleSpec>, Vec<CompileNote>), DefinitionError> {
        let mut instances: BTreeMap<usize, (&str, HashMap<&str, usize>)> = BTreeMap::new();
        for (real, atom) in atoms.iter().enumerate() {
            let (_, names) = instances
                .entry(atom.molecule_index)
                .or_insert_with(|| (atom.molecule_name.as_str(), HashMap::new()));
            names.entry(atom.name.as_str()).or_insert(real);
        }

        let mut specs = Vec::new();
        let mut notes = Vec::new();

        for (molecule_name, entries) in &self.molecules {
            let matching: Vec<_> = instances
                .iter()
                .filter(|(_, (name, _))| *name == molecule_name.as_str())
                .collect();
            if matching.is_empty() {
                notes.push(CompileNote::UnknownMolecule {
                    name: molecule_name.clone(),
                });
                continue;
            }

            let mut kept: Vec<&TemplateEntry> = Vec::with_capacity(entries.len());
            for (position, entry) in entries.iter().enumerate() {
                if kept.iter().any(|k| k.same_tuple(entry)) {
                    notes.push(CompileNote::RedundantTemplateEntry {
                        molecule: molecule_name.clone(),
                        entry: position,
                    });
                } else {
                    kept.push(entry);
                }
            }

            for (&molecule, (_, names)) in matching {
                for entry in &kept {
                    let lookup = |name: &String| {
                        names.get(name.as_str()).copied().ok_or_else(|| {
                            DefinitionError::InvalidSelector {
                                definition: specs.len(),
                                source: SelectionError::MissingAtomName {
                                    molecule,
                                    name: name.clone(),
                                },
                            }
                        })
                    };
                    let spec = AngleSpec::new(
                        lookup(&entry.improper)?,
                        lookup(&entry.origin)?,
                        lookup(&entry.x)?,
                        lookup(&entry.y)?,
                        entry.lower,
                        entry.upper,
                    );
                    specs.push(spec);
                }
            }
        }
        Ok((specs, notes))
    }
}

/// Where the angle definitions of a restraint come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AngleSource {
    Explicit(Vec<AngleSpec>),
    Template(AngleTemplate),
}

impl Default for AngleSource {
    fn default() -> Self {
        AngleSource::Explicit(Vec::new())
    }
}

impl AngleSource {
    pub fn compile(&self, atoms: &[AtomRecord]) -> Result<CompiledAngles, DefinitionError> {
        match self {
            AngleSource::Explicit(specs) => compile_angles(specs, atoms),
            AngleSource::Template(template) => {
                let (specs, mut notes) = template.expand(atoms)?;
                let mut compiled = compile_angles(&specs, atoms)?;
                notes.append(&mut compiled.notes);
                compiled.notes = notes;
                Ok(compiled)
            }
        }
    }
}

/// Result of compiling a batch of angle specs.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledAngles {
    pub definitions: Vec<AngleDefinition>,
    /// `primary` is the improper-atom role, `secondary` covers origin, x and y.
    pub membership: MembershipIndex,
    pub notes: Vec<CompileNote>,
}

fn validate(definition: usize, spec: &AngleSpec, len: usize) -> Result<(), DefinitionError> {
    let atoms = [spec.improper, spec.origin, spec.x, spec.y];
    let selector_error = |source| DefinitionError::InvalidSelector { definition, source };
    if let Some(&index) = atoms.iter().find(|&&index| index >= len) {
        return Err(selector_error(SelectionError::IndexOutOfRange { index, len }));
    }
    for (i, atom) in atoms.iter().enumerate() {
        if atoms[i + 1..].contains(atom) {
            return Err(selector_error(SelectionError::RepeatedAtom(*atom)));
        }
    }

    ensure_finite(definition, "lower", spec.lower)?;
    ensure_finite(definition, "upper", spec.upper)?;
    if spec.lower < -MAX_IMPROPER_DEGREES || spec.upper > MAX_IMPROPER_DEGREES {
        return Err(DefinitionError::InvalidBounds {
            definition,
            reason: format!(
                "bounds [{}, {}] exceed [-{MAX_IMPROPER_DEGREES}, {MAX_IMPROPER_DEGREES}] degrees",
                spec.lower, spec.upper
            ),
        });
    }
    if spec.lower >= spec.upper {
        return Err(DefinitionError::InvalidBounds {
            definition,
            reason: format!(
                "lower bound {} must be below upper bound {}",
                spec.lower, spec.upper
            ),
        });
    }
    Ok(())
}

/// Compiles explicit angle specs against the frozen atom table.
///
/// A spec repeating the improper atom and plane atoms of an earlier one, in any order,
/// overwrites that definition's bounds and is reported as [`CompileNote::Redundant`].
pub fn compile_angles(
    specs: &[AngleSpec],
    atoms: &[AtomRecord],
) -> Result<CompiledAngles, DefinitionError> {
    let mut definitions: Vec<AngleDefinition> = Vec::with_capacity(specs.len());
    let mut notes = Vec::new();

    for (index, spec) in specs.iter().enumerate() {
        validate(index, spec, atoms.len())?;
        let candidate = AngleDefinition {
            improper: spec.improper,
            origin: spec.origin,
            x: spec.x,
            y: spec.y,
            lower: spec.lower.to_radians(),
            upper: spec.upper.to_radians(),
        };
        match definitions.iter().position(|d| d.same_tuple(&candidate)) {
            Some(existing) => {
                definitions[existing] = candidate;
                notes.push(CompileNote::Redundant {
                    definition: index,
                    replaces: existing,
                });
            }
            None => definitions.push(candidate),
        }
    }

    let others: Vec<[usize; 3]> = definitions
        .iter()
        .map(|d| {
            let mut plane = [d.origin, d.x, d.y];
            plane.sort_unstable();
            plane
        })
        .collect();
    let impropers: Vec<[usize; 1]> = definitions.iter().map(|d| [d.improper]).collect();
    let membership = MembershipIndex::build(
        atoms.len(),
        impropers
            .iter()
            .zip(&others)
            .enumerate()
            .map(|(i, (improper, plane))| (i, improper.as_slice(), plane.as_slice())),
    );
    debug!(
        definitions = definitions.len(),
        redundant = notes.len(),
        "Compiled improper angles."
    );

    Ok(CompiledAngles {
        definitions,
        membership,
        notes,
    })
}
