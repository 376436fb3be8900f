use serde::{Deserialize, Serialize};

/// An atomic attribute that can be used to select atoms by value.
///
/// Selection by attribute is resolved against the frozen original atom table, so the
/// resulting indexes always refer to stable real atom identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AtomAttribute {
    /// The chemical element symbol (e.g., "Al", "Cl").
    Element,
    /// The atom name as given by the structure (e.g., "C1", "AU").
    Name,
    /// The name of the molecule (residue) the atom belongs to.
    MoleculeName,
}

/// Attribute record of a single atom, as captured when the system was attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomRecord {
    /// The chemical element symbol.
    pub element: String,
    /// The atom name.
    pub name: String,
    /// Index of the molecule this atom belongs to.
    pub molecule_index: usize,
    /// Name of the molecule this atom belongs to.
    pub molecule_name: String,
}

impl AtomRecord {
    /// Creates a new `AtomRecord`.
    ///
    /// # Arguments
    ///
    /// * `element` - The element symbol.
    /// * `name` - The atom name.
    /// * `molecule_index` - The molecule index of the atom.
    /// * `molecule_name` - The molecule name of the atom.
    pub fn new(element: &str, name: &str, molecule_index: usize, molecule_name: &str) -> Self {
        Self {
            element: element.to_string(),
            name: name.to_string(),
            molecule_index,
            molecule_name: molecule_name.to_string(),
        }
    }

    /// Returns the value of the requested attribute.
    pub fn attribute(&self, attribute: AtomAttribute) -> &str {
        match attribute {
            AtomAttribute::Element => &self.element,
            AtomAttribute::Name => &self.name,
            AtomAttribute::MoleculeName => &self.molecule_name,
        }
    }
}
