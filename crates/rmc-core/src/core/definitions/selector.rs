use crate::core::models::atom::{AtomAttribute, AtomRecord};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("No atom has {attribute:?} '{value}'")]
    UnknownValue {
        attribute: AtomAttribute,
        value: String,
    },

    #[error("Atom index {index} is out of range for {len} atoms")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Explicit index set is empty")]
    EmptyIndexSet,

    #[error("Atom {0} is used more than once in the same tuple")]
    RepeatedAtom(usize),

    #[error("Molecule {molecule} has no atom named '{name}'")]
    MissingAtomName { molecule: usize, name: String },
}

/// Selects a group of atoms from the frozen atom table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AtomSelector {
    /// Every atom of the given element.
    ByElement(String),
    /// Every atom whose attribute equals `value`.
    ByAttribute { key: AtomAttribute, value: String },
    /// An explicit set of real atom indexes.
    ByIndexSet(BTreeSet<usize>),
}

impl AtomSelector {
    pub fn element(name: &str) -> Self {
        AtomSelector::ByElement(name.to_string())
    }

    pub fn attribute(key: AtomAttribute, value: &str) -> Self {
        AtomSelector::ByAttribute {
            key,
            value: value.to_string(),
        }
    }

    pub fn indexes<I: IntoIterator<Item = usize>>(indexes: I) -> Self {
        AtomSelector::ByIndexSet(indexes.into_iter().collect())
    }

    /// Resolves the selector into a sorted, deduplicated list of real atom indexes.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::UnknownValue`] if no atom matches an element or attribute
    /// selector, and [`SelectionError::IndexOutOfRange`] or
    /// [`SelectionError::EmptyIndexSet`] for unusable explicit sets.
    pub fn resolve(&self, atoms: &[AtomRecord]) -> Result<Vec<usize>, SelectionError> {
        let (attribute, value) = match self {
            AtomSelector::ByIndexSet(set) => {
                if set.is_empty() {
                    return Err(SelectionError::EmptyIndexSet);
                }
                if let Some(&index) = set.iter().find(|&&index| index >= atoms.len()) {
                    return Err(SelectionError::IndexOutOfRange {
                        index,
                        len: atoms.len(),
                    });
                }
                return Ok(set.iter().copied().collect());
            }
            AtomSelector::ByElement(name) => (AtomAttribute::Element, name.as_str()),
            AtomSelector::ByAttribute { key, value } => (*key, value.as_str()),
        };

        let selected = atoms
            .iter()
            .positions(|atom| atom.attribute(attribute) == value)
            .collect::<Vec<_>>();

        if selected.is_empty() {
            return Err(SelectionError::UnknownValue {
                attribute,
                value: value.to_string(),
            });
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atoms() -> Vec<AtomRecord> {
        vec![
            AtomRecord::new("Al", "AL1", 0, "ALC"),
            AtomRecord::new("Cl", "CL1", 0, "ALC"),
            AtomRecord::new("Cl", "CL2", 0, "ALC"),
            AtomRecord::new("Al", "AL1", 1, "ALC"),
            AtomRecord::new("O", "OW", 2, "WAT"),
        ]
    }

    #[test]
    fn element_selector_returns_sorted_indexes() {
        let selected = AtomSelector::element("Cl").resolve(&atoms()).unwrap();
        assert_eq!(selected, vec![1, 2]);
    }

    #[test]
    fn attribute_selector_matches_names_and_molecules() {
        let atoms = atoms();
        assert_eq!(
            AtomSelector::attribute(AtomAttribute::Name, "AL1")
                .resolve(&atoms)
                .unwrap(),
            vec![0, 3]
        );
        assert_eq!(
            AtomSelector::attribute(AtomAttribute::MoleculeName, "WAT")
                .resolve(&atoms)
                .unwrap(),
            vec![4]
        );
    }

    #[test]
    fn index_set_is_deduplicated_and_range_checked() {
        let atoms = atoms();
        assert_eq!(
            AtomSelector::indexes([3, 1, 3]).resolve(&atoms).unwrap(),
            vec![1, 3]
        );
        assert_eq!(
            AtomSelector::indexes([0, 5]).resolve(&atoms),
            Err(SelectionError::IndexOutOfRange { index: 5, len: 5 })
        );
        assert_eq!(
            AtomSelector::ByIndexSet(BTreeSet::new()).resolve(&atoms),
            Err(SelectionError::EmptyIndexSet)
        );
    }

    #[test]
    fn unknown_values_are_rejected() {
        let err = AtomSelector::element("Xe").resolve(&atoms()).unwrap_err();
        assert_eq!(
            err,
            SelectionError::UnknownValue {
                attribute: AtomAttribute::Element,
                value: "Xe".to_string()
            }
        );
    }

    #[test]
    fn selectors_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            selector: AtomSelector,
        }
        let parsed: Wrapper = toml::from_str(
            r#"
            [selector.by-attribute]
            key = "molecule-name"
            value = "WAT"
            "#,
        )
        .unwrap();
        assert_eq!(
            parsed.selector,
            AtomSelector::attribute(AtomAttribute::MoleculeName, "WAT")
        );

        let parsed: Wrapper = toml::from_str(r#"selector = { by-index-set = [2, 0] }"#).unwrap();
        assert_eq!(parsed.selector, AtomSelector::indexes([0, 2]));
    }
}
