//! # Definitions Module
//!
//! Compilation of raw restraint input into resolved, validated definitions.
//!
//! ## Overview
//!
//! Raw specs are plain `serde` data referring to atoms through [`AtomSelector`]s or
//! explicit indexes. Compiling a batch of specs against the frozen atom table produces
//! sorted deduplicated index sets plus the inverse [`MembershipIndex`], built together in
//! one pass. Compilation never mutates anything: callers receive a complete candidate
//! or an error and decide themselves whether to publish it.
//!
//! ## Architecture
//!
//! - **Selectors** ([`selector`]) - Resolution of element, attribute and index-set selectors
//! - **Membership** ([`membership`]) - Per-atom role lists, the inverse of the definitions
//! - **Shells** ([`shell`]) - Coordination shell specs and their compiler
//! - **Angles** ([`angle`]) - Improper angle specs, molecule templates and their compiler

pub mod angle;
pub mod membership;
pub mod selector;
pub mod shell;

pub use membership::{AtomMembership, MembershipIndex};
pub use selector::{AtomSelector, SelectionError};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DefinitionError {
    #[error("Invalid selector in definition {definition}: {source}")]
    InvalidSelector {
        definition: usize,
        #[source]
        source: SelectionError,
    },

    #[error("Invalid bounds in definition {definition}: {reason}")]
    InvalidBounds { definition: usize, reason: String },
}

/// A non-fatal observation made while compiling a batch of specs.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileNote {
    /// Spec `definition` repeats the atom tuple of compiled definition `replaces`, whose
    /// bounds were overwritten.
    Redundant { definition: usize, replaces: usize },
    /// A template refers to a molecule name no atom carries.
    UnknownMolecule { name: String },
    /// A template repeats an entry for the same molecule; the earlier entry was kept.
    RedundantTemplateEntry { molecule: String, entry: usize },
}

pub(crate) fn ensure_finite(definition: usize, field: &str, value: f64) -> Result<(), DefinitionError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(DefinitionError::InvalidBounds {
            definition,
            reason: format!("{field} must be finite, got {value}"),
        })
    }
}
