//! # Engine Module
//!
//! Stateful evaluation of restraints against an atomic system under trial moves.
//!
//! ## Overview
//!
//! A Reverse Monte Carlo step proposes new positions for a few atoms, asks every restraint
//! how its standard error would change, and then keeps or discards the proposal. This
//! module makes that cheap: restraints only re-measure the definitions touched by the
//! moved atoms, and trial positions are written into the shared coordinate store for the
//! duration of one evaluation and always put back afterwards.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Worker count and geometry tolerance
//! - **Error Handling** ([`error`]) - Engine error type wrapping lower-layer failures
//! - **Diagnostics** ([`diagnostics`]) - Non-fatal notices forwarded to an optional callback
//! - **Atom Collection** ([`collector`]) - Real/relative index translation for amputated atoms
//! - **Move Protocol** ([`protocol`]) - The before/after/accept/reject cycle state machine
//! - **Trial Coordinates** ([`transaction`]) - Scoped writes into the coordinate store
//! - **Restraint Interface** ([`restraint`]) - The trait every restraint kind implements
//! - **Restraint Kinds** ([`restraints`]) - Coordination shells and improper angles
//! - **Registry** ([`registry`]) - The set of restraints sharing one atomic system
//!
//! ## Key Capabilities
//!
//! - **Incremental evaluation** of only the definitions a move touches
//! - **Exact bookkeeping** of double-counted neighbour pairs
//! - **Amputation and restoration** of atoms without renumbering definitions
//! - **Parallel dispatch** across restraints and across definitions

pub mod collector;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod restraint;
pub mod restraints;
pub mod transaction;
