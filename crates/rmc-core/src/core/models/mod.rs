//! # Core Models Module
//!
//! Data structures describing the atomic system the restraints are evaluated against.
//!
//! ## Overview
//!
//! An [`AtomicSystem`](system::AtomicSystem) pairs a frozen attribute table (one
//! [`AtomRecord`](atom::AtomRecord) per original atom) with the live Cartesian coordinate
//! store and the simulation box. Attribute lookups always use real atom indexes, while
//! the coordinate store follows the current packed layout in which collected atoms are
//! absent.
//!
//! ## Key Components
//!
//! - [`atom`] - Per-atom attributes and attribute keys used by selectors
//! - [`system`] - The atomic system shared by all restraints
//! - [`ids`] - Stable identifiers for registered restraints

pub mod atom;
pub mod ids;
pub mod system;
