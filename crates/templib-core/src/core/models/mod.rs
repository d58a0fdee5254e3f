//! # Core Models Module
//!
//! Data structures describing residue templates and their collections.
//!
//! ## Key Components
//!
//! - [`atom`] - A single atom: name, type, element, charge, position and velocity
//! - [`template`] - `ResidueTemplate`, the atom arena with its bond graph and
//!   attachment points
//! - [`container`] - Ordered collections of templates and multi-unit entries
//! - [`library`] - Name-keyed libraries of units
//! - [`structure`] - The flat multi-residue view templates are projected from
//! - [`topology`] - Bonds and bond orders
//! - [`residue`] - Residue classification
//! - [`ids`] - Arena handles
//! - [`error`] - Structural errors
//!
//! ## Usage
//!
//! ```ignore
//! use templib::core::models::{atom::Atom, template::ResidueTemplate};
//!
//! let mut ace = ResidueTemplate::new("ACE");
//! let ch3 = ace.add_atom(Atom::with_guessed_element("CH3", "CT"))?;
//! let c = ace.add_atom(Atom::with_guessed_element("C", "C"))?;
//! ace.add_bond(ch3, c)?;
//! ace.set_tail(c)?;
//! ```

pub mod atom;
pub mod container;
pub mod error;
pub mod ids;
pub mod library;
pub mod residue;
pub mod structure;
pub mod template;
pub mod topology;
