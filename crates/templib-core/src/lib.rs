//! # templib
//!
//! Residue templates for molecular-simulation libraries: the building blocks
//! (amino acids, nucleotides, capping groups, solvent boxes) from which larger
//! structures are assembled, and the file formats they are exchanged in.
//!
//! ## Layout
//!
//! Everything lives under [`core`]:
//!
//! - **[`core::models`]** holds the data model. A `ResidueTemplate` owns its
//!   atoms in a slot-map arena, keeps a symmetric bond graph and marks head,
//!   tail and extra connection atoms used when templates are chained.
//!   Containers and libraries group templates, sharing them behind `Arc`
//!   unless a copy is requested.
//! - **[`core::charge`]** redistributes partial charges so that they sum
//!   exactly to an integer (or explicit) target at a chosen precision.
//! - **[`core::io`]** reads and writes Amber OFF libraries and Tripos
//!   Mol2 files (plus the Mol3 variant that keeps attachment points), with
//!   transparent gzip, bzip2 or zstd compression picked from the file extension.
//! - **[`core::config`]** carries the codec settings, loadable from TOML.
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod core;
