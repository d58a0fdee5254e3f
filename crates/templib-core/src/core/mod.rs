//! # Core Module
//!
//! Data model, charge normalization and file formats for residue templates.
//!
//! - [`models`] - Atoms, bonds, templates, containers, libraries and the flat
//!   `Structure` view templates are projected from
//! - [`charge`] - Charge normalization on templates and containers
//! - [`io`] - OFF library and Mol2/Mol3 codecs, format resolution and compression
//! - [`config`] - Codec settings
//! - [`elements`] - Element symbols and atomic number inference

pub mod charge;
pub mod config;
pub mod elements;
pub mod io;
pub mod models;
