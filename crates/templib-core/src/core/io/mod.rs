//! Reading and writing residue templates.
//!
//! Each format implements [`traits::TemplateFile`]. The `save`/`save_to`
//! methods on templates, containers and libraries pick a format from a
//! keyword or the file extension through [`format::resolve_format`], and
//! [`save::load_library`] loads any supported file into a library.

pub mod compression;
pub(crate) mod entry;
pub mod error;
pub mod format;
pub mod mol2;
pub mod off;
pub mod save;
pub mod traits;
