use super::compression::write_atomically;
use super::entry::EntryView;
use super::error::{IoError, ReadReport};
use super::format::{Format, resolve_format};
use super::mol2::{self, Mol2File, Mol3File};
use super::off::{self, OffLibraryFile};
use super::traits::TemplateFile;
use crate::core::config::CodecConfig;
use crate::core::models::container::{ResidueTemplateContainer, Unit};
use crate::core::models::library::Library;
use crate::core::models::template::ResidueTemplate;
use std::io::Write;
use std::path::Path;
use tracing::info;

fn write_entries(
    entries: &[EntryView<'_>],
    format: Format,
    config: &CodecConfig,
    writer: &mut impl Write,
) -> Result<(), IoError> {
    match format {
        Format::OffLibrary => off::write_entries(entries, config, writer),
        Format::Mol2 => mol2::write_entries(entries, config, writer, false),
        Format::Mol3 => mol2::write_entries(entries, config, writer, true),
    }
}

fn save_entries(
    entries: &[EntryView<'_>],
    path: &Path,
    keyword: Option<&str>,
    config: &CodecConfig,
) -> Result<(), IoError> {
    let format = resolve_format(path, keyword)?;
    write_atomically(path, |writer| write_entries(entries, format, config, writer))?;
    info!(path = %path.display(), %format, entries = entries.len(), "Saved templates.");
    Ok(())
}

impl ResidueTemplate {
    /// Saves the template to `path`.
    ///
    /// `format` is a keyword (`offlib`, `off`, `lib`, `mol2`, `mol3`); without
    /// one the format follows the extension. A `.gz`, `.bz2` or `.zst` suffix
    /// compresses the output.
    pub fn save<P: AsRef<Path>>(&self, path: P, format: Option<&str>) -> Result<(), IoError> {
        self.save_with(path, format, &CodecConfig::default())
    }

    pub fn save_with<P: AsRef<Path>>(
        &self,
        path: P,
        format: Option<&str>,
        config: &CodecConfig,
    ) -> Result<(), IoError> {
        save_entries(&[EntryView::single(&self.name, self)], path.as_ref(), format, config)
    }

    /// Writes the template to a stream in an explicit format.
    pub fn save_to(&self, writer: &mut impl Write, format: Format) -> Result<(), IoError> {
        self.save_to_with(writer, format, &CodecConfig::default())
    }

    /// Like [`save_to`](Self::save_to), with explicit codec settings.
    pub fn save_to_with(
        &self,
        writer: &mut impl Write,
        format: Format,
        config: &CodecConfig,
    ) -> Result<(), IoError> {
        write_entries(&[EntryView::single(&self.name, self)], format, config, writer)
    }
}

impl ResidueTemplateContainer {
    /// Saves every member to `path`: one OFF unit or one Mol2 record per member.
    pub fn save<P: AsRef<Path>>(&self, path: P, format: Option<&str>) -> Result<(), IoError> {
        self.save_with(path, format, &CodecConfig::default())
    }

    pub fn save_with<P: AsRef<Path>>(
        &self,
        path: P,
        format: Option<&str>,
        config: &CodecConfig,
    ) -> Result<(), IoError> {
        let path = path.as_ref();
        match resolve_format(path, format)? {
            Format::OffLibrary => {
                let library = self.to_library();
                save_entries(&EntryView::of_library(&library), path, format, config)
            }
            Format::Mol2 | Format::Mol3 => {
                save_entries(&EntryView::of_members(self), path, format, config)
            }
        }
    }

    pub fn save_to(&self, writer: &mut impl Write, format: Format) -> Result<(), IoError> {
        self.save_to_with(writer, format, &CodecConfig::default())
    }

    pub fn save_to_with(
        &self,
        writer: &mut impl Write,
        format: Format,
        config: &CodecConfig,
    ) -> Result<(), IoError> {
        match format {
            Format::OffLibrary => {
                let library = self.to_library();
                write_entries(&EntryView::of_library(&library), format, config, writer)
            }
            Format::Mol2 | Format::Mol3 => {
                write_entries(&EntryView::of_members(self), format, config, writer)
            }
        }
    }
}

impl Library {
    /// Saves the library: one OFF unit or one Mol2 record per entry, named by key.
    pub fn save<P: AsRef<Path>>(&self, path: P, format: Option<&str>) -> Result<(), IoError> {
        self.save_with(path, format, &CodecConfig::default())
    }

    pub fn save_with<P: AsRef<Path>>(
        &self,
        path: P,
        format: Option<&str>,
        config: &CodecConfig,
    ) -> Result<(), IoError> {
        save_entries(&EntryView::of_library(self), path.as_ref(), format, config)
    }

    pub fn save_to(&self, writer: &mut impl Write, format: Format) -> Result<(), IoError> {
        self.save_to_with(writer, format, &CodecConfig::default())
    }

    pub fn save_to_with(
        &self,
        writer: &mut impl Write,
        format: Format,
        config: &CodecConfig,
    ) -> Result<(), IoError> {
        write_entries(&EntryView::of_library(self), format, config, writer)
    }
}

/// Loads a template library with default codec settings.
///
/// See [`load_library_with`].
pub fn load_library<P: AsRef<Path>>(path: P) -> Result<Library, IoError> {
    load_library_with(path, &CodecConfig::default()).map(|(library, _)| library)
}

/// Loads a template library from an OFF or Mol2/Mol3 file.
///
/// The format follows the extension, or the file contents when the extension
/// is not recognized. Mol2 records become entries keyed by their molecule
/// name.
pub fn load_library_with<P: AsRef<Path>>(
    path: P,
    config: &CodecConfig,
) -> Result<(Library, ReadReport), IoError> {
    let path = path.as_ref();
    let format = match Format::from_extension(path) {
        Some(format) => format,
        None => Format::identify(path)?,
    };

    let (library, report) = match format {
        Format::OffLibrary => OffLibraryFile::read_from_path(path, config)?,
        Format::Mol2 | Format::Mol3 => {
            let (unit, report) = if format == Format::Mol3 {
                Mol3File::read_from_path(path, config)?
            } else {
                Mol2File::read_from_path(path, config)?
            };
            let mut library = Library::new();
            match unit {
                Unit::Multi(container) if container.name.is_empty() => {
                    for member in container.iter() {
                        library.insert(member.name(), member.clone());
                    }
                }
                unit => {
                    let name = unit.name().to_string();
                    library.insert(&name, unit);
                }
            }
            (library, report)
        }
    };
    info!(path = %path.display(), %format, units = library.len(), "Loaded template library.");
    Ok((library, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use crate::core::models::residue::ResidueKind;
    use crate::core::models::template::PeriodicBox;
    use nalgebra::Point3;
    use tempfile::tempdir;

    fn ace() -> ResidueTemplate {
        let mut ace = ResidueTemplate::new("ACE").with_kind(ResidueKind::Protein);
        for (i, (name, ty, z, q)) in [
            ("HH31", "HC", 1, 0.1123),
            ("CH3", "CT", 6, -0.3662),
            ("HH32", "HC", 1, 0.1123),
            ("HH33", "HC", 1, 0.1123),
            ("C", "C", 6, 0.5972),
            ("O", "O", 8, -0.5679),
        ]
        .into_iter()
        .enumerate()
        {
            ace.add_atom(
                Atom::new(name, ty)
                    .with_atomic_number(z)
                    .with_charge(q)
                    .with_position(Point3::new(i as f64, 0.5, -0.25)),
            )
            .unwrap();
        }
        for (a, b) in [(0, 1), (1, 2), (1, 3), (1, 4), (4, 5)] {
            ace.add_bond(a, b).unwrap();
        }
        ace.set_tail(4).unwrap();
        ace
    }

    fn water() -> ResidueTemplate {
        let mut water = ResidueTemplate::new("WAT").with_kind(ResidueKind::Solvent);
        water.add_atom(Atom::new("O", "OW").with_atomic_number(8).with_charge(-0.834)).unwrap();
        water.add_atom(Atom::new("H1", "HW").with_atomic_number(1).with_charge(0.417)).unwrap();
        water.add_atom(Atom::new("H2", "HW").with_atomic_number(1).with_charge(0.417)).unwrap();
        water.add_bond(0, 1).unwrap();
        water.add_bond(0, 2).unwrap();
        water
    }

    #[test]
    fn template_save_follows_extension() {
        let dir = tempdir().unwrap();
        let ace = ace();
        for file in ["ace.lib", "ace.off", "ace.mol2", "ace.mol3"] {
            let path = dir.path().join(file);
            ace.save(&path, None).unwrap();
            let library = load_library(&path).unwrap();
            let read = library.get_template("ACE").unwrap();
            assert_eq!(read.len(), 6, "{file}");
            assert_eq!(read.bonds().len(), 5, "{file}");
        }

        let mol2 = load_library(dir.path().join("ace.mol2")).unwrap();
        assert!(mol2.get_template("ACE").unwrap().tail().is_none());
        let mol3 = load_library(dir.path().join("ace.mol3")).unwrap();
        assert_eq!(mol3.get_template("ACE").unwrap().tail().unwrap().name, "C");
        let off = load_library(dir.path().join("ace.lib")).unwrap();
        assert_eq!(off.get_template("ACE").unwrap().tail().unwrap().name, "C");
    }

    #[test]
    fn keyword_overrides_extension_and_contents_decide_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ace.txt");
        ace().save(&path, Some("MOL3")).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("@<TRIPOS>HEADTAIL"));

        let library = load_library(&path).unwrap();
        assert_eq!(library.get_template("ACE").unwrap().tail().unwrap().name, "C");

        let off = dir.path().join("ace.mol2");
        ace().save(&off, Some("offlib")).unwrap();
        assert!(std::fs::read_to_string(&off).unwrap().starts_with("!!index"));
    }

    #[test]
    fn bad_keywords_and_extensions_are_rejected() {
        let dir = tempdir().unwrap();
        let ace = ace();
        assert!(matches!(
            ace.save(dir.path().join("ace.lib"), Some("nofmt")),
            Err(IoError::UnknownFormat(_))
        ));
        let unknown = dir.path().join("test.nofmt");
        assert!(matches!(
            ace.save(&unknown, None),
            Err(IoError::UnrecognizedExtension { .. })
        ));
        assert!(!unknown.exists());
    }

    #[test]
    fn compressed_files_round_trip() {
        let dir = tempdir().unwrap();
        let mut library = Library::new();
        library.insert("ACE", ace());
        library.insert("WAT", water());

        for file in ["lib.off.gz", "lib.off.zst", "amino.lib.bz2", "lib.mol3.gz", "lib.mol3.bz2"] {
            let path = dir.path().join(file);
            library.save(&path, None).unwrap();
            let head = std::fs::read(&path).unwrap();
            assert_ne!(head[0], b'!', "{file} should be compressed");
            assert_ne!(head[0], b'@', "{file} should be compressed");

            let read = load_library(&path).unwrap();
            assert_eq!(read.names().collect::<Vec<_>>(), vec!["ACE", "WAT"], "{file}");
            assert_eq!(read.get_template("ACE").unwrap().tail().unwrap().name, "C");
        }
    }

    #[test]
    fn container_save_writes_one_entry_per_member() {
        let dir = tempdir().unwrap();
        let mut solvent = ResidueTemplateContainer::new("WATBOX");
        solvent.periodic_box = Some(PeriodicBox::rectangular(12.0, 12.0, 12.0));
        for _ in 0..4 {
            solvent.push(water());
        }
        let mut container = ResidueTemplateContainer::new("");
        container.push(ace());
        container.push(solvent);

        let off = dir.path().join("all.lib");
        container.save(&off, None).unwrap();
        let library = load_library(&off).unwrap();
        assert_eq!(library.names().collect::<Vec<_>>(), vec!["ACE", "WATBOX"]);
        let watbox = library.get("WATBOX").unwrap().as_multi().unwrap();
        assert_eq!(watbox.len(), 4);
        assert_eq!(watbox.periodic_box.unwrap().lengths.x, 12.0);

        let mol2 = dir.path().join("all.mol2");
        container.save(&mol2, None).unwrap();
        let library = load_library(&mol2).unwrap();
        assert_eq!(library.names().collect::<Vec<_>>(), vec!["ACE", "WATBOX"]);
        assert_eq!(library.get("WATBOX").unwrap().as_multi().unwrap().len(), 4);
    }

    #[test]
    fn save_to_streams_in_the_given_format() {
        let mut buffer = Vec::new();
        ace().save_to(&mut buffer, Format::Mol2).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("@<TRIPOS>MOLECULE\nACE\n"));
        assert!(!text.contains("HEADTAIL"));

        let mut library = Library::new();
        library.insert("ACE", ace());
        let mut buffer = Vec::new();
        library.save_to(&mut buffer, Format::OffLibrary).unwrap();
        assert!(String::from_utf8(buffer).unwrap().starts_with("!!index array str\n \"ACE\"\n"));
    }

    #[test]
    fn bzip2_mol2_keeps_unnamed_records_apart() {
        let dir = tempdir().unwrap();
        let mut container = ResidueTemplateContainer::new("");
        container.push(ace());
        container.push(water());
        let path = dir.path().join("pair.mol2.bz2");
        container.save(&path, None).unwrap();
        assert_eq!(&std::fs::read(&path).unwrap()[..3], b"BZh");

        let library = load_library(&path).unwrap();
        assert_eq!(library.names().collect::<Vec<_>>(), vec!["ACE", "WAT"]);
    }

    #[test]
    fn failed_save_keeps_existing_file() {
        let dir = tempdir().unwrap();
        let mut overloaded = ace();
        for idx in 0..5 {
            overloaded.add_connection(idx).unwrap();
        }

        for file in ["keep.lib", "keep.mol3.gz"] {
            let path = dir.path().join(file);
            std::fs::write(&path, "PRECIOUS CONTENT\n").unwrap();
            let err = overloaded.save(&path, None).unwrap_err();
            assert!(matches!(err, IoError::TooManyConnections { count: 5, max: 4, .. }), "{file}");
            assert_eq!(std::fs::read_to_string(&path).unwrap(), "PRECIOUS CONTENT\n");
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn save_to_with_honors_charge_precision() {
        let config = CodecConfig::builder().charge_precision(2).build().unwrap();
        let mut buffer = Vec::new();
        ace().save_to_with(&mut buffer, Format::Mol2, &config).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains(" -0.57\n"), "{text}");

        let mut library = Library::new();
        library.insert("ACE", ace());
        let mut buffer = Vec::new();
        library.save_to_with(&mut buffer, Format::OffLibrary, &config).unwrap();
        assert!(String::from_utf8(buffer).unwrap().contains(" -0.57\n"));
    }

    #[test]
    fn load_library_with_returns_consistency_report() {
        let dir = tempdir().unwrap();
        let mut solvent = ResidueTemplateContainer::new("WATBOX");
        solvent.push(water());
        let mut odd = water();
        odd.atom_mut(1).unwrap().charge = 0.5;
        solvent.push(odd);
        let mut library = Library::new();
        library.insert("WATBOX", solvent);
        let path = dir.path().join("box.lib");
        library.save(&path, None).unwrap();

        let (_, report) = load_library_with(&path, &CodecConfig::default()).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].subunit, 1);
    }
}
