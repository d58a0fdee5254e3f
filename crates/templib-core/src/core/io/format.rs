use super::compression::{self, logical_extension};
use super::error::IoError;
use phf::{Map, phf_map};
use std::fmt;
use std::io::BufRead;
use std::path::Path;
use std::str::FromStr;

/// File formats residue templates can be persisted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Amber Object File Format library.
    OffLibrary,
    /// Tripos Mol2 without attachment points.
    Mol2,
    /// Mol2 extended with head/tail and residue connection records.
    Mol3,
}

static KEYWORDS: Map<&'static str, Format> = phf_map! {
    "offlib" => Format::OffLibrary,
    "off" => Format::OffLibrary,
    "lib" => Format::OffLibrary,
    "mol2" => Format::Mol2,
    "mol3" => Format::Mol3,
};

static EXTENSIONS: Map<&'static str, Format> = phf_map! {
    "lib" => Format::OffLibrary,
    "off" => Format::OffLibrary,
    "mol2" => Format::Mol2,
    "mol3" => Format::Mol3,
};

impl FromStr for Format {
    type Err = IoError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KEYWORDS
            .get(s.to_ascii_lowercase().as_str())
            .copied()
            .ok_or_else(|| IoError::UnknownFormat(s.to_string()))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::OffLibrary => "offlib",
                Self::Mol2 => "mol2",
                Self::Mol3 => "mol3",
            }
        )
    }
}

impl Format {
    /// Infers the format from the extension, ignoring a compression suffix.
    pub fn from_extension(path: &Path) -> Option<Self> {
        logical_extension(path).and_then(|ext| EXTENSIONS.get(ext.as_str()).copied())
    }

    /// Detects the format of an existing file from its contents.
    pub fn identify(path: &Path) -> Result<Self, IoError> {
        let mut reader = compression::open_reader(path)?;
        Self::sniff(&mut reader)
    }

    /// Detects the format of a stream from its contents.
    ///
    /// OFF libraries open with an `!!index` block; Mol2 files contain
    /// `@<TRIPOS>` records and count as Mol3 once a `HEADTAIL` or
    /// `RESIDUECONNECT` record shows up.
    pub fn sniff(reader: &mut impl BufRead) -> Result<Self, IoError> {
        let mut tripos = false;
        for line_res in reader.lines() {
            let line = line_res?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if !tripos && line.starts_with("!!index") {
                return Ok(Self::OffLibrary);
            }
            if let Some(record) = line.strip_prefix("@<TRIPOS>") {
                if matches!(record.trim(), "HEADTAIL" | "RESIDUECONNECT") {
                    return Ok(Self::Mol3);
                }
                tripos = true;
            }
        }
        if tripos {
            Ok(Self::Mol2)
        } else {
            Err(IoError::parse(
                "auto-detect",
                0,
                "content matches no supported template format",
            ))
        }
    }
}

/// Determines the format to save `path` in.
///
/// An explicit `keyword` always wins; otherwise the extension decides after
/// stripping `.gz`, `.bz2` or `.zst`.
pub fn resolve_format(path: &Path, keyword: Option<&str>) -> Result<Format, IoError> {
    match keyword {
        Some(keyword) => keyword.parse(),
        None => Format::from_extension(path).ok_or_else(|| IoError::UnrecognizedExtension {
            path: path.display().to_string(),
        }),
    }
}
