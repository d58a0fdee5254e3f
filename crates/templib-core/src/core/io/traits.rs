use super::compression;
use super::error::ReadReport;
use crate::core::config::CodecConfig;
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Defines the interface for reading and writing residue template file formats.
///
/// Implementors handle format-specific parsing and serialization; the
/// path-based methods add transparent `.gz`, `.bz2` or `.zst` compression chosen from the
/// file extension.
pub trait TemplateFile {
    /// The value a file of this format decodes to.
    type Content;

    /// The error type for I/O operations.
    type Error: Error + From<io::Error>;

    /// Reads content from a buffered reader.
    ///
    /// # Arguments
    ///
    /// * `reader` - The buffered reader to read from.
    /// * `config` - Codec settings, e.g. consistency tolerances.
    ///
    /// # Return
    ///
    /// Returns the parsed content and the non-fatal diagnostics gathered while reading.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails or I/O operations encounter issues.
    fn read_from(
        reader: &mut impl BufRead,
        config: &CodecConfig,
    ) -> Result<(Self::Content, ReadReport), Self::Error>;

    /// Writes content to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be represented in this format or
    /// writing fails.
    fn write_to(
        content: &Self::Content,
        config: &CodecConfig,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error>;

    /// Reads content from a file path, decompressing by extension.
    fn read_from_path<P: AsRef<Path>>(
        path: P,
        config: &CodecConfig,
    ) -> Result<(Self::Content, ReadReport), Self::Error> {
        let mut reader = compression::open_reader(path.as_ref())?;
        Self::read_from(&mut reader, config)
    }

    /// Writes content to a file path, compressing by extension.
    ///
    /// An existing file is replaced only once the whole content was written.
    fn write_to_path<P: AsRef<Path>>(
        content: &Self::Content,
        config: &CodecConfig,
        path: P,
    ) -> Result<(), Self::Error> {
        compression::write_atomically(path.as_ref(), |writer| {
            Self::write_to(content, config, writer)
        })
    }
}
