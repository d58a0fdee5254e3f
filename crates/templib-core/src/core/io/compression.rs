use bzip2::Compression as BzLevel;
use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use flate2::Compression as GzLevel;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Compression applied to a file, chosen from its final extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Zstd,
}

impl Compression {
    /// Picks the compression from the final extension, ignoring case.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gz") => Self::Gzip,
            Some(ext) if ext.eq_ignore_ascii_case("bz2") => Self::Bzip2,
            Some(ext) if ext.eq_ignore_ascii_case("zst") => Self::Zstd,
            _ => Self::None,
        }
    }
}

/// The lowercase extension of `path` once a compression suffix is removed,
/// e.g. `mol2` for `ace.mol2.gz`.
pub fn logical_extension(path: &Path) -> Option<String> {
    let inner = match Compression::from_path(path) {
        Compression::None => path.to_path_buf(),
        _ => path.with_extension(""),
    };
    inner
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Opens `path` for buffered reading, decompressing according to its extension.
pub fn open_reader(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    Ok(match Compression::from_path(path) {
        Compression::None => Box::new(BufReader::new(file)),
        Compression::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(file))),
        Compression::Bzip2 => Box::new(BufReader::new(MultiBzDecoder::new(file))),
        Compression::Zstd => Box::new(BufReader::new(zstd::stream::read::Decoder::new(file)?)),
    })
}

/// A writer that compresses according to the target extension.
///
/// [`finish`](Self::finish) must be called once writing succeeded; dropping the
/// writer without it may leave a truncated compressed stream.
pub enum CompressedWriter<W: Write = File> {
    Plain(BufWriter<W>),
    Gzip(GzEncoder<BufWriter<W>>),
    Bzip2(BzEncoder<BufWriter<W>>),
    Zstd(zstd::stream::write::Encoder<'static, BufWriter<W>>),
}

impl<W: Write> CompressedWriter<W> {
    /// Wraps `inner`, compressing everything written through it.
    pub fn new(inner: W, compression: Compression) -> io::Result<Self> {
        let inner = BufWriter::new(inner);
        Ok(match compression {
            Compression::None => Self::Plain(inner),
            Compression::Gzip => Self::Gzip(GzEncoder::new(inner, GzLevel::default())),
            Compression::Bzip2 => Self::Bzip2(BzEncoder::new(inner, BzLevel::default())),
            Compression::Zstd => Self::Zstd(zstd::stream::write::Encoder::new(
                inner,
                zstd::DEFAULT_COMPRESSION_LEVEL,
            )?),
        })
    }

    /// Writes any trailing compressed frames, flushes, and hands back the
    /// underlying writer.
    pub fn finish(self) -> io::Result<W> {
        let buffered = match self {
            Self::Plain(inner) => inner,
            Self::Gzip(encoder) => encoder.finish()?,
            Self::Bzip2(encoder) => encoder.finish()?,
            Self::Zstd(encoder) => encoder.finish()?,
        };
        buffered.into_inner().map_err(io::IntoInnerError::into_error)
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Gzip(w) => w.write(buf),
            Self::Bzip2(w) => w.write(buf),
            Self::Zstd(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Gzip(w) => w.flush(),
            Self::Bzip2(w) => w.flush(),
            Self::Zstd(w) => w.flush(),
        }
    }
}

/// Writes `path` through a temporary file in the same directory.
///
/// The target is replaced only after `write` succeeded and the compressed
/// stream was finished; on any error an existing file at `path` is untouched.
pub fn write_atomically<E>(
    path: &Path,
    write: impl FnOnce(&mut CompressedWriter<NamedTempFile>) -> Result<(), E>,
) -> Result<(), E>
where
    E: From<io::Error>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut writer = CompressedWriter::new(NamedTempFile::new_in(dir)?, Compression::from_path(path))?;
    write(&mut writer)?;
    let file = writer.finish()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn compression_is_detected_from_final_extension() {
        assert_eq!(Compression::from_path(Path::new("a.mol2.gz")), Compression::Gzip);
        assert_eq!(Compression::from_path(Path::new("a.lib.ZST")), Compression::Zstd);
        assert_eq!(Compression::from_path(Path::new("a.mol2.bz2")), Compression::Bzip2);
        assert_eq!(Compression::from_path(Path::new("a.mol2.xz")), Compression::None);
        assert_eq!(Compression::from_path(Path::new("a.lib")), Compression::None);
    }

    #[test]
    fn logical_extension_strips_compression_suffix() {
        assert_eq!(logical_extension(Path::new("ace.MOL2.gz")).as_deref(), Some("mol2"));
        assert_eq!(logical_extension(Path::new("ace.lib.zst")).as_deref(), Some("lib"));
        assert_eq!(logical_extension(Path::new("ace.mol3.bz2")).as_deref(), Some("mol3"));
        assert_eq!(logical_extension(Path::new("ace.mol3")).as_deref(), Some("mol3"));
        assert_eq!(logical_extension(Path::new("ace.gz")), None);
        assert_eq!(logical_extension(Path::new("ace")), None);
    }

    fn round_trip(file_name: &str) -> (String, Vec<u8>) {
        let dir = tempdir().unwrap();
        let path = dir.path().join(file_name);
        let written: io::Result<()> =
            write_atomically(&path, |writer| writer.write_all(b"!!index array str\n \"ACE\"\n"));
        written.unwrap();

        let mut text = String::new();
        open_reader(&path).unwrap().read_to_string(&mut text).unwrap();
        (text, std::fs::read(&path).unwrap())
    }

    #[test]
    fn plain_files_round_trip_unchanged() {
        let (text, raw) = round_trip("lib.off");
        assert_eq!(text, "!!index array str\n \"ACE\"\n");
        assert_eq!(raw, text.as_bytes());
    }

    #[test]
    fn gzip_files_round_trip() {
        let (text, raw) = round_trip("lib.off.gz");
        assert_eq!(text, "!!index array str\n \"ACE\"\n");
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn bzip2_files_round_trip() {
        let (text, raw) = round_trip("lib.off.bz2");
        assert_eq!(text, "!!index array str\n \"ACE\"\n");
        assert_eq!(&raw[..3], b"BZh");
    }

    #[test]
    fn failed_write_leaves_existing_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keep.lib.gz");
        std::fs::write(&path, b"kept").unwrap();

        let result: io::Result<()> = write_atomically(&path, |writer| {
            writer.write_all(b"partial")?;
            Err(io::Error::new(io::ErrorKind::InvalidData, "refused"))
        });
        assert!(result.is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"kept");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn zstd_files_round_trip() {
        let (text, raw) = round_trip("lib.off.zst");
        assert_eq!(text, "!!index array str\n \"ACE\"\n");
        assert_eq!(&raw[..4], &[0x28, 0xb5, 0x2f, 0xfd]);
    }
}
