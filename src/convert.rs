//! Path-level ISO <-> CSO conversion.
//!
//! These wrappers own the file handling: the destination path is derived
//! from the source by swapping the `.iso`/`.cso` extension (matching the
//! case of the source extension), and a destination left behind by a failed
//! conversion is removed so callers never see a truncated container.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::CsoError;
use crate::progress::ProgressSink;
use crate::reader::CsoReader;
use crate::writer::CsoStreamWriter;

/// Compress an ISO image at `path` into a CSO container next to it.
///
/// Returns the path of the written container (`.iso` -> `.cso`).
///
/// # Errors
///
/// This function will return an error if the source cannot be opened, the
/// destination cannot be created, or compression fails. On failure the
/// partial destination file is removed best-effort.
pub fn compress_iso<P: AsRef<Path>>(
    path: P,
    progress: &mut impl ProgressSink,
) -> Result<PathBuf, CsoError> {
    let path = path.as_ref();
    let out_path = swap_extension(path, "CSO", "cso")?;

    #[cfg(feature = "logging")]
    tracing::info!(from = %path.display(), to = %out_path.display(), "compressing ISO to CSO");

    let result = (|| -> Result<(), CsoError> {
        let mut input = BufReader::new(File::open(path)?);
        let mut output = BufWriter::new(File::create(&out_path)?);

        CsoStreamWriter::new(&mut output).write_from_reader_seekable(&mut input, progress)?;
        output.flush()?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&out_path);
        return Err(e);
    }
    Ok(out_path)
}

/// Decompress a CSO container at `path` into a plain ISO image next to it.
///
/// Returns the path of the written image (`.cso` -> `.iso`).
///
/// # Errors
///
/// This function will return an error if the source cannot be opened or is
/// not a valid CSO container, the destination cannot be created, or
/// decompression fails. On failure the partial destination file is removed
/// best-effort.
pub fn decompress_cso<P: AsRef<Path>>(
    path: P,
    progress: &mut impl ProgressSink,
) -> Result<PathBuf, CsoError> {
    let path = path.as_ref();
    let out_path = swap_extension(path, "ISO", "iso")?;

    #[cfg(feature = "logging")]
    tracing::info!(from = %path.display(), to = %out_path.display(), "decompressing CSO to ISO");

    let result = (|| -> Result<(), CsoError> {
        let input = BufReader::new(File::open(path)?);
        let mut reader = CsoReader::open(input)?;

        let mut output = BufWriter::new(File::create(&out_path)?);
        reader.decompress_to_writer(&mut output, progress)?;
        output.flush()?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&out_path);
        return Err(e);
    }
    Ok(out_path)
}

/// Replace the extension of `path`, picking `lower` when the source
/// extension is entirely lowercase and `upper` otherwise.
fn swap_extension(path: &Path, upper: &str, lower: &str) -> Result<PathBuf, CsoError> {
    let ext = path
        .extension()
        .and_then(OsStr::to_str)
        .ok_or_else(|| CsoError::NoExtension(path.display().to_string()))?;

    let new_ext = if ext.chars().any(|c| c.is_ascii_uppercase()) {
        upper
    } else {
        lower
    };
    Ok(path.with_extension(new_ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_swap_follows_source_case() {
        let p = swap_extension(Path::new("/tmp/game.iso"), "CSO", "cso").unwrap();
        assert_eq!(p, Path::new("/tmp/game.cso"));

        let p = swap_extension(Path::new("/tmp/GAME.ISO"), "CSO", "cso").unwrap();
        assert_eq!(p, Path::new("/tmp/GAME.CSO"));

        let p = swap_extension(Path::new("/tmp/disc.CSO"), "ISO", "iso").unwrap();
        assert_eq!(p, Path::new("/tmp/disc.ISO"));
    }

    #[test]
    fn extension_swap_requires_extension() {
        assert!(matches!(
            swap_extension(Path::new("/tmp/noext"), "CSO", "cso"),
            Err(CsoError::NoExtension(_))
        ));
    }
}
