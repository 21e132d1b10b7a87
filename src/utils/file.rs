use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use flate2::read::MultiGzDecoder;
use crate::config::defs::PipelineError;

pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1F, 0x8B]), // Gzip magic bytes
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}


/// Opens a text file for line reading, decompressing on the fly when the
/// file starts with gzip magic bytes.
pub fn open_text_reader(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    if is_gzipped(path)? {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}


/// Builds an output path inside `dir`, optionally prefixing the file name
/// with a sample name: `<dir>/<prefix><delimiter><file_name>`.
///
/// # Arguments
///
/// * `dir` - Directory the file will live in.
/// * `prefix` - Optional sample prefix.
/// * `file_name` - Base file name.
/// * `delimiter` - Joins prefix and file name.
///
/// # Returns
/// PathBuf of the composed file.
pub fn file_path_manipulator(
    dir: &Path,
    prefix: Option<&str>,
    file_name: &str,
    delimiter: &str,
) -> PathBuf {
    match prefix {
        Some(p) if !p.is_empty() => dir.join(format!("{}{}{}", p, delimiter, file_name)),
        _ => dir.join(file_name),
    }
}


/// Resolves a user supplied path against the working directory.
pub fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}


/// Checks that each named input exists as a regular file.
///
/// # Arguments
///
/// * `inputs` - (artifact name, path) pairs.
///
/// # Returns
/// Ok(()) or the first missing artifact.
pub fn validate_file_inputs(inputs: &[(&str, &Path)]) -> Result<(), PipelineError> {
    for (name, path) in inputs {
        if !path.is_file() {
            return Err(PipelineError::MissingArtifact {
                name: name.to_string(),
                path: path.to_path_buf(),
            });
        }
    }
    Ok(())
}
