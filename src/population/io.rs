//! Binary population files.
//!
//! Layout: magic, object count (u64 LE), name and description (u32 LE length +
//! UTF-8 bytes each), last epoch (f64 LE, NaN when unset), then the orbit,
//! position, velocity and property records in native byte order. Files are only
//! portable between machines of the same endianness.

use super::Population;
use crate::backend::Backend;
use crate::error::{OpiError, Result};
use crate::host::ErrorReporter;
use crate::orbit::{ObjectProperties, Orbit, Vector3};
use bytemuck::Pod;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Take, Write};
use std::mem::size_of;
use std::path::Path;
use tracing::debug;

const MAGIC: &[u8; 8] = b"OPIPOP01";

/// Record bytes stored per object across all four categories.
const OBJECT_BYTES: usize =
    size_of::<Orbit>() + 2 * size_of::<Vector3>() + size_of::<ObjectProperties>();

impl Population {
    /// Write every category, synchronized to the host first.
    pub fn write_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let result = self.write_file(path.as_ref());
        self.reporter.report(result)
    }

    fn write_file(&mut self, path: &Path) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);

        out.write_all(MAGIC)?;
        out.write_all(&(self.len() as u64).to_le_bytes())?;
        write_str(&mut out, &self.name)?;
        write_str(&mut out, &self.description)?;
        out.write_all(&self.last_epoch.unwrap_or(f64::NAN).to_le_bytes())?;
        out.write_all(bytemuck::cast_slice(self.orbits.get(Backend::Host)?))?;
        out.write_all(bytemuck::cast_slice(self.positions.get(Backend::Host)?))?;
        out.write_all(bytemuck::cast_slice(self.velocities.get(Backend::Host)?))?;
        out.write_all(bytemuck::cast_slice(self.properties.get(Backend::Host)?))?;
        out.flush()?;

        debug!(path = %path.display(), objects = self.len(), "wrote population");
        Ok(())
    }

    /// Read a file written by [`write_to_file`](Self::write_to_file).
    ///
    /// Every length in the file is checked against the bytes actually present
    /// before anything is allocated.
    pub(crate) fn read_from_file(
        reporter: ErrorReporter,
        backends: &[Backend],
        path: &Path,
    ) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut input = BufReader::new(file).take(file_len);

        let mut magic = [0u8; 8];
        input.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(OpiError::InvalidArgument(format!(
                "{} is not a population file",
                path.display()
            )));
        }
        let count = u64::from_le_bytes(read_array(&mut input)?);
        let name = read_str(&mut input)?;
        let description = read_str(&mut input)?;
        let epoch = f64::from_le_bytes(read_array(&mut input)?);

        let size = count
            .checked_mul(OBJECT_BYTES as u64)
            .filter(|&bytes| bytes == input.limit())
            .and_then(|_| usize::try_from(count).ok())
            .ok_or_else(|| {
                OpiError::InvalidArgument(format!(
                    "{} declares {count} objects but holds {} record bytes",
                    path.display(),
                    input.limit()
                ))
            })?;

        let mut population = Population::new(reporter, 0, backends);
        population.name = name;
        population.description = description;
        population.last_epoch = (!epoch.is_nan()).then_some(epoch);
        population
            .orbits
            .replace(Backend::Host, read_records(&mut input, size)?)?;
        population
            .positions
            .replace(Backend::Host, read_records(&mut input, size)?)?;
        population
            .velocities
            .replace(Backend::Host, read_records(&mut input, size)?)?;
        population
            .properties
            .replace(Backend::Host, read_records(&mut input, size)?)?;

        debug!(path = %path.display(), objects = size, "read population");
        Ok(population)
    }
}

fn write_str<W: Write>(out: &mut W, value: &str) -> Result<()> {
    let len = u32::try_from(value.len())
        .map_err(|_| OpiError::InvalidArgument("string too long".to_string()))?;
    out.write_all(&len.to_le_bytes())?;
    out.write_all(value.as_bytes())?;
    Ok(())
}

fn read_array<R: Read, const N: usize>(input: &mut R) -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    input.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn read_str<R: Read>(input: &mut Take<R>) -> Result<String> {
    let len = u64::from(u32::from_le_bytes(read_array(input)?));
    if len > input.limit() {
        return Err(OpiError::InvalidArgument(format!(
            "string of {len} bytes runs past the end of the file"
        )));
    }
    let mut bytes = vec![0u8; len as usize];
    input.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| OpiError::InvalidArgument(e.to_string()))
}

/// `count` must already be checked against the remaining input.
fn read_records<R: Read, T: Pod>(input: &mut R, count: usize) -> Result<Vec<T>> {
    let mut records = vec![T::zeroed(); count];
    input.read_exact(bytemuck::cast_slice_mut(&mut records))?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::DataCategory;
    use tempfile::tempdir;

    #[test]
    fn test_population_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("debris.pop");
        let reporter = ErrorReporter::new();

        let mut pop = Population::new(reporter.clone(), 3, &[Backend::Host, Backend::Cuda]);
        pop.set_name("debris");
        pop.set_description("three fragments");
        pop.set_last_propagation_epoch(2_451_545.5);
        pop.orbits(Backend::Cuda).unwrap()[2].semi_major_axis = 42_164.0;
        pop.update(DataCategory::Orbit, Backend::Cuda).unwrap();
        pop.properties(Backend::Host).unwrap()[1].mass = 12.5;
        pop.update(DataCategory::Properties, Backend::Host).unwrap();
        pop.write_to_file(&path).unwrap();

        let mut loaded = Population::read_from_file(reporter, &[Backend::Host], &path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.name(), "debris");
        assert_eq!(loaded.description(), "three fragments");
        assert_eq!(loaded.last_propagation_epoch(), Some(2_451_545.5));
        assert_eq!(loaded.orbits(Backend::Host).unwrap()[2].semi_major_axis, 42_164.0);
        assert_eq!(loaded.properties(Backend::Host).unwrap()[1].mass, 12.5);
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.bin");
        std::fs::write(&path, b"definitely not a population").unwrap();
        let result = Population::read_from_file(ErrorReporter::new(), &[Backend::Host], &path);
        assert!(matches!(result, Err(OpiError::InvalidArgument(_))));
    }

    fn header(count: u64, name_len: u32) -> Vec<u8> {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&count.to_le_bytes());
        bytes.extend_from_slice(&name_len.to_le_bytes());
        bytes
    }

    #[test]
    fn test_rejects_oversized_object_count() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("huge.pop");
        let mut bytes = header(u64::MAX / 16, 0);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&f64::NAN.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        let result = Population::read_from_file(ErrorReporter::new(), &[Backend::Host], &path);
        assert!(matches!(result, Err(OpiError::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_oversized_string() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("long-name.pop");
        std::fs::write(&path, header(0, u32::MAX)).unwrap();

        let result = Population::read_from_file(ErrorReporter::new(), &[Backend::Host], &path);
        assert!(matches!(result, Err(OpiError::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_truncated_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("truncated.pop");
        let mut pop = Population::new(ErrorReporter::new(), 4, &[Backend::Host]);
        pop.write_to_file(&path).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 1);
        std::fs::write(&path, bytes).unwrap();

        let result = Population::read_from_file(ErrorReporter::new(), &[Backend::Host], &path);
        assert!(matches!(result, Err(OpiError::InvalidArgument(_))));
    }
}
