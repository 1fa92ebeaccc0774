//! On-disk artifact layout and (de)serialisation helpers
//!
//! Binary artifacts (graph bundle, splits, checkpoint) are bincode. Everything
//! meant for people or the dashboard is pretty JSON or CSV.

use crate::error::MedKgResult;
use crate::split::SplitKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fixed file layout under a data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    pub data_dir: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl ArtifactPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn processed(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    fn results(&self) -> PathBuf {
        self.data_dir.join("results")
    }

    pub fn graph_bundle(&self) -> PathBuf {
        self.processed().join("graph_data.bin")
    }

    pub fn graph_mapping(&self) -> PathBuf {
        self.processed().join("graph_data_mapping.json")
    }

    pub fn split(&self, kind: SplitKind) -> PathBuf {
        self.processed().join(format!("{}_data.bin", kind.as_str()))
    }

    pub fn split_statistics(&self) -> PathBuf {
        self.processed().join("split_statistics.json")
    }

    pub fn checkpoint(&self) -> PathBuf {
        self.data_dir.join("checkpoints").join("best_model.bin")
    }

    pub fn training_history(&self) -> PathBuf {
        self.results().join("training_history.json")
    }

    pub fn test_metrics(&self) -> PathBuf {
        self.results().join("test_metrics.json")
    }

    pub fn test_curves(&self) -> PathBuf {
        self.results().join("test_curves.json")
    }

    pub fn predictions(&self) -> PathBuf {
        self.results().join("novel_predictions.csv")
    }
}

fn create_parent(path: &Path) -> MedKgResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn save_bincode<T: Serialize>(path: impl AsRef<Path>, value: &T) -> MedKgResult<()> {
    let path = path.as_ref();
    create_parent(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut writer, value)?;
    writer.flush()?;
    debug!("Wrote {:?}", path);
    Ok(())
}

pub fn load_bincode<T: DeserializeOwned>(path: impl AsRef<Path>) -> MedKgResult<T> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    Ok(bincode::deserialize_from(reader)?)
}

pub fn save_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> MedKgResult<()> {
    let path = path.as_ref();
    create_parent(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    debug!("Wrote {:?}", path);
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> MedKgResult<T> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    Ok(serde_json::from_reader(reader)?)
}

/// Write serde rows with a header line
pub fn save_csv<T: Serialize>(path: impl AsRef<Path>, rows: &[T]) -> MedKgResult<()> {
    let path = path.as_ref();
    create_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    debug!("Wrote {} rows to {:?}", rows.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let paths = ArtifactPaths::new("/tmp/kg");
        assert_eq!(paths.split(SplitKind::Val), PathBuf::from("/tmp/kg/processed/val_data.bin"));
        assert_eq!(paths.checkpoint(), PathBuf::from("/tmp/kg/checkpoints/best_model.bin"));
        assert_eq!(paths.predictions(), PathBuf::from("/tmp/kg/results/novel_predictions.csv"));
    }

    #[test]
    fn test_bincode_and_json_create_directories() {
        let dir = TempDir::new().unwrap();
        let paths = ArtifactPaths::new(dir.path());
        let value = vec![(1usize, 2usize), (3, 4)];

        save_bincode(paths.graph_bundle(), &value).unwrap();
        let loaded: Vec<(usize, usize)> = load_bincode(paths.graph_bundle()).unwrap();
        assert_eq!(loaded, value);

        save_json(paths.test_metrics(), &value).unwrap();
        let loaded: Vec<(usize, usize)> = load_json(paths.test_metrics()).unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result: MedKgResult<Vec<u8>> = load_bincode(dir.path().join("absent.bin"));
        assert!(matches!(result, Err(crate::error::MedKgError::Io(_))));
    }
}
