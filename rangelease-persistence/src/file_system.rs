use async_trait::async_trait;
use rangelease_core::{persistence::PersistenceLayer, LeaseError, RangeId, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

const STATE_FILE_PREFIX: &str = "range-";
const STATE_FILE_EXTENSION: &str = "dat";

/// File-based range-state store.
///
/// Each range is stored in its own file, `range-<id>.dat`, under the data
/// directory. Writes go to a temporary file that is then renamed over the
/// previous record.
#[derive(Debug, Clone)]
pub struct FileSystemPersistence {
    data_dir: PathBuf,
}

impl FileSystemPersistence {
    /// Create a store rooted at `data_dir`, creating the directory if needed.
    ///
    /// # Errors
    /// * Returns error if the data directory cannot be created
    pub async fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();

        if !data_dir.exists() {
            fs::create_dir_all(data_dir).await.map_err(|e| {
                LeaseError::persistence(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn state_file_path(&self, range_id: RangeId) -> PathBuf {
        self.data_dir.join(format!(
            "{}{}.{}",
            STATE_FILE_PREFIX,
            range_id.value(),
            STATE_FILE_EXTENSION
        ))
    }

    fn parse_range_id(file_name: &str) -> Option<RangeId> {
        let id = file_name
            .strip_prefix(STATE_FILE_PREFIX)?
            .strip_suffix(STATE_FILE_EXTENSION)?
            .strip_suffix('.')?;
        id.parse().ok().map(RangeId::new)
    }
}

#[async_trait]
impl PersistenceLayer for FileSystemPersistence {
    async fn save_range_state(&self, range_id: RangeId, state: &[u8]) -> Result<()> {
        let state_file_path = self.state_file_path(range_id);
        let temp_file_path = state_file_path.with_extension("tmp");

        fs::write(&temp_file_path, state).await.map_err(|e| {
            LeaseError::persistence(format!(
                "Failed to write state of {} to temp file: {}",
                range_id, e
            ))
        })?;

        fs::rename(&temp_file_path, &state_file_path)
            .await
            .map_err(|e| {
                LeaseError::persistence(format!(
                    "Failed to rename temp file to state file of {}: {}",
                    range_id, e
                ))
            })?;

        debug!("Saved {} bytes of state for {}", state.len(), range_id);
        Ok(())
    }

    async fn load_range_state(&self, range_id: RangeId) -> Result<Option<Vec<u8>>> {
        match fs::read(self.state_file_path(range_id)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LeaseError::persistence(format!(
                "Failed to read state file of {}: {}",
                range_id, e
            ))),
        }
    }

    async fn list_ranges(&self) -> Result<Vec<RangeId>> {
        let mut entries = fs::read_dir(&self.data_dir).await.map_err(|e| {
            LeaseError::persistence(format!("Failed to list data directory: {}", e))
        })?;

        let mut ranges = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(range_id) = entry.file_name().to_str().and_then(Self::parse_range_id) {
                ranges.push(range_id);
            }
        }
        ranges.sort();
        Ok(ranges)
    }
}
