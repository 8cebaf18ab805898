use std::path::PathBuf;

use notekeep_core::RagSettings;

use crate::errors::{RagError, RagResult};

pub const DB_FILE_NAME: &str = "embeddings.sqlite3";

pub fn data_root() -> RagResult<PathBuf> {
    if let Ok(override_dir) = std::env::var("NOTEKEEP_DATA_DIR") {
        return Ok(PathBuf::from(override_dir));
    }

    let dir = dirs::data_dir().ok_or(RagError::MissingDataDir)?;
    Ok(dir.join("notekeep"))
}

pub fn embeddings_db_path(settings: &RagSettings) -> RagResult<PathBuf> {
    if let Some(path) = &settings.db_path_override {
        return Ok(path.clone());
    }
    Ok(data_root()?.join(DB_FILE_NAME))
}
