pub mod cache;
pub mod chart;
pub mod config;
pub mod series;
pub mod symbol;
pub mod util;

pub use cache::{CacheError, CacheKey, RateCache};
pub use chart::{
    BarInfo, ChartViewState, Command, Interaction, Modal, Redraw,
    annotation::{AnnotationStore, LineId, LineStyle, Selection},
    frame::{Frame, Layer, Primitive},
    scale::{BarSpace, PriceSpace, Projection},
};
pub use config::settings::Settings;
pub use series::RateSeries;

use log::{info, warn};
use serde::de::DeserializeOwned;

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const SETTINGS_PATH: &str = "settings.json";

#[derive(thiserror::Error, Debug)]
pub enum InternalError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub fn data_path(path_name: Option<&str>) -> PathBuf {
    let base = if let Ok(path) = std::env::var("FX_OVERLAY_DATA_PATH") {
        PathBuf::from(path)
    } else {
        dirs_next::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fx-overlay")
    };

    match path_name {
        Some(name) => base.join(name),
        None => base,
    }
}

/// Resolves a configured file name: absolute paths are kept, anything else
/// lives in the data directory.
pub fn resolve_path(file_name: &str) -> PathBuf {
    let path = Path::new(file_name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_path(Some(file_name))
    }
}

pub fn write_json_to_file(json: &str, path: &Path) -> Result<(), InternalError> {
    let io_err = |source| InternalError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut file = File::create(path).map_err(io_err)?;
    file.write_all(json.as_bytes()).map_err(io_err)?;
    Ok(())
}

/// Reads and parses a JSON file. A file that exists but does not parse is
/// moved aside to `<stem>_old.<ext>` so that the next write does not destroy it.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, InternalError> {
    let mut file = File::open(path).map_err(|source| InternalError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|source| InternalError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    drop(file);

    serde_json::from_str(&contents).map_err(|source| {
        backup_corrupted(path);
        InternalError::Json {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn backup_corrupted(path: &Path) {
    let backup_path = backup_path_for(path);

    if let Err(rename_err) = std::fs::rename(path, &backup_path) {
        warn!(
            "Failed to backup corrupted file '{}' to '{}': {}",
            path.display(),
            backup_path.display(),
            rename_err
        );
    } else {
        info!(
            "Backed up corrupted file to '{}'. It can be restored manually.",
            backup_path.display()
        );
    }
}

fn backup_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let file_name = match path.extension() {
        Some(ext) => format!("{stem}_old.{}", ext.to_string_lossy()),
        None => format!("{stem}_old"),
    };

    path.with_file_name(file_name)
}

#[cfg(test)]
pub(crate) fn temp_file(name: &str) -> PathBuf {
    let unique = uuid::Uuid::new_v4();
    std::env::temp_dir()
        .join(format!("fx-overlay-test-{unique}"))
        .join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_name_keeps_extension() {
        assert_eq!(
            backup_path_for(Path::new("/tmp/x/annotations.json")),
            PathBuf::from("/tmp/x/annotations_old.json")
        );
        assert_eq!(
            backup_path_for(Path::new("/tmp/x/settings")),
            PathBuf::from("/tmp/x/settings_old")
        );
    }

    #[test]
    fn corrupted_file_is_moved_aside() {
        let path = temp_file("broken.json");
        write_json_to_file("{ not json", &path).unwrap();

        let result = read_json_file::<serde_json::Value>(&path);
        assert!(matches!(result, Err(InternalError::Json { .. })));
        assert!(!path.exists());
        assert!(backup_path_for(&path).exists());
    }

    #[test]
    fn missing_file_is_io_error() {
        let path = temp_file("absent.json");
        assert!(matches!(
            read_json_file::<serde_json::Value>(&path),
            Err(InternalError::Io { .. })
        ));
    }
}
