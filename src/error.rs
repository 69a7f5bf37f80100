// src/error.rs
//! Ошибки генерации карты
//!
//! Входные ошибки (битые строки каталога, неразрешённые родители) и
//! топологические аномалии сюда не попадают: они логируются и считаются в
//! диагностике. `MapError` — только то, что обрывает запуск.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("source {0} is already registered")]
    DuplicateSource(String),

    /// Не удалось выделить память под сетку `resolution × resolution`.
    #[error("cannot allocate {cells} grid cells")]
    GridAllocation { cells: usize },

    #[error("geometry writer: {0}")]
    Writer(String),

    #[error("failed to serialize summary: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write preview image: {0}")]
    Image(#[from] image::ImageError),
}

impl MapError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for MapError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            source,
        }
    }
}
