//! Библиотека внеядерного доступа к filterbank данным
//!
//! Разбор sigproc заголовков, вычисление частотной и временной осей,
//! выборки по частоте и времени, планирование чанков и блобов и поблобовая
//! конвертация плоского `.fil` файла в чанковый контейнер и обратно.
//!
//! # Быстрый старт
//!
//! ```no_run
//! use std::path::Path;
//!
//! use filbank_core::{ConversionEngine, ConversionMode, FilbankConfig, SelectionRequest};
//!
//! let engine = ConversionEngine::new(FilbankConfig::default());
//! let request = SelectionRequest::full().with_freq(Some(8_419.0), Some(8_420.0));
//!
//! let report = engine.convert_path(
//!     Path::new("voyager.fil"),
//!     Path::new("voyager.fbc"),
//!     ConversionMode::FlatToChunked,
//!     &request,
//! )?;
//! println!("{}", report.metrics);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod axis;
pub mod binary;
pub mod config;
pub mod container;
pub mod data;
pub mod engine;
pub mod flat;
pub mod format;
pub mod geometry;
pub mod metrics;
pub mod selection;
pub mod spectral;

pub use axis::*;
pub use config::*;
pub use container::{
    BlobStore, ContainerWriter, FilesystemStore, FilterbankContainer, MemoryStore,
};
pub use data::*;
pub use engine::*;
pub use flat::*;
pub use format::*;
pub use geometry::*;
pub use metrics::*;
pub use selection::*;
pub use spectral::*;

/// Версия библиотеки.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
