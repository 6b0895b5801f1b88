//! Full-book JSON export
//!
//! One entry per non-empty symbol, `{bids, asks, timestamp}`, plus a
//! `_metadata` object describing the run that produced it.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::aggregate::OrderBookAggregate;
use crate::order_book::LevelView;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Exported levels for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolExport {
    pub bids: Vec<LevelView>,
    pub asks: Vec<LevelView>,
    /// Epoch milliseconds at export time.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub messages_processed: u64,
    pub errors: u64,
    pub symbols_count: usize,
    pub generated_at: i64,
    pub source_file: Option<String>,
    pub state_checksum: String,
}

/// The persisted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookExport {
    #[serde(flatten)]
    pub books: BTreeMap<String, SymbolExport>,
    #[serde(rename = "_metadata")]
    pub metadata: ExportMetadata,
}

impl BookExport {
    /// Capture the aggregate. `depth` limits levels per side; None exports
    /// every level.
    pub fn build(book: &OrderBookAggregate, depth: Option<usize>, source_file: Option<&str>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let limit = depth.unwrap_or(usize::MAX);

        let books: BTreeMap<String, SymbolExport> = book
            .full_snapshot_all()
            .into_iter()
            .filter(|s| !s.bids.is_empty() || !s.asks.is_empty())
            .map(|s| {
                (
                    s.symbol.to_string(),
                    SymbolExport {
                        bids: s.bids.into_iter().take(limit).collect(),
                        asks: s.asks.into_iter().take(limit).collect(),
                        timestamp: now,
                    },
                )
            })
            .collect();

        let recorder = book.recorder();
        let metadata = ExportMetadata {
            messages_processed: recorder.messages(),
            errors: recorder.errors(),
            symbols_count: books.len(),
            generated_at: now,
            source_file: source_file.map(str::to_string),
            state_checksum: book.state_checksum(),
        };

        Self { books, metadata }
    }

    pub fn to_json_pretty(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write pretty-printed, creating parent directories. Returns bytes written.
    pub fn write_to(&self, path: &Path) -> Result<usize, ExportError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = self.to_json_pretty()?;
        fs::write(path, &json)?;

        info!(
            path = %path.display(),
            bytes = json.len(),
            symbols = self.metadata.symbols_count,
            "Order book exported"
        );
        Ok(json.len())
    }
}
