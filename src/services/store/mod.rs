use crate::error::{CartRankError, Result};
use crate::models::*;
use crate::services::training::SelectedModel;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Read-only source of raw interaction events.
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    async fn load_events(&self) -> Result<Vec<RawEvent>>;
}

/// One JSON-encoded `RawEvent` per line.
#[derive(Debug, Clone)]
pub struct JsonLinesEventStore {
    path: PathBuf,
}

impl JsonLinesEventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn parse(&self, content: &str) -> Result<Vec<RawEvent>> {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(number, line)| {
                serde_json::from_str::<RawEvent>(line).map_err(|e| {
                    CartRankError::Data(format!("{}:{}: {}", self.path.display(), number + 1, e))
                })
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl EventStore for JsonLinesEventStore {
    async fn load_events(&self) -> Result<Vec<RawEvent>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let events = self.parse(&content)?;
        info!("Loaded {} events from {}", events.len(), self.path.display());
        Ok(events)
    }
}

/// RetailRocket-style export: `timestamp,visitorid,event,itemid,transactionid`.
/// Columns the event model does not know are ignored.
#[derive(Debug, Clone)]
pub struct CsvEventStore {
    path: PathBuf,
}

impl CsvEventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn parse(&self, content: &[u8]) -> Result<Vec<RawEvent>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content);

        reader
            .deserialize::<RawEvent>()
            .map(|record| {
                record.map_err(|e| {
                    let line = e.position().map_or(0, |position| position.line());
                    CartRankError::Data(format!("{}:{}: {}", self.path.display(), line, e))
                })
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl EventStore for CsvEventStore {
    async fn load_events(&self) -> Result<Vec<RawEvent>> {
        let content = tokio::fs::read(&self.path).await?;
        let events = self.parse(&content)?;
        info!("Loaded {} events from {}", events.len(), self.path.display());
        Ok(events)
    }
}

/// Picks the reader from the file extension: `.csv` or JSON lines otherwise.
pub fn event_store_for(path: impl AsRef<Path>) -> Arc<dyn EventStore> {
    let path = path.as_ref();
    if has_extension(path, "csv") {
        Arc::new(CsvEventStore::new(path))
    } else {
        Arc::new(JsonLinesEventStore::new(path))
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case(extension))
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryEventStore {
    events: Vec<RawEvent>,
}

impl InMemoryEventStore {
    pub fn new(events: Vec<RawEvent>) -> Self {
        Self { events }
    }
}

#[async_trait::async_trait]
impl EventStore for InMemoryEventStore {
    async fn load_events(&self) -> Result<Vec<RawEvent>> {
        Ok(self.events.clone())
    }
}

/// Durable home of the selected model artifact.
#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes next to the target and renames over it, so readers never
    /// observe a partially written artifact.
    pub async fn save(&self, model: &SelectedModel) -> Result<()> {
        write_atomically(&self.path, serde_json::to_vec_pretty(model)?).await?;
        info!("Saved model {} ({}) to {}", model.name, model.run_id, self.path.display());
        Ok(())
    }

    pub async fn load(&self) -> Result<SelectedModel> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No model artifact at {}", self.path.display());
                return Err(CartRankError::ModelUnavailable);
            }
            Err(e) => return Err(e.into()),
        };
        let model: SelectedModel = serde_json::from_slice(&bytes)?;
        model.validate().map_err(|e| {
            CartRankError::Data(format!("model artifact {} is malformed: {}", self.path.display(), e))
        })?;
        Ok(model)
    }
}

/// Writes the balanced table for offline inspection, as CSV when the path
/// ends in `.csv` and as JSON lines otherwise.
pub async fn write_snapshot<T: Serialize>(path: impl AsRef<Path>, rows: &[T]) -> Result<()> {
    let path = path.as_ref();
    if has_extension(path, "csv") {
        write_csv(path, rows).await
    } else {
        write_json_lines(path, rows).await
    }
}

pub async fn write_csv<T: Serialize>(path: impl AsRef<Path>, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let buffer = writer.into_inner().map_err(|e| e.into_error())?;
    write_atomically(path.as_ref(), buffer).await
}

pub async fn write_json_lines<T: Serialize>(path: impl AsRef<Path>, rows: &[T]) -> Result<()> {
    let mut buffer = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut buffer, row)?;
        buffer.push(b'\n');
    }
    write_atomically(path.as_ref(), buffer).await
}

async fn write_atomically(path: &Path, bytes: Vec<u8>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);

    tokio::fs::write(&staging, bytes).await?;
    tokio::fs::rename(&staging, path).await?;
    Ok(())
}
