//! Stack settings persistence
//!
//! `LocalSettingsStore` keeps both collections in memory and writes them as a
//! single JSON document. Writes go to a temporary file that is renamed over the
//! target, so a crash never leaves a truncated document behind.

use crate::models::{IgnoredImage, StackSettings};
use crate::utils::errors::{AppError, AppResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Document store holding stack settings and ignored images
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_all(&self) -> AppResult<Vec<StackSettings>>;

    /// Fails with `SettingsNotFound` when no row carries `name`
    async fn get_by_name(&self, name: &str) -> AppResult<StackSettings>;

    /// Fails with `SettingsConflict` when a row with the same stack name exists
    async fn create(&self, settings: StackSettings) -> AppResult<()>;

    async fn replace(&self, name: &str, settings: StackSettings) -> AppResult<()>;

    async fn delete(&self, name: &str) -> AppResult<()>;

    /// Replace several rows; stores without batch writes fall back to one write per row
    async fn replace_many(&self, rows: Vec<StackSettings>) -> AppResult<()> {
        for row in rows {
            let name = row.stack_name.clone();
            self.replace(&name, row).await?;
        }
        Ok(())
    }

    async fn ignored_images(&self) -> AppResult<Vec<IgnoredImage>>;

    async fn add_ignored_image(&self, image: IgnoredImage) -> AppResult<()>;

    async fn remove_ignored_image(&self, name: &str) -> AppResult<()>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(default)]
    stacks: BTreeMap<String, StackSettings>,
    #[serde(default)]
    ignored_images: Vec<IgnoredImage>,
}

/// JSON-file backed settings store
pub struct LocalSettingsStore {
    path: Option<PathBuf>,
    document: Arc<RwLock<Document>>,
    timeout: Duration,
}

impl LocalSettingsStore {
    /// Store without persistence
    pub fn in_memory(timeout: Duration) -> Self {
        Self {
            path: None,
            document: Arc::new(RwLock::new(Document::default())),
            timeout,
        }
    }

    /// Load the document at `path`, starting empty when the file does not exist yet
    pub async fn open(path: impl Into<PathBuf>, timeout: Duration) -> AppResult<Self> {
        let path = path.into();
        let document = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Document>(&bytes).map_err(|e| {
                AppError::Storage(format!("Failed to parse settings file {:?}: {}", path, e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Settings file {:?} not found, starting empty", path);
                Document::default()
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "Loaded {} stack settings and {} ignored images from {:?}",
            document.stacks.len(),
            document.ignored_images.len(),
            path
        );

        Ok(Self {
            path: Some(path),
            document: Arc::new(RwLock::new(document)),
            timeout,
        })
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| AppError::Storage(format!("{} timed out after {:?}", op, self.timeout)))?
    }

    async fn persist(&self, document: &Document) -> AppResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_atomically(path, &serde_json::to_vec_pretty(document)?).await?;
        debug!("Settings written to {:?}", path);
        Ok(())
    }

    /// Apply `change` to a copy of the document, persist it, then publish it
    async fn mutate<F>(&self, op: &str, change: F) -> AppResult<()>
    where
        F: FnOnce(&mut Document) -> AppResult<()> + Send,
    {
        self.bounded(op, async {
            let mut document = self.document.write().await;
            let mut next = document.clone();
            change(&mut next)?;
            self.persist(&next).await?;
            *document = next;
            Ok(())
        })
        .await
    }
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> AppResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl SettingsStore for LocalSettingsStore {
    async fn get_all(&self) -> AppResult<Vec<StackSettings>> {
        self.bounded("get_all", async {
            Ok(self.document.read().await.stacks.values().cloned().collect())
        })
        .await
    }

    async fn get_by_name(&self, name: &str) -> AppResult<StackSettings> {
        self.bounded("get_by_name", async {
            self.document
                .read()
                .await
                .stacks
                .get(name)
                .cloned()
                .ok_or_else(|| AppError::SettingsNotFound(name.to_string()))
        })
        .await
    }

    async fn create(&self, settings: StackSettings) -> AppResult<()> {
        self.mutate("create", move |doc| {
            if doc.stacks.contains_key(&settings.stack_name) {
                return Err(AppError::SettingsConflict(format!(
                    "stack '{}' already exists",
                    settings.stack_name
                )));
            }
            doc.stacks.insert(settings.stack_name.clone(), settings);
            Ok(())
        })
        .await
    }

    async fn replace(&self, name: &str, settings: StackSettings) -> AppResult<()> {
        let name = name.to_string();
        self.mutate("replace", move |doc| {
            if doc.stacks.remove(&name).is_none() {
                return Err(AppError::SettingsNotFound(name));
            }
            if name != settings.stack_name && doc.stacks.contains_key(&settings.stack_name) {
                return Err(AppError::SettingsConflict(format!(
                    "stack '{}' already exists",
                    settings.stack_name
                )));
            }
            doc.stacks.insert(settings.stack_name.clone(), settings);
            Ok(())
        })
        .await
    }

    async fn delete(&self, name: &str) -> AppResult<()> {
        let name = name.to_string();
        self.mutate("delete", move |doc| match doc.stacks.remove(&name) {
            Some(_) => Ok(()),
            None => Err(AppError::SettingsNotFound(name)),
        })
        .await
    }

    /// All rows are written in one document write; nothing changes if any row is unknown
    async fn replace_many(&self, rows: Vec<StackSettings>) -> AppResult<()> {
        self.mutate("replace_many", move |doc| {
            for row in rows {
                match doc.stacks.get_mut(&row.stack_name) {
                    Some(existing) => *existing = row,
                    None => return Err(AppError::SettingsNotFound(row.stack_name)),
                }
            }
            Ok(())
        })
        .await
    }

    async fn ignored_images(&self) -> AppResult<Vec<IgnoredImage>> {
        self.bounded("ignored_images", async {
            Ok(self.document.read().await.ignored_images.clone())
        })
        .await
    }

    async fn add_ignored_image(&self, image: IgnoredImage) -> AppResult<()> {
        self.mutate("add_ignored_image", move |doc| {
            if doc.ignored_images.iter().any(|i| i.name == image.name) {
                return Err(AppError::SettingsConflict(format!(
                    "image '{}' is already ignored",
                    image.name
                )));
            }
            doc.ignored_images.push(image);
            Ok(())
        })
        .await
    }

    async fn remove_ignored_image(&self, name: &str) -> AppResult<()> {
        let name = name.to_string();
        self.mutate("remove_ignored_image", move |doc| {
            let before = doc.ignored_images.len();
            doc.ignored_images.retain(|i| i.name != name);
            if doc.ignored_images.len() == before {
                return Err(AppError::SettingsNotFound(name));
            }
            Ok(())
        })
        .await
    }
}
