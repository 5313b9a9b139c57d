use crate::capture::ExchangeReady;
use crate::store::{ExchangeStore, Snapshot};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileContents {
    #[serde(default)]
    exchanges: Snapshot,
    #[serde(default)]
    undelivered: Vec<ExchangeReady>,
}

/// JSON file implementation of ExchangeStore
///
/// The whole file is rewritten on every change through a temporary file and
/// a rename, so a crash never leaves a half-written snapshot behind.
#[derive(Debug)]
pub struct FileExchangeStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileExchangeStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<FileContents> {
        if !self.path.exists() {
            return Ok(FileContents::default());
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(FileContents::default());
        }
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    fn write(&self, contents: &FileContents) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(contents)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl ExchangeStore for FileExchangeStore {
    fn load(&self) -> Result<Snapshot> {
        let _guard = self.lock.lock();
        Ok(self.read()?.exchanges)
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let _guard = self.lock.lock();
        let mut contents = self.read()?;
        contents.exchanges = snapshot.clone();
        self.write(&contents)
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock();
        self.write(&FileContents::default())
    }

    fn put_undelivered(&self, ready: &ExchangeReady) -> Result<()> {
        let _guard = self.lock.lock();
        let mut contents = self.read()?;
        contents.undelivered.push(ready.clone());
        self.write(&contents)
    }

    fn take_undelivered(&self) -> Result<Vec<ExchangeReady>> {
        let _guard = self.lock.lock();
        let mut contents = self.read()?;
        let drained = std::mem::take(&mut contents.undelivered);
        if !drained.is_empty() {
            self.write(&contents)?;
        }
        Ok(drained)
    }
}
