//! Two primitives over a per-agent data directory: append a line to a
//! named log, and atomically replace a named snapshot. Thread-safety
//! beyond a single process is the caller's job; within a process each
//! named file is serialized behind its own lock so concurrent owners of
//! the same log name don't interleave writes.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StorageError, StorageResult};

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[derive(Clone)]
pub struct Store {
    data_dir: PathBuf,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl Store {
    pub fn new(data_dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(|e| io_err(&data_dir, e))?;
        Ok(Self {
            data_dir,
            locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Append one record as a line of canonical JSON to `log_name`.
    pub fn append<T: Serialize>(&self, log_name: &str, record: &T) -> StorageResult<()> {
        let file_lock = self.lock_for(log_name);
        let _guard = file_lock.lock();

        let path = self.path_for(log_name);
        let bytes = beacon_core::canonical::to_canonical_bytes(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        file.write_all(&bytes).map_err(|e| io_err(&path, e))?;
        file.write_all(b"\n").map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    /// Every line of `log_name`, parsed as JSON. Skips trailing blank lines.
    pub fn read_all<T: DeserializeOwned>(&self, log_name: &str) -> StorageResult<Vec<T>> {
        let path = self.path_for(log_name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path).map_err(|e| io_err(&path, e))?;
        let reader = BufReader::new(file);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|e| io_err(&path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            out.push(serde_json::from_str(&line)?);
        }
        Ok(out)
    }

    /// Last `n` records of `log_name`.
    pub fn tail<T: DeserializeOwned>(&self, log_name: &str, n: usize) -> StorageResult<Vec<T>> {
        let mut all = self.read_all::<T>(log_name)?;
        if all.len() > n {
            all.drain(0..all.len() - n);
        }
        Ok(all)
    }

    /// Atomically replace `name`'s contents: write to a temp file in the
    /// same directory, then rename over the target.
    pub fn snapshot<T: Serialize>(&self, name: &str, value: &T) -> StorageResult<()> {
        let file_lock = self.lock_for(name);
        let _guard = file_lock.lock();

        let path = self.path_for(name);
        let tmp_path = self.data_dir.join(format!("{name}.tmp"));
        let bytes = beacon_core::canonical::to_canonical_bytes(value)?;
        fs::write(&tmp_path, &bytes).map_err(|e| io_err(&tmp_path, e))?;
        fs::rename(&tmp_path, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    pub fn load_snapshot<T: DeserializeOwned>(&self, name: &str) -> StorageResult<Option<T>> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| io_err(&path, e))?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    pub fn load_snapshot_or_default<T: DeserializeOwned + Default>(
        &self,
        name: &str,
    ) -> StorageResult<T> {
        Ok(self.load_snapshot(name)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Rec {
        n: u32,
    }

    #[test]
    fn append_then_read_all_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        store.append("log.jsonl", &Rec { n: 1 }).unwrap();
        store.append("log.jsonl", &Rec { n: 2 }).unwrap();
        let recs: Vec<Rec> = store.read_all("log.jsonl").unwrap();
        assert_eq!(recs, vec![Rec { n: 1 }, Rec { n: 2 }]);
    }

    #[test]
    fn tail_returns_last_n() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        for i in 0..5 {
            store.append("log.jsonl", &Rec { n: i }).unwrap();
        }
        let recs: Vec<Rec> = store.tail("log.jsonl", 2).unwrap();
        assert_eq!(recs, vec![Rec { n: 3 }, Rec { n: 4 }]);
    }

    #[test]
    fn snapshot_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        store.snapshot("s.json", &Rec { n: 1 }).unwrap();
        store.snapshot("s.json", &Rec { n: 2 }).unwrap();
        let loaded: Rec = store.load_snapshot("s.json").unwrap().unwrap();
        assert_eq!(loaded, Rec { n: 2 });
        assert!(!store.path_for("s.json.tmp").exists());
    }

    #[test]
    fn missing_log_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let recs: Vec<Rec> = store.read_all("missing.jsonl").unwrap();
        assert!(recs.is_empty());
    }

    #[test]
    fn missing_snapshot_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        assert!(store.load_snapshot::<Rec>("missing.json").unwrap().is_none());
    }
}
