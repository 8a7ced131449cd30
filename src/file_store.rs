use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::models::{PulseModel, SignalRecord};
use crate::store::PulseStore;

/// Local/file mode: per-tenant JSON documents on disk. Signals live as one
/// JSON record per line under `signals/`, the cached model as a single
/// document under `models/`. Every write goes through a temp file and a
/// rename so a crash never leaves a half-written document.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// `tenant` locates the document tree and is mandatory; a missing
    /// tenant is a configuration error, not something to default around.
    pub fn open(data_dir: &Path, tenant: &str) -> anyhow::Result<Self> {
        if tenant.trim().is_empty() {
            bail!("file-mode storage requires a tenant identifier");
        }

        let root = data_dir.join(tenant.trim());
        fs::create_dir_all(root.join("signals"))
            .with_context(|| format!("failed to create {}", root.join("signals").display()))?;
        fs::create_dir_all(root.join("models"))
            .with_context(|| format!("failed to create {}", root.join("models").display()))?;

        Ok(Self { root })
    }

    fn signals_path(&self, scope_key: &str) -> PathBuf {
        self.root
            .join("signals")
            .join(format!("{}.jsonl", sanitize(scope_key)))
    }

    fn model_path(&self, scope_key: &str) -> PathBuf {
        self.root
            .join("models")
            .join(format!("{}.json", sanitize(scope_key)))
    }

    fn read_signal_lines(&self, path: &Path) -> anyhow::Result<Vec<SignalRecord>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let mut records = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SignalRecord>(line) {
                Ok(record) => records.push(record),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping malformed signal line");
                }
            }
        }

        Ok(records)
    }
}

fn sanitize(scope_key: &str) -> String {
    scope_key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Write the full document to a `.tmp` sibling, then rename into place.
fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move {} into place", tmp.display()))?;
    Ok(())
}

#[async_trait]
impl PulseStore for FileStore {
    async fn insert_signals(&self, records: &[SignalRecord]) -> anyhow::Result<usize> {
        let mut by_scope: HashMap<&str, Vec<&SignalRecord>> = HashMap::new();
        for record in records {
            by_scope.entry(record.scope_key.as_str()).or_default().push(record);
        }

        let mut written = 0usize;
        for (scope_key, batch) in by_scope {
            let path = self.signals_path(scope_key);
            let mut contents = if path.exists() {
                fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?
            } else {
                String::new()
            };

            for record in batch {
                contents.push_str(&serde_json::to_string(record)?);
                contents.push('\n');
                written += 1;
            }

            write_atomic(&path, &contents)?;
        }

        Ok(written)
    }

    async fn signals_since(
        &self,
        scope_key: &str,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<SignalRecord>> {
        let mut records = self.read_signal_lines(&self.signals_path(scope_key))?;
        // Sanitized file names are lossy, so distinct scope keys can share a
        // file; the record's own scope key is authoritative.
        records.retain(|record| record.scope_key == scope_key && record.created_at >= cutoff);
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn upsert_model(&self, scope_key: &str, model: &PulseModel) -> anyhow::Result<()> {
        let contents = serde_json::to_string_pretty(model)?;
        write_atomic(&self.model_path(scope_key), &contents)
    }

    async fn latest_model(&self, scope_key: &str) -> anyhow::Result<Option<PulseModel>> {
        let path = self.model_path(scope_key);
        if !path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        match serde_json::from_str(&raw) {
            Ok(model) => Ok(Some(model)),
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping malformed model document");
                Ok(None)
            }
        }
    }

    async fn active_scopes(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> anyhow::Result<Vec<String>> {
        let signals_dir = self.root.join("signals");
        let mut last_seen: HashMap<String, DateTime<Utc>> = HashMap::new();

        for entry in fs::read_dir(&signals_dir)
            .with_context(|| format!("failed to list {}", signals_dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }

            // The verbatim scope key lives in the records; the file name is
            // a sanitized form and never round-trips, and one file can hold
            // several scopes whose keys sanitize identically.
            for record in self.read_signal_lines(&path)? {
                let created_at = record.created_at;
                let entry = last_seen.entry(record.scope_key).or_insert(created_at);
                if created_at > *entry {
                    *entry = created_at;
                }
            }
        }

        let mut scopes: Vec<(String, DateTime<Utc>)> = last_seen
            .into_iter()
            .filter(|(_, seen)| *seen >= since)
            .collect();
        scopes.sort_by(|a, b| b.1.cmp(&a.1));
        scopes.truncate(limit);
        Ok(scopes.into_iter().map(|(scope, _)| scope).collect())
    }
}
