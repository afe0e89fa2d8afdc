//! Persistent tracking store using redb.
//!
//! # Table design
//!
//! A single `TRACKED` table keyed by `owner/repo`. Values are JSON arrays of
//! tracked issues. Older stores hold bare issue numbers instead of objects;
//! both shapes decode through [`StoredEntry`] into [`TrackedIssue`] when read,
//! and every write uses the current shape.
//!
//! A repository whose list becomes empty is removed from the table.

use std::collections::BTreeMap;
use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, WardenError};
use crate::types::RepoRef;

/// Key: `owner/repo` as UTF-8 bytes
/// Value: JSON-encoded list of entries
const TRACKED: TableDefinition<&[u8], &[u8]> = TableDefinition::new("tracked");

fn db_err(e: impl std::fmt::Display) -> WardenError {
    WardenError::TrackingDb(e.to_string())
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedIssue {
    pub issue_number: u64,
    /// Comment refreshed by the cron job. Legacy entries have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<u64>,
}

impl TrackedIssue {
    pub fn new(issue_number: u64, comment_id: u64) -> Self {
        Self {
            issue_number,
            comment_id: Some(comment_id),
        }
    }
}

/// Shapes found on disk.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Legacy(u64),
    Current(TrackedIssue),
}

impl From<StoredEntry> for TrackedIssue {
    fn from(entry: StoredEntry) -> Self {
        match entry {
            StoredEntry::Legacy(issue_number) => TrackedIssue {
                issue_number,
                comment_id: None,
            },
            StoredEntry::Current(issue) => issue,
        }
    }
}

fn decode(bytes: &[u8]) -> Result<Vec<TrackedIssue>> {
    let stored: Vec<StoredEntry> = serde_json::from_slice(bytes).map_err(db_err)?;
    Ok(stored.into_iter().map(TrackedIssue::from).collect())
}

// ---------------------------------------------------------------------------
// TrackingDb
// ---------------------------------------------------------------------------

pub struct TrackingDb {
    db: Database,
}

impl TrackingDb {
    /// Open or create the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(TRACKED).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    /// Every tracked repository with its entries, ordered by `owner/repo`.
    ///
    /// Records whose key or list cannot be decoded are logged and left out;
    /// they stay on disk untouched.
    pub fn get_all(&self) -> Result<BTreeMap<RepoRef, Vec<TrackedIssue>>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(TRACKED).map_err(db_err)?;

        let mut result = BTreeMap::new();
        for entry in table.iter().map_err(db_err)? {
            let (k, v) = entry.map_err(db_err)?;
            let key = String::from_utf8_lossy(k.value()).into_owned();
            let decoded = key
                .parse::<RepoRef>()
                .and_then(|repo| decode(v.value()).map(|entries| (repo, entries)));
            match decoded {
                Ok((repo, entries)) => {
                    result.insert(repo, entries);
                }
                Err(e) => warn!(key = %key, error = %e, "skipping unreadable tracking record"),
            }
        }
        Ok(result)
    }

    pub fn get_repo(&self, repo: &RepoRef) -> Result<Vec<TrackedIssue>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(TRACKED).map_err(db_err)?;
        let key = repo.key();
        match table.get(key.as_bytes()).map_err(db_err)? {
            Some(v) => decode(v.value()),
            None => Ok(Vec::new()),
        }
    }

    /// Track an issue. An existing entry for the same issue is replaced.
    pub fn add(&self, repo: &RepoRef, issue: TrackedIssue) -> Result<()> {
        self.modify(repo, |entries| {
            entries.retain(|e| e.issue_number != issue.issue_number);
            entries.push(issue);
        })
    }

    /// Stop tracking an issue. Returns whether an entry was removed.
    pub fn remove(&self, repo: &RepoRef, issue_number: u64) -> Result<bool> {
        let mut removed = false;
        self.modify(repo, |entries| {
            let before = entries.len();
            entries.retain(|e| e.issue_number != issue_number);
            removed = entries.len() != before;
        })?;
        Ok(removed)
    }

    /// Remove then add, in one transaction.
    pub fn update(&self, repo: &RepoRef, issue: TrackedIssue) -> Result<()> {
        self.add(repo, issue)
    }

    fn modify(&self, repo: &RepoRef, f: impl FnOnce(&mut Vec<TrackedIssue>)) -> Result<()> {
        let key = repo.key();
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(TRACKED).map_err(db_err)?;
            let mut entries = match table.get(key.as_bytes()).map_err(db_err)? {
                Some(v) => decode(v.value())?,
                None => Vec::new(),
            };
            f(&mut entries);
            if entries.is_empty() {
                table.remove(key.as_bytes()).map_err(db_err)?;
            } else {
                let value = serde_json::to_vec(&entries).map_err(db_err)?;
                table
                    .insert(key.as_bytes(), value.as_slice())
                    .map_err(db_err)?;
            }
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
