// audit.rs — Append-only JSONL trail of schedule commits.
//
// One JSON object per line. Each entry carries the SHA-256 of the previous
// line, so inserting, deleting or editing a line breaks the chain.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ChangeSetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Apply,
    Rollback,
}

/// One committed schedule write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Who asked for the write; `None` for unattributed callers.
    pub actor: Option<String>,
    pub action: AuditAction,
    pub change_set_id: Uuid,
    /// Schedule version after the write.
    pub schedule_version: u64,
    pub previous_hash: Option<String>,
}

impl AuditEntry {
    pub fn new(
        actor: Option<&str>,
        action: AuditAction,
        change_set_id: Uuid,
        schedule_version: u64,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor: actor.map(str::to_string),
            action,
            change_set_id,
            schedule_version,
            previous_hash: None,
        }
    }
}

/// An append-only audit log backed by a JSONL file.
pub struct AuditLog {
    writer: BufWriter<File>,
    path: PathBuf,
    last_hash: Option<String>,
}

impl AuditLog {
    /// Open (or create) the log, recovering the chain from existing lines.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ChangeSetError> {
        let path = path.as_ref().to_path_buf();
        let last_hash = if path.exists() {
            read_last_hash(&path)?
        } else {
            None
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| io_error(&path, source))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            last_hash,
        })
    }

    /// Link `entry` to the previous line, write it, and flush.
    pub fn append(&mut self, entry: &mut AuditEntry) -> Result<(), ChangeSetError> {
        entry.previous_hash = self.last_hash.clone();
        let json = serde_json::to_string(entry)?;
        writeln!(self.writer, "{}", json).map_err(|source| io_error(&self.path, source))?;
        self.writer
            .flush()
            .map_err(|source| io_error(&self.path, source))?;
        self.last_hash = Some(hash_line(&json));
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries, oldest first. Blank lines are skipped.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditEntry>, ChangeSetError> {
        let mut entries = Vec::new();
        for line in lines(path.as_ref())? {
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }

    /// Check every `previous_hash` against the raw line before it.
    pub fn verify_chain(path: impl AsRef<Path>) -> Result<(), ChangeSetError> {
        let mut previous: Option<String> = None;
        for (n, line) in lines(path.as_ref())?.into_iter().enumerate() {
            let entry: AuditEntry = serde_json::from_str(&line)?;
            if entry.previous_hash != previous {
                return Err(ChangeSetError::AuditChainBroken { line: n + 1 });
            }
            previous = Some(hash_line(&line));
        }
        Ok(())
    }
}

fn lines(path: &Path) -> Result<Vec<String>, ChangeSetError> {
    let file = File::open(path).map_err(|source| io_error(path, source))?;
    let mut out = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|source| io_error(path, source))?;
        if !line.trim().is_empty() {
            out.push(line);
        }
    }
    Ok(out)
}

fn read_last_hash(path: &Path) -> Result<Option<String>, ChangeSetError> {
    Ok(lines(path)?.last().map(|line| hash_line(line)))
}

fn hash_line(line: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(line.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn io_error(path: &Path, source: std::io::Error) -> ChangeSetError {
    ChangeSetError::IoError {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn entries_chain_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let id = Uuid::new_v4();
        {
            let mut log = AuditLog::open(&path).unwrap();
            log.append(&mut AuditEntry::new(Some("manager"), AuditAction::Apply, id, 2))
                .unwrap();
        }
        let mut log = AuditLog::open(&path).unwrap();
        log.append(&mut AuditEntry::new(None, AuditAction::Rollback, id, 3))
            .unwrap();

        let entries = AuditLog::read_all(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].actor.as_deref(), Some("manager"));
        assert_eq!(entries[0].previous_hash, None);
        assert!(entries[1].previous_hash.is_some());
        assert_eq!(entries[1].action, AuditAction::Rollback);
        AuditLog::verify_chain(&path).unwrap();
    }

    #[test]
    fn edited_line_breaks_the_chain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut log = AuditLog::open(&path).unwrap();
        for version in 2..5 {
            log.append(&mut AuditEntry::new(
                Some("manager"),
                AuditAction::Apply,
                Uuid::new_v4(),
                version,
            ))
            .unwrap();
        }
        drop(log);

        let tampered = std::fs::read_to_string(&path)
            .unwrap()
            .replacen("manager", "someone", 1);
        std::fs::write(&path, tampered).unwrap();

        let err = AuditLog::verify_chain(&path).unwrap_err();
        assert!(matches!(err, ChangeSetError::AuditChainBroken { line: 2 }));
        assert_eq!(err.kind(), "audit_chain_broken");
    }
}
