// store.rs — RequestStore: persistence for shift change requests.
//
// Each request is stored as a JSON file: `<store_dir>/<request_id>.json`.
// Requests are never deleted; decided ones stay on disk as the audit trail.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::ApprovalError;
use crate::request::{RequestStatus, ShiftChangeRequest};

pub struct RequestStore {
    store_dir: PathBuf,
}

impl RequestStore {
    /// Create a store backed by the given directory, creating it if needed.
    pub fn new(store_dir: impl AsRef<Path>) -> Result<Self, ApprovalError> {
        let store_dir = store_dir.as_ref().to_path_buf();
        fs::create_dir_all(&store_dir).map_err(|source| ApprovalError::IoError {
            path: store_dir.display().to_string(),
            source,
        })?;
        Ok(Self { store_dir })
    }

    /// Save a request (creates or overwrites).
    ///
    /// Written to `<id>.json.tmp` and renamed into place, so a failed save
    /// leaves the previous version intact.
    pub fn save(&self, request: &ShiftChangeRequest) -> Result<(), ApprovalError> {
        let path = self.request_file(request.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(request)?;
        fs::write(&tmp, json).map_err(|source| ApprovalError::IoError {
            path: tmp.display().to_string(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| ApprovalError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    pub fn get(&self, request_id: Uuid) -> Result<Option<ShiftChangeRequest>, ApprovalError> {
        let path = self.request_file(request_id);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).map_err(|source| ApprovalError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Like [`RequestStore::get`], but a missing request is an error.
    pub fn require(&self, request_id: Uuid) -> Result<ShiftChangeRequest, ApprovalError> {
        self.get(request_id)?
            .ok_or(ApprovalError::NotFound(request_id))
    }

    /// List all requests, newest first. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<ShiftChangeRequest>, ApprovalError> {
        let mut requests = Vec::new();

        let entries = fs::read_dir(&self.store_dir).map_err(|source| ApprovalError::IoError {
            path: self.store_dir.display().to_string(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| ApprovalError::IoError {
                path: self.store_dir.display().to_string(),
                source,
            })?;
            let path = entry.path();

            if path.extension().is_some_and(|ext| ext == "json") {
                let json = fs::read_to_string(&path).map_err(|source| ApprovalError::IoError {
                    path: path.display().to_string(),
                    source,
                })?;
                match serde_json::from_str::<ShiftChangeRequest>(&json) {
                    Ok(request) => requests.push(request),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable request")
                    }
                }
            }
        }

        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    pub fn list_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<ShiftChangeRequest>, ApprovalError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.status == status)
            .collect())
    }

    fn request_file(&self, request_id: Uuid) -> PathBuf {
        self.store_dir.join(format!("{}.json", request_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestKind;
    use chrono::{Duration, NaiveDate, Utc};
    use tempfile::tempdir;

    fn request(offset_secs: i64) -> ShiftChangeRequest {
        let date = NaiveDate::from_ymd_opt(2024, 6, 4).unwrap();
        let created = Utc::now() + Duration::seconds(offset_secs);
        ShiftChangeRequest {
            id: Uuid::new_v4(),
            kind: RequestKind::Absence,
            employee_id: 1,
            employee_name: Some("Sato".into()),
            date,
            from_slot: None,
            to_slot: None,
            target_employee_id: None,
            target_employee_name: None,
            reason: Some("fever".into()),
            status: RequestStatus::Pending,
            requested_via: Some("web".into()),
            external_user_id: None,
            snapshot_week_start: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            snapshot_week_end: NaiveDate::from_ymd_opt(2024, 6, 9).unwrap(),
            snapshot_version: 1,
            change_set_id: None,
            decided_by: None,
            decision_note: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn save_and_get() {
        let dir = tempdir().unwrap();
        let store = RequestStore::new(dir.path().join("requests")).unwrap();
        let req = request(0);
        store.save(&req).unwrap();

        let loaded = store.get(req.id).unwrap().unwrap();
        assert_eq!(loaded.id, req.id);
        assert_eq!(loaded.reason.as_deref(), Some("fever"));
        assert!(store.get(Uuid::new_v4()).unwrap().is_none());
        assert!(matches!(
            store.require(Uuid::new_v4()),
            Err(ApprovalError::NotFound(_))
        ));
    }

    #[test]
    fn list_is_newest_first_and_filters() {
        let dir = tempdir().unwrap();
        let store = RequestStore::new(dir.path()).unwrap();
        let older = request(-60);
        let mut newer = request(0);
        newer.status = RequestStatus::Rejected;
        store.save(&older).unwrap();
        store.save(&newer).unwrap();
        fs::write(dir.path().join("garbage.json"), "{not json").unwrap();

        let all = store.list().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, newer.id);

        let pending = store.list_by_status(RequestStatus::Pending).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, older.id);
    }

    #[test]
    fn failed_save_keeps_the_previous_version() {
        let dir = tempdir().unwrap();
        let store = RequestStore::new(dir.path()).unwrap();
        let mut req = request(0);
        store.save(&req).unwrap();

        fs::create_dir(dir.path().join(format!("{}.json.tmp", req.id))).unwrap();
        req.status = RequestStatus::Approved;
        let err = store.save(&req).unwrap_err();
        assert_eq!(err.kind(), "io");
        assert_eq!(store.require(req.id).unwrap().status, RequestStatus::Pending);
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
