use serde::{Deserialize, Serialize};

use crate::snapkeep::status::{MediaHandle, Status, StatusType};

/// Why a status query produced the list it did. Exactly one code is active
/// per result; `statuses` is only populated for `Success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultCode {
    Idle,
    Loading,
    Success,
    NoStatuses,
    PermissionError,
    NotInstalled,
}

/// Outcome of a status scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusQueryResult {
    pub code: ResultCode,
    pub statuses: Vec<Status>,
}

impl StatusQueryResult {
    pub fn new(code: ResultCode) -> Self {
        Self {
            code,
            statuses: Vec::new(),
        }
    }

    pub fn success(statuses: Vec<Status>) -> Self {
        Self {
            code: ResultCode::Success,
            statuses,
        }
    }
}

impl Default for StatusQueryResult {
    fn default() -> Self {
        Self::new(ResultCode::Idle)
    }
}

/// Outcome of a save operation: the statuses that succeeded and their new
/// location handles, in the input order of the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveResult {
    pub is_saving: bool,
    pub statuses: Vec<Status>,
    pub handles: Vec<MediaHandle>,
    pub saved: usize,
}

impl SaveResult {
    pub fn saving() -> Self {
        Self {
            is_saving: true,
            ..Default::default()
        }
    }

    pub fn single(status: &Status, handle: Option<MediaHandle>) -> Self {
        match handle {
            Some(handle) => Self {
                is_saving: false,
                statuses: vec![status.clone()],
                handles: vec![handle],
                saved: 1,
            },
            None => Self::default(),
        }
    }

    pub fn completed(pairs: Vec<(Status, MediaHandle)>) -> Self {
        let saved = pairs.len();
        let (statuses, handles) = pairs.into_iter().unzip();
        Self {
            is_saving: false,
            statuses,
            handles,
            saved,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.statuses.is_empty()
            && !self.handles.is_empty()
            && self.statuses.len() == self.handles.len()
    }
}

/// Outcome of a delete operation. Success means every targeted status was
/// actually removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeletionResult {
    pub is_deleting: bool,
    pub statuses: Vec<Status>,
    pub deleted: usize,
}

impl DeletionResult {
    pub fn deleting() -> Self {
        Self {
            is_deleting: true,
            ..Default::default()
        }
    }

    pub fn new(statuses: Vec<Status>, deleted: usize) -> Self {
        Self {
            is_deleting: false,
            statuses,
            deleted,
        }
    }

    pub fn single(status: &Status, success: bool) -> Self {
        Self::new(vec![status.clone()], usize::from(success))
    }

    pub fn is_success(&self) -> bool {
        self.statuses.len() == self.deleted
    }
}

/// A share package: content handles plus a combined mime classification.
/// No bytes are moved to produce one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShareData {
    pub handles: Vec<MediaHandle>,
    pub mime_type: Option<String>,
}

impl ShareData {
    pub fn from_statuses(statuses: &[Status]) -> Self {
        if statuses.is_empty() {
            return Self::default();
        }
        let first = statuses[0].status_type;
        let mixed = statuses.iter().any(|s| s.status_type != first);
        let mime_type = if mixed {
            "*/*".to_string()
        } else {
            first.mime_type().to_string()
        };
        Self {
            handles: statuses.iter().map(|s| s.handle.clone()).collect(),
            mime_type: Some(mime_type),
        }
    }

    pub fn has_data(&self) -> bool {
        !self.handles.is_empty() && self.mime_type.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapkeep::status::StatusOrigin;
    use std::path::PathBuf;

    fn make_status(name: &str, status_type: StatusType) -> Status {
        Status {
            status_type,
            name: name.to_string(),
            handle: MediaHandle::File(PathBuf::from(format!("/statuses/{name}"))),
            date_modified: 0,
            size: 1,
            client_package: None,
            origin: StatusOrigin::Discovered,
        }
    }

    #[test]
    fn test_query_result_default_is_idle_and_empty() {
        let result = StatusQueryResult::default();
        assert_eq!(result.code, ResultCode::Idle);
        assert!(result.statuses.is_empty());
    }

    #[test]
    fn test_save_result_single_failure_is_empty() {
        let status = make_status("a.jpg", StatusType::Image);
        let result = SaveResult::single(&status, None);
        assert!(!result.is_success());
        assert!(result.statuses.is_empty());
        assert_eq!(result.saved, 0);
    }

    #[test]
    fn test_save_result_single_success() {
        let status = make_status("a.jpg", StatusType::Image);
        let handle = MediaHandle::File(PathBuf::from("/saves/a.jpg"));
        let result = SaveResult::single(&status, Some(handle));
        assert!(result.is_success());
        assert_eq!(result.saved, 1);
    }

    #[test]
    fn test_deletion_result_partial_is_not_success() {
        let statuses = vec![
            make_status("a.jpg", StatusType::Image),
            make_status("b.jpg", StatusType::Image),
        ];
        let result = DeletionResult::new(statuses, 1);
        assert!(!result.is_success());
    }

    #[test]
    fn test_deletion_result_full_is_success() {
        let statuses = vec![make_status("a.jpg", StatusType::Image)];
        let result = DeletionResult::new(statuses, 1);
        assert!(result.is_success());
    }

    #[test]
    fn test_share_data_single_type_mime() {
        let statuses = vec![
            make_status("a.jpg", StatusType::Image),
            make_status("b.jpg", StatusType::Image),
        ];
        let data = ShareData::from_statuses(&statuses);
        assert!(data.has_data());
        assert_eq!(data.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(data.handles.len(), 2);
    }

    #[test]
    fn test_share_data_mixed_types_mime() {
        let statuses = vec![
            make_status("a.jpg", StatusType::Image),
            make_status("b.mp4", StatusType::Video),
        ];
        let data = ShareData::from_statuses(&statuses);
        assert_eq!(data.mime_type.as_deref(), Some("*/*"));
    }

    #[test]
    fn test_share_data_empty() {
        let data = ShareData::from_statuses(&[]);
        assert!(!data.has_data());
    }
}
