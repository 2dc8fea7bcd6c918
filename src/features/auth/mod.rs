//! # Authorization Feature
//!
//! Allow-list based access control. The list file is re-read on every
//! check so the operator can grant or revoke access without a restart.
//!
//! - **Version**: 1.0.0
//! - **Since**: 2.0.0
//! - **Toggleable**: true

use async_trait::async_trait;
use log::{error, info, warn};
use std::collections::HashSet;
use std::path::PathBuf;

/// Decides whether a sender may talk to the bot
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    /// `handle` is the transport-level username, if the sender has one
    async fn is_allowed(&self, user_id: &str, handle: Option<&str>) -> bool;
}

/// Permits everyone. Used when no allow-list is configured.
pub struct OpenAccess;

#[async_trait]
impl AccessPolicy for OpenAccess {
    async fn is_allowed(&self, _user_id: &str, _handle: Option<&str>) -> bool {
        true
    }
}

/// File-backed allow-list: one entry per line, numeric ids or @handles,
/// `#` starts a comment.
pub struct AllowList {
    path: PathBuf,
}

impl AllowList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AllowList { path: path.into() }
    }
}

#[async_trait]
impl AccessPolicy for AllowList {
    async fn is_allowed(&self, user_id: &str, handle: Option<&str>) -> bool {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                // Unreadable list denies everyone rather than opening the bot up
                error!("Failed to read allow-list {}: {e}", self.path.display());
                return false;
            }
        };
        let allowed = parse_allow_list(&content);

        if allowed.ids.contains(user_id) {
            return true;
        }
        if let Some(handle) = handle {
            let handle = handle.trim_start_matches('@').to_lowercase();
            if allowed.handles.contains(&handle) {
                info!("User @{handle} (ID: {user_id}) authorized by handle");
                return true;
            }
        }
        false
    }
}

struct AllowedUsers {
    ids: HashSet<String>,
    handles: HashSet<String>,
}

fn parse_allow_list(content: &str) -> AllowedUsers {
    let mut ids = HashSet::new();
    let mut handles = HashSet::new();

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.chars().all(|c| c.is_ascii_digit()) {
            ids.insert(line.to_string());
            continue;
        }

        let handle = line.trim_start_matches('@');
        // Transport handles are 5-32 chars, alphanumeric plus underscore
        let valid = (5..=32).contains(&handle.len())
            && handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if valid {
            handles.insert(handle.to_lowercase());
        } else {
            warn!("Invalid handle format on line {}: {line}", line_num + 1);
        }
    }

    AllowedUsers { ids, handles }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_allow_list_ids_and_handles() {
        let allowed = parse_allow_list("# admins\n123456\n@some_user\nOtherUser\n\n789\n");
        assert!(allowed.ids.contains("123456"));
        assert!(allowed.ids.contains("789"));
        assert!(allowed.handles.contains("some_user"));
        assert!(allowed.handles.contains("otheruser"));
        assert_eq!(allowed.ids.len(), 2);
        assert_eq!(allowed.handles.len(), 2);
    }

    #[test]
    fn test_parse_allow_list_rejects_bad_handles() {
        let allowed = parse_allow_list("@ab\n@way too many spaces\n@good_name\n");
        assert_eq!(allowed.handles.len(), 1);
        assert!(allowed.handles.contains("good_name"));
    }

    #[tokio::test]
    async fn test_open_access_allows_anyone() {
        assert!(OpenAccess.is_allowed("anyone", None).await);
    }

    #[tokio::test]
    async fn test_allow_list_missing_file_denies() {
        let policy = AllowList::new("/nonexistent/allowed_users.txt");
        assert!(!policy.is_allowed("123", Some("someone")).await);
    }
}
