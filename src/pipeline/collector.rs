//! Attachment collection
//!
//! Pulls report attachments out of a [`MailStore`] and saves them into the
//! working directory, where the extractor picks them up.

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// One attachment as it came out of the mail store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content: Vec<u8>,
}

/// Source of report attachments.
///
/// `collect` blocks on the operator choosing a folder. `Ok(None)` means the
/// choice was cancelled and the run should stop without touching anything.
#[allow(async_fn_in_trait)]
pub trait MailStore {
    async fn collect(&self) -> Result<Option<Vec<Attachment>>>;
}

/// Characters that cannot appear in a file name on Windows or Unix
const RESERVED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Make an attachment name safe to join onto the working directory
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if RESERVED.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    match cleaned.trim_matches('.') {
        "" => "attachment".to_string(),
        _ => cleaned,
    }
}

/// Ask the store for attachments and write each one into `dir`.
///
/// Returns the saved paths, or `None` when the operator cancelled.
pub async fn collect_attachments<S: MailStore>(
    store: &S,
    dir: &Path,
) -> Result<Option<Vec<PathBuf>>> {
    let Some(attachments) = store.collect().await? else {
        tracing::debug!("Mail store returned no folder selection");
        return Ok(None);
    };

    let mut saved = Vec::with_capacity(attachments.len());
    for attachment in attachments {
        let target = dir.join(sanitize_file_name(&attachment.file_name));
        if target.exists() {
            tracing::debug!("Overwriting existing {}", target.display());
        }
        fs::write(&target, &attachment.content)?;
        tracing::debug!(
            "Saved {} ({} bytes)",
            target.display(),
            attachment.content.len()
        );
        saved.push(target);
    }

    Ok(Some(saved))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    /// In-memory store that counts how often it was asked
    pub(crate) struct FakeStore {
        pub attachments: Option<Vec<Attachment>>,
        pub calls: Cell<usize>,
    }

    impl FakeStore {
        pub fn with(attachments: Vec<Attachment>) -> Self {
            Self {
                attachments: Some(attachments),
                calls: Cell::new(0),
            }
        }

        pub fn cancelled() -> Self {
            Self {
                attachments: None,
                calls: Cell::new(0),
            }
        }
    }

    impl MailStore for FakeStore {
        async fn collect(&self) -> Result<Option<Vec<Attachment>>> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.attachments.clone())
        }
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(
            sanitize_file_name("google.com!contoso.com!1700000000!1700086400!001.json.gz"),
            "google.com!contoso.com!1700000000!1700086400!001.json.gz"
        );
        assert_eq!(sanitize_file_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_file_name("a:b?.gz"), "a_b_.gz");
        assert_eq!(sanitize_file_name("  ..  "), "attachment");
    }

    #[tokio::test]
    async fn test_collect_writes_attachments() {
        let dir = TempDir::new().unwrap();
        let store = FakeStore::with(vec![
            Attachment {
                file_name: "one.json.gz".into(),
                content: vec![1, 2, 3],
            },
            Attachment {
                file_name: "sub/two.gz".into(),
                content: vec![4],
            },
        ]);

        let saved = collect_attachments(&store, dir.path())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(saved.len(), 2);
        assert_eq!(fs::read(dir.path().join("one.json.gz")).unwrap(), vec![1, 2, 3]);
        assert_eq!(fs::read(dir.path().join("sub_two.gz")).unwrap(), vec![4]);
        assert_eq!(store.calls.get(), 1);
    }

    #[tokio::test]
    async fn test_collect_cancelled_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = FakeStore::cancelled();

        let saved = collect_attachments(&store, dir.path()).await.unwrap();

        assert!(saved.is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
