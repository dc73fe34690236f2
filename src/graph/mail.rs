//! Exchange Online mailbox access
//!
//! Mail folder enumeration and attachment download through the Graph mail
//! API, plus the [`MailStore`] implementation the pipeline collects from.

use crate::cmd::progress;
use crate::config::ConfigManager;
use crate::error::{ReportError, Result};
use crate::graph::GraphClient;
use crate::pipeline::collector::{Attachment, MailStore};
use crate::tui;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

const FILE_ATTACHMENT: &str = "#microsoft.graph.fileAttachment";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MailFolderEntry {
    id: String,
    display_name: String,
    #[serde(default)]
    child_folder_count: u32,
}

/// A folder with its slash-joined display path, e.g. `Inbox/TLS Reports`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailFolder {
    pub id: String,
    pub path: String,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
    #[serde(default)]
    subject: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentEntry {
    #[serde(rename = "@odata.type", default)]
    odata_type: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    content_bytes: Option<String>,
}

/// Graph mail endpoints scoped to one mailbox (`me` or a UPN)
pub struct Mailbox<'a> {
    client: &'a GraphClient,
    root: String,
}

impl<'a> Mailbox<'a> {
    pub fn new(client: &'a GraphClient, mailbox: &str) -> Self {
        let root = if mailbox.eq_ignore_ascii_case("me") {
            "me".to_string()
        } else {
            format!("users/{}", mailbox)
        };
        Self { client, root }
    }

    /// Every folder in the mailbox, depth-first, parents before children
    pub async fn folders(&self) -> Result<Vec<MailFolder>> {
        let top: Vec<MailFolderEntry> = self
            .client
            .get_all_pages(&format!("{}/mailFolders?$top=100", self.root))
            .await?;

        let mut pending: Vec<(String, MailFolderEntry)> = top
            .into_iter()
            .rev()
            .map(|entry| (String::new(), entry))
            .collect();
        let mut folders = Vec::new();

        while let Some((parent, entry)) = pending.pop() {
            let path = if parent.is_empty() {
                entry.display_name.clone()
            } else {
                format!("{}/{}", parent, entry.display_name)
            };

            if entry.child_folder_count > 0 {
                let children: Vec<MailFolderEntry> = self
                    .client
                    .get_all_pages(&format!(
                        "{}/mailFolders/{}/childFolders?$top=100",
                        self.root, entry.id
                    ))
                    .await?;
                pending.extend(children.into_iter().rev().map(|c| (path.clone(), c)));
            }

            folders.push(MailFolder { id: entry.id, path });
        }

        Ok(folders)
    }

    /// Download the file attachments of every message in `folder`
    pub async fn attachments(&self, folder: &MailFolder) -> Result<Vec<Attachment>> {
        let messages: Vec<MessageRef> = self
            .client
            .get_all_pages(&format!(
                "{}/mailFolders/{}/messages?$filter=hasAttachments eq true&$select=id,subject&$top=50",
                self.root, folder.id
            ))
            .await?;

        let bar = progress::create_progress_bar(messages.len() as u64, "Downloading attachments");
        let mut attachments = Vec::new();

        for message in &messages {
            tracing::debug!(
                "Message {}: {}",
                message.id,
                message.subject.as_deref().unwrap_or("(no subject)")
            );
            let entries: Vec<AttachmentEntry> = match self
                .client
                .get_all_pages(&format!("{}/messages/{}/attachments", self.root, message.id))
                .await
            {
                Ok(entries) => entries,
                Err(e) => {
                    progress::finish_progress_error(&bar, "Attachment download failed");
                    return Err(e);
                }
            };

            for entry in entries {
                if entry.odata_type.as_deref() != Some(FILE_ATTACHMENT) {
                    continue;
                }
                let (Some(name), Some(content)) = (entry.name, entry.content_bytes) else {
                    continue;
                };
                attachments.push(Attachment {
                    file_name: name,
                    content: STANDARD.decode(content.as_bytes())?,
                });
            }
            bar.inc(1);
        }

        progress::finish_progress_success(
            &bar,
            &format!(
                "{} attachment(s) from {} message(s)",
                attachments.len(),
                messages.len()
            ),
        );
        Ok(attachments)
    }
}

pub fn find_folder<'f>(folders: &'f [MailFolder], path: &str) -> Result<&'f MailFolder> {
    let wanted = path.trim_matches('/');
    folders
        .iter()
        .find(|f| f.path.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| ReportError::FolderNotFound(path.to_string()))
}

/// Mail store backed by an Exchange Online mailbox.
///
/// Authentication happens on the first `collect`, so runs that never collect
/// need no token.
pub struct GraphMailStore {
    config: ConfigManager,
    tenant: Option<String>,
    mailbox: String,
    folder: Option<String>,
}

impl GraphMailStore {
    pub fn new(
        config: ConfigManager,
        tenant: Option<String>,
        mailbox: String,
        folder: Option<String>,
    ) -> Self {
        Self {
            config,
            tenant,
            mailbox,
            folder,
        }
    }
}

impl MailStore for GraphMailStore {
    async fn collect(&self) -> Result<Option<Vec<Attachment>>> {
        let tenant = self.config.resolve_tenant(self.tenant.as_deref())?;
        let client = GraphClient::from_config(&self.config, &tenant.name).await?;
        let mailbox = Mailbox::new(&client, &self.mailbox);

        let spinner = progress::create_spinner(&format!("Listing folders in {}...", self.mailbox));
        let folders = match mailbox.folders().await {
            Ok(folders) => {
                progress::finish_spinner_success(&spinner, &format!("{} folder(s)", folders.len()));
                folders
            }
            Err(e) => {
                progress::finish_spinner_error(&spinner, "Could not list mail folders");
                return Err(e);
            }
        };

        let folder = match &self.folder {
            Some(path) => find_folder(&folders, path)?.clone(),
            None => match tui::pick_folder(&folders)? {
                Some(folder) => folder,
                None => return Ok(None),
            },
        };
        tracing::debug!("Collecting from folder {} ({})", folder.path, folder.id);

        mailbox.attachments(&folder).await.map(Some)
    }
}
