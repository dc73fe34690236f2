//! Interactive pieces: status output and the mail folder picker

pub mod prompts;

use crate::error::{ReportError, Result};
use crate::graph::mail::MailFolder;
use dialoguer::{Select, theme::ColorfulTheme};

/// Let the operator choose a folder. `Esc` or `q` cancels and yields `None`.
pub fn pick_folder(folders: &[MailFolder]) -> Result<Option<MailFolder>> {
    if folders.is_empty() {
        return Err(ReportError::FolderNotFound("(mailbox has no folders)".into()));
    }

    let items: Vec<&str> = folders.iter().map(|f| f.path.as_str()).collect();
    let default = folders
        .iter()
        .position(|f| f.path.eq_ignore_ascii_case("Inbox"))
        .unwrap_or(0);

    let choice = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the folder holding TLS-RPT reports (Esc to cancel)")
        .items(&items)
        .default(default)
        .interact_opt()?;

    Ok(choice.map(|index| folders[index].clone()))
}
