use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Graph API error: {0}")]
    GraphApiError(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Attachment content is not valid base64: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("Interactive prompt error: {0}")]
    DialoguerError(#[from] dialoguer::Error),

    #[error("Working directory '{}' is not writable (missing or permission denied)", .0.display())]
    PathNotWritable(PathBuf),

    #[error("Failed to extract '{}': {reason}", .file.display())]
    ExtractError { file: PathBuf, reason: String },

    #[error("Failed to parse '{}': {source}", .file.display())]
    ParseError {
        file: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "Failed to write report '{}': {source}\n  The extracted JSON files were left in place; rerun with --report-only to retry without collecting attachments again",
        .path.display()
    )]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Mail folder '{0}' not found")]
    FolderNotFound(String),

    #[error("Token not found. Please run 'mtasts-report login' first")]
    TokenNotFound,

    #[error("Tenant '{0}' not found")]
    TenantNotFound(String),
}

pub type Result<T> = std::result::Result<T, ReportError>;

/// Parse a Graph API error body into `code: message` plus a hint for the
/// failures an operator can fix themselves
pub fn enhance_graph_error(error_response: &str) -> String {
    let Ok(error_json) = serde_json::from_str::<serde_json::Value>(error_response) else {
        return error_response.to_string();
    };
    let Some(error_obj) = error_json.get("error") else {
        return error_response.to_string();
    };

    let code = error_obj
        .get("code")
        .and_then(|c| c.as_str())
        .unwrap_or("Unknown");
    let message = error_obj
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("No message");

    let hint = match code {
        "Unauthorized" | "InvalidAuthenticationToken" => {
            "\n  Hint: Your token may have expired. Run 'mtasts-report login' again."
        }
        "Forbidden" | "ErrorAccessDenied" | "InsufficientPrivileges" => {
            "\n  Hint: The app registration needs Mail.Read (delegated) or Mail.Read application permission with admin consent."
        }
        "ErrorItemNotFound" | "NotFound" => {
            "\n  Hint: The mailbox or folder does not exist. Check --mailbox and --folder."
        }
        "ErrorInvalidUser" | "MailboxNotEnabledForRESTAPI" => {
            "\n  Hint: Application logins cannot use 'me'. Pass --mailbox with the report mailbox UPN."
        }
        "TooManyRequests" | "ApplicationThrottled" => {
            "\n  Hint: Mailbox API rate limit exceeded. Wait a moment and try again."
        }
        _ => "",
    };

    format!("{}: {}{}", code, message, hint)
}
