//! Destination resolution.
//!
//! Pure functions: settings + connection context in, concrete address out.
//! Results are computed once at enqueue time and never re-resolved on retry.

mod template;

pub use template::interpolate;

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::config::{StorageSettings, WebhookSettings};
use crate::domain::{ConnectionContext, StorageDestination, WebhookAuth, WebhookDestination};
use crate::error::CourierError;

/// File name used when no template is configured, or the template renders
/// to nothing usable.
pub const DEFAULT_RECORDING_NAME: &str = "recording.guac";

/// Fixed width and free of `:` so it is safe in file names and object keys.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%3fZ";

/// Recording file name from the configured template.
///
/// Tokens: connection metadata, `sessionId`, `timestamp`.
pub fn recording_filename(
    template: Option<&str>,
    context: &ConnectionContext,
    session_id: &str,
    now: DateTime<Utc>,
) -> String {
    let Some(template) = template else {
        return DEFAULT_RECORDING_NAME.to_string();
    };

    let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
    let rendered = interpolate(template, |name| match name {
        "sessionId" => Some(session_id.to_string()),
        "timestamp" => Some(timestamp.clone()),
        other => context.lookup(other),
    });
    sanitize_file_name(&rendered)
}

/// Drive (file-transfer) directory for a session. `None` when not configured.
///
/// Tokens: connection metadata, `sessionId`.
pub fn drive_path(
    template: Option<&str>,
    context: &ConnectionContext,
    session_id: &str,
) -> Option<PathBuf> {
    let template = template?;
    let rendered = interpolate(template, |name| match name {
        "sessionId" => Some(session_id.to_string()),
        other => context.lookup(other),
    });
    Some(PathBuf::from(rendered))
}

/// Bucket and key of an upload.
///
/// Bucket precedence: connection override, then the configured default.
/// Key tokens: connection metadata, `filename`, `sessionId`.
pub fn resolve_storage(
    settings: &StorageSettings,
    context: &ConnectionContext,
    session_id: &str,
    file_name: &str,
) -> Result<StorageDestination, CourierError> {
    let bucket = non_blank(context.bucket.as_deref())
        .or_else(|| non_blank(settings.bucket.as_deref()))
        .ok_or(CourierError::NoDestinationConfigured("upload"))?;

    let key = interpolate(&settings.key_template, |name| match name {
        "filename" => Some(file_name.to_string()),
        "sessionId" => Some(session_id.to_string()),
        other => context.lookup(other),
    });

    Ok(StorageDestination {
        bucket: bucket.to_string(),
        key,
    })
}

/// Endpoint and credentials of a notification. Static configuration only.
pub fn resolve_webhook(settings: &WebhookSettings) -> Result<WebhookDestination, CourierError> {
    let url = settings
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(CourierError::NoDestinationConfigured("notification"))?;

    Ok(WebhookDestination {
        url: url.to_string(),
        auth: webhook_auth(settings),
    })
}

/// Mode names are case-insensitive. An unknown mode, or one missing its
/// credentials, sends no `Authorization` header.
fn webhook_auth(settings: &WebhookSettings) -> WebhookAuth {
    let mode = settings
        .auth_type
        .as_deref()
        .map(|m| m.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match mode.as_str() {
        "bearer" => match settings.token.as_deref() {
            Some(token) if !token.is_empty() => WebhookAuth::Bearer {
                token: token.to_string(),
            },
            _ => WebhookAuth::None,
        },
        "basic" => match (settings.username.as_deref(), settings.password.as_deref()) {
            (Some(username), Some(password)) if !username.is_empty() => WebhookAuth::Basic {
                username: username.to_string(),
                password: password.to_string(),
            },
            _ => WebhookAuth::None,
        },
        _ => WebhookAuth::None,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Keep generated names inside the recording directory.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();

    match cleaned.trim() {
        "" | "." | ".." => DEFAULT_RECORDING_NAME.to_string(),
        _ => cleaned,
    }
}
