//! Dropbox storage client.
//!
//! Thin typed wrapper over the Dropbox HTTP API covering exactly what the
//! pipeline needs: folder-change listing, download, move and upload.
//! Authenticates with a refresh token and renews the short-lived access
//! token on demand.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::DropboxSettings;

const TOKEN_URL: &str = "https://api.dropboxapi.com/oauth2/token";
const API_BASE: &str = "https://api.dropboxapi.com/2";
const CONTENT_BASE: &str = "https://content.dropboxapi.com/2";

/// Renew the access token this long before its reported expiry.
const TOKEN_EXPIRY_SLACK: Duration = Duration::from_secs(60);

/// Errors raised at the storage boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Dropbox auth error: {0}")]
    Auth(String),

    #[error("Dropbox API error ({endpoint}): {message}")]
    Api { endpoint: String, message: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
}

/// One entry of a folder listing page.
#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    #[serde(rename = ".tag")]
    pub tag: String,
    pub name: String,
    #[serde(default)]
    pub path_lower: Option<String>,
}

impl Entry {
    pub fn is_file(&self) -> bool {
        self.tag == "file"
    }
}

/// One page of folder changes.
#[derive(Debug, Deserialize)]
pub struct ListFolderPage {
    pub entries: Vec<Entry>,
    pub cursor: String,
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct AccessToken {
    token: String,
    expires_at: Instant,
}

/// Authenticated Dropbox client.
pub struct DropboxClient {
    http: reqwest::Client,
    app_key: String,
    app_secret: String,
    refresh_token: String,
    access: Mutex<Option<AccessToken>>,
}

impl DropboxClient {
    pub fn new(settings: &DropboxSettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            app_key: settings.app_key.clone(),
            app_secret: settings.app_secret.clone(),
            refresh_token: settings.refresh_token.clone(),
            access: Mutex::new(None),
        }
    }

    /// Get a valid access token, refreshing through the OAuth2 endpoint
    /// when the cached one is missing or about to expire.
    async fn access_token(&self) -> Result<String, StorageError> {
        let mut guard = self.access.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_EXPIRY_SLACK {
                return Ok(token.token.clone());
            }
        }

        debug!("Refreshing Dropbox access token");
        let resp = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.app_key, Some(&self.app_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Auth(body));
        }

        let token: TokenResponse = resp.json().await?;
        let access = AccessToken {
            token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        };
        *guard = Some(access);
        Ok(token.access_token)
    }

    /// POST a JSON-in/JSON-out RPC endpoint.
    async fn rpc<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> Result<Resp, StorageError> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .post(format!("{}/{}", API_BASE, endpoint))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                endpoint: endpoint.to_string(),
                message,
            });
        }

        Ok(resp.json().await?)
    }

    /// Display name of the authenticated account. Used once at startup
    /// to verify the credentials actually work.
    pub async fn current_account(&self) -> Result<String, StorageError> {
        #[derive(Deserialize)]
        struct Account {
            name: AccountName,
        }
        #[derive(Deserialize)]
        struct AccountName {
            display_name: String,
        }

        let token = self.access_token().await?;
        let resp = self
            .http
            .post(format!("{}/users/get_current_account", API_BASE))
            .bearer_auth(token)
            .send()
            .await?;

        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(StorageError::Auth(message));
        }

        let account: Account = resp.json().await?;
        Ok(account.name.display_name)
    }

    /// Cursor representing the watched folder's current state; changes
    /// after this point show up in `list_folder_continue`.
    pub async fn latest_cursor(&self, folder_path: &str) -> Result<String, StorageError> {
        #[derive(Serialize)]
        struct Request<'a> {
            path: &'a str,
            recursive: bool,
        }
        #[derive(Deserialize)]
        struct Response {
            cursor: String,
        }

        let resp: Response = self
            .rpc(
                "files/list_folder/get_latest_cursor",
                &Request {
                    path: folder_path,
                    recursive: false,
                },
            )
            .await?;
        Ok(resp.cursor)
    }

    /// Fetch the next page of changes after `cursor`.
    pub async fn list_folder_continue(&self, cursor: &str) -> Result<ListFolderPage, StorageError> {
        #[derive(Serialize)]
        struct Request<'a> {
            cursor: &'a str,
        }

        self.rpc("files/list_folder/continue", &Request { cursor })
            .await
    }

    /// Download a file's bytes.
    pub async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let token = self.access_token().await?;
        let resp = self
            .http
            .post(format!("{}/files/download", CONTENT_BASE))
            .bearer_auth(token)
            .header("Dropbox-API-Arg", api_arg(&serde_json::json!({ "path": path })))
            .send()
            .await?;

        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                endpoint: "files/download".to_string(),
                message,
            });
        }

        Ok(resp.bytes().await?.to_vec())
    }

    /// Move a file, optionally letting Dropbox rename on collision.
    /// Returns the path the file actually ended up at.
    pub async fn move_entry(
        &self,
        from_path: &str,
        to_path: &str,
        autorename: bool,
    ) -> Result<String, StorageError> {
        #[derive(Serialize)]
        struct Request<'a> {
            from_path: &'a str,
            to_path: &'a str,
            autorename: bool,
        }
        #[derive(Deserialize)]
        struct Response {
            metadata: Metadata,
        }
        #[derive(Deserialize)]
        struct Metadata {
            path_display: String,
        }

        let resp: Response = self
            .rpc(
                "files/move_v2",
                &Request {
                    from_path,
                    to_path,
                    autorename,
                },
            )
            .await?;
        Ok(resp.metadata.path_display)
    }

    /// Upload bytes to `path` in overwrite mode, muting the change
    /// notification the write would otherwise trigger.
    pub async fn upload(&self, path: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let token = self.access_token().await?;
        let arg = serde_json::json!({
            "path": path,
            "mode": "overwrite",
            "mute": true,
        });
        let resp = self
            .http
            .post(format!("{}/files/upload", CONTENT_BASE))
            .bearer_auth(token)
            .header("Dropbox-API-Arg", api_arg(&arg))
            .header("Content-Type", "application/octet-stream")
            .body(data)
            .send()
            .await?;

        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                endpoint: "files/upload".to_string(),
                message,
            });
        }

        Ok(())
    }
}

/// Serialize a `Dropbox-API-Arg` header value.
///
/// HTTP headers are ASCII-only, so every non-ASCII character (watched
/// folders routinely have Japanese names) is emitted as a \uXXXX escape.
fn api_arg(value: &serde_json::Value) -> String {
    let raw = value.to_string();
    let mut escaped = String::with_capacity(raw.len());
    let mut buf = [0u16; 2];
    for c in raw.chars() {
        if c.is_ascii() {
            escaped.push(c);
        } else {
            for unit in c.encode_utf16(&mut buf) {
                escaped.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_arg_ascii_passthrough() {
        let arg = api_arg(&serde_json::json!({ "path": "/scans/file.pdf" }));
        assert_eq!(arg, r#"{"path":"/scans/file.pdf"}"#);
    }

    #[test]
    fn test_api_arg_escapes_non_ascii() {
        let arg = api_arg(&serde_json::json!({ "path": "/請求書.pdf" }));
        assert!(arg.is_ascii());
        assert!(arg.contains("\\u8acb"));
        // Escapes must round-trip back to the original path
        let parsed: serde_json::Value = serde_json::from_str(&arg).unwrap();
        assert_eq!(parsed["path"], "/請求書.pdf");
    }

    #[test]
    fn test_entry_tag_parsing() {
        let json = r#"{".tag": "file", "name": "BRWDCE_scan.pdf", "path_lower": "/scans/brwdce_scan.pdf", "path_display": "/Scans/BRWDCE_scan.pdf"}"#;
        let entry: Entry = serde_json::from_str(json).unwrap();
        assert!(entry.is_file());
        assert_eq!(entry.name, "BRWDCE_scan.pdf");

        let json = r#"{".tag": "folder", "name": "archive"}"#;
        let entry: Entry = serde_json::from_str(json).unwrap();
        assert!(!entry.is_file());
        assert!(entry.path_lower.is_none());
    }

    #[test]
    fn test_list_folder_page_parsing() {
        let json = r#"{
            "entries": [{".tag": "file", "name": "a.pdf", "path_lower": "/a.pdf"}],
            "cursor": "AAE",
            "has_more": false
        }"#;
        let page: ListFolderPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.cursor, "AAE");
        assert!(!page.has_more);
    }
}
