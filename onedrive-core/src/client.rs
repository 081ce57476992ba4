use std::io;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://api.onedrive.com";

#[derive(Debug, Error)]
pub enum OneDriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct OneDriveClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl OneDriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, OneDriveError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, OneDriveError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    /// One page of the server's change feed for the subtree at `path`.
    ///
    /// An absent or empty token asks for the full enumeration; the returned
    /// token resumes the feed after this page.
    pub async fn view_changes(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<ChangeSet, OneDriveError> {
        let mut url = self.endpoint(&format!("{}/view.changes", drive_path(path)))?;
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            url.query_pairs_mut().append_pair("token", token);
        }
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Streams item content to `<target>.partial`, then renames into place.
    pub async fn download_by_id(&self, id: &str, target: &Path) -> Result<(), OneDriveError> {
        let url = self.endpoint(&format!("/v1.0/drive/items/{id}/content"))?;
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OneDriveError::Api { status, body });
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(target);
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(partial, target).await?;
        Ok(())
    }

    /// Creates or replaces the item at `path` with the contents of `source`.
    pub async fn simple_upload(
        &self,
        source: &Path,
        path: &str,
        if_match: Option<&str>,
    ) -> Result<DriveItem, OneDriveError> {
        let url = self.endpoint(&format!("{}/content", drive_path(path)))?;
        let file = tokio::fs::File::open(source).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let mut request = self
            .http
            .put(url)
            .header("Authorization", self.auth_header_value())
            .body(body);
        if let Some(etag) = if_match {
            request = request.header("If-Match", etag);
        }
        Self::handle_response(request.send().await?).await
    }

    pub async fn update_by_id(
        &self,
        id: &str,
        patch: &serde_json::Value,
        if_match: &str,
    ) -> Result<DriveItem, OneDriveError> {
        let url = self.endpoint(&format!("/v1.0/drive/items/{id}"))?;
        let response = self
            .http
            .patch(url)
            .header("Authorization", self.auth_header_value())
            .header("If-Match", if_match)
            .json(patch)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn delete_by_id(&self, id: &str, if_match: &str) -> Result<(), OneDriveError> {
        let url = self.endpoint(&format!("/v1.0/drive/items/{id}"))?;
        let response = self
            .http
            .delete(url)
            .header("Authorization", self.auth_header_value())
            .header("If-Match", if_match)
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(OneDriveError::Api { status, body })
    }

    pub async fn create_folder(
        &self,
        parent_path: &str,
        name: &str,
    ) -> Result<DriveItem, OneDriveError> {
        let url = self.endpoint(&format!("{}/children", drive_path(parent_path)))?;
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .json(&serde_json::json!({ "name": name, "folder": {} }))
            .send()
            .await?;
        Self::handle_response(response).await
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, OneDriveError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, OneDriveError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(OneDriveError::Api { status, body })
        }
    }
}

impl OneDriveError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            OneDriveError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_EARLY)
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

// Items are addressed by colon-delimited drive path ("/drive/root:/Docs:");
// the drive root itself has no colon segment.
fn drive_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/v1.0/drive/root".to_string();
    }
    format!("/v1.0/drive/root:{trimmed}:")
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}

/// A remote item as the server describes it. Every field is optional: the
/// decoder is permissive and callers decide what absence means.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DriveItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "eTag")]
    pub etag: Option<String>,
    #[serde(default, rename = "cTag")]
    pub ctag: Option<String>,
    #[serde(default, rename = "parentReference")]
    pub parent_reference: Option<ParentReference>,
    #[serde(default, rename = "fileSystemInfo")]
    pub file_system_info: Option<FileSystemInfo>,
    #[serde(default)]
    pub deleted: Option<serde_json::Value>,
    #[serde(default)]
    pub file: Option<FileFacet>,
    #[serde(default)]
    pub folder: Option<serde_json::Value>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ParentReference {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FileSystemInfo {
    #[serde(default, rename = "lastModifiedDateTime")]
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FileFacet {
    #[serde(default)]
    pub hashes: Option<HashFacet>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HashFacet {
    #[serde(default, rename = "crc32Hash")]
    pub crc32: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeSet {
    pub value: Vec<DriveItem>,
    #[serde(rename = "@changes.token")]
    pub token: String,
    #[serde(default, rename = "@changes.hasMoreChanges")]
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_path_addresses_root_without_colon() {
        assert_eq!(drive_path("/"), "/v1.0/drive/root");
        assert_eq!(drive_path(""), "/v1.0/drive/root");
    }

    #[test]
    fn drive_path_wraps_subpaths_in_colons() {
        assert_eq!(drive_path("/Docs/A.txt"), "/v1.0/drive/root:/Docs/A.txt:");
        assert_eq!(drive_path("/Docs/"), "/v1.0/drive/root:/Docs:");
    }

    #[test]
    fn partial_path_keeps_original_extension() {
        assert_eq!(
            partial_path(Path::new("/tmp/a.txt")),
            PathBuf::from("/tmp/a.txt.partial")
        );
        assert_eq!(
            partial_path(Path::new("/tmp/noext")),
            PathBuf::from("/tmp/noext.partial")
        );
    }

    #[test]
    fn classification_maps_statuses() {
        assert_eq!(
            classify_api_status(StatusCode::UNAUTHORIZED),
            ApiErrorClass::Auth
        );
        assert_eq!(
            classify_api_status(StatusCode::TOO_MANY_REQUESTS),
            ApiErrorClass::RateLimit
        );
        assert_eq!(
            classify_api_status(StatusCode::BAD_GATEWAY),
            ApiErrorClass::Transient
        );
        assert_eq!(
            classify_api_status(StatusCode::PRECONDITION_FAILED),
            ApiErrorClass::Permanent
        );
    }
}
