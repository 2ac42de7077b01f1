//! Typed HTTP client for the Memos REST API.
//!
//! [`MemosClient`] wraps `reqwest::Client` with bearer authentication,
//! status classification and tracing spans. It performs exactly one request
//! per call; retries are the caller's business (see [`crate::retry`]).

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{Span, debug, instrument};
use url::Url;

use crate::error::{AuthError, ClientError, SyncError};
use crate::fetch::Page;
use crate::name::ResourceName;
use crate::types::{AttachmentPayload, AttachmentRef, Memo, MemoAttachment, Visibility};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Longest server error body kept in an error message.
const MAX_ERROR_BODY: usize = 200;

const OCTET_STREAM: &str = "application/octet-stream";

/// Builder for configuring a [`MemosClient`].
#[derive(Debug)]
pub struct MemosClientBuilder {
    base_url: Url,
    token: Option<String>,
    timeout: Duration,
}

impl MemosClientBuilder {
    fn new(mut base_url: Url) -> Self {
        // `Url::join` drops the last path segment unless it ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            base_url,
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Sets the bearer token sent with every API request.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.trim().is_empty()).then(|| token.trim().to_string());
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the [`MemosClient`].
    ///
    /// ## Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn build(self) -> Result<MemosClient, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(ClientError::Request)?;

        Ok(MemosClient {
            http,
            base_url: self.base_url,
            token: self.token,
        })
    }
}

/// Async client for one Memos instance.
///
/// ## Examples
///
/// ```rust,ignore
/// use memos_sync_lib::{MemosClient, Visibility};
/// use url::Url;
///
/// let client = MemosClient::builder(Url::parse("https://memos.example")?)
///     .token("secret")
///     .build()?;
/// let name = client.create_memo("hello", Visibility::Private).await?;
/// println!("created {name}");
/// ```
#[derive(Debug, Clone)]
pub struct MemosClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMemosResponse {
    #[serde(default)]
    memos: Vec<Memo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListAttachmentsResponse {
    #[serde(default)]
    attachments: Vec<MemoAttachment>,
}

#[derive(Debug, Deserialize)]
struct ListCommentsResponse {
    #[serde(default)]
    memos: Vec<Memo>,
}

/// Body returned by every create call.
#[derive(Debug, Deserialize)]
struct Created {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    id: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AttachmentContent {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct CreateMemoRequest<'a> {
    content: &'a str,
    visibility: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCommentRequest<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PatchCreateTimeRequest {
    create_time: String,
}

#[derive(Debug, Serialize)]
struct UploadAttachmentRequest<'a> {
    filename: &'a str,
    content: String,
    #[serde(rename = "type")]
    mime_type: &'a str,
    memo: String,
}

impl MemosClient {
    /// Creates a new builder for `base_url`.
    pub fn builder(base_url: Url) -> MemosClientBuilder {
        MemosClientBuilder::new(base_url)
    }

    /// Returns the instance base URL (always ending in `/`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Lists one page of memos.
    ///
    /// An empty `nextPageToken` is reported as `None`.
    ///
    /// ## Errors
    ///
    /// Returns [`AuthError`] on 401/403 and [`ClientError`] for any other
    /// failure, including 400/404 which callers treat as end-of-data.
    #[instrument(name = "memos_list", skip(self), fields(http.status_code = tracing::field::Empty))]
    pub async fn list_memos(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<Page<Memo>, SyncError> {
        let url = self.api_url("memos")?;
        let mut request = self
            .authed(Method::GET, url)
            .query(&[("pageSize", page_size.to_string())]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = self.send("list memos", request).await?;
        let body: ListMemosResponse = parse_json(response).await?;
        Ok(Page {
            items: body.memos,
            next_token: body.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    /// Creates a top-level memo and returns its name.
    ///
    /// ## Errors
    ///
    /// Returns an error if the request fails or the response carries no
    /// usable name.
    #[instrument(name = "memos_create", skip(self, content), fields(http.status_code = tracing::field::Empty))]
    pub async fn create_memo(
        &self,
        content: &str,
        visibility: Visibility,
    ) -> Result<ResourceName, SyncError> {
        let url = self.api_url("memos")?;
        let request = self.authed(Method::POST, url).json(&CreateMemoRequest {
            content,
            visibility: visibility.as_str(),
        });
        let response = self.send("create memo", request).await?;
        created_name(response, "memos").await
    }

    /// Creates a comment on `note`, optionally nested under `parent_comment`.
    ///
    /// The nested parent is addressed by the trailing id of its name.
    ///
    /// ## Errors
    ///
    /// Returns an error if the request fails or the response carries no
    /// usable name.
    #[instrument(name = "memos_comment", skip(self, content), fields(note = %note, http.status_code = tracing::field::Empty))]
    pub async fn create_comment(
        &self,
        note: &ResourceName,
        parent_comment: Option<&ResourceName>,
        content: &str,
    ) -> Result<ResourceName, SyncError> {
        let memo_id = note.memo_id().unwrap_or_else(|| note.id());
        let url = self.api_url(&format!("memos/{memo_id}/comments"))?;
        let request = self.authed(Method::POST, url).json(&CreateCommentRequest {
            content,
            parent_id: parent_comment.map(ResourceName::id),
        });
        let response = self.send("create comment", request).await?;
        created_name(response, "memos").await
    }

    /// Sets the creation time of `name` (backdating).
    ///
    /// ## Errors
    ///
    /// Returns an error if the server rejects the patch.
    #[instrument(name = "memos_backdate", skip(self), fields(name = %name, http.status_code = tracing::field::Empty))]
    pub async fn patch_create_time(
        &self,
        name: &ResourceName,
        created_at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let url = self.api_url(&name.to_string())?;
        let request = self
            .authed(Method::PATCH, url)
            .json(&PatchCreateTimeRequest {
                create_time: created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            });
        self.send("update create time", request).await?;
        Ok(())
    }

    /// Uploads `payload` as an attachment linked to `owner`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the upload is rejected.
    #[instrument(
        name = "memos_upload",
        skip(self, payload),
        fields(owner = %owner, filename = %payload.filename, bytes = payload.bytes.len(), http.status_code = tracing::field::Empty)
    )]
    pub async fn upload_attachment(
        &self,
        owner: &ResourceName,
        payload: &AttachmentPayload,
    ) -> Result<ResourceName, SyncError> {
        let url = self.api_url("attachments")?;
        let request = self
            .authed(Method::POST, url)
            .json(&UploadAttachmentRequest {
                filename: &payload.filename,
                content: payload.to_base64(),
                mime_type: &payload.mime_type,
                memo: owner.to_string(),
            });
        let response = self.send("upload attachment", request).await?;
        created_name(response, "attachments").await
    }

    /// Lists the attachments of a memo.
    ///
    /// ## Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(name = "memos_attachments", skip(self), fields(memo = %memo, http.status_code = tracing::field::Empty))]
    pub async fn list_attachments(
        &self,
        memo: &ResourceName,
    ) -> Result<Vec<MemoAttachment>, SyncError> {
        let url = self.api_url(&format!("{memo}/attachments"))?;
        let response = self
            .send("list attachments", self.authed(Method::GET, url))
            .await?;
        let body: ListAttachmentsResponse = parse_json(response).await?;
        Ok(body.attachments)
    }

    /// Lists the comments under a memo.
    ///
    /// ## Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(name = "memos_comments", skip(self), fields(memo = %memo, http.status_code = tracing::field::Empty))]
    pub async fn list_comments(&self, memo: &ResourceName) -> Result<Vec<Memo>, SyncError> {
        let url = self.api_url(&format!("{memo}/comments"))?;
        let response = self
            .send("list comments", self.authed(Method::GET, url))
            .await?;
        let body: ListCommentsResponse = parse_json(response).await?;
        Ok(body.memos)
    }

    /// Downloads an attachment's bytes.
    ///
    /// Tries the attachment API first (JSON with base64 `content`), then falls
    /// back to the raw file endpoint `/file/{name}/{filename}`.
    ///
    /// ## Errors
    ///
    /// Returns an authentication error from either call immediately, or the
    /// file endpoint's error when both fail.
    #[instrument(name = "memos_download", skip(self, attachment), fields(attachment = %attachment.name))]
    pub async fn download_attachment(
        &self,
        attachment: &MemoAttachment,
    ) -> Result<AttachmentPayload, SyncError> {
        let name = ResourceName::parse(&attachment.name)?;
        let filename = if attachment.filename.is_empty() {
            name.id().to_string()
        } else {
            attachment.filename.clone()
        };
        let mime_type = if attachment.mime_type.is_empty() {
            guess_mime(&filename).unwrap_or(OCTET_STREAM).to_string()
        } else {
            attachment.mime_type.clone()
        };

        match self.download_via_api(&name).await {
            Ok(Some(bytes)) => {
                debug!(bytes = bytes.len(), "downloaded through attachment API");
                return Ok(AttachmentPayload {
                    filename,
                    mime_type,
                    bytes,
                });
            }
            Ok(None) => debug!("attachment API returned no content, using file endpoint"),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => debug!(error = %err, "attachment API failed, using file endpoint"),
        }

        let url = self.site_url(&format!("file/{}/{}", attachment.name, filename))?;
        let response = self
            .send("download attachment", self.authed(Method::GET, url))
            .await?;
        let bytes = response.bytes().await.map_err(ClientError::Request)?;
        Ok(AttachmentPayload {
            filename,
            mime_type,
            bytes: bytes.to_vec(),
        })
    }

    async fn download_via_api(&self, name: &ResourceName) -> Result<Option<Vec<u8>>, SyncError> {
        let url = self.api_url(&format!("attachments/{}", name.id()))?;
        let response = self
            .send("fetch attachment", self.authed(Method::GET, url))
            .await?;
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"));
        if !is_json {
            return Ok(None);
        }
        let body: AttachmentContent = parse_json(response).await?;
        if body.content.is_empty() {
            return Ok(None);
        }
        Ok(STANDARD.decode(body.content.as_bytes()).ok())
    }

    /// Downloads an externally hosted attachment referenced by a feed record.
    ///
    /// No credentials are sent. The MIME type comes from the record, then the
    /// filename's extension, then the response `Content-Type`. When the URL
    /// has no usable filename, one is derived from the MIME type.
    ///
    /// ## Errors
    ///
    /// Returns an error if the URL is invalid or the download fails.
    #[instrument(name = "memos_fetch_url", skip(self, attachment), fields(url = %attachment.url, http.status_code = tracing::field::Empty))]
    pub async fn download_url(
        &self,
        attachment: &AttachmentRef,
    ) -> Result<AttachmentPayload, SyncError> {
        let url = Url::parse(&attachment.url)
            .map_err(|e| ClientError::Connection(format!("invalid URL {}: {e}", attachment.url)))?;
        let response = self
            .send_anonymous("download file", self.http.request(Method::GET, url.clone()))
            .await?;
        let header_mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty());
        let bytes = response.bytes().await.map_err(ClientError::Request)?;

        let mut filename = attachment
            .filename
            .clone()
            .filter(|f| !f.is_empty())
            .or_else(|| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "attachment".to_string());

        let mime_type = attachment
            .mime_type
            .clone()
            .or_else(|| guess_mime(&filename).map(str::to_string))
            .or(header_mime)
            .unwrap_or_else(|| OCTET_STREAM.to_string());

        if guess_mime(&filename).is_none()
            && let Some(ext) = mime_guess::get_mime_extensions_str(&mime_type)
                .and_then(|exts| exts.first())
        {
            filename = format!("{filename}.{ext}");
        }

        Ok(AttachmentPayload {
            filename,
            mime_type,
            bytes: bytes.to_vec(),
        })
    }

    /// Deletes a memo, comment or attachment.
    ///
    /// ## Errors
    ///
    /// Returns an error if the server refuses the deletion.
    #[instrument(name = "memos_delete", skip(self), fields(name = %name, http.status_code = tracing::field::Empty))]
    pub async fn delete(&self, name: &ResourceName) -> Result<(), SyncError> {
        let url = self.api_url(&name.to_string())?;
        self.send("delete", self.authed(Method::DELETE, url)).await?;
        Ok(())
    }

    fn api_url(&self, path: &str) -> Result<Url, SyncError> {
        self.site_url(&format!("api/v1/{path}"))
    }

    fn site_url(&self, path: &str) -> Result<Url, SyncError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::Connection(format!("invalid URL for {path}: {e}")).into())
    }

    fn authed(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.http.request(method, url);
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    /// Sends a request to the instance and maps non-success statuses onto the
    /// error taxonomy.
    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response, SyncError> {
        self.dispatch(operation, request, true).await
    }

    /// Like [`Self::send`], for requests that carry no credentials. A 401 or
    /// 403 there says nothing about our token, so it stays a plain status.
    async fn send_anonymous(&self, operation: &str, request: RequestBuilder) -> Result<Response, SyncError> {
        self.dispatch(operation, request, false).await
    }

    async fn dispatch(
        &self,
        operation: &str,
        request: RequestBuilder,
        authenticated: bool,
    ) -> Result<Response, SyncError> {
        let response = request.send().await.map_err(ClientError::Request)?;
        let status = response.status();
        Span::current().record("http.status_code", status.as_u16());

        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| status.to_string());
        let message: String = body.chars().take(MAX_ERROR_BODY).collect();
        debug!(status = status.as_u16(), %url, "{operation} rejected");

        match status.as_u16() {
            401 if authenticated => Err(AuthError::AuthenticationFailed { url, message }.into()),
            403 if authenticated => Err(AuthError::InsufficientPermissions {
                operation: operation.to_string(),
            }
            .into()),
            code => Err(ClientError::HttpStatus {
                status: code,
                message,
            }
            .into()),
        }
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, SyncError> {
    let url = response.url().to_string();
    let body = response.bytes().await.map_err(ClientError::Request)?;
    serde_json::from_slice(&body).map_err(|e| {
        ClientError::UnexpectedResponse {
            url,
            message: e.to_string(),
        }
        .into()
    })
}

/// Reads the name of a created resource, accepting a bare `id` as fallback.
async fn created_name(response: Response, collection: &str) -> Result<ResourceName, SyncError> {
    let url = response.url().to_string();
    let created: Created = parse_json(response).await?;
    let raw = match (created.name, created.id) {
        (Some(name), _) if !name.is_empty() => name,
        (_, Some(serde_json::Value::String(id))) => format!("{collection}/{id}"),
        (_, Some(serde_json::Value::Number(id))) => format!("{collection}/{id}"),
        _ => {
            return Err(ClientError::UnexpectedResponse {
                url,
                message: "response has no resource name".to_string(),
            }
            .into());
        }
    };
    Ok(ResourceName::parse(&raw)?)
}

fn guess_mime(filename: &str) -> Option<&'static str> {
    mime_guess::from_path(filename)
        .first_raw()
        .filter(|m| *m != OCTET_STREAM)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> MemosClient {
        MemosClient::builder(Url::parse(&server.uri()).unwrap())
            .token("test-token")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn list_memos_sends_bearer_and_parses_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/memos"))
            .and(header("authorization", "Bearer test-token"))
            .and(query_param("pageSize", "2"))
            .and(query_param("pageToken", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "memos": [
                    {"name": "memos/1", "content": "one"},
                    {"name": "memos/2", "content": "two"}
                ],
                "nextPageToken": "def"
            })))
            .mount(&server)
            .await;

        let page = client(&server).await.list_memos(2, Some("abc")).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[1].content, "two");
        assert_eq!(page.next_token.as_deref(), Some("def"));
    }

    #[tokio::test]
    async fn empty_next_token_means_last_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/memos"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"memos": [], "nextPageToken": ""})),
            )
            .mount(&server)
            .await;

        let page = client(&server).await.list_memos(10, None).await.unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_token.is_none());
    }

    #[tokio::test]
    async fn base_url_with_subpath_is_preserved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notes/api/v1/memos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "memos/9"})))
            .mount(&server)
            .await;

        let base = Url::parse(&format!("{}/notes", server.uri())).unwrap();
        let client = MemosClient::builder(base).build().unwrap();
        let name = client.create_memo("x", Visibility::Private).await.unwrap();
        assert_eq!(name, ResourceName::memo("9").unwrap());
    }

    #[tokio::test]
    async fn unauthorized_is_an_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let err = client(&server).await.list_memos(10, None).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, SyncError::Auth(AuthError::AuthenticationFailed { .. })));
        assert!(err.to_string().contains("bad token"));
    }

    #[tokio::test]
    async fn forbidden_names_the_operation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .create_memo("x", Visibility::Public)
            .await
            .unwrap_err();
        match err {
            SyncError::Auth(AuthError::InsufficientPermissions { operation }) => {
                assert_eq!(operation, "create memo");
            }
            other => panic!("expected permission error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_errors_are_retryable_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server).await.list_memos(10, None).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!err.is_end_of_data());
    }

    #[tokio::test]
    async fn create_memo_posts_content_and_visibility() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/memos"))
            .and(body_json(serde_json::json!({"content": "hello", "visibility": "PROTECTED"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "memos/abc"})))
            .expect(1)
            .mount(&server)
            .await;

        let name = client(&server)
            .await
            .create_memo("hello", Visibility::Protected)
            .await
            .unwrap();
        assert_eq!(name.to_string(), "memos/abc");
    }

    #[tokio::test]
    async fn create_memo_accepts_bare_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 17})))
            .mount(&server)
            .await;

        let name = client(&server)
            .await
            .create_memo("x", Visibility::Private)
            .await
            .unwrap();
        assert_eq!(name.to_string(), "memos/17");
    }

    #[tokio::test]
    async fn create_memo_without_name_is_unexpected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .create_memo("x", Visibility::Private)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Client(ClientError::UnexpectedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn nested_comment_sends_parent_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/memos/n1/comments"))
            .and(body_json(serde_json::json!({"content": "reply", "parentId": "c7"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"name": "memos/n1/comments/c8"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let note = ResourceName::memo("n1").unwrap();
        let parent: ResourceName = "memos/n1/comments/c7".parse().unwrap();
        let name = client(&server)
            .await
            .create_comment(&note, Some(&parent), "reply")
            .await
            .unwrap();
        assert_eq!(name.id(), "c8");
    }

    #[tokio::test]
    async fn top_level_comment_omits_parent_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/memos/n1/comments"))
            .and(body_json(serde_json::json!({"content": "reply"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "memos/n2"})))
            .expect(1)
            .mount(&server)
            .await;

        let note = ResourceName::memo("n1").unwrap();
        client(&server)
            .await
            .create_comment(&note, None, "reply")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn backdate_patches_create_time() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/v1/memos/5"))
            .and(body_json(serde_json::json!({"createTime": "2024-03-01T12:00:00Z"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let when = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        client(&server)
            .await
            .patch_create_time(&ResourceName::memo("5").unwrap(), when)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn upload_sends_base64_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/attachments"))
            .and(body_partial_json(serde_json::json!({
                "filename": "a.txt",
                "content": "aGk=",
                "type": "text/plain",
                "memo": "memos/1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "attachments/x"})))
            .expect(1)
            .mount(&server)
            .await;

        let payload = AttachmentPayload {
            filename: "a.txt".to_string(),
            mime_type: "text/plain".to_string(),
            bytes: b"hi".to_vec(),
        };
        let name = client(&server)
            .await
            .upload_attachment(&ResourceName::memo("1").unwrap(), &payload)
            .await
            .unwrap();
        assert_eq!(name.to_string(), "attachments/x");
    }

    #[tokio::test]
    async fn download_prefers_attachment_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/attachments/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": "aGk="})))
            .mount(&server)
            .await;

        let attachment = MemoAttachment {
            name: "attachments/abc".to_string(),
            filename: "a.txt".to_string(),
            mime_type: "text/plain".to_string(),
            external_link: None,
        };
        let payload = client(&server)
            .await
            .download_attachment(&attachment)
            .await
            .unwrap();
        assert_eq!(payload.bytes, b"hi");
        assert_eq!(payload.mime_type, "text/plain");
    }

    #[tokio::test]
    async fn download_falls_back_to_file_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/attachments/abc"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/file/attachments/abc/photo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .expect(1)
            .mount(&server)
            .await;

        let attachment = MemoAttachment {
            name: "attachments/abc".to_string(),
            filename: "photo.png".to_string(),
            ..Default::default()
        };
        let payload = client(&server)
            .await
            .download_attachment(&attachment)
            .await
            .unwrap();
        assert_eq!(payload.bytes, vec![1, 2, 3]);
        assert_eq!(payload.mime_type, "image/png");
    }

    #[tokio::test]
    async fn download_url_takes_mime_from_header_and_names_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img/blob"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(vec![9u8; 4]),
            )
            .mount(&server)
            .await;

        let reference = AttachmentRef::new(format!("{}/img/blob", server.uri()));
        let payload = client(&server).await.download_url(&reference).await.unwrap();
        assert_eq!(payload.mime_type, "image/jpeg");
        assert!(payload.filename.starts_with("blob."));
        assert_eq!(payload.bytes.len(), 4);
    }

    #[tokio::test]
    async fn lists_comments_of_a_memo() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/memos/n1/comments"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "memos": [{"name": "memos/c1", "content": "first!"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let note = ResourceName::parse("memos/n1").unwrap();
        let comments = client(&server).await.list_comments(&note).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].content, "first!");
    }

    #[tokio::test]
    async fn download_url_rejection_is_not_an_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cdn/expired.jpg"))
            .respond_with(ResponseTemplate::new(403).set_body_string("link expired"))
            .mount(&server)
            .await;

        let reference = AttachmentRef::new(format!("{}/cdn/expired.jpg", server.uri()));
        let err = client(&server).await.download_url(&reference).await.unwrap_err();
        assert!(!err.is_fatal());
        assert!(matches!(
            err,
            SyncError::Client(ClientError::HttpStatus { status: 403, .. })
        ));
    }

    #[tokio::test]
    async fn download_url_prefers_extension() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/cat.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/octet-stream")
                    .set_body_bytes(vec![0u8; 2]),
            )
            .mount(&server)
            .await;

        let reference = AttachmentRef::new(format!("{}/media/cat.png", server.uri()));
        let payload = client(&server).await.download_url(&reference).await.unwrap();
        assert_eq!(payload.filename, "cat.png");
        assert_eq!(payload.mime_type, "image/png");
    }

    #[tokio::test]
    async fn delete_targets_resource_name() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/memos/3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .await
            .delete(&ResourceName::memo("3").unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_attachments_uses_memo_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/memos/3/attachments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "attachments": [{"name": "attachments/a", "filename": "a.png", "type": "image/png"}]
            })))
            .mount(&server)
            .await;

        let list = client(&server)
            .await
            .list_attachments(&ResourceName::memo("3").unwrap())
            .await
            .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].signature(), "a.png:image/png");
    }
}
