//! Destination forge (GitLab) issue writer.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DestinationConfig, TransferConfig};
use crate::error::{MigrationError, ProviderErrorKind, RequestError, Result, Timed};

/// Request body for issue creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    /// Comma separated label names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidential: Option<bool>,
    /// Requested issue number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iid: Option<u64>,
}

/// An issue created on the destination.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedIssue {
    /// Project scoped issue number.
    pub iid: u64,
    /// Canonical link of the issue.
    pub web_url: String,
}

/// A comment created on the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedComment {
    /// Note id of the comment.
    pub id: u64,
    /// Canonical link of the comment.
    pub url: String,
}

/// Write access to the destination issue tracker.
#[async_trait]
pub trait IssueSink: Send + Sync {
    /// Create an issue.
    async fn create_issue(&self, issue: &NewIssue) -> Timed<CreatedIssue>;

    /// Start a discussion on an existing issue.
    async fn create_comment(&self, issue: &CreatedIssue, body: &str) -> Timed<CreatedComment>;

    /// Close an existing issue.
    async fn close_issue(&self, iid: u64) -> Timed<()>;
}

#[derive(Debug, Deserialize)]
struct Note {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct Discussion {
    #[serde(default)]
    notes: Vec<Note>,
}

#[derive(Debug, Serialize)]
struct CommentRequest<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct StateEvent {
    state_event: &'static str,
}

/// Client for the GitLab issues API.
pub struct GitLabClient {
    client: Client,
    project_url: String,
    token: String,
}

impl GitLabClient {
    /// Create a new GitLab client for one project.
    pub fn new(destination: &DestinationConfig, transfer: &TransferConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent("pagure-migrate")
            .timeout(transfer.timeout())
            .build()
            .map_err(|e| MigrationError::InvalidConfig(format!("HTTP client: {e}")))?;

        let project: String =
            url::form_urlencoded::byte_serialize(destination.project.as_bytes()).collect();

        Ok(Self {
            client,
            project_url: format!(
                "{}/api/v4/projects/{project}",
                destination.url.trim_end_matches('/')
            ),
            token: destination.token.clone(),
        })
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &B,
        kind: ProviderErrorKind,
    ) -> std::result::Result<Response, RequestError> {
        let url = format!("{}{path}", self.project_url);
        let response = self
            .client
            .request(method, &url)
            .header("PRIVATE-TOKEN", &self.token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(classify(status, response.text().await.unwrap_or_default(), kind))
    }
}

/// Map a rejected response onto the error taxonomy.
///
/// Credential and server errors stay HTTP errors. A missing issue is a
/// failed lookup; any other client error is the forge refusing the operation.
fn classify(status: StatusCode, body: String, kind: ProviderErrorKind) -> RequestError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RequestError::http(status),
        StatusCode::NOT_FOUND => RequestError::provider(ProviderErrorKind::Get, body),
        s if s.is_client_error() => RequestError::provider(kind, body),
        _ => RequestError::http(status),
    }
}

/// The write went through but its reply is unusable. Retrying would
/// duplicate the object.
fn unconfirmed(e: impl std::fmt::Display) -> RequestError {
    RequestError::provider(
        ProviderErrorKind::Unconfirmed,
        format!("accepted but reply unreadable: {e}"),
    )
}

#[async_trait]
impl IssueSink for GitLabClient {
    async fn create_issue(&self, issue: &NewIssue) -> Timed<CreatedIssue> {
        debug!(iid = ?issue.iid, "Creating issue");
        Timed::measure(async {
            let response = self
                .send(reqwest::Method::POST, "/issues", issue, ProviderErrorKind::Create)
                .await?;
            let created: CreatedIssue = response.json().await.map_err(unconfirmed)?;
            Ok::<_, RequestError>(created)
        })
        .await
    }

    async fn create_comment(&self, issue: &CreatedIssue, body: &str) -> Timed<CreatedComment> {
        debug!(iid = issue.iid, "Creating discussion");
        Timed::measure(async {
            let response = self
                .send(
                    reqwest::Method::POST,
                    &format!("/issues/{}/discussions", issue.iid),
                    &CommentRequest { body },
                    ProviderErrorKind::Create,
                )
                .await?;
            let discussion: Discussion = response.json().await.map_err(unconfirmed)?;
            let note = discussion
                .notes
                .first()
                .ok_or_else(|| unconfirmed("discussion has no notes"))?;
            Ok::<_, RequestError>(CreatedComment {
                id: note.id,
                url: format!("{}#note_{}", issue.web_url, note.id),
            })
        })
        .await
    }

    async fn close_issue(&self, iid: u64) -> Timed<()> {
        debug!(iid, "Closing issue");
        Timed::measure(async {
            self.send(
                reqwest::Method::PUT,
                &format!("/issues/{iid}"),
                &StateEvent {
                    state_event: "close",
                },
                ProviderErrorKind::Update,
            )
            .await?;
            Ok::<_, RequestError>(())
        })
        .await
    }
}
