//! Source forge (Pagure) ticket reader.

use async_trait::async_trait;
use reqwest::Client;
use serde::{de, Deserialize, Deserializer};
use tracing::debug;

use crate::config::{SourceConfig, TransferConfig};
use crate::error::{MigrationError, RequestError, Result, Timed};
use crate::filter::StateFilter;
use crate::types::{Author, CommentRecord, TicketRecord, TicketStatus};

/// Pagination block of a listing response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    /// Link to the next page, `null` on the last page.
    pub next: Option<String>,
    /// Number of pages for the current filter.
    #[serde(default)]
    pub pages: u64,
    /// Page size the forge actually applied.
    #[serde(default)]
    pub per_page: Option<u64>,
}

/// Ticket summary as it appears in a listing.
#[derive(Debug, Clone, Deserialize)]
pub struct TicketSummary {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
}

/// One page of the ticket listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssuePage {
    #[serde(default)]
    pub issues: Vec<TicketSummary>,
    #[serde(default)]
    pub pagination: Pagination,
    /// Tickets matching the filter in this response.
    #[serde(default)]
    pub total_issues: u64,
}

/// A ticket with its comment thread, and whether the filter excludes it.
#[derive(Debug, Clone)]
pub struct FetchedTicket {
    pub ticket: TicketRecord,
    /// Comments in source order.
    pub comments: Vec<CommentRecord>,
    /// The state filter excludes this ticket.
    pub skip: bool,
}

/// Read access to the source ticket tracker.
#[async_trait]
pub trait TicketSource: Send + Sync {
    /// List one page of tickets. Pages start at 1.
    async fn list_page(&self, page: u64) -> Timed<IssuePage>;

    /// Fetch the full detail of a ticket and evaluate the state filter on it.
    async fn fetch_ticket(&self, id: u64) -> Timed<FetchedTicket>;
}

#[derive(Debug, Deserialize)]
struct PagureUser {
    #[serde(default)]
    name: String,
    #[serde(default)]
    fullname: String,
    #[serde(default)]
    url_path: String,
}

#[derive(Debug, Deserialize)]
struct PagureComment {
    id: u64,
    #[serde(deserialize_with = "unix_timestamp")]
    date_created: i64,
    #[serde(default)]
    comment: String,
    user: PagureUser,
}

#[derive(Debug, Deserialize)]
struct PagureIssue {
    id: u64,
    title: String,
    #[serde(default)]
    content: String,
    status: String,
    user: PagureUser,
    #[serde(default)]
    full_url: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    private: bool,
    #[serde(deserialize_with = "unix_timestamp")]
    date_created: i64,
    #[serde(default)]
    comments: Vec<PagureComment>,
}

/// Pagure reports timestamps as strings of seconds; accept numbers too.
fn unix_timestamp<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid timestamp: {s}"))),
    }
}

/// Client for the Pagure ticket API.
pub struct PagureClient {
    client: Client,
    api_base: String,
    token: String,
    account_url: String,
    state: StateFilter,
    page_size: u64,
}

impl PagureClient {
    /// Create a new Pagure client.
    pub fn new(source: &SourceConfig, transfer: &TransferConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent("pagure-migrate")
            .timeout(transfer.timeout())
            .build()
            .map_err(|e| MigrationError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: source.api_base(),
            token: source.token.clone(),
            account_url: source.account_url.trim_end_matches('/').to_string(),
            state: transfer.state,
            page_size: transfer.page_size,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<T, RequestError> {
        let url = format!("{}{path}", self.api_base);
        let response = self
            .client
            .get(&url)
            .query(query)
            .header("Authorization", format!("token {}", self.token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RequestError::http(response.status()));
        }

        Ok(response.json().await?)
    }

    fn author(&self, user: PagureUser, with_handle: bool) -> Author {
        Author {
            display_name: user.fullname,
            profile_url: format!("{}/{}", self.account_url, user.url_path),
            handle: with_handle.then_some(user.name),
        }
    }

    fn assemble(&self, issue: PagureIssue) -> FetchedTicket {
        let skip = !self.state.includes(&issue.status);
        let comments = issue
            .comments
            .into_iter()
            .map(|c| CommentRecord {
                id: c.id,
                body: c.comment,
                author: self.author(c.user, false),
                created_at: c.date_created,
            })
            .collect();

        let ticket = TicketRecord {
            id: issue.id,
            title: issue.title,
            body: issue.content,
            author: self.author(issue.user, true),
            tags: issue.tags,
            is_confidential: issue.private,
            created_at: issue.date_created,
            status: TicketStatus::from_source(&issue.status),
            status_text: issue.status,
            canonical_url: issue.full_url,
        };

        FetchedTicket {
            ticket,
            comments,
            skip,
        }
    }
}

#[async_trait]
impl TicketSource for PagureClient {
    async fn list_page(&self, page: u64) -> Timed<IssuePage> {
        let mut query = vec![
            ("per_page", self.page_size.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(status) = self.state.query_status() {
            query.push(("status", status.to_string()));
        }

        debug!(page, per_page = self.page_size, "Listing ticket page");
        Timed::measure(self.get("/issues", &query)).await
    }

    async fn fetch_ticket(&self, id: u64) -> Timed<FetchedTicket> {
        debug!(ticket_id = id, "Fetching ticket");
        Timed::measure(async {
            let issue: PagureIssue = self.get(&format!("/issue/{id}"), &[]).await?;
            Ok::<_, RequestError>(self.assemble(issue))
        })
        .await
    }
}
