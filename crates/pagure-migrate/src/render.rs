//! Rendering of tickets and comments into destination markup.
//!
//! Templates use `{name}` placeholders. Unknown placeholders are left as
//! written, and substituted values are never expanded again.
//!
//! | Placeholder    | Ticket | Comment | Value                                  |
//! |----------------|--------|---------|----------------------------------------|
//! | `ticket_id`    | yes    | yes     | source ticket number                   |
//! | `title`        | yes    | yes     | source ticket title                    |
//! | `body`         | yes    | yes     | ticket content or comment text         |
//! | `author_name`  | yes    | yes     | display name of the author             |
//! | `author_url`   | yes    | yes     | profile link of the author             |
//! | `source_repo`  | yes    | yes     | source repository name                 |
//! | `repo_link`    | yes    | yes     | source repository link                 |
//! | `ticket_url`   | yes    | yes     | canonical ticket link                  |
//! | `comment_url`  | no     | yes     | canonical comment link                 |
//! | `date`         | yes    | yes     | full creation date                     |
//! | `month` `day` `year` `hour` `minute` | yes | yes | creation date parts      |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CommentRecord, TicketRecord};

const DEFAULT_TITLE: &str = "[SN#{ticket_id}] {title}";

const DEFAULT_BODY: &str = "\
[**Ticket #{ticket_id}**]({ticket_url}) imported from [{source_repo}]({repo_link}), \
opened by [{author_name}]({author_url}) on {month} {day}, {year} at {hour}:{minute} UTC

---

{body}";

const DEFAULT_COMMENT: &str = "\
[**Comment**]({comment_url}) by [{author_name}]({author_url}) \
on {month} {day}, {year} at {hour}:{minute} UTC

---

{body}";

/// Template strings for issue titles, issue bodies, and comments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Templates {
    pub title: String,
    pub body: String,
    pub comment: String,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            body: DEFAULT_BODY.to_string(),
            comment: DEFAULT_COMMENT.to_string(),
        }
    }
}

/// Repository context shared by every rendered item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    /// Source repository name.
    pub source_repo: String,
    /// Web link of the source repository.
    pub repo_link: String,
}

/// Rendered title and body of a destination issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedIssue {
    pub title: String,
    pub body: String,
}

/// Renders source items with the configured templates.
#[derive(Debug, Clone)]
pub struct Renderer {
    templates: Templates,
    context: RenderContext,
}

impl Renderer {
    pub fn new(templates: Templates, context: RenderContext) -> Self {
        Self { templates, context }
    }

    /// Render the title and body of the issue replacing `ticket`.
    pub fn render_ticket(&self, ticket: &TicketRecord) -> RenderedIssue {
        let values = self.ticket_values(ticket, &ticket.body, ticket.created_at);
        RenderedIssue {
            title: sanitize_mentions(&fill(&self.templates.title, &values)),
            body: sanitize_mentions(&fill(&self.templates.body, &values)),
        }
    }

    /// Render a comment of `ticket`. Dates come from the comment itself.
    pub fn render_comment(&self, ticket: &TicketRecord, comment: &CommentRecord) -> String {
        let mut values = self.ticket_values(ticket, &comment.body, comment.created_at);
        values.retain(|(key, _)| *key != "author_name" && *key != "author_url");
        values.push(("author_name", comment.author.display_name.clone()));
        values.push(("author_url", comment.author.profile_url.clone()));
        values.push(("comment_url", comment_url(ticket, comment)));
        sanitize_mentions(&fill(&self.templates.comment, &values))
    }

    fn ticket_values(
        &self,
        ticket: &TicketRecord,
        body: &str,
        timestamp: i64,
    ) -> Vec<(&'static str, String)> {
        let date = DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_default();
        vec![
            ("ticket_id", ticket.id.to_string()),
            ("title", ticket.title.clone()),
            ("body", body.to_string()),
            ("author_name", ticket.author.display_name.clone()),
            ("author_url", ticket.author.profile_url.clone()),
            ("source_repo", self.context.source_repo.clone()),
            ("repo_link", self.context.repo_link.clone()),
            ("ticket_url", ticket.canonical_url.clone()),
            ("date", date.format("%c").to_string()),
            ("month", date.format("%b").to_string().to_lowercase()),
            ("day", date.format("%d").to_string()),
            ("year", date.format("%Y").to_string()),
            ("hour", date.format("%H").to_string()),
            ("minute", date.format("%M").to_string()),
        ]
    }
}

/// Canonical link of a comment on the source forge.
pub fn comment_url(ticket: &TicketRecord, comment: &CommentRecord) -> String {
    format!("{}#comment-{}", ticket.canonical_url, comment.id)
}

/// Replace every `@` so the destination does not resolve source handles
/// into mentions of unrelated users.
pub fn sanitize_mentions(text: &str) -> String {
    text.replace('@', "&")
}

fn fill(template: &str, values: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
