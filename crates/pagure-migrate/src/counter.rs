//! Exact ticket counting with at most two listing requests.
//!
//! The first page tells whether there is more than one page. When there is,
//! the last page is requested and the count becomes
//! `(pages - 1) * page_size + tickets_on_last_page`. This relies on the page
//! size staying the same between the two requests, so the size the forge
//! reports on the first page takes precedence over the configured one.

use tracing::{debug, warn};

use crate::error::{ProviderErrorKind, RequestError, Timed};
use crate::source::TicketSource;

/// Result of counting the tickets in scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketCount {
    /// Tickets matching the filter.
    pub total: u64,
    /// Pages in the listing.
    pub pages: u64,
    /// Page size the count is based on.
    pub page_size: u64,
}

/// Count tickets matching the source's state filter.
pub async fn count_tickets<S>(source: &S, page_size: u64) -> Timed<TicketCount>
where
    S: TicketSource + ?Sized,
{
    Timed::measure(async {
        let first = source.list_page(1).await.result?;

        let page_size = match first.pagination.per_page {
            Some(reported) if reported > 0 && reported != page_size => {
                warn!(
                    configured = page_size,
                    reported, "Forge applied a different page size"
                );
                reported
            }
            _ => page_size,
        };

        if first.pagination.next.is_none() {
            debug!(total = first.total_issues, "Single listing page");
            return Ok(TicketCount {
                total: first.total_issues,
                pages: 1,
                page_size,
            });
        }

        let pages = first.pagination.pages;
        if pages < 2 {
            return Err(RequestError::provider(
                ProviderErrorKind::Decode,
                format!("listing has a next page but reports {pages} pages"),
            ));
        }

        let last = source.list_page(pages).await.result?;
        let total = (pages - 1)
            .checked_mul(page_size)
            .and_then(|full| full.checked_add(last.total_issues))
            .ok_or_else(|| {
                RequestError::provider(
                    ProviderErrorKind::Decode,
                    format!("listing reports {pages} pages of {page_size}, too many to count"),
                )
            })?;
        debug!(pages, page_size, total, "Counted tickets from last page");

        Ok(TicketCount {
            total,
            pages,
            page_size,
        })
    })
    .await
}
