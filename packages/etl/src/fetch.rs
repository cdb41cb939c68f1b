//! The paginated fetcher.

use tracing::{debug, warn};

use crate::error::Result;
use crate::traits::PageSource;
use crate::types::{Page, Record};

/// Upper bound on pages followed per collection. The fetcher trusts the
/// upstream cursor and normally loops until it is absent; the cap only
/// bounds a misbehaving upstream that keeps handing out pointers.
pub const DEFAULT_PAGE_LIMIT: usize = 500;

/// Fetch every page of a collection resource, starting from a fully-formed
/// first-page URL, and return the concatenated records in page order.
///
/// Page N+1 is requested only after page N's next pointer is known;
/// pagination ends when the pointer is null, absent, or empty.
pub async fn fetch_all_pages<S>(source: &S, first_url: &str) -> Result<Vec<Record>>
where
    S: PageSource + ?Sized,
{
    fetch_all_pages_limited(source, first_url, DEFAULT_PAGE_LIMIT).await
}

/// [`fetch_all_pages`] with an explicit page cap.
pub async fn fetch_all_pages_limited<S>(
    source: &S,
    first_url: &str,
    page_limit: usize,
) -> Result<Vec<Record>>
where
    S: PageSource + ?Sized,
{
    let mut records = Vec::new();
    let mut next = Some(first_url.to_string());
    let mut pages = 0usize;

    while let Some(url) = next {
        if pages >= page_limit {
            warn!(
                url = %url,
                pages = pages,
                records = records.len(),
                "page limit reached, stopping pagination with pages left unfetched"
            );
            break;
        }

        let body = source.get_json(&url).await?;
        let page = Page::from_value(body)?;

        debug!(
            url = %url,
            page = pages + 1,
            batch = page.records.len(),
            has_next = page.has_next(),
            "page normalized"
        );

        records.extend(page.records);
        next = page.next;
        pages += 1;
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use crate::testing::MockSource;
    use serde_json::json;

    #[tokio::test]
    async fn test_pagination_terminates_and_preserves_order() {
        let source = MockSource::new()
            .with_page(json!({"data": [{"id": 1}, {"id": 2}], "paging": {"next": "p2"}}))
            .with_page(json!({"data": [{"id": 3}], "paging": {"next": "p3"}}))
            .with_page(json!({"data": [{"id": 4}], "paging": {}}));

        let records = fetch_all_pages(&source, "p1").await.unwrap();

        assert_eq!(
            records,
            vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3}), json!({"id": 4})]
        );
        assert_eq!(source.requested_urls(), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_graph_envelope_two_pages() {
        // Scenario: graph-style envelope, second page has empty paging
        let source = MockSource::new()
            .with_page(json!({"data": [{"id": 1}, {"id": 2}], "paging": {"next": "url2"}}))
            .with_page(json!({"data": [{"id": 3}], "paging": {}}));

        let records = fetch_all_pages(&source, "url1").await.unwrap();

        assert_eq!(records, vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]);
        assert_eq!(source.request_count(), 2);
    }

    #[tokio::test]
    async fn test_collection_envelope_single_page() {
        let source = MockSource::new()
            .with_page(json!({"items": [{"id": "a"}], "next_page_url": null}));

        let records = fetch_all_pages(&source, "url1").await.unwrap();

        assert_eq!(records, vec![json!({"id": "a"})]);
        assert_eq!(source.request_count(), 1);
    }

    #[tokio::test]
    async fn test_mid_pagination_error_propagates() {
        let source = MockSource::new()
            .with_page(json!({"data": [{"id": 1}], "paging": {"next": "p2"}}))
            .with_error(EtlError::upstream("rate limit"));

        let err = fetch_all_pages(&source, "p1").await.unwrap_err();
        assert!(matches!(err, EtlError::Upstream { .. }));
    }

    #[tokio::test]
    async fn test_page_limit_guard() {
        // An upstream that always hands out another pointer
        let mut source = MockSource::new();
        for _ in 0..10 {
            source = source.with_page(json!({"data": [{"id": 1}], "paging": {"next": "again"}}));
        }

        let records = fetch_all_pages_limited(&source, "p1", 4).await.unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(source.request_count(), 4);
    }
}
