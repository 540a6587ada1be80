//! Page-number pagination over Blockfrost collection endpoints.

use crate::blockfrost::{ApiError, PAGE_SIZE};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Items collected from a paginated endpoint.
///
/// `error` holds the failure that stopped pagination early, if any; `items`
/// still contains every page fetched before it.
#[derive(Debug)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub pages: u32,
    pub error: Option<ApiError>,
}

impl<T> Paged<T> {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Walks pages 1, 2, ... until a short page, an empty page, a 404 or the
/// limit is reached.
#[derive(Debug, Clone)]
pub struct PagedFetcher {
    cooldown: Duration,
}

impl Default for PagedFetcher {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl PagedFetcher {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub async fn fetch<T, F, Fut>(&self, mut request: F, limit: Option<usize>) -> Paged<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Vec<T>, ApiError>>,
    {
        let mut items = Vec::new();
        let mut error = None;
        let mut page: u32 = 1;
        let mut pages: u32 = 0;

        loop {
            if limit.is_some_and(|l| items.len() >= l) {
                debug!("Pagination stopped at limit after {} pages", pages);
                break;
            }

            if page > 1 && !self.cooldown.is_zero() {
                tokio::time::sleep(self.cooldown).await;
            }

            match request(page).await {
                Ok(batch) => {
                    pages += 1;
                    let count = batch.len();
                    items.extend(batch);
                    debug!("page {}: {} items ({} total)", page, count, items.len());
                    if count < PAGE_SIZE {
                        break;
                    }
                    page += 1;
                }
                Err(e) if e.is_not_found() => break,
                Err(e) => {
                    warn!(
                        "Pagination aborted on page {} with {} items collected: {}",
                        page,
                        items.len(),
                        e
                    );
                    error = Some(e);
                    break;
                }
            }
        }

        if let Some(limit) = limit {
            items.truncate(limit);
        }

        Paged {
            items,
            pages,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> PagedFetcher {
        PagedFetcher::new(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_stops_after_short_page() {
        let sizes = [100usize, 100, 37];
        let mut calls = 0u32;

        let paged = fetcher()
            .fetch(
                |page| {
                    calls += 1;
                    let size = sizes[(page - 1) as usize];
                    async move { Ok::<_, ApiError>(vec![page; size]) }
                },
                None,
            )
            .await;

        assert_eq!(paged.items.len(), 237);
        assert_eq!(paged.pages, 3);
        assert_eq!(calls, 3);
        assert!(paged.is_complete());
    }

    #[tokio::test]
    async fn test_empty_page_terminates() {
        let mut calls = 0u32;
        let paged = fetcher()
            .fetch(
                |page| {
                    calls += 1;
                    let size = if page == 1 { 100 } else { 0 };
                    async move { Ok::<_, ApiError>(vec![0u8; size]) }
                },
                None,
            )
            .await;

        assert_eq!(paged.items.len(), 100);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_limit_truncates_exactly() {
        for limit in [1usize, 99, 100, 101, 250] {
            let mut calls = 0u32;
            let paged = fetcher()
                .fetch(
                    |_| {
                        calls += 1;
                        async move { Ok::<_, ApiError>(vec![(); 100]) }
                    },
                    Some(limit),
                )
                .await;

            assert_eq!(paged.items.len(), limit);
            assert_eq!(calls as usize, limit.div_ceil(100));
        }
    }

    #[tokio::test]
    async fn test_error_keeps_partial_results() {
        let paged = fetcher()
            .fetch(
                |page| async move {
                    if page == 1 {
                        Ok(vec![1u32; 100])
                    } else {
                        Err(ApiError::Status {
                            status: 402,
                            message: "Project over limit".to_string(),
                        })
                    }
                },
                None,
            )
            .await;

        assert_eq!(paged.items.len(), 100);
        assert_eq!(paged.pages, 1);
        assert!(matches!(paged.error, Some(ApiError::Status { status: 402, .. })));
    }

    #[tokio::test]
    async fn test_not_found_is_empty() {
        let paged = fetcher()
            .fetch(
                |_| async move { Err::<Vec<u8>, _>(ApiError::NotFound("/addresses/x".into())) },
                None,
            )
            .await;

        assert!(paged.items.is_empty());
        assert!(paged.is_complete());
    }
}
