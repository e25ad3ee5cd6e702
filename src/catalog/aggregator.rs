use tracing::{debug, info, trace};

use super::{parse_page, Catalog};
use crate::error::{CatalogError, FetchError};

/// Number of items the device returns per `QueryContainer` page.
pub const PAGE_SIZE: u64 = 16;

/// Source of raw listing pages. Transport, authentication and retries are the
/// implementor's business.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, offset: u64) -> Result<Vec<u8>, FetchError>;
}

/// Page through the whole Now Playing container and return it sorted by title.
#[tracing::instrument(skip_all)]
pub async fn build_catalog<F>(fetcher: &F) -> Result<Catalog, CatalogError>
where
    F: PageFetcher + ?Sized,
{
    let first = fetch_and_parse(fetcher, 0, true).await?;
    let Some(total) = first.total_items else {
        return Err(CatalogError::Protocol("missing total count".to_string()));
    };
    info!(total, "Device reported recordings");

    let mut catalog = Catalog::default();
    catalog.extend(first.recordings);

    if total > PAGE_SIZE {
        // With an exact multiple the last page starts at `total - PAGE_SIZE`,
        // and a page at `total` would come back empty.
        let limit = if total % PAGE_SIZE == 0 {
            total - 1
        } else {
            total
        };

        let mut offset = PAGE_SIZE;
        while offset <= limit {
            let page = fetch_and_parse(fetcher, offset, false).await?;
            catalog.extend(page.recordings);
            offset += PAGE_SIZE;
        }
    }

    let actual = catalog.len() as u64;
    if actual != total {
        return Err(CatalogError::Integrity {
            expected: total,
            actual,
        });
    }

    catalog.sort();
    debug!(recordings = catalog.len(), "Catalog built");

    Ok(catalog)
}

async fn fetch_and_parse<F>(
    fetcher: &F,
    offset: u64,
    expect_total: bool,
) -> Result<super::ParsedPage, CatalogError>
where
    F: PageFetcher + ?Sized,
{
    trace!(offset, "Fetching page");
    let body = fetcher
        .fetch_page(offset)
        .await
        .map_err(|source| CatalogError::Fetch { offset, source })?;

    let page = parse_page(&body, expect_total)
        .map_err(|source| CatalogError::Parse { offset, source })?;
    trace!(offset, items = page.recordings.len(), "Page parsed");

    Ok(page)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::ParseError;

    /// Serves a synthetic container of `total` recordings, `PAGE_SIZE` at a time.
    struct FakeDevice {
        total: u64,
        /// Items actually present, when the device lies about `total`.
        present: u64,
        titles: Vec<String>,
        offsets: Mutex<Vec<u64>>,
        fail_at: Option<u64>,
    }
    impl FakeDevice {
        fn new(total: u64) -> Self {
            Self {
                total,
                present: total,
                titles: (0..total).map(|i| format!("Show {:03}", total - i)).collect(),
                offsets: Mutex::new(Vec::new()),
                fail_at: None,
            }
        }

        fn with_titles(titles: &[&str]) -> Self {
            let mut device = Self::new(titles.len() as u64);
            device.titles = titles.iter().map(ToString::to_string).collect();
            device
        }

        fn offsets(&self) -> Vec<u64> {
            self.offsets.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl PageFetcher for FakeDevice {
        async fn fetch_page(&self, offset: u64) -> Result<Vec<u8>, FetchError> {
            self.offsets.lock().unwrap().push(offset);

            if self.fail_at == Some(offset) {
                return Err(FetchError::Auth("challenge rejected".to_string()));
            }

            let end = (offset + PAGE_SIZE).min(self.present);
            let items = (offset..end)
                .map(|i| {
                    format!(
                        "<Item><Details><Title>{}</Title><SourceSize>{i}</SourceSize></Details>\
                         <Links><Content><Url>http://tivo/download/{i}</Url></Content></Links></Item>",
                        self.titles[usize::try_from(i).unwrap()]
                    )
                })
                .collect::<String>();

            Ok(format!(
                "<TiVoContainer><Details><TotalItems>{}</TotalItems></Details>{items}</TiVoContainer>",
                self.total
            )
            .into_bytes())
        }
    }

    #[tokio::test]
    async fn fetches_the_minimum_number_of_pages() {
        for (total, pages) in [(0, 1), (1, 1), (16, 1), (17, 2), (32, 2), (33, 3), (48, 3)] {
            let device = FakeDevice::new(total);

            let catalog = build_catalog(&device).await.unwrap();

            assert_eq!(device.offsets().len(), pages, "total = {total}");
            assert_eq!(catalog.len() as u64, total);
        }
    }

    #[tokio::test]
    async fn pages_advance_by_page_size() {
        let device = FakeDevice::new(40);

        build_catalog(&device).await.unwrap();

        assert_eq!(device.offsets(), [0, 16, 32]);
    }

    #[tokio::test]
    async fn catalog_is_sorted_stably_by_title() {
        let device = FakeDevice::with_titles(&["B Show", "A Show", "A Show"]);

        let catalog = build_catalog(&device).await.unwrap();

        let got = catalog
            .iter()
            .map(|x| (x.title.as_str(), x.url.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            got,
            [
                ("A Show", "http://tivo/download/1"),
                ("A Show", "http://tivo/download/2"),
                ("B Show", "http://tivo/download/0"),
            ]
        );
    }

    #[tokio::test]
    async fn count_mismatch_is_an_integrity_error() {
        let mut device = FakeDevice::new(20);
        device.present = 18;

        let err = build_catalog(&device).await.unwrap_err();

        assert!(matches!(
            err,
            CatalogError::Integrity {
                expected: 20,
                actual: 18
            }
        ));
    }

    #[tokio::test]
    async fn missing_total_is_a_protocol_error() {
        struct NoTotal;

        #[async_trait::async_trait]
        impl PageFetcher for NoTotal {
            async fn fetch_page(&self, _offset: u64) -> Result<Vec<u8>, FetchError> {
                Ok(b"<TiVoContainer><ItemCount>0</ItemCount></TiVoContainer>".to_vec())
            }
        }

        let err = build_catalog(&NoTotal).await.unwrap_err();

        assert!(matches!(err, CatalogError::Protocol(_)));
    }

    #[tokio::test]
    async fn fetch_failure_aborts_with_offset() {
        let mut device = FakeDevice::new(40);
        device.fail_at = Some(16);

        let err = build_catalog(&device).await.unwrap_err();

        assert!(matches!(err, CatalogError::Fetch { offset: 16, .. }));
        assert_eq!(device.offsets(), [0, 16]);
    }

    #[tokio::test]
    async fn malformed_item_aborts_with_offset() {
        struct Broken;

        #[async_trait::async_trait]
        impl PageFetcher for Broken {
            async fn fetch_page(&self, _offset: u64) -> Result<Vec<u8>, FetchError> {
                Ok(b"<TiVoContainer><TotalItems>1</TotalItems>\
                     <Item><Details><Title>A</Title></Details></Item></TiVoContainer>"
                    .to_vec())
            }
        }

        let err = build_catalog(&Broken).await.unwrap_err();

        assert!(matches!(
            err,
            CatalogError::Parse {
                offset: 0,
                source: ParseError::MalformedRecord {
                    field: "SourceSize",
                    ..
                }
            }
        ));
    }
}
