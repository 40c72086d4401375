use std::{fmt, sync::Arc};

use aperture_model::{Asset, MetadataFilter, Page, PageRequest};
use tracing::trace;

use super::SortPreference;
use crate::{error::Result, gateway::LibraryGateway};

/// Delegates filtering, sorting and paging to the server.
///
/// Stateless apart from the filter: every call is one request.
pub struct ServerFilteredStrategy {
    gateway: Arc<dyn LibraryGateway>,
    filter: MetadataFilter,
    sort: Arc<dyn SortPreference>,
}

impl fmt::Debug for ServerFilteredStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerFilteredStrategy")
            .field("filter", &self.filter)
            .field("sort", &self.sort)
            .finish_non_exhaustive()
    }
}

impl ServerFilteredStrategy {
    pub fn new(
        gateway: Arc<dyn LibraryGateway>,
        filter: MetadataFilter,
        sort: Arc<dyn SortPreference>,
    ) -> Self {
        Self {
            gateway,
            filter,
            sort,
        }
    }

    pub fn filter(&self) -> &MetadataFilter {
        &self.filter
    }

    fn effective_filter(&self) -> MetadataFilter {
        self.filter.clone().ordered(self.sort.sort_order())
    }

    pub async fn fetch_page(
        &self,
        request: PageRequest,
    ) -> Result<Page<Asset>> {
        let filter = self.effective_filter();
        let mut page = self
            .gateway
            .query_metadata(&filter, request.page(), request.page_size())
            .await?;

        // The server is trusted for order, not for page length.
        page.items.truncate(request.page_size() as usize);
        let next_page = request.next_page(page.total);
        trace!(
            page = request.page(),
            returned = page.items.len(),
            total = page.total,
            "server-filtered page"
        );
        Ok(Page {
            items: page.items,
            total: page.total,
            next_page,
        })
    }

    pub async fn fetch_random(&self, limit: u32) -> Result<Page<Asset>> {
        let mut items = self.gateway.query_random(&self.filter, limit).await?;
        items.truncate(limit as usize);
        Ok(Page::complete(items))
    }
}
