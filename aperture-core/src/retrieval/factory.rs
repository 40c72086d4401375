use std::{fmt, sync::Arc};

use aperture_model::FilterContext;
use tracing::debug;

use super::{
    FixedCollectionStrategy, IdentifierFetchStrategy, RetrievalStrategy,
    ServerFilteredStrategy, SortPreference,
};
use crate::{gateway::LibraryGateway, location::LocationIndex};

/// Picks the strategy for a filter context.
///
/// Every call builds a fresh strategy; callers decide how long to keep it.
#[derive(Clone)]
pub struct StrategyFactory {
    gateway: Arc<dyn LibraryGateway>,
    locations: Arc<LocationIndex>,
    sort: Arc<dyn SortPreference>,
}

impl fmt::Debug for StrategyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyFactory")
            .field("locations", &self.locations)
            .field("sort", &self.sort)
            .finish_non_exhaustive()
    }
}

impl StrategyFactory {
    pub fn new(
        gateway: Arc<dyn LibraryGateway>,
        locations: Arc<LocationIndex>,
        sort: Arc<dyn SortPreference>,
    ) -> Self {
        Self {
            gateway,
            locations,
            sort,
        }
    }

    pub fn select(&self, context: &FilterContext) -> RetrievalStrategy {
        let strategy = match context {
            FilterContext::Collection { album } => {
                RetrievalStrategy::FixedCollection(FixedCollectionStrategy::new(
                    Arc::clone(&self.gateway),
                    album.clone(),
                    Arc::clone(&self.sort),
                ))
            }
            FilterContext::Location { name } => {
                RetrievalStrategy::IdentifierFetch(IdentifierFetchStrategy::new(
                    Arc::clone(&self.gateway),
                    Arc::clone(&self.locations),
                    name.clone(),
                    Arc::clone(&self.sort),
                ))
            }
            FilterContext::Query { filter } => {
                RetrievalStrategy::ServerFiltered(ServerFilteredStrategy::new(
                    Arc::clone(&self.gateway),
                    filter.clone(),
                    Arc::clone(&self.sort),
                ))
            }
        };
        debug!(kind = ?strategy.kind(), "retrieval strategy selected");
        strategy
    }
}
