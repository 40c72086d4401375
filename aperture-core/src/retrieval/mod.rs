//! Asset retrieval strategies.
//!
//! Each [`FilterContext`](aperture_model::FilterContext) variant has exactly
//! one strategy. Pages are 1-indexed; a page past the end comes back empty
//! with `total` set and no continuation token.

mod factory;
mod fixed_collection;
mod identifier_fetch;
mod server_filtered;

pub use factory::StrategyFactory;
pub use fixed_collection::FixedCollectionStrategy;
pub use identifier_fetch::IdentifierFetchStrategy;
pub use server_filtered::ServerFilteredStrategy;

use std::{
    fmt,
    sync::atomic::{AtomicU8, Ordering},
};

use aperture_model::{Asset, Page, PageRequest, SortOrder};
use rand::seq::IndexedRandom;

use crate::error::Result;

/// Source of the persisted newest/oldest preference.
pub trait SortPreference: Send + Sync + fmt::Debug {
    fn sort_order(&self) -> SortOrder;
}

impl SortPreference for SortOrder {
    fn sort_order(&self) -> SortOrder {
        *self
    }
}

/// A preference the settings layer can flip at runtime.
#[derive(Debug, Default)]
pub struct SharedSortPreference(AtomicU8);

impl SharedSortPreference {
    pub fn new(order: SortOrder) -> Self {
        let pref = Self::default();
        pref.set(order);
        pref
    }

    pub fn set(&self, order: SortOrder) {
        let raw = match order {
            SortOrder::NewestFirst => 0,
            SortOrder::OldestFirst => 1,
        };
        self.0.store(raw, Ordering::Relaxed);
    }
}

impl SortPreference for SharedSortPreference {
    fn sort_order(&self) -> SortOrder {
        match self.0.load(Ordering::Relaxed) {
            1 => SortOrder::OldestFirst,
            _ => SortOrder::NewestFirst,
        }
    }
}

/// Order by capture time; ties break by identifier ascending.
pub fn sort_assets(assets: &mut [Asset], order: SortOrder) {
    assets.sort_by(|a, b| {
        let by_time = match order {
            SortOrder::NewestFirst => b.taken_at.cmp(&a.taken_at),
            SortOrder::OldestFirst => a.taken_at.cmp(&b.taken_at),
        };
        by_time.then_with(|| a.id.cmp(&b.id))
    });
}

/// Up to `limit` distinct elements, in random order.
pub(crate) fn sample<T: Clone>(items: &[T], limit: usize) -> Vec<T> {
    items
        .choose_multiple(&mut rand::rng(), limit)
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    FixedCollection,
    IdentifierFetch,
    ServerFiltered,
}

/// The strategy chosen for one filter context.
#[derive(Debug)]
pub enum RetrievalStrategy {
    FixedCollection(FixedCollectionStrategy),
    IdentifierFetch(IdentifierFetchStrategy),
    ServerFiltered(ServerFilteredStrategy),
}

impl RetrievalStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::FixedCollection(_) => StrategyKind::FixedCollection,
            Self::IdentifierFetch(_) => StrategyKind::IdentifierFetch,
            Self::ServerFiltered(_) => StrategyKind::ServerFiltered,
        }
    }

    pub async fn fetch_page(
        &self,
        request: PageRequest,
    ) -> Result<Page<Asset>> {
        match self {
            Self::FixedCollection(s) => s.fetch_page(request).await,
            Self::IdentifierFetch(s) => s.fetch_page(request).await,
            Self::ServerFiltered(s) => s.fetch_page(request).await,
        }
    }

    pub async fn fetch_random(&self, limit: u32) -> Result<Page<Asset>> {
        match self {
            Self::FixedCollection(s) => s.fetch_random(limit).await,
            Self::IdentifierFetch(s) => s.fetch_random(limit).await,
            Self::ServerFiltered(s) => s.fetch_random(limit).await,
        }
    }
}
