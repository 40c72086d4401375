use std::ops::Range;

use crate::{
    asset::Asset,
    error::{ModelError, Result},
};

/// A validated 1-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Result<Self> {
        if page == 0 || page_size == 0 {
            return Err(ModelError::InvalidPage { page, page_size });
        }
        Ok(Self { page, page_size })
    }

    pub const fn page(&self) -> u32 {
        self.page
    }

    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1).saturating_mul(self.page_size as usize)
    }

    /// Index range covered by this page inside a collection of `total`
    /// items, or `None` when the page starts past the end.
    pub fn bounds(&self, total: usize) -> Option<Range<usize>> {
        let start = self.offset();
        if start >= total {
            return None;
        }
        let end = start.saturating_add(self.page_size as usize).min(total);
        Some(start..end)
    }

    /// Token for the following page, present iff items remain after this one.
    pub fn next_page(&self, total: usize) -> Option<u32> {
        let end = self.offset().saturating_add(self.page_size as usize);
        (end < total).then(|| self.page.saturating_add(1))
    }
}

/// One page of results.
///
/// `items.len() <= page_size` of the originating request, and `next_page`
/// is present iff more items remain.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub next_page: Option<u32>,
}

impl<T> Page<T> {
    pub fn empty(total: usize) -> Self {
        Self {
            items: Vec::new(),
            total,
            next_page: None,
        }
    }

    /// A page with no continuation, e.g. a random sample.
    pub fn complete(items: Vec<T>) -> Self {
        let total = items.len();
        Self {
            items,
            total,
            next_page: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            next_page: self.next_page,
        }
    }
}

impl<T: Clone> Page<T> {
    /// Slice a fully materialized, already ordered collection.
    pub fn from_slice(all: &[T], request: PageRequest) -> Self {
        let total = all.len();
        match request.bounds(total) {
            Some(range) => Self {
                items: all[range].to_vec(),
                total,
                next_page: request.next_page(total),
            },
            None => Self::empty(total),
        }
    }
}

/// Page shape returned by the remote metadata query.
pub type MetadataPage = Page<Asset>;
