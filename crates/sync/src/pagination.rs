//! Offset pagination over remote list endpoints.

use thiserror::Error;

/// Errors while accumulating pages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaginationError {
    /// The remote kept returning full pages past the configured limit.
    #[error("Pagination exceeded {max_pages} pages")]
    TooManyPages { max_pages: usize },

    /// The accumulator was finished before the last page arrived.
    #[error("Pagination stopped after {pages} pages without a final page")]
    Incomplete { pages: usize },
}

/// Accumulates the pages of one offset-paginated listing.
///
/// Pages are requested at offsets `0, page_size, 2 * page_size, ...` until a
/// page shorter than `page_size` arrives. Nothing is exposed until the
/// listing is complete, so a failed fetch never yields a partial list.
///
/// ```ignore
/// let mut pages = PageAccumulator::new(config.page_size, config.max_pages);
/// while let Some(offset) = pages.next_offset() {
///     pages.push_page(remote.fetch_alerts(&group_id, offset).await?)?;
/// }
/// let alerts = pages.finish()?;
/// ```
#[derive(Debug)]
pub struct PageAccumulator<E> {
    page_size: usize,
    max_pages: usize,
    items: Vec<E>,
    pages: usize,
    complete: bool,
}

impl<E> PageAccumulator<E> {
    /// Create an empty accumulator.
    ///
    /// A zero page size is treated as one.
    pub fn new(page_size: usize, max_pages: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            max_pages,
            items: Vec::new(),
            pages: 0,
            complete: false,
        }
    }

    /// Offset of the next page to fetch, or `None` once complete.
    pub fn next_offset(&self) -> Option<usize> {
        (!self.complete).then_some(self.pages * self.page_size)
    }

    /// Number of pages accepted so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Whether the final page has arrived.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Add the page fetched at [`next_offset`](Self::next_offset).
    ///
    /// Returns `true` when this was the final page.
    pub fn push_page(&mut self, page: Vec<E>) -> Result<bool, PaginationError> {
        if self.complete {
            return Ok(true);
        }
        if self.pages >= self.max_pages {
            return Err(PaginationError::TooManyPages {
                max_pages: self.max_pages,
            });
        }
        self.pages += 1;
        self.complete = page.len() < self.page_size;
        self.items.extend(page);
        Ok(self.complete)
    }

    /// Take the full listing.
    pub fn finish(self) -> Result<Vec<E>, PaginationError> {
        if !self.complete {
            return Err(PaginationError::Incomplete { pages: self.pages });
        }
        Ok(self.items)
    }
}
