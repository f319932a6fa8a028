//! Page arithmetic shared by timelines and search.

use crate::error::{BlogError, Result};
use serde::Serialize;

/// A validated page request (1-based page number).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: u32,
    per_page: u32,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32) -> Result<Self> {
        if page < 1 {
            return Err(BlogError::validation("page", "must be at least 1"));
        }
        if per_page == 0 {
            return Err(BlogError::validation("per_page", "must be positive"));
        }
        Ok(Self { page, per_page })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.per_page as usize
    }

    pub fn limit(&self) -> usize {
        self.per_page as usize
    }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: usize, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page(),
            per_page: pagination.per_page(),
        }
    }

    pub fn empty(pagination: Pagination) -> Self {
        Self::new(Vec::new(), 0, pagination)
    }

    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.per_page as usize)
    }

    pub fn has_next(&self) -> bool {
        (self.page as usize) < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_positive_input() {
        assert!(Pagination::new(0, 10).unwrap_err().is_validation());
        assert!(Pagination::new(1, 0).unwrap_err().is_validation());
    }

    #[test]
    fn test_offset() {
        let p = Pagination::new(2, 10).unwrap();
        assert_eq!(p.offset(), 10);
        assert_eq!(p.limit(), 10);
        assert_eq!(Pagination::new(1, 25).unwrap().offset(), 0);
    }

    #[test]
    fn test_page_navigation() {
        let p = Pagination::new(2, 10).unwrap();
        let page: Page<i64> = Page::new(vec![1, 2, 3, 4, 5], 15, p);
        assert_eq!(page.total_pages(), 2);
        assert!(!page.has_next());
        assert!(page.has_prev());

        let empty: Page<i64> = Page::empty(Pagination::new(1, 10).unwrap());
        assert_eq!(empty.total_pages(), 0);
        assert!(!empty.has_next());
        assert!(!empty.has_prev());
    }
}
