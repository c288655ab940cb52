//! Page-number pagination with clamped bounds.

use serde::Serialize;

/// Allowed page sizes for listing endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
    pub min_page_size: u32,
    pub max_page_size: u32,
}

impl PageBounds {
    pub fn new(min_page_size: u32, max_page_size: u32) -> Self {
        let min_page_size = min_page_size.max(1);
        Self {
            min_page_size,
            max_page_size: max_page_size.max(min_page_size),
        }
    }

    /// Clamps `page_size` into the bounds and `page` into `[1, total_pages]`.
    /// An empty listing still has one (empty) page.
    pub fn window(&self, page: i64, page_size: i64, total: u64) -> PageWindow {
        let page_size = page_size.clamp(
            i64::from(self.min_page_size),
            i64::from(self.max_page_size),
        ) as u32;
        let total_pages = total.div_ceil(u64::from(page_size)).max(1);
        let page = page.clamp(1, i64::try_from(total_pages).unwrap_or(i64::MAX)) as u64;
        PageWindow {
            page,
            page_size,
            total_pages,
        }
    }
}

impl Default for PageBounds {
    fn default() -> Self {
        Self::new(1, 50)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u64,
    pub page_size: u32,
    pub total_pages: u64,
}

impl PageWindow {
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(u64::from(self.page_size))
    }
}

/// One page of liked object ids, most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LikedPage {
    pub ids: Vec<i64>,
    pub total: u64,
    pub page: u64,
    pub page_size: u32,
}
