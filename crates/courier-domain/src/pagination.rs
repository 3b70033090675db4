pub const DEFAULT_PER_PAGE: u32 = 25;
pub const MAX_PER_PAGE: u32 = 100;

/// One page of a list endpoint. Always holds in-range values: `per_page` in
/// `1..=MAX_PER_PAGE` and `page` from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    per_page: u32,
    page: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::from_query(None, None)
    }
}

impl PageRequest {
    /// From `per-page` / `page` query values; absent ones take the defaults
    /// and out-of-range ones are clamped.
    pub fn from_query(per_page: Option<u32>, page: Option<u32>) -> Self {
        Self {
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
            page: page.unwrap_or(1).max(1),
        }
    }

    pub fn per_page(self) -> u32 {
        self.per_page
    }

    pub fn page(self) -> u32 {
        self.page
    }

    /// Rows to skip before this page.
    pub fn offset(self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }

    pub fn limit(self) -> u64 {
        u64::from(self.per_page)
    }
}
