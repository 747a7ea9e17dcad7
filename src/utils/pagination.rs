use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: u64 = 20;
pub const MAX_LIMIT: u64 = 100;

/// Query de paginação (?page=1&limit=20)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl PaginationQuery {
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn skip(&self) -> u64 {
        (self.page() - 1) * self.limit()
    }

    pub fn meta(&self, total: u64) -> PageMeta {
        PageMeta::new(self.page(), self.limit(), total)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageMeta {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

impl PageMeta {
    pub fn new(page: u64, limit: u64, total: u64) -> Self {
        let pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self { page, limit, total, pages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_bounds() {
        let query = PaginationQuery::default();
        assert_eq!(query.page(), 1);
        assert_eq!(query.limit(), DEFAULT_LIMIT);
        assert_eq!(query.skip(), 0);

        let query = PaginationQuery { page: Some(0), limit: Some(5000) };
        assert_eq!(query.page(), 1);
        assert_eq!(query.limit(), MAX_LIMIT);
    }

    #[test]
    fn skip_moves_by_whole_pages() {
        let query = PaginationQuery { page: Some(3), limit: Some(10) };
        assert_eq!(query.skip(), 20);
    }

    #[test]
    fn pages_round_up() {
        assert_eq!(PageMeta::new(1, 10, 0).pages, 0);
        assert_eq!(PageMeta::new(1, 10, 10).pages, 1);
        assert_eq!(PageMeta::new(1, 10, 11).pages, 2);
    }
}
