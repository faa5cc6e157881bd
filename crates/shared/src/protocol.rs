use serde::{Deserialize, Serialize};

/// Page size used by every list screen unless configured otherwise.
pub const ITEMS_PER_PAGE: u32 = 20;
/// Identity field every collection can be sorted by.
pub const IDENTITY_FIELD: &str = "id";
/// Pseudo sort field ranking search hits by match quality.
pub const RELEVANCE_FIELD: &str = "_score";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
    #[serde(default)]
    pub sort: Vec<String>,
}

impl PageRequest {
    /// Query string pairs, with `sort` repeated once per sort key.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("page", self.page.to_string()), ("size", self.size.to_string())];
        pairs.extend(self.sort.iter().map(|key| ("sort", key.clone())));
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub page: u32,
    pub size: u32,
    #[serde(default)]
    pub sort: Vec<String>,
}

impl SearchRequest {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("query", self.query.clone())];
        pairs.extend(
            PageRequest {
                page: self.page,
                size: self.size,
                sort: self.sort.clone(),
            }
            .query_pairs(),
        );
        pairs
    }
}
