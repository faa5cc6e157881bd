//! Pagination, sort and search state of a list screen, independent of any I/O.

use shared::protocol::{PageRequest, SearchRequest, IDENTITY_FIELD, RELEVANCE_FIELD};

use crate::error::ControllerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    Browse,
    Search,
}

/// The request a list screen issues for its current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListRequest {
    Browse(PageRequest),
    Search(SearchRequest),
}

impl ListRequest {
    pub fn mode(&self) -> ListMode {
        match self {
            ListRequest::Browse(_) => ListMode::Browse,
            ListRequest::Search(_) => ListMode::Search,
        }
    }

    pub fn page(&self) -> u32 {
        match self {
            ListRequest::Browse(request) => request.page,
            ListRequest::Search(request) => request.page,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQueryState {
    page: u32,
    page_size: u32,
    sort_field: String,
    ascending: bool,
    search: Option<String>,
}

impl ListQueryState {
    pub fn new(page_size: u32, initial_search: Option<&str>) -> Result<Self, ControllerError> {
        if page_size == 0 {
            return Err(ControllerError::ZeroPageSize);
        }
        // Navigation only supplies the term; the sort stays on the identity field.
        Ok(Self {
            page: 0,
            page_size,
            sort_field: IDENTITY_FIELD.to_string(),
            ascending: true,
            search: initial_search
                .filter(|term| !term.is_empty())
                .map(str::to_string),
        })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn sort_field(&self) -> &str {
        &self.sort_field
    }

    pub fn ascending(&self) -> bool {
        self.ascending
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn mode(&self) -> ListMode {
        if self.search.is_some() {
            ListMode::Search
        } else {
            ListMode::Browse
        }
    }

    pub fn reset_page(&mut self) {
        self.page = 0;
    }

    pub fn select_page(&mut self, page: u32) {
        self.page = page;
    }

    /// Switches between browse and search mode. An empty term means browse.
    pub fn apply_search(&mut self, term: &str) {
        self.page = 0;
        if term.is_empty() {
            self.search = None;
            self.sort_field = IDENTITY_FIELD.to_string();
            self.ascending = true;
        } else {
            self.search = Some(term.to_string());
            self.sort_field = RELEVANCE_FIELD.to_string();
            self.ascending = false;
        }
    }

    pub fn sort_by(&mut self, field: impl Into<String>, ascending: bool) {
        self.sort_field = field.into();
        self.ascending = ascending;
    }

    /// Sort keys for the request, with the identity field as tie-breaker.
    pub fn build_sort_spec(&self) -> Vec<String> {
        let direction = if self.ascending { "asc" } else { "desc" };
        let mut spec = vec![format!("{},{direction}", self.sort_field)];
        if self.sort_field != IDENTITY_FIELD {
            spec.push(IDENTITY_FIELD.to_string());
        }
        spec
    }

    pub fn request(&self) -> ListRequest {
        let sort = self.build_sort_spec();
        match &self.search {
            Some(query) => ListRequest::Search(SearchRequest {
                query: query.clone(),
                page: self.page,
                size: self.page_size,
                sort,
            }),
            None => ListRequest::Browse(PageRequest {
                page: self.page,
                size: self.page_size,
                sort,
            }),
        }
    }
}

/// Items accumulated by a list screen plus the last page index the server reported.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    items: Vec<T>,
    last_page_index: u32,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            last_page_index: 0,
        }
    }
}

impl<T> Page<T> {
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn last_page_index(&self) -> u32 {
        self.last_page_index
    }

    pub fn clear_items(&mut self) {
        self.items.clear();
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.last_page_index = 0;
    }

    pub fn append(&mut self, items: impl IntoIterator<Item = T>, last_page_index: u32) {
        self.items.extend(items);
        self.last_page_index = last_page_index;
    }
}

#[cfg(test)]
#[path = "tests/list_state_tests.rs"]
mod tests;
