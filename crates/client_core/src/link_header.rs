//! Decoding of `Link` pagination headers such as
//! `<http://host/api/items?page=4&size=20>; rel="last",<...>; rel="first"`.

use std::collections::HashMap;

use thiserror::Error;
use url::{ParseError, Url};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkHeaderError {
    #[error("link header must not be empty")]
    Empty,
    #[error("link section could not be split on ';': {0}")]
    MalformedSection(String),
    #[error("link section has no rel name: {0}")]
    MissingRel(String),
    #[error("invalid link url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid page index '{value}' in link {url}")]
    InvalidPage { url: String, value: String },
}

/// Page indices keyed by relation name (`first`, `prev`, `next`, `last`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    relations: HashMap<String, Option<u32>>,
}

impl PageLinks {
    pub fn page(&self, rel: &str) -> Option<u32> {
        self.relations.get(rel).copied().flatten()
    }

    pub fn last(&self) -> Option<u32> {
        self.page("last")
    }

    /// Index of the last page, `0` when the header names none.
    pub fn last_page_index(&self) -> u32 {
        self.last().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkHeaderParser;

impl LinkHeaderParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, header: &str) -> Result<PageLinks, LinkHeaderError> {
        if header.trim().is_empty() {
            return Err(LinkHeaderError::Empty);
        }

        let mut links = PageLinks::default();
        for section in header.split(',') {
            let parts: Vec<&str> = section.split(';').collect();
            let [target, rel] = parts.as_slice() else {
                return Err(LinkHeaderError::MalformedSection(section.trim().to_string()));
            };

            let raw_url = target
                .trim()
                .trim_start_matches('<')
                .trim_end_matches('>')
                .trim();
            let name = rel_name(rel)
                .ok_or_else(|| LinkHeaderError::MissingRel(section.trim().to_string()))?;
            let page = self.page_of(raw_url)?;
            links.relations.insert(name.to_string(), page);
        }

        Ok(links)
    }

    /// Last page index, treating absent or malformed headers as a single page.
    pub fn last_page_index(&self, header: Option<&str>) -> u32 {
        match self.parse(header.unwrap_or_default()) {
            Ok(links) => links.last_page_index(),
            Err(LinkHeaderError::Empty) => 0,
            Err(err) => {
                tracing::debug!(error = %err, "list: ignoring malformed link header");
                0
            }
        }
    }

    fn page_of(&self, raw_url: &str) -> Result<Option<u32>, LinkHeaderError> {
        let url = match Url::parse(raw_url) {
            Err(ParseError::RelativeUrlWithoutBase) => {
                Url::parse("http://localhost/").and_then(|base| base.join(raw_url))
            }
            parsed => parsed,
        }
        .map_err(|err| LinkHeaderError::InvalidUrl {
            url: raw_url.to_string(),
            reason: err.to_string(),
        })?;

        let Some((_, value)) = url.query_pairs().find(|(key, _)| key == "page") else {
            return Ok(None);
        };
        value
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| LinkHeaderError::InvalidPage {
                url: raw_url.to_string(),
                value: value.into_owned(),
            })
    }
}

fn rel_name(section: &str) -> Option<&str> {
    let value = section.trim().strip_prefix("rel=")?;
    let value = value.trim_matches('"').trim();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
#[path = "tests/link_header_tests.rs"]
mod tests;
