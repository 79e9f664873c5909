// ── List query filters ──

use std::collections::BTreeMap;

/// Query for `fetch_all`. An empty filter set means "the whole collection"
/// and lets the store replace its cache; anything else is a partial view
/// that is merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilters {
    pub search: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl ListFilters {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn search(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        self.search = (!term.trim().is_empty()).then_some(term);
        self
    }

    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.search.is_none() && self.fields.is_empty()
    }

    /// Query-string pairs, in deterministic order.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query: Vec<(String, String)> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(search) = &self.search {
            query.push(("search".into(), search.clone()));
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_search_is_ignored() {
        assert!(ListFilters::new().search("   ").is_empty());
    }

    #[test]
    fn query_pairs_are_sorted_by_field() {
        let filters = ListFilters::new()
            .field("status", "draft")
            .field("brandId", "b1")
            .search("wid");
        assert_eq!(
            filters.to_query(),
            vec![
                ("brandId".to_owned(), "b1".to_owned()),
                ("status".to_owned(), "draft".to_owned()),
                ("search".to_owned(), "wid".to_owned()),
            ]
        );
    }
}
