//! Request parameters for the DataCite `/dois` endpoint

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::config::{DateField, Selection};

pub const PAGE_SIZE: &str = "page[size]";
pub const PAGE_CURSOR: &str = "page[cursor]";
pub const RESOURCE_TYPE_ID: &str = "resource-type-id";
pub const QUERY: &str = "query";
pub const CLIENT_ID: &str = "client-id";

/// Cursor sentinel that starts cursor pagination from the first page
pub const INITIAL_CURSOR: &str = "1";

/// Query parameters of one harvest pass.
///
/// Kept in a `BTreeMap` so iteration order (and thus the request URL) is
/// independent of insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryParams(BTreeMap<String, String>);

/// Everything that determines the filter of one pass.
#[derive(Debug, Clone)]
pub struct PassFilter<'a> {
    pub selection: &'a Selection,
    pub date_field: DateField,
    pub date_start: Option<NaiveDate>,
    pub date_end: NaiveDate,
    pub partition: Option<&'a str>,
    pub page_size: u32,
    pub include_affiliation: bool,
}

impl QueryParams {
    /// Build the full parameter set for a pass, starting at `cursor`.
    pub fn build(filter: &PassFilter<'_>, cursor: Option<&str>) -> Self {
        let mut params = Self::default();
        params.set(PAGE_SIZE, filter.page_size.to_string());
        params.set(PAGE_CURSOR, cursor.unwrap_or(INITIAL_CURSOR));
        if let Some(rtid) = filter.selection.resource_type_id() {
            params.set(RESOURCE_TYPE_ID, rtid);
        }
        if let Some(start) = filter.date_start {
            params.set(filter.date_field.from_key(), start.to_string());
        }
        params.set(filter.date_field.until_key(), filter.date_end.to_string());
        if let Some(client) = filter.partition {
            params.set(CLIENT_ID, client);
        }
        if filter.include_affiliation {
            params.set("affiliation", "true");
        }
        params.set("disable-facets", "true");
        if let Some(query) = filter.selection.query() {
            params.set(QUERY, query);
        }
        params
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn cursor(&self) -> Option<&str> {
        self.get(PAGE_CURSOR)
    }

    pub fn set_cursor(&mut self, cursor: &str) {
        self.set(PAGE_CURSOR, cursor);
    }

    /// Zero-size variant that only asks for `meta.total`.
    pub fn probe(&self) -> Self {
        let mut probe = self.clone();
        probe.set(PAGE_SIZE, "0");
        probe
    }

    /// Pairs for the HTTP query string.
    pub fn to_query(&self) -> Vec<(String, String)> {
        self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
