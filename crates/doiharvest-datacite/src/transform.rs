//! DataCite JSON:API item → flat row → Arrow RecordBatch

use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, RecordBatch, StringArray};
use arrow::error::ArrowError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use doiharvest_core::Accumulator;
use serde_json::Value;

use crate::schema::{self, PUBLISHED_YEAR, TEXT_COLUMN_COUNT};

/// One flattened DOI record. Field order matches [`schema::COLUMNS`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DoiRow {
    pub doi: Option<String>,
    pub url: Option<String>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    pub version: Option<String>,
    pub schema_version: Option<String>,
    pub state: Option<String>,
    pub prefix: Option<String>,
    pub client_id: Option<String>,
    pub provider_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_type_general: Option<String>,
    pub types_json: Option<String>,
    pub title: Option<String>,
    pub titles_json: Option<String>,
    pub created: Option<String>,
    pub registered: Option<String>,
    pub updated: Option<String>,
    pub published: Option<String>,
    pub published_year: Option<i64>,
    pub creators_json: Option<String>,
    pub contributors_json: Option<String>,
    pub subjects_json: Option<String>,
    pub descriptions_json: Option<String>,
    pub identifiers_json: Option<String>,
    pub alternate_ids_json: Option<String>,
    pub related_ids_json: Option<String>,
    pub container_json: Option<String>,
    pub funding_refs_json: Option<String>,
    pub rights_list_json: Option<String>,
    pub sizes_json: Option<String>,
    pub formats_json: Option<String>,
    pub geo_locations_json: Option<String>,
    pub references_json: Option<String>,
    pub citations_json: Option<String>,
    pub url_alternate_json: Option<String>,
    pub raw_attributes_json: Option<String>,
    pub raw_relationships_json: Option<String>,
}

impl DoiRow {
    /// Split into the Utf8 columns (schema order) and `published_year`.
    fn into_columns(self) -> ([Option<String>; TEXT_COLUMN_COUNT], Option<i64>) {
        (
            [
                self.doi,
                self.url,
                self.publisher,
                self.language,
                self.version,
                self.schema_version,
                self.state,
                self.prefix,
                self.client_id,
                self.provider_id,
                self.resource_type,
                self.resource_type_general,
                self.types_json,
                self.title,
                self.titles_json,
                self.created,
                self.registered,
                self.updated,
                self.published,
                self.creators_json,
                self.contributors_json,
                self.subjects_json,
                self.descriptions_json,
                self.identifiers_json,
                self.alternate_ids_json,
                self.related_ids_json,
                self.container_json,
                self.funding_refs_json,
                self.rights_list_json,
                self.sizes_json,
                self.formats_json,
                self.geo_locations_json,
                self.references_json,
                self.citations_json,
                self.url_alternate_json,
                self.raw_attributes_json,
                self.raw_relationships_json,
            ],
            self.published_year,
        )
    }
}

// === Field helpers ===

/// Scalar as text; strings verbatim, numbers and bools via their JSON form.
fn text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Nested value as JSON text. Maps serialize with sorted keys.
fn json_text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn non_empty_str(v: Option<&Value>) -> Option<&str> {
    v.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// `relationships.<name>.data.id`
fn relationship_id<'a>(rel: Option<&'a Value>, name: &str) -> Option<&'a str> {
    non_empty_str(rel?.get(name)?.get("data")?.get("id"))
}

/// ISO timestamp → `YYYY-MM-DD` in its own offset; unparseable input keeps
/// its first ten characters.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive().to_string());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date().to_string());
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d.to_string());
    }
    Some(raw.chars().take(10).collect())
}

fn date(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str).and_then(normalize_date)
}

fn year(v: Option<&Value>) -> Option<i64> {
    match v? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Decode the HTML entities DataCite titles carry (`&amp;`, `&eacute;`, `&#x2014;` ...).
///
/// Unknown entities and bare ampersands are left as they are.
pub fn unescape_html(s: &str) -> String {
    html_escape::decode_html_entities(s).into_owned()
}

/// Map one API item to a row. `None` when the item carries no `attributes`.
pub fn map_record(item: &Value) -> Option<DoiRow> {
    let a = item.get("attributes").filter(|a| a.is_object())?;
    let rel = item.get("relationships").filter(|r| !r.is_null());

    let doi = text(a.get("doi"));
    let prefix = non_empty_str(a.get("prefix"))
        .map(str::to_owned)
        .or_else(|| {
            doi.as_deref()
                .and_then(|d| d.split_once('/'))
                .map(|(p, _)| p.to_owned())
        });

    let client_id = relationship_id(rel, "client")
        .or_else(|| non_empty_str(a.get("clientId")))
        .map(str::to_owned);
    let provider_id = relationship_id(rel, "provider")
        .or_else(|| non_empty_str(a.get("providerId")))
        .map(str::to_owned)
        .or_else(|| {
            client_id
                .as_deref()
                .and_then(|c| c.split_once('.'))
                .map(|(p, _)| p.to_owned())
        });

    let types = a.get("types");
    let titles = a.get("titles");
    let title = titles
        .and_then(|t| t.get(0))
        .and_then(|t| t.get("title"))
        .and_then(|t| match t {
            Value::String(s) => Some(unescape_html(s)),
            other => text(Some(other)),
        });

    Some(DoiRow {
        doi,
        url: text(a.get("url")),
        publisher: text(a.get("publisher")),
        language: text(a.get("language")),
        version: text(a.get("version")),
        schema_version: text(a.get("schemaVersion")),
        state: text(a.get("state")),
        prefix,
        client_id,
        provider_id,
        resource_type: text(types.and_then(|t| t.get("resourceType"))),
        resource_type_general: text(types.and_then(|t| t.get("resourceTypeGeneral"))),
        types_json: json_text(types),
        title,
        titles_json: json_text(titles),
        created: date(a.get("created")),
        registered: date(a.get("registered")),
        updated: date(a.get("updated")),
        published: text(a.get("published")),
        published_year: year(a.get("publicationYear")),
        creators_json: json_text(a.get("creators")),
        contributors_json: json_text(a.get("contributors")),
        subjects_json: json_text(a.get("subjects")),
        descriptions_json: json_text(a.get("descriptions")),
        identifiers_json: json_text(a.get("identifiers")),
        alternate_ids_json: json_text(a.get("alternateIdentifiers")),
        related_ids_json: json_text(a.get("relatedIdentifiers")),
        container_json: json_text(a.get("container")),
        funding_refs_json: json_text(a.get("fundingReferences")),
        rights_list_json: json_text(a.get("rightsList")),
        sizes_json: json_text(a.get("sizes")),
        formats_json: json_text(a.get("formats")),
        geo_locations_json: json_text(a.get("geoLocations")),
        references_json: json_text(a.get("references")),
        citations_json: json_text(a.get("citations")),
        url_alternate_json: json_text(a.get("urlAlternate")),
        raw_attributes_json: json_text(Some(a)),
        raw_relationships_json: json_text(rel),
    })
}

// === Accumulator ===

/// Column-wise buffer of [`DoiRow`]s.
pub struct DoiAccumulator {
    text: [Vec<Option<String>>; TEXT_COLUMN_COUNT],
    published_year: Vec<Option<i64>>,
}

impl DoiAccumulator {
    pub fn new() -> Self {
        Self {
            text: std::array::from_fn(|_| Vec::new()),
            published_year: Vec::new(),
        }
    }
}

impl Default for DoiAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Accumulator for DoiAccumulator {
    type Row = DoiRow;

    fn push(&mut self, row: DoiRow) {
        let (text, year) = row.into_columns();
        for (column, value) in self.text.iter_mut().zip(text) {
            column.push(value);
        }
        self.published_year.push(year);
    }

    fn len(&self) -> usize {
        self.published_year.len()
    }

    fn take_batch(&mut self) -> Result<RecordBatch, ArrowError> {
        let schema = schema::doi_rows();
        let text = std::mem::replace(&mut self.text, std::array::from_fn(|_| Vec::new()));
        let mut text = text.into_iter();
        let mut year = Some(std::mem::take(&mut self.published_year));

        let columns: Vec<ArrayRef> = schema
            .fields()
            .iter()
            .map(|field| -> ArrayRef {
                if field.name() == PUBLISHED_YEAR {
                    Arc::new(Int64Array::from(year.take().unwrap_or_default()))
                } else {
                    Arc::new(StringArray::from(text.next().unwrap_or_default()))
                }
            })
            .collect();

        RecordBatch::try_new(schema.clone(), columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use serde_json::json;

    fn sample_item() -> Value {
        json!({
            "id": "10.48550/arxiv.2401.00001",
            "type": "dois",
            "attributes": {
                "doi": "10.48550/arxiv.2401.00001",
                "prefix": "10.48550",
                "url": "https://arxiv.org/abs/2401.00001",
                "publisher": "arXiv",
                "state": "findable",
                "titles": [{"title": "Graphs &amp; Groups: a &#39;note&#39;"}],
                "types": {"resourceTypeGeneral": "Preprint", "resourceType": "Article"},
                "created": "2024-01-02T10:20:30Z",
                "registered": "2024-01-03T23:59:59+02:00",
                "updated": "2024-02-01T00:00:00.000Z",
                "publicationYear": 2024,
                "alternateIdentifiers": [{"alternateIdentifier": "2401.00001", "alternateIdentifierType": "arXiv"}],
                "subjects": []
            },
            "relationships": {
                "client": {"data": {"id": "arxiv.content", "type": "clients"}}
            }
        })
    }

    #[test]
    fn maps_core_fields() {
        let row = map_record(&sample_item()).unwrap();
        assert_eq!(row.doi.as_deref(), Some("10.48550/arxiv.2401.00001"));
        assert_eq!(row.prefix.as_deref(), Some("10.48550"));
        assert_eq!(row.client_id.as_deref(), Some("arxiv.content"));
        assert_eq!(row.provider_id.as_deref(), Some("arxiv"));
        assert_eq!(row.resource_type.as_deref(), Some("Article"));
        assert_eq!(row.resource_type_general.as_deref(), Some("Preprint"));
        assert_eq!(row.title.as_deref(), Some("Graphs & Groups: a 'note'"));
        assert_eq!(row.created.as_deref(), Some("2024-01-02"));
        assert_eq!(row.registered.as_deref(), Some("2024-01-03"));
        assert_eq!(row.updated.as_deref(), Some("2024-02-01"));
        assert_eq!(row.published_year, Some(2024));
        assert_eq!(row.subjects_json.as_deref(), Some("[]"));
        assert_eq!(row.contributors_json, None);
    }

    #[test]
    fn json_columns_have_sorted_keys() {
        let row = map_record(&sample_item()).unwrap();
        assert_eq!(
            row.types_json.as_deref(),
            Some(r#"{"resourceType":"Article","resourceTypeGeneral":"Preprint"}"#)
        );
        let raw = row.raw_attributes_json.unwrap();
        assert!(raw.find("\"alternateIdentifiers\"").unwrap() < raw.find("\"doi\"").unwrap());
    }

    #[test]
    fn missing_attributes_dropped() {
        assert!(map_record(&json!({"id": "x", "type": "dois"})).is_none());
        assert!(map_record(&json!({"attributes": null})).is_none());
        assert!(map_record(&json!(null)).is_none());
    }

    #[test]
    fn prefix_and_provider_fallbacks() {
        let item = json!({
            "attributes": {"doi": "10.5281/zenodo.123", "clientId": "cern.zenodo"}
        });
        let row = map_record(&item).unwrap();
        assert_eq!(row.prefix.as_deref(), Some("10.5281"));
        assert_eq!(row.client_id.as_deref(), Some("cern.zenodo"));
        assert_eq!(row.provider_id.as_deref(), Some("cern"));
        assert_eq!(row.raw_relationships_json, None);
    }

    #[test]
    fn provider_from_relationships_wins() {
        let item = json!({
            "attributes": {"doi": "10.1/x", "providerId": "attr"},
            "relationships": {"provider": {"data": {"id": "rel"}}}
        });
        assert_eq!(map_record(&item).unwrap().provider_id.as_deref(), Some("rel"));
    }

    #[test]
    fn date_normalization() {
        assert_eq!(normalize_date("2020-05-06T01:02:03Z").as_deref(), Some("2020-05-06"));
        assert_eq!(normalize_date("2020-05-06T01:02:03.123").as_deref(), Some("2020-05-06"));
        assert_eq!(normalize_date("2020-05-06").as_deref(), Some("2020-05-06"));
        assert_eq!(normalize_date("2020-05-06 garbage").as_deref(), Some("2020-05-06"));
        assert_eq!(normalize_date("   "), None);
    }

    #[test]
    fn year_from_string() {
        let item = json!({"attributes": {"publicationYear": "2019"}});
        assert_eq!(map_record(&item).unwrap().published_year, Some(2019));
        let item = json!({"attributes": {"publicationYear": "n.d."}});
        assert_eq!(map_record(&item).unwrap().published_year, None);
    }

    #[test]
    fn html_unescape() {
        assert_eq!(unescape_html("a &lt;b&gt; &quot;c&quot;"), "a <b> \"c\"");
        assert_eq!(unescape_html("em&#x2014;dash"), "em\u{2014}dash");
        assert_eq!(unescape_html("AT&T rocks"), "AT&T rocks");
        assert_eq!(unescape_html("&bogus; &"), "&bogus; &");
        assert_eq!(
            unescape_html("Schr&ouml;dinger &eacute;quations &copy; &rsquo;"),
            "Schrödinger équations © \u{2019}"
        );
        assert_eq!(
            unescape_html("&ldquo;Na&iuml;ve&rdquo; &ndash; &hellip;"),
            "\u{201c}Naïve\u{201d} \u{2013} \u{2026}"
        );
    }

    #[test]
    fn accumulator_roundtrip() {
        let mut acc = DoiAccumulator::new();
        acc.push(map_record(&sample_item()).unwrap());
        acc.push(DoiRow {
            doi: Some("10.1/other".into()),
            ..Default::default()
        });
        assert_eq!(acc.len(), 2);

        let batch = acc.take_batch().unwrap();
        assert!(acc.is_empty());
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema(), *schema::doi_rows());

        let doi = batch
            .column_by_name("doi")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(doi.value(1), "10.1/other");

        let provider = batch
            .column_by_name("provider_id")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(provider.value(0), "arxiv");
        assert!(provider.is_null(1));

        let years = batch
            .column_by_name(PUBLISHED_YEAR)
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(years.value(0), 2024);
        assert!(years.is_null(1));

        let raw_rel = batch
            .column_by_name("raw_relationships_json")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert!(raw_rel.value(0).contains("arxiv.content"));
    }

    #[test]
    fn empty_batch_has_schema() {
        let mut acc = DoiAccumulator::new();
        let batch = acc.take_batch().unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), schema::COLUMNS.len());
    }
}
