//! Arrow schema for harvested DOI rows
//!
//! One flat row per DataCite item. Scalar attributes are kept as strings,
//! nested attributes as JSON text (`*_json`) so shards stay schema-stable no
//! matter how irregular the upstream metadata is.

use std::sync::{Arc, LazyLock};

use arrow::datatypes::{DataType, Field, Schema};

/// The only non-string column
pub const PUBLISHED_YEAR: &str = "published_year";

/// Column names in shard order.
pub const COLUMNS: &[&str] = &[
    // Identity
    "doi",
    "url",
    "publisher",
    "language",
    "version",
    "schema_version",
    "state",
    "prefix",
    // Ownership
    "client_id",
    "provider_id",
    // Type
    "resource_type",
    "resource_type_general",
    "types_json",
    // Title
    "title",
    "titles_json",
    // Dates, normalised to YYYY-MM-DD
    "created",
    "registered",
    "updated",
    "published",
    PUBLISHED_YEAR,
    // Nested metadata as JSON text
    "creators_json",
    "contributors_json",
    "subjects_json",
    "descriptions_json",
    "identifiers_json",
    "alternate_ids_json",
    "related_ids_json",
    "container_json",
    "funding_refs_json",
    "rights_list_json",
    "sizes_json",
    "formats_json",
    "geo_locations_json",
    "references_json",
    "citations_json",
    "url_alternate_json",
    // Full payload for anything not flattened above
    "raw_attributes_json",
    "raw_relationships_json",
];

/// Number of Utf8 columns
pub const TEXT_COLUMN_COUNT: usize = 37;

/// Harvest shard schema. Every column is nullable.
pub fn doi_rows() -> &'static Arc<Schema> {
    static SCHEMA: LazyLock<Arc<Schema>> = LazyLock::new(|| {
        Arc::new(Schema::new(
            COLUMNS
                .iter()
                .map(|name| {
                    let data_type = if *name == PUBLISHED_YEAR {
                        DataType::Int64
                    } else {
                        DataType::Utf8
                    };
                    Field::new(*name, data_type, true)
                })
                .collect::<Vec<_>>(),
        ))
    });
    &SCHEMA
}
