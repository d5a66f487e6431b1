use std::path::PathBuf;

use arrow::datatypes::DataType;

/// Default merged file basename
pub const DEFAULT_BASENAME: &str = "doiharvest_merged";

/// Columns that drive deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupKeys {
    /// Record identifier; the first row per value survives
    pub id: String,
    /// Optional fields whose presence makes a row "richer"
    pub signals: Vec<String>,
    /// Tie-break dates, ascending, missing values last
    pub dates: Vec<String>,
}

impl Default for DedupKeys {
    fn default() -> Self {
        Self {
            id: "doi".to_string(),
            signals: vec!["provider_id".to_string(), "alternate_ids_json".to_string()],
            dates: vec![
                "registered".to_string(),
                "updated".to_string(),
                "created".to_string(),
            ],
        }
    }
}

/// Columns coerced to a fixed type whatever the shards say.
pub fn default_canonical_types() -> Vec<(String, DataType)> {
    vec![
        ("score".to_string(), DataType::Float64),
        ("published_year".to_string(), DataType::Int64),
    ]
}

/// Configuration for a merge run.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Root directories searched for shards
    pub inputs: Vec<PathBuf>,
    /// Also search each immediate child of every root
    pub one_level_deep: bool,
    /// Keep only files whose name contains this substring
    pub name_contains: Option<String>,
    pub output_dir: PathBuf,
    /// Output is `{basename}_{YYYYmmdd_HHMMSS}.parquet`
    pub basename: String,
    pub zstd_level: i32,
    /// `None` writes every aligned row
    pub dedup: Option<DedupKeys>,
    pub canonical_types: Vec<(String, DataType)>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            one_level_deep: true,
            name_contains: None,
            output_dir: PathBuf::from("merged"),
            basename: DEFAULT_BASENAME.to_string(),
            zstd_level: 3,
            dedup: Some(DedupKeys::default()),
            canonical_types: default_canonical_types(),
        }
    }
}
