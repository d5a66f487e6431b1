//! DataCite harvest configuration

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use doiharvest_core::{HttpSettings, RetryPolicy};

/// Public DataCite DOI search endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.datacite.org/dois";

/// Product token used in the polite-pool user agent
pub const USER_AGENT_PRODUCT: &str = concat!("doiharvest/", env!("CARGO_PKG_VERSION"));

/// JSON:API media type DataCite answers with
pub const ACCEPT_JSON_API: &str = "application/vnd.api+json";

/// Which DOI date the range filter applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateField {
    Created,
    Updated,
    #[default]
    Registered,
}

impl DateField {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "registered" => Some(Self::Registered),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Registered => "registered",
        }
    }

    /// Lower-bound query key, e.g. `from-registered-date`
    pub fn from_key(self) -> String {
        format!("from-{}-date", self.as_str())
    }

    /// Upper-bound query key, e.g. `until-registered-date`
    pub fn until_key(self) -> String {
        format!("until-{}-date", self.as_str())
    }
}

impl fmt::Display for DateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How records of the wanted type are selected upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeMode {
    /// `resource-type-id` filter on the controlled vocabulary
    #[default]
    Canonical,
    /// Free-text query on the `types.resourceType` label
    Label,
    /// Canonical pass, then label pass
    Both,
}

impl TypeMode {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "canonical" => Some(Self::Canonical),
            "label" => Some(Self::Label),
            "both" => Some(Self::Both),
            _ => None,
        }
    }
}

/// One query-selection mode resolved to its filter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// `resource-type-id=<type>`
    Canonical(String),
    /// `query=types.resourceType:"<label>"`
    Label(String),
}

impl Selection {
    pub fn resource_type_id(&self) -> Option<&str> {
        match self {
            Self::Canonical(t) => Some(t),
            Self::Label(_) => None,
        }
    }

    pub fn query(&self) -> Option<String> {
        match self {
            Self::Canonical(_) => None,
            Self::Label(label) => Some(format!("types.resourceType:\"{label}\"")),
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canonical(t) => write!(f, "canonical:{t}"),
            Self::Label(l) => write!(f, "label:{l}"),
        }
    }
}

/// Runtime configuration for a harvest invocation
#[derive(Debug, Clone)]
pub struct Config {
    /// DOI search endpoint
    pub endpoint: String,
    /// Outbound identity and timeouts
    pub http: HttpSettings,
    /// Attempt ceiling and backoff for transient failures
    pub retry: RetryPolicy,
    /// Canonical resource type (e.g. "Preprint")
    pub resource_type: String,
    /// Label for label-mode passes; defaults to `resource_type`
    pub type_label: Option<String>,
    pub type_mode: TypeMode,
    pub date_field: DateField,
    pub date_start: Option<NaiveDate>,
    /// Defaults to today when unset
    pub date_end: Option<NaiveDate>,
    /// Partition keys (DataCite client ids); empty means one unpartitioned pass
    pub client_ids: Vec<String>,
    /// Records per page, 1..=1000
    pub page_size: u32,
    /// Ask DataCite to include creator affiliations
    pub include_affiliation: bool,
    /// Starting cursor when no checkpoint applies
    pub start_cursor: Option<String>,
    /// Honor checkpoints; `false` always starts fresh (checkpoints are still written)
    pub resume: bool,
    pub checkpoint_dir: PathBuf,
    pub shard_dir: PathBuf,
    /// Shard filename prefix: `{prefix}_chunk_{NNNNN}.parquet`
    pub shard_prefix: String,
    /// Rows buffered before a shard is written
    pub flush_every: usize,
    pub zstd_level: i32,
    /// Optional NDJSON mirror of every flushed row (`.gz` → gzip)
    pub ndjson_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            http: HttpSettings {
                accept: ACCEPT_JSON_API.to_string(),
                ..HttpSettings::default()
            },
            retry: RetryPolicy::default(),
            resource_type: "Preprint".to_string(),
            type_label: None,
            type_mode: TypeMode::Canonical,
            date_field: DateField::Registered,
            date_start: None,
            date_end: None,
            client_ids: Vec::new(),
            page_size: 1000,
            include_affiliation: false,
            start_cursor: None,
            resume: true,
            checkpoint_dir: PathBuf::from("checkpoints"),
            shard_dir: PathBuf::from("batches"),
            shard_prefix: "datacite".to_string(),
            flush_every: 10_000,
            zstd_level: 3,
            ndjson_path: None,
        }
    }
}

impl Config {
    /// Selections in execution order for the configured [`TypeMode`].
    pub fn selections(&self) -> Vec<Selection> {
        let label = self
            .type_label
            .clone()
            .unwrap_or_else(|| self.resource_type.clone());
        match self.type_mode {
            TypeMode::Canonical => vec![Selection::Canonical(self.resource_type.clone())],
            TypeMode::Label => vec![Selection::Label(label)],
            TypeMode::Both => vec![
                Selection::Canonical(self.resource_type.clone()),
                Selection::Label(label),
            ],
        }
    }

    /// Partition keys in execution order; `[None]` when unpartitioned.
    pub fn partitions(&self) -> Vec<Option<String>> {
        if self.client_ids.is_empty() {
            vec![None]
        } else {
            self.client_ids.iter().cloned().map(Some).collect()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (1..=1000).contains(&self.page_size),
            "page size must be 1..=1000, got {}",
            self.page_size
        );
        anyhow::ensure!(self.flush_every > 0, "flush threshold must be positive");
        anyhow::ensure!(
            !self.resource_type.is_empty(),
            "resource type must not be empty"
        );
        if let (Some(start), Some(end)) = (self.date_start, self.date_end) {
            anyhow::ensure!(start <= end, "date range is inverted: {start} > {end}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.page_size, 1000);
        assert_eq!(config.flush_every, 10_000);
        assert_eq!(config.date_field, DateField::Registered);
        assert_eq!(config.http.accept, ACCEPT_JSON_API);
        assert!(config.resume);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn date_field_keys() {
        assert_eq!(DateField::Created.from_key(), "from-created-date");
        assert_eq!(DateField::Updated.until_key(), "until-updated-date");
        assert_eq!(DateField::from_name("registered"), Some(DateField::Registered));
        assert_eq!(DateField::from_name("published"), None);
    }

    #[test]
    fn selections_per_mode() {
        let mut config = Config {
            resource_type: "Preprint".into(),
            ..Default::default()
        };
        assert_eq!(
            config.selections(),
            vec![Selection::Canonical("Preprint".into())]
        );

        config.type_mode = TypeMode::Label;
        assert_eq!(config.selections(), vec![Selection::Label("Preprint".into())]);

        config.type_mode = TypeMode::Both;
        config.type_label = Some("preprint".into());
        assert_eq!(
            config.selections(),
            vec![
                Selection::Canonical("Preprint".into()),
                Selection::Label("preprint".into())
            ]
        );
    }

    #[test]
    fn label_query_format() {
        let sel = Selection::Label("Preprint".into());
        assert_eq!(sel.query().as_deref(), Some("types.resourceType:\"Preprint\""));
        assert_eq!(sel.resource_type_id(), None);
    }

    #[test]
    fn partitions_default_to_single_none() {
        let mut config = Config::default();
        assert_eq!(config.partitions(), vec![None]);
        config.client_ids = vec!["arxiv.content".into(), "cern.zenodo".into()];
        assert_eq!(
            config.partitions(),
            vec![Some("arxiv.content".into()), Some("cern.zenodo".into())]
        );
    }

    #[test]
    fn validate_rejects_bad_page_size() {
        let config = Config {
            page_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = Config {
            page_size: 1001,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let config = Config {
            date_start: NaiveDate::from_ymd_opt(2024, 2, 1),
            date_end: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
