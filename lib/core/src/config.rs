//! Model configuration
//!
//! Declares the application fields, how they are grouped and encoded, the
//! embedding width and the decision thresholds. A configuration is loaded
//! once at startup, validated eagerly and then passed by reference to every
//! component that needs it.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Environment variable holding an explicit configuration path
pub const CONFIG_ENV: &str = "FRAUDX_CONFIG";

/// Environment variable selecting `config/model_config.{env}.json`
pub const ENV_NAME_ENV: &str = "FRAUDX_ENV";

/// Full model configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Declared application fields, in order
    pub fields: Vec<FieldSpec>,

    /// Feature groups, concatenated in this order
    pub feature_groups: Vec<FeatureGroup>,

    /// Width of every produced embedding
    pub embedding_dim: usize,

    #[serde(default, alias = "thresholds")]
    pub similarity_thresholds: Thresholds,

    /// Optional offline-fitted projection; absent means pad/truncate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reducer: Option<ReducerConfig>,

    #[serde(default)]
    pub search: SearchConfig,
}

/// Declared scalar type of a field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Datetime,
}

impl FieldType {
    /// Whether values of this type have a numeric reading for scaling
    pub fn is_numeric(self) -> bool {
        !matches!(self, FieldType::String)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default = "default_required")]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Regular expression a present string value must fully match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

fn default_required() -> bool {
    true
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType, required: bool) -> Self {
        Self {
            name: name.into(),
            field_type,
            required,
            description: None,
            pattern: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String, true)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

/// A named, weighted subset of fields encoded together
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureGroup {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub fields: Vec<String>,

    #[serde(default)]
    pub transformer: TransformerKind,

    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl FeatureGroup {
    pub fn new<I, S>(name: impl Into<String>, fields: I, transformer: TransformerKind) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            description: None,
            fields: fields.into_iter().map(Into::into).collect(),
            transformer,
            weight: 1.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// How the fields of a group are turned into numbers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransformerKind {
    Hash {
        #[serde(default = "default_hash_buckets")]
        buckets: u64,
        #[serde(default = "default_true")]
        normalize: bool,
    },
    #[serde(alias = "one_hot")]
    OneHot,
    #[serde(alias = "tfidf_like", alias = "ngram")]
    Tfidf {
        #[serde(default = "default_ngram")]
        ngram: usize,
        #[serde(default = "default_ngram_buckets")]
        buckets: usize,
        #[serde(default)]
        variant: NGramVariant,
    },
    Scaler,
}

impl Default for TransformerKind {
    fn default() -> Self {
        TransformerKind::Hash {
            buckets: default_hash_buckets(),
            normalize: true,
        }
    }
}

impl TransformerKind {
    pub fn hash() -> Self {
        Self::default()
    }

    pub fn tfidf(variant: NGramVariant) -> Self {
        TransformerKind::Tfidf {
            ngram: default_ngram(),
            buckets: default_ngram_buckets(),
            variant,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransformerKind::Hash { .. } => "hash",
            TransformerKind::OneHot => "onehot",
            TransformerKind::Tfidf { .. } => "tfidf",
            TransformerKind::Scaler => "scaler",
        }
    }
}

fn default_hash_buckets() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_ngram() -> usize {
    3
}

fn default_ngram_buckets() -> usize {
    64
}

/// The two n-gram encodings produce different vectors, so the choice is
/// explicit in the configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NGramVariant {
    /// Raw bucket counts, no fit state
    #[default]
    Hashing,
    /// Bucket counts weighted by idf learned at fit time
    Vocabulary,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Thresholds {
    pub decline: f32,
    pub review: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            decline: 0.8,
            review: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReducerConfig {
    Pca {
        /// Upper bound on the number of components, defaults to `embedding_dim`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_components: Option<usize>,
    },
}

impl ReducerConfig {
    pub fn max_components(&self, embedding_dim: usize) -> usize {
        match self {
            ReducerConfig::Pca { max_components } => max_components.unwrap_or(embedding_dim),
        }
    }
}

/// Nearest-neighbour search and decision policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// When false, vector similarity alone may raise the decision tier
    #[serde(default = "default_true")]
    pub require_corroboration: bool,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_limit() -> usize {
    5
}

fn default_timeout_ms() -> u64 {
    2_000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            require_corroboration: true,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ModelConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ModelConfig =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Check every invariant the rest of the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_dim == 0 {
            return Err(Error::Config("embedding_dim must be greater than 0".into()));
        }

        let Thresholds { decline, review } = self.similarity_thresholds;
        if !(0.0..=1.0).contains(&decline) || !(0.0..=1.0).contains(&review) {
            return Err(Error::Config(format!(
                "thresholds must lie in [0, 1] (decline={}, review={})",
                decline, review
            )));
        }
        if decline < review {
            return Err(Error::Config(format!(
                "decline threshold {} is below review threshold {}",
                decline, review
            )));
        }

        if self.search.limit == 0 {
            return Err(Error::Config("search.limit must be greater than 0".into()));
        }

        if let Some(reducer) = &self.reducer {
            if reducer.max_components(self.embedding_dim) == 0 {
                return Err(Error::Config("reducer max_components must be greater than 0".into()));
            }
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(Error::Config(format!("field '{}' declared twice", field.name)));
            }
        }

        if self.feature_groups.is_empty() {
            return Err(Error::Config("at least one feature group is required".into()));
        }

        for group in &self.feature_groups {
            if group.fields.is_empty() {
                return Err(Error::Config(format!("feature group '{}' has no fields", group.name)));
            }
            if !(group.weight >= 0.0 && group.weight.is_finite()) {
                return Err(Error::Config(format!(
                    "feature group '{}' has invalid weight {}",
                    group.name, group.weight
                )));
            }
            self.validate_transformer(group)?;

            for name in &group.fields {
                let spec = self.field(name).ok_or_else(|| {
                    Error::Config(format!(
                        "feature group '{}' references undeclared field '{}'",
                        group.name, name
                    ))
                })?;
                if matches!(group.transformer, TransformerKind::Scaler)
                    && !spec.field_type.is_numeric()
                {
                    return Err(Error::Config(format!(
                        "scaler group '{}' cannot encode string field '{}'",
                        group.name, name
                    )));
                }
            }
        }

        Ok(())
    }

    fn validate_transformer(&self, group: &FeatureGroup) -> Result<()> {
        match group.transformer {
            TransformerKind::Hash { buckets, .. } if buckets == 0 => Err(Error::Config(format!(
                "hash group '{}' needs at least one bucket",
                group.name
            ))),
            TransformerKind::Tfidf { ngram, buckets, .. } if ngram == 0 || buckets == 0 => {
                Err(Error::Config(format!(
                    "tfidf group '{}' needs ngram > 0 and buckets > 0",
                    group.name
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// True when `other` produces embeddings with the same meaning.
    ///
    /// Thresholds and search policy do not change embeddings and are ignored.
    pub fn same_feature_layout(&self, other: &ModelConfig) -> bool {
        self.fields == other.fields
            && self.feature_groups == other.feature_groups
            && self.embedding_dim == other.embedding_dim
            && self.reducer == other.reducer
    }
}

/// Resolve the configuration file to load.
///
/// Precedence: explicit path, `FRAUDX_CONFIG`, `config/model_config.{FRAUDX_ENV}.json`
/// (env defaults to `development`), then `config/model_config.json`.
pub fn resolve_config_path(explicit: Option<&Path>, root: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::Config(format!(
            "config file not found at specified path: {}",
            path.display()
        )));
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let env = std::env::var(ENV_NAME_ENV).unwrap_or_else(|_| "development".to_string());
    let env_config = root.join("config").join(format!("model_config.{}.json", env));
    if env_config.exists() {
        return Ok(env_config);
    }

    let default_config = root.join("config").join("model_config.json");
    if default_config.exists() {
        return Ok(default_config);
    }

    Err(Error::Config(format!(
        "no model config found; looked for {} and {}",
        env_config.display(),
        default_config.display()
    )))
}
