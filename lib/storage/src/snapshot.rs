// Model artifact persistence: fitted encoder state on disk
use anyhow::{anyhow, bail, Context, Result};
use atomicwrites::{AllowOverwrite, AtomicFile};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use fraudx_core::ModelConfig;
use fraudx_schema::{FittedEncoderState, FittedParameters, PipelineInfo};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Layout of the artifact file itself, independent of the pipeline version
const ARTIFACT_FORMAT: u32 = 1;

/// Artifact description for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDescription {
    pub path: String,
    pub model: String,
    pub created_at: String,
    pub pipeline_version: u32,
    pub corpus_size: usize,
    pub size: u64,
    pub checksum: String,
}

/// On-disk body. The configuration travels as JSON text because its
/// tagged enums do not round-trip through bincode.
#[derive(Serialize, Deserialize)]
struct ArtifactBody {
    format: u32,
    config_json: String,
    parameters: FittedParameters,
    info: PipelineInfo,
    created_at: i64,
}

/// A fitted encoder state together with the configuration it was fitted for
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub config: ModelConfig,
    pub parameters: FittedParameters,
    pub info: PipelineInfo,
    pub created_at: DateTime<Utc>,
}

impl ModelArtifact {
    pub fn from_state(state: &FittedEncoderState) -> Self {
        Self {
            config: state.config().clone(),
            parameters: state.parameters(),
            info: state.info().clone(),
            created_at: Utc::now(),
        }
    }

    pub fn into_state(self) -> fraudx_core::Result<FittedEncoderState> {
        FittedEncoderState::restore(self.config, self.parameters, self.info)
    }

    /// Write gzip-compressed bincode atomically, plus a sha256 sidecar.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<ArtifactDescription> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let body = ArtifactBody {
            format: ARTIFACT_FORMAT,
            config_json: serde_json::to_string(&self.config)?,
            parameters: self.parameters.clone(),
            info: self.info.clone(),
            created_at: self.created_at.timestamp(),
        };
        let encoded = bincode::serialize(&body).map_err(|e| anyhow!("Serialization error: {}", e))?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&encoded)?;
        let bytes = encoder.finish()?;
        let checksum = format!("{:x}", Sha256::digest(&bytes));

        AtomicFile::new(path, AllowOverwrite)
            .write(|f| f.write_all(&bytes))
            .map_err(|e| anyhow!("Failed to write model artifact {}: {}", path.display(), e))?;
        AtomicFile::new(checksum_path(path), AllowOverwrite)
            .write(|f| f.write_all(checksum.as_bytes()))
            .map_err(|e| anyhow!("Failed to write artifact checksum: {}", e))?;

        info!(
            path = %path.display(),
            model = %self.config.name,
            size = bytes.len(),
            "Saved model artifact"
        );

        Ok(ArtifactDescription {
            path: path.display().to_string(),
            model: self.config.name.clone(),
            created_at: self.created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            pipeline_version: self.info.pipeline_version,
            corpus_size: self.info.corpus_size,
            size: bytes.len() as u64,
            checksum,
        })
    }

    /// Read an artifact, verifying its checksum sidecar.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("reading model artifact {}", path.display()))?;

        let expected = fs::read_to_string(checksum_path(path))
            .with_context(|| format!("reading checksum for {}", path.display()))?;
        let actual = format!("{:x}", Sha256::digest(&bytes));
        if expected.trim() != actual {
            bail!("Checksum mismatch: expected {}, got {}", expected.trim(), actual);
        }

        let mut decoder = GzDecoder::new(bytes.as_slice());
        let mut encoded = Vec::new();
        decoder.read_to_end(&mut encoded)?;

        let body: ArtifactBody =
            bincode::deserialize(&encoded).map_err(|e| anyhow!("Deserialization error: {}", e))?;
        if body.format != ARTIFACT_FORMAT {
            bail!("Unsupported artifact format {}", body.format);
        }

        let config = ModelConfig::from_json_str(&body.config_json)?;
        let created_at = DateTime::from_timestamp(body.created_at, 0).unwrap_or_default();

        Ok(Self {
            config,
            parameters: body.parameters,
            info: body.info,
            created_at,
        })
    }
}

/// `<artifact>.sha256`
pub fn checksum_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".sha256");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fraudx_core::{
        ApplicationRecord, FeatureGroup, FieldSpec, ReducerConfig, SearchConfig, Thresholds,
        TransformerKind,
    };
    use serde_json::json;
    use tempfile::TempDir;

    fn config() -> ModelConfig {
        ModelConfig {
            name: "merchants".to_string(),
            description: Some("artifact test".to_string()),
            fields: vec![FieldSpec::string("email"), FieldSpec::string("state").optional()],
            feature_groups: vec![
                FeatureGroup::new("contact", ["email"], TransformerKind::hash()),
                FeatureGroup::new("location", ["state"], TransformerKind::OneHot).with_weight(0.5),
            ],
            embedding_dim: 3,
            similarity_thresholds: Thresholds::default(),
            reducer: Some(ReducerConfig::Pca { max_components: None }),
            search: SearchConfig::default(),
        }
    }

    fn corpus() -> Vec<ApplicationRecord> {
        ["TX", "CA", "NY", "TX"]
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let value = json!({"email": format!("m{}@x.com", i), "state": s});
                ApplicationRecord::from_value(value).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model").join("model.bin.gz");
        let state = FittedEncoderState::fit(&config(), &corpus()).unwrap();

        let description = ModelArtifact::from_state(&state).save(&path).unwrap();
        assert_eq!(description.model, "merchants");
        assert_eq!(description.corpus_size, 4);
        assert!(checksum_path(&path).exists());

        let restored = ModelArtifact::load(&path).unwrap().into_state().unwrap();
        assert_eq!(restored.config(), state.config());
        let record = &corpus()[2];
        assert_eq!(restored.assemble(record).unwrap(), state.assemble(record).unwrap());
    }

    #[test]
    fn test_checksum_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.bin.gz");
        let state = FittedEncoderState::fit(&config(), &corpus()).unwrap();
        ModelArtifact::from_state(&state).save(&path).unwrap();

        fs::write(checksum_path(&path), "0000").unwrap();
        let err = ModelArtifact::load(&path).unwrap_err();
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_missing_artifact() {
        let dir = TempDir::new().unwrap();
        assert!(ModelArtifact::load(dir.path().join("absent.bin.gz")).is_err());
    }
}
