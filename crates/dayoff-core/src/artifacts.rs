//! Fitted artifact loading
//!
//! The imputer, scaler and classifier are loaded together, checked against
//! the feature contract and, when an `artifacts_meta.json` sits next to
//! them, verified against its recorded SHA-256 checksums. Any failure
//! aborts the whole load.

use crate::contract::{FeatureContract, CONTRACT_VERSION};
use crate::error::{stages, PipelineError};
use crate::pipeline::{
    Classifier, ForestArtifact, ForestClassifier, ImputerArtifact, KnnImputer, MinMaxScaler,
    OnnxClassifier, ScalerArtifact,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_ARTIFACT_DIR: &str = "models";
pub const IMPUTER_FILE: &str = "kNN_imputer.json";
pub const SCALER_FILE: &str = "MMscaler.json";
pub const CLASSIFIER_FILE: &str = "rf_model.json";
pub const METADATA_FILE: &str = "artifacts_meta.json";

/// Environment overrides for individual artifact paths
pub mod env {
    pub const IMPUTER: &str = "KNN_IMPUTER_PATH";
    pub const SCALER: &str = "MINMAX_SCALER_PATH";
    pub const CLASSIFIER: &str = "MODEL_PATH";
}

const METADATA: &str = "metadata";

/// Locations of the three fitted artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub imputer: PathBuf,
    pub scaler: PathBuf,
    pub classifier: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self::in_dir(DEFAULT_ARTIFACT_DIR)
    }
}

impl ArtifactPaths {
    /// Standard file names inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            imputer: dir.join(IMPUTER_FILE),
            scaler: dir.join(SCALER_FILE),
            classifier: dir.join(CLASSIFIER_FILE),
        }
    }

    /// Defaults, overridden per artifact by `KNN_IMPUTER_PATH`,
    /// `MINMAX_SCALER_PATH` and `MODEL_PATH`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let lookup = |key: &str, fallback: PathBuf| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(fallback)
        };
        Self {
            imputer: lookup(env::IMPUTER, defaults.imputer),
            scaler: lookup(env::SCALER, defaults.scaler),
            classifier: lookup(env::CLASSIFIER, defaults.classifier),
        }
    }

    /// Metadata file expected next to the imputer
    pub fn metadata_path(&self) -> PathBuf {
        self.imputer
            .parent()
            .map(|dir| dir.join(METADATA_FILE))
            .unwrap_or_else(|| PathBuf::from(METADATA_FILE))
    }
}

/// Provenance written alongside fitted transforms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub contract_version: String,
    pub imputer_columns: Vec<String>,
    pub scaler_columns: Vec<String>,
    pub label: String,
    pub seed: u64,
    pub training_rows: usize,
    pub positive_rows: usize,
    pub created_at: DateTime<Utc>,
    /// File name -> hex SHA-256
    #[serde(default)]
    pub checksums: BTreeMap<String, String>,
}

impl ArtifactMetadata {
    /// Compare each artifact file present in `checksums` with its recorded digest
    pub fn verify(
        &self,
        paths: &ArtifactPaths,
        contents: &[(&'static str, &Path, &[u8])],
    ) -> Result<(), PipelineError> {
        if self.contract_version != CONTRACT_VERSION {
            return Err(PipelineError::artifact(
                METADATA,
                paths.metadata_path(),
                format!(
                    "artifacts were fitted for contract {}, running {}",
                    self.contract_version, CONTRACT_VERSION
                ),
            ));
        }

        for (artifact, path, bytes) in contents {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(expected) = self.checksums.get(name) else {
                debug!(artifact = artifact, file = name, "No recorded checksum, skipping");
                continue;
            };
            let actual = compute_checksum(bytes);
            if &actual != expected {
                return Err(PipelineError::artifact(
                    artifact,
                    *path,
                    format!("checksum mismatch: expected {}, got {}", expected, actual),
                ));
            }
        }
        Ok(())
    }
}

/// A fully loaded and verified set of fitted artifacts
pub struct ArtifactSet {
    pub contract: FeatureContract,
    pub imputer: KnnImputer,
    pub scaler: MinMaxScaler,
    pub classifier: Box<dyn Classifier>,
    pub metadata: Option<ArtifactMetadata>,
}

impl ArtifactSet {
    /// Load all three artifacts; nothing is returned unless every one succeeds
    pub fn load(paths: &ArtifactPaths) -> Result<Self, PipelineError> {
        let contract = FeatureContract::current();
        contract.validate()?;

        let imputer_bytes = read(stages::IMPUTER, &paths.imputer)?;
        let scaler_bytes = read(stages::SCALER, &paths.scaler)?;
        let classifier_bytes = read(stages::CLASSIFIER, &paths.classifier)?;

        let metadata_path = paths.metadata_path();
        let metadata = if metadata_path.exists() {
            let bytes = read(METADATA, &metadata_path)?;
            let metadata: ArtifactMetadata = parse(METADATA, &metadata_path, &bytes)?;
            metadata.verify(
                paths,
                &[
                    (stages::IMPUTER, paths.imputer.as_path(), imputer_bytes.as_slice()),
                    (stages::SCALER, paths.scaler.as_path(), scaler_bytes.as_slice()),
                    (stages::CLASSIFIER, paths.classifier.as_path(), classifier_bytes.as_slice()),
                ],
            )?;
            Some(metadata)
        } else {
            None
        };

        let imputer_artifact: ImputerArtifact =
            parse(stages::IMPUTER, &paths.imputer, &imputer_bytes)?;
        let imputer = KnnImputer::from_artifact(imputer_artifact, &contract)
            .map_err(|e| PipelineError::artifact(stages::IMPUTER, &paths.imputer, e))?;

        let scaler_artifact: ScalerArtifact = parse(stages::SCALER, &paths.scaler, &scaler_bytes)?;
        let scaler = MinMaxScaler::from_artifact(scaler_artifact, &contract)
            .map_err(|e| PipelineError::artifact(stages::SCALER, &paths.scaler, e))?;
        if scaler.dimension() != contract.scale_columns().len() {
            return Err(PipelineError::artifact(
                stages::SCALER,
                &paths.scaler,
                format!(
                    "fitted on {} columns, contract has {}",
                    scaler.dimension(),
                    contract.scale_columns().len()
                ),
            ));
        }

        let classifier = load_classifier(&paths.classifier, &classifier_bytes, &contract)?;

        info!(
            contract_version = contract.version(),
            neighbors = imputer.n_neighbors(),
            fit_rows = imputer.fit_rows(),
            classifier = %classifier.describe(),
            verified = metadata.is_some(),
            "Artifacts loaded"
        );

        Ok(Self {
            contract,
            imputer,
            scaler,
            classifier,
            metadata,
        })
    }

    pub fn describe_classifier(&self) -> String {
        self.classifier.describe()
    }
}

fn load_classifier(
    path: &Path,
    bytes: &[u8],
    contract: &FeatureContract,
) -> Result<Box<dyn Classifier>, PipelineError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("onnx") => {
            let model = OnnxClassifier::from_bytes(bytes).map_err(|e| {
                PipelineError::artifact(stages::CLASSIFIER, path, format!("{:#}", e))
            })?;
            Ok(Box::new(model))
        }
        Some("json") => {
            let artifact: ForestArtifact = parse(stages::CLASSIFIER, path, bytes)?;
            let model = ForestClassifier::from_artifact(artifact, contract)
                .map_err(|e| PipelineError::artifact(stages::CLASSIFIER, path, e))?;
            Ok(Box::new(model))
        }
        other => Err(PipelineError::artifact(
            stages::CLASSIFIER,
            path,
            format!("unsupported model format {:?}, expected .onnx or .json", other.unwrap_or("")),
        )),
    }
}

fn read(artifact: &'static str, path: &Path) -> Result<Vec<u8>, PipelineError> {
    fs::read(path).map_err(|e| PipelineError::artifact(artifact, path, e))
}

fn parse<T: DeserializeOwned>(
    artifact: &'static str,
    path: &Path,
    bytes: &[u8],
) -> Result<T, PipelineError> {
    serde_json::from_slice(bytes).map_err(|e| PipelineError::artifact(artifact, path, e))
}

/// Hex-encoded SHA-256 of `data`
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Write through a temporary file and rename into place
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{IMPUTE_WIDTH, SCALE_WIDTH};
    use crate::pipeline::{NeighborWeights, TreeArtifact};
    use tempfile::TempDir;

    fn forest_artifact() -> ForestArtifact {
        ForestArtifact {
            contract_version: CONTRACT_VERSION.to_string(),
            n_features: SCALE_WIDTH,
            classes: vec![0, 1],
            trees: vec![TreeArtifact {
                children_left: vec![1, -1, -1],
                children_right: vec![2, -1, -1],
                feature: vec![1, -2, -2],
                threshold: vec![0.5, -2.0, -2.0],
                value: vec![vec![5.0, 5.0], vec![4.0, 1.0], vec![1.0, 4.0]],
            }],
        }
    }

    fn write_json<T: Serialize>(path: &Path, value: &T) {
        fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
    }

    /// Writes a consistent artifact set into a fresh directory
    fn artifact_dir() -> (TempDir, ArtifactPaths) {
        let dir = TempDir::new().unwrap();
        let paths = ArtifactPaths::in_dir(dir.path());
        let contract = FeatureContract::current();

        let rows: Vec<Vec<f64>> = (0..4)
            .map(|r| (0..IMPUTE_WIDTH).map(|c| (r * c) as f64).collect())
            .collect();
        let imputer = KnnImputer::fit(&rows, 2, NeighborWeights::Distance).unwrap();
        let scaler =
            MinMaxScaler::new(vec![0.0; SCALE_WIDTH], vec![1.0; SCALE_WIDTH], false).unwrap();

        write_json(&paths.imputer, &imputer.to_artifact(&contract));
        write_json(&paths.scaler, &scaler.to_artifact(&contract));
        write_json(&paths.classifier, &forest_artifact());
        (dir, paths)
    }

    fn metadata_for(paths: &ArtifactPaths) -> ArtifactMetadata {
        let mut checksums = BTreeMap::new();
        for path in [&paths.imputer, &paths.scaler] {
            let name = path.file_name().unwrap().to_str().unwrap().to_string();
            checksums.insert(name, compute_checksum(&fs::read(path).unwrap()));
        }
        ArtifactMetadata {
            contract_version: CONTRACT_VERSION.to_string(),
            imputer_columns: vec![],
            scaler_columns: vec![],
            label: "TmrDayoff".to_string(),
            seed: 42,
            training_rows: 4,
            positive_rows: 1,
            created_at: Utc::now(),
            checksums,
        }
    }

    #[test]
    fn test_default_paths() {
        let paths = ArtifactPaths::default();
        assert_eq!(paths.imputer, PathBuf::from("models/kNN_imputer.json"));
        assert_eq!(paths.scaler, PathBuf::from("models/MMscaler.json"));
        assert_eq!(paths.classifier, PathBuf::from("models/rf_model.json"));
        assert_eq!(paths.metadata_path(), PathBuf::from("models/artifacts_meta.json"));
    }

    #[test]
    fn test_load_complete_set() {
        let (_dir, paths) = artifact_dir();
        let set = ArtifactSet::load(&paths).unwrap();

        assert_eq!(set.imputer.n_neighbors(), 2);
        assert_eq!(set.scaler.dimension(), SCALE_WIDTH);
        assert_eq!(set.describe_classifier(), "random-forest(1 trees)");
        assert!(set.metadata.is_none());
    }

    #[test]
    fn test_missing_artifact_fails_whole_load() {
        let (_dir, paths) = artifact_dir();
        fs::remove_file(&paths.scaler).unwrap();

        match ArtifactSet::load(&paths) {
            Err(PipelineError::ArtifactLoadFailure { artifact, path, .. }) => {
                assert_eq!(artifact, stages::SCALER);
                assert_eq!(path, paths.scaler);
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("load should fail without a scaler"),
        }
    }

    #[test]
    fn test_scaler_with_wrong_columns_rejected() {
        let (_dir, paths) = artifact_dir();
        let contract = FeatureContract::current();
        let mut artifact = MinMaxScaler::new(vec![0.0; SCALE_WIDTH], vec![1.0; SCALE_WIDTH], false)
            .unwrap()
            .to_artifact(&contract);
        artifact.columns.swap(1, 2);
        write_json(&paths.scaler, &artifact);

        let err = ArtifactSet::load(&paths).err().unwrap();
        assert_eq!(err.kind(), "artifact_load_failure");
        assert!(err.to_string().contains("Precp"));
    }

    #[test]
    fn test_corrupt_json_rejected() {
        let (_dir, paths) = artifact_dir();
        fs::write(&paths.imputer, b"{ not json").unwrap();
        assert_eq!(ArtifactSet::load(&paths).err().unwrap().kind(), "artifact_load_failure");
    }

    #[test]
    fn test_unsupported_model_extension() {
        let (dir, mut paths) = artifact_dir();
        paths.classifier = dir.path().join("rf_model.joblib");
        fs::write(&paths.classifier, b"\x80\x04").unwrap();

        let err = ArtifactSet::load(&paths).err().unwrap();
        assert!(err.to_string().contains("unsupported model format"));
    }

    #[test]
    fn test_corrupt_onnx_rejected() {
        let (dir, mut paths) = artifact_dir();
        paths.classifier = dir.path().join("rf_model.onnx");
        fs::write(&paths.classifier, b"garbage").unwrap();

        assert_eq!(ArtifactSet::load(&paths).err().unwrap().kind(), "artifact_load_failure");
    }

    #[test]
    fn test_checksums_verified_when_metadata_present() {
        let (_dir, paths) = artifact_dir();
        write_json(&paths.metadata_path(), &metadata_for(&paths));

        let set = ArtifactSet::load(&paths).unwrap();
        assert_eq!(set.metadata.unwrap().label, "TmrDayoff");
    }

    #[test]
    fn test_checksum_mismatch_rejected() {
        let (_dir, paths) = artifact_dir();
        write_json(&paths.metadata_path(), &metadata_for(&paths));

        // Same content, different bytes
        let text = fs::read_to_string(&paths.scaler).unwrap();
        fs::write(&paths.scaler, format!("{}\n", text)).unwrap();

        let err = ArtifactSet::load(&paths).err().unwrap();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_atomic_write_replaces_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_checksum_is_stable() {
        assert_eq!(compute_checksum(b"typhoon"), compute_checksum(b"typhoon"));
        assert_ne!(compute_checksum(b"typhoon"), compute_checksum(b"typhoon!"));
        assert_eq!(compute_checksum(b"").len(), 64);
    }
}
