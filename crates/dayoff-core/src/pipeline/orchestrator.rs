//! Pipeline orchestrator
//!
//! Owns the feature contract and sequences the stages. The fitted
//! artifacts are moved in at construction and never mutated afterwards, so
//! a `Pipeline` can be shared behind an `Arc` by concurrent requests.

use super::{Classifier, FeatureAugmenter, KnnImputer, MinMaxScaler};
use crate::artifacts::ArtifactSet;
use crate::contract::FeatureContract;
use crate::error::PipelineError;
use crate::models::{FeatureVector, PredictionResult, RawRecord, ScaledVector};
use crate::observability::{PipelineMetrics, StructuredLogger};
use std::time::Instant;

const DEFAULT_SERVICE: &str = "dayoff";

/// The assembled inference pipeline
pub struct Pipeline {
    contract: FeatureContract,
    imputer: KnnImputer,
    augmenter: FeatureAugmenter,
    scaler: MinMaxScaler,
    classifier: Box<dyn Classifier>,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

/// Augmenter output plus the imputable columns that arrived missing
struct Prepared {
    features: FeatureVector,
    imputed_columns: Vec<String>,
}

impl Pipeline {
    /// Build from a loaded and verified artifact set
    pub fn new(artifacts: ArtifactSet) -> Self {
        let ArtifactSet {
            contract,
            imputer,
            scaler,
            classifier,
            ..
        } = artifacts;
        Self::assemble(contract, imputer, scaler, classifier)
    }

    /// Build from individually supplied stages
    pub fn from_parts(
        contract: FeatureContract,
        imputer: KnnImputer,
        scaler: MinMaxScaler,
        classifier: Box<dyn Classifier>,
    ) -> Result<Self, PipelineError> {
        contract.validate()?;
        if scaler.dimension() != contract.scale_columns().len() {
            return Err(PipelineError::contract(format!(
                "scaler has {} columns, contract {} has {}",
                scaler.dimension(),
                contract.version(),
                contract.scale_columns().len()
            )));
        }
        Ok(Self::assemble(contract, imputer, scaler, classifier))
    }

    fn assemble(
        contract: FeatureContract,
        imputer: KnnImputer,
        scaler: MinMaxScaler,
        classifier: Box<dyn Classifier>,
    ) -> Self {
        let metrics = PipelineMetrics::new();
        metrics.set_artifact_info(contract.version(), &classifier.describe());
        Self {
            augmenter: FeatureAugmenter::new(contract),
            contract,
            imputer,
            scaler,
            classifier,
            metrics,
            logger: StructuredLogger::new(DEFAULT_SERVICE),
        }
    }

    /// Replace the logger used for per-request events
    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn contract(&self) -> &FeatureContract {
        &self.contract
    }

    pub fn imputer(&self) -> &KnnImputer {
        &self.imputer
    }

    pub fn describe_classifier(&self) -> String {
        self.classifier.describe()
    }

    /// Run one record through every stage
    pub fn infer(&self, record: &RawRecord) -> Result<PredictionResult, PipelineError> {
        let start = Instant::now();
        let outcome = self.run(record);
        let elapsed = start.elapsed();
        self.metrics.observe_inference_latency(elapsed.as_secs_f64());

        match outcome {
            Ok((probability, imputed_columns)) => {
                self.metrics.inc_predictions();
                self.metrics.add_imputed_values(imputed_columns.len());
                self.logger.log_prediction(
                    record.station(),
                    probability,
                    &imputed_columns,
                    elapsed.as_secs_f64() * 1000.0,
                );
                Ok(PredictionResult {
                    station: record.station().to_string(),
                    observed_at: record.observed_at(),
                    probability,
                    imputed_columns,
                    contract_version: self.contract.version().to_string(),
                    classifier: self.classifier.describe(),
                })
            }
            Err(err) => {
                self.metrics.inc_prediction_errors(err.kind());
                match &err {
                    PipelineError::ContractViolation(details) => {
                        self.logger.log_contract_violation(record.station(), details)
                    }
                    other => self.logger.log_prediction_failure(
                        record.station(),
                        other.kind(),
                        &other.to_string(),
                    ),
                }
                Err(err)
            }
        }
    }

    /// The assembled 24-vector before scaling
    pub fn feature_vector(&self, record: &RawRecord) -> Result<FeatureVector, PipelineError> {
        Ok(self.prepare(record)?.features)
    }

    /// The scaled 24-vector the classifier would receive
    pub fn scaled_vector(&self, record: &RawRecord) -> Result<ScaledVector, PipelineError> {
        let prepared = self.prepare(record)?;
        self.scaler.scale(prepared.features.as_slice())
    }

    fn run(&self, record: &RawRecord) -> Result<(f64, Vec<String>), PipelineError> {
        let prepared = self.prepare(record)?;
        let scaled = self.scaler.scale(prepared.features.as_slice())?;
        let probability = self.classifier.predict_proba(&scaled)?;
        if !(0.0..=1.0).contains(&probability) {
            return Err(PipelineError::Inference(format!(
                "classifier returned {} outside [0, 1]",
                probability
            )));
        }
        Ok((probability, prepared.imputed_columns))
    }

    fn prepare(&self, record: &RawRecord) -> Result<Prepared, PipelineError> {
        let record = self.augmenter.derive_components(record);

        let absent: Vec<&str> = self
            .contract
            .impute_columns()
            .iter()
            .copied()
            .filter(|column| !record.contains(column))
            .collect();
        if !absent.is_empty() {
            return Err(PipelineError::contract(format!(
                "record for '{}' lacks required columns: {}",
                record.station(),
                absent.join(", ")
            )));
        }

        let mut imputed_columns = Vec::new();
        let partial: Vec<f64> = self
            .contract
            .impute_columns()
            .iter()
            .map(|column| match record.value(column) {
                Some(value) => value,
                None => {
                    imputed_columns.push(column.to_string());
                    f64::NAN
                }
            })
            .collect();

        let imputed = self.imputer.impute(&partial)?;
        for column in &imputed_columns {
            if let Some(idx) = self.contract.impute_columns().iter().position(|c| c == column) {
                self.logger
                    .log_imputation(record.station(), column, imputed.as_slice()[idx]);
            }
        }

        let features = self.augmenter.augment(&imputed, &record)?;
        Ok(Prepared {
            features,
            imputed_columns,
        })
    }
}
