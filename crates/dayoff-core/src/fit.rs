//! Training-side fitting of the imputer and scaler
//!
//! Reads a training table, aligns it to the feature contract exactly the
//! way inference does, and persists the fitted transforms with provenance.
//! Classifier training happens elsewhere; the resulting model only has to
//! consume the 24 scaled columns in contract order.

use crate::artifacts::{
    compute_checksum, write_atomic, ArtifactMetadata, IMPUTER_FILE, METADATA_FILE, SCALER_FILE,
};
use crate::contract::{owned_columns, FeatureContract, ROUTE_COLUMNS};
use crate::error::PipelineError;
use crate::pipeline::{
    ImputerArtifact, KnnImputer, MinMaxScaler, NeighborWeights, RouteCategory, ScalerArtifact,
    DEFAULT_NEIGHBORS,
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Label column of the shipped model
pub const DEFAULT_LABEL: &str = "TmrDayoff";

/// Column holding the raw storm route category
pub const ROUTE_SOURCE_COLUMN: &str = "route";

pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Error)]
pub enum FitError {
    #[error("failed to read training data from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(
        "unsupported training data format for {}: expected a .csv file{}",
        path.display(),
        if *spreadsheet { " (export the spreadsheet to CSV first)" } else { "" }
    )]
    UnsupportedFormat { path: PathBuf, spreadsheet: bool },

    #[error("malformed training table: {0}")]
    Csv(#[from] csv::Error),

    #[error("label column '{label}' not found; available: {available}")]
    MissingLabel { label: String, available: String },

    #[error("training table has no rows")]
    Empty,

    #[error("column '{0}' has no numeric values in the training table")]
    EmptyColumn(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("failed to serialize {artifact}: {source}")]
    Serialize {
        artifact: &'static str,
        source: serde_json::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Training rows aligned to both contract column lists
#[derive(Debug, Clone)]
pub struct TrainingFrame {
    label: String,
    /// `IMPUTE_COLUMNS` order, NaN for missing
    impute_rows: Vec<Vec<f64>>,
    /// `SCALE_COLUMNS` order, NaN for missing
    scale_rows: Vec<Vec<f64>>,
    labels: Vec<i64>,
}

impl TrainingFrame {
    /// Read a `.csv` training table; other formats are rejected before
    /// the file is opened
    pub fn from_csv(path: impl AsRef<Path>, label: &str) -> Result<Self, FitError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("csv") => {}
            other => {
                return Err(FitError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    spreadsheet: matches!(other, Some("xlsx" | "xls" | "xlsm" | "ods")),
                })
            }
        }

        let file = std::fs::File::open(path).map_err(|source| FitError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file, label)
    }

    /// Parse CSV with a header row. Numeric cells are coerced, anything
    /// unparseable becomes missing, and contract columns absent from the
    /// header are missing in every row.
    pub fn from_reader<R: Read>(reader: R, label: &str) -> Result<Self, FitError> {
        let contract = FeatureContract::current();
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

        let index_of = |name: &str| headers.iter().position(|h| h == name);
        let label_idx = index_of(label).ok_or_else(|| FitError::MissingLabel {
            label: label.to_string(),
            available: headers.iter().take(15).cloned().collect::<Vec<_>>().join(", "),
        })?;
        let route_idx = index_of(ROUTE_SOURCE_COLUMN);
        let impute_idx: Vec<Option<usize>> =
            contract.impute_columns().iter().map(|c| index_of(*c)).collect();
        let scale_idx: Vec<Option<usize>> =
            contract.scale_columns().iter().map(|c| index_of(*c)).collect();

        let mut frame = Self {
            label: label.to_string(),
            impute_rows: Vec::new(),
            scale_rows: Vec::new(),
            labels: Vec::new(),
        };

        for record in reader.records() {
            let record = record?;
            let cell = |idx: Option<usize>| {
                idx.and_then(|i| record.get(i)).map_or(f64::NAN, parse_cell)
            };

            let mut scale_row: Vec<f64> = scale_idx.iter().map(|idx| cell(*idx)).collect();
            if let Some(idx) = route_idx {
                let flags = training_route_flags(record.get(idx).unwrap_or(""));
                for (column, flag) in ROUTE_COLUMNS.iter().zip(flags) {
                    if let Some(pos) = contract.position_of(column) {
                        scale_row[pos] = flag;
                    }
                }
            }

            let label_value = parse_cell(record.get(label_idx).unwrap_or(""));
            frame.impute_rows.push(impute_idx.iter().map(|idx| cell(*idx)).collect());
            frame.scale_rows.push(scale_row);
            frame.labels.push(if label_value.is_finite() { label_value as i64 } else { 0 });
        }

        if frame.labels.is_empty() {
            return Err(FitError::Empty);
        }
        Ok(frame)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|l| **l == 1).count()
    }
}

/// Coerce a cell the way the training table was coerced: missing unless numeric
fn parse_cell(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(f64::NAN)
}

/// Training-time route encoding: anything that is not route 2 or 3,
/// including an empty cell, counts as unclassified
fn training_route_flags(raw: &str) -> [f64; 3] {
    let category = RouteCategory::parse(raw).unwrap_or(RouteCategory::Unclassified);
    let mut flags = [0.0; 3];
    for (flag, column) in flags.iter_mut().zip(ROUTE_COLUMNS) {
        if column == category.column() {
            *flag = 1.0;
        }
    }
    flags
}

#[derive(Debug, Clone)]
pub struct FitOptions {
    pub neighbors: usize,
    pub weights: NeighborWeights,
    /// Recorded for the downstream classifier training
    pub seed: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            neighbors: DEFAULT_NEIGHBORS,
            weights: NeighborWeights::Distance,
            seed: DEFAULT_SEED,
        }
    }
}

/// Fitted transforms ready to persist
#[derive(Debug, Clone)]
pub struct FittedTransforms {
    pub imputer: ImputerArtifact,
    pub scaler: ScalerArtifact,
    pub metadata: ArtifactMetadata,
    /// Scaled training matrix in contract order, for classifier training
    pub scaled_rows: Vec<Vec<f64>>,
}

/// Fit the imputer on exactly the impute columns, reinsert the imputed
/// values, then fit the scaler on exactly the scale columns
pub fn fit_transforms(
    frame: &TrainingFrame,
    options: &FitOptions,
) -> Result<FittedTransforms, FitError> {
    let contract = FeatureContract::current();
    contract.validate()?;

    let imputer = KnnImputer::fit(&frame.impute_rows, options.neighbors, options.weights)?;
    let positions = contract.impute_positions();

    let mut scale_rows = frame.scale_rows.clone();
    let mut fallback_rows = 0usize;
    for (impute_row, scale_row) in frame.impute_rows.iter().zip(scale_rows.iter_mut()) {
        let filled: Vec<f64> = if impute_row.iter().any(|v| v.is_finite()) {
            imputer.impute(impute_row)?.as_slice().to_vec()
        } else {
            fallback_rows += 1;
            imputer.means().to_vec()
        };
        for (value, pos) in filled.iter().zip(&positions) {
            scale_row[*pos] = *value;
        }
    }
    if fallback_rows > 0 {
        warn!(
            rows = fallback_rows,
            "Training rows without any imputable value were filled with column means"
        );
    }

    for (idx, column) in contract.scale_columns().iter().enumerate() {
        if !scale_rows.iter().any(|row| row[idx].is_finite()) {
            return Err(FitError::EmptyColumn(column.to_string()));
        }
    }

    let scaler = MinMaxScaler::fit(&scale_rows)?;
    let scaled_rows = scale_rows
        .iter()
        .map(|row| {
            // Remaining gaps are metadata the table never had; they encode as 0
            let row: Vec<f64> = row.iter().map(|v| if v.is_finite() { *v } else { 0.0 }).collect();
            scaler.scale(&row).map(|s| s.as_slice().to_vec())
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        rows = frame.len(),
        positives = frame.positives(),
        neighbors = options.neighbors,
        "Fitted imputer and scaler"
    );

    Ok(FittedTransforms {
        imputer: imputer.to_artifact(&contract),
        scaler: scaler.to_artifact(&contract),
        metadata: ArtifactMetadata {
            contract_version: contract.version().to_string(),
            imputer_columns: owned_columns(contract.impute_columns()),
            scaler_columns: owned_columns(contract.scale_columns()),
            label: frame.label().to_string(),
            seed: options.seed,
            training_rows: frame.len(),
            positive_rows: frame.positives(),
            created_at: Utc::now(),
            checksums: BTreeMap::new(),
        },
        scaled_rows,
    })
}

/// Persist the imputer, scaler and checksummed metadata into `dir`
pub fn write_artifacts(
    dir: impl AsRef<Path>,
    fitted: &FittedTransforms,
) -> Result<ArtifactMetadata, FitError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|source| FitError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    let imputer = serde_json::to_vec_pretty(&fitted.imputer).map_err(|source| FitError::Serialize {
        artifact: "imputer",
        source,
    })?;
    let scaler = serde_json::to_vec_pretty(&fitted.scaler).map_err(|source| FitError::Serialize {
        artifact: "scaler",
        source,
    })?;

    let mut metadata = fitted.metadata.clone();
    for (file, bytes) in [(IMPUTER_FILE, &imputer), (SCALER_FILE, &scaler)] {
        write_file(&dir.join(file), bytes)?;
        metadata.checksums.insert(file.to_string(), compute_checksum(bytes));
    }

    let meta_bytes = serde_json::to_vec_pretty(&metadata).map_err(|source| FitError::Serialize {
        artifact: "metadata",
        source,
    })?;
    write_file(&dir.join(METADATA_FILE), &meta_bytes)?;

    info!(dir = %dir.display(), "Wrote fitted artifacts");
    Ok(metadata)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), FitError> {
    write_atomic(path, bytes).map_err(|source| FitError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactPaths, ArtifactSet};
    use crate::contract::{SCALE_COLUMNS, SCALE_WIDTH};
    use crate::models::RawRecord;
    use crate::pipeline::{ForestArtifact, Pipeline, TreeArtifact};
    use tempfile::TempDir;

    const TABLE: &str = "\
TmrDayoff,Dayoff,Precp,RH,StnHeight,StnPres,T.Max,T.Min,Temperature,TyWS,WDGust_vector_x,WDGust_vector_y,WD_vector_x,WD_vector_y,X10_radius,X7_radius,alert_num,born_spotE,born_spotN,hpa,lat,lon,route
1,1,120.5,95,5.3,990.1,30.2,25.1,27.0,45,3.1,-2.0,1.2,-0.8,150,300,40,130,18,940,25.03,121.5,3
0,0,2.0,70,30.0,1008.0,33.0,27.0,30.5,23,0.5,0.1,0.3,0.2,50,180,12,140,22,985,24.15,120.6,2
1,1,,88,12.1,995.5,29.0,24.0,26.5,40,,-1.5,0.9,,120,250,36,136,21,955,23.0,120.2,--
0,0,0.0,,8.0,1010.2,34.1,28.2,31.0,18,0.2,0.0,0.1,0.0,0,120,8,150,15,998,22.6,120.3,
0,0,n/a,65,40.0,1005.0,32.0,26.0,29.0,25,0.4,0.3,0.2,0.1,30,150,10,138,20,990,24.8,121.0,7
";

    fn frame() -> TrainingFrame {
        TrainingFrame::from_reader(TABLE.as_bytes(), DEFAULT_LABEL).unwrap()
    }

    #[test]
    fn test_frame_reads_rows_and_labels() {
        let frame = frame();
        assert_eq!(frame.len(), 5);
        assert_eq!(frame.labels(), &[1, 0, 1, 0, 0]);
        assert_eq!(frame.positives(), 2);
    }

    #[test]
    fn test_non_numeric_cells_are_missing() {
        let frame = frame();
        assert!(frame.impute_rows[2][0].is_nan());
        assert!(frame.impute_rows[4][0].is_nan());
        assert_eq!(frame.impute_rows[0][0], 120.5);
    }

    #[test]
    fn test_route_encoded_with_training_semantics() {
        let frame = frame();
        let route = |row: usize| frame.scale_rows[row][21..].to_vec();
        assert_eq!(route(0), vec![0.0, 0.0, 1.0]);
        assert_eq!(route(1), vec![0.0, 1.0, 0.0]);
        assert_eq!(route(2), vec![1.0, 0.0, 0.0]);
        // Empty and unknown routes count as unclassified when fitting
        assert_eq!(route(3), vec![1.0, 0.0, 0.0]);
        assert_eq!(route(4), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_missing_label_column() {
        let err =
            TrainingFrame::from_reader("Precp,RH\n1,2\n".as_bytes(), DEFAULT_LABEL).unwrap_err();
        assert!(matches!(err, FitError::MissingLabel { .. }));
    }

    #[test]
    fn test_spreadsheet_input_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("typhoon_data.xlsx");
        std::fs::write(&path, TABLE).unwrap();

        let err = TrainingFrame::from_csv(&path, DEFAULT_LABEL).unwrap_err();
        assert!(matches!(err, FitError::UnsupportedFormat { spreadsheet: true, .. }));
        let message = err.to_string();
        assert!(message.contains("typhoon_data.xlsx"));
        assert!(message.contains("export the spreadsheet to CSV"));
    }

    #[test]
    fn test_csv_extension_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("TRAIN.CSV");
        std::fs::write(&path, TABLE).unwrap();

        assert!(TrainingFrame::from_csv(&path, DEFAULT_LABEL).is_ok());

        let bare = dir.path().join("train");
        std::fs::write(&bare, TABLE).unwrap();
        assert!(matches!(
            TrainingFrame::from_csv(&bare, DEFAULT_LABEL),
            Err(FitError::UnsupportedFormat { spreadsheet: false, .. })
        ));
    }

    #[test]
    fn test_empty_table() {
        let err =
            TrainingFrame::from_reader("TmrDayoff,Precp\n".as_bytes(), DEFAULT_LABEL).unwrap_err();
        assert!(matches!(err, FitError::Empty));
    }

    #[test]
    fn test_fit_aligns_to_contract() {
        let fitted = fit_transforms(&frame(), &FitOptions::default()).unwrap();

        assert_eq!(fitted.imputer.columns.len(), 13);
        assert_eq!(fitted.imputer.n_neighbors, DEFAULT_NEIGHBORS);
        assert_eq!(fitted.scaler.columns, owned_columns(&SCALE_COLUMNS));
        assert_eq!(fitted.metadata.training_rows, 5);
        assert_eq!(fitted.metadata.seed, DEFAULT_SEED);

        // Precp bounds come from observed plus imputed values
        assert_eq!(fitted.scaler.data_max[1], 120.5);
        assert_eq!(fitted.scaler.data_min[1], 0.0);
        assert_eq!(fitted.scaled_rows.len(), 5);
        assert!(fitted.scaled_rows.iter().all(|r| r.len() == SCALE_WIDTH));
    }

    #[test]
    fn test_fit_rejects_column_without_values() {
        let table = "TmrDayoff,Precp,RH,route\n1,1,2,3\n0,2,3,2\n";
        let frame = TrainingFrame::from_reader(table.as_bytes(), DEFAULT_LABEL).unwrap();
        assert!(fit_transforms(&frame, &FitOptions::default()).is_err());
    }

    #[test]
    fn test_written_artifacts_load_into_pipeline() {
        let dir = TempDir::new().unwrap();
        let fitted = fit_transforms(&frame(), &FitOptions::default()).unwrap();
        let metadata = write_artifacts(dir.path(), &fitted).unwrap();
        assert_eq!(metadata.checksums.len(), 2);

        let paths = ArtifactPaths::in_dir(dir.path());
        let forest = ForestArtifact {
            contract_version: fitted.metadata.contract_version.clone(),
            n_features: SCALE_WIDTH,
            classes: vec![0, 1],
            trees: vec![TreeArtifact {
                children_left: vec![-1],
                children_right: vec![-1],
                feature: vec![-2],
                threshold: vec![-2.0],
                value: vec![vec![3.0, 2.0]],
            }],
        };
        std::fs::write(&paths.classifier, serde_json::to_vec(&forest).unwrap()).unwrap();

        let set = ArtifactSet::load(&paths).unwrap();
        assert!(set.metadata.is_some());
        let pipeline = Pipeline::new(set);

        let mut builder = RawRecord::builder("Tainan").route("2");
        for column in FeatureContract::current().impute_columns() {
            builder = builder.missing(*column);
        }
        let record = builder.value("Precp", 50.0).value("lat", 23.0).build();
        let result = pipeline.infer(&record).unwrap();
        assert_eq!(result.probability, 0.4);
        assert_eq!(result.imputed_columns.len(), 11);
    }
}
