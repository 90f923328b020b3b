//! Classifier implementations
//!
//! `ForestClassifier` evaluates a serialized random forest directly.
//! `OnnxClassifier` runs an ONNX export of the same ensemble through tract.

use super::Classifier;
use crate::contract::{FeatureContract, SCALE_WIDTH};
use crate::error::PipelineError;
use crate::models::ScaledVector;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Index of the "day off" class in two-class outputs
pub const POSITIVE_CLASS: usize = 1;

/// Maximum inference latency before warning
const MAX_INFERENCE_MS: u128 = 5;

/// Marks a leaf in the child arrays
const LEAF: i64 = -1;

/// One decision tree as parallel node arrays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeArtifact {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    /// Per-node class weights (counts or fractions)
    pub value: Vec<Vec<f64>>,
}

/// Persisted random-forest ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestArtifact {
    pub contract_version: String,
    pub n_features: usize,
    pub classes: Vec<i64>,
    pub trees: Vec<TreeArtifact>,
}

#[derive(Debug, Clone)]
struct Tree {
    left: Vec<usize>,
    right: Vec<usize>,
    feature: Vec<usize>,
    threshold: Vec<f64>,
    /// Normalized class distribution for leaves, empty for split nodes
    leaf_proba: Vec<Vec<f64>>,
    is_leaf: Vec<bool>,
}

impl Tree {
    fn from_artifact(
        idx: usize,
        t: TreeArtifact,
        n_features: usize,
        n_classes: usize,
    ) -> Result<Self, String> {
        let n = t.children_left.len();
        if n == 0 {
            return Err(format!("tree {} has no nodes", idx));
        }
        let lengths = [
            t.children_right.len(),
            t.feature.len(),
            t.threshold.len(),
            t.value.len(),
        ];
        if lengths.iter().any(|len| *len != n) {
            return Err(format!("tree {} node arrays differ in length", idx));
        }

        let mut tree = Tree {
            left: vec![0; n],
            right: vec![0; n],
            feature: vec![0; n],
            threshold: t.threshold,
            leaf_proba: vec![Vec::new(); n],
            is_leaf: vec![false; n],
        };

        for node in 0..n {
            let (l, r) = (t.children_left[node], t.children_right[node]);
            if l == LEAF || r == LEAF {
                if l != r {
                    return Err(format!("tree {} node {} has a single child", idx, node));
                }
                let weights = &t.value[node];
                let total: f64 = weights.iter().sum();
                if weights.len() != n_classes || total <= 0.0 || !total.is_finite() {
                    return Err(format!("tree {} leaf {} has invalid class weights", idx, node));
                }
                tree.leaf_proba[node] = weights.iter().map(|w| w / total).collect();
                tree.is_leaf[node] = true;
                continue;
            }

            // Children always come after their parent, so traversal terminates
            let in_range = |c: i64| c > node as i64 && (c as usize) < n;
            if !in_range(l) || !in_range(r) {
                return Err(format!("tree {} node {} has out-of-order children", idx, node));
            }
            let f = t.feature[node];
            if f < 0 || f as usize >= n_features {
                return Err(format!("tree {} node {} splits on feature {}", idx, node, f));
            }
            tree.left[node] = l as usize;
            tree.right[node] = r as usize;
            tree.feature[node] = f as usize;
        }

        Ok(tree)
    }

    fn leaf(&self, x: &[f64]) -> &[f64] {
        let mut node = 0;
        while !self.is_leaf[node] {
            // Trees were grown on f32 inputs; compare at that precision
            let value = x[self.feature[node]] as f32 as f64;
            node = if value <= self.threshold[node] {
                self.left[node]
            } else {
                self.right[node]
            };
        }
        &self.leaf_proba[node]
    }
}

/// Random-forest classifier evaluated from its serialized trees
#[derive(Debug, Clone)]
pub struct ForestClassifier {
    trees: Vec<Tree>,
    positive_index: usize,
}

impl ForestClassifier {
    pub fn from_artifact(
        artifact: ForestArtifact,
        contract: &FeatureContract,
    ) -> Result<Self, String> {
        if artifact.contract_version != contract.version() {
            return Err(format!(
                "model was trained for contract {}, running {}",
                artifact.contract_version,
                contract.version()
            ));
        }
        if artifact.n_features != contract.scale_columns().len() {
            return Err(format!(
                "model expects {} features, contract provides {}",
                artifact.n_features,
                contract.scale_columns().len()
            ));
        }
        let positive_index = artifact
            .classes
            .iter()
            .position(|c| *c == POSITIVE_CLASS as i64)
            .ok_or_else(|| "model has no positive class".to_string())?;
        if artifact.trees.is_empty() {
            return Err("model has no trees".to_string());
        }

        let n_classes = artifact.classes.len();
        let trees = artifact
            .trees
            .into_iter()
            .enumerate()
            .map(|(idx, t)| Tree::from_artifact(idx, t, artifact.n_features, n_classes))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            trees,
            positive_index,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for ForestClassifier {
    fn predict_proba(&self, features: &ScaledVector) -> Result<f64, PipelineError> {
        let x = features.as_slice();
        let total: f64 = self
            .trees
            .iter()
            .map(|tree| tree.leaf(x)[self.positive_index])
            .sum();
        Ok(total / self.trees.len() as f64)
    }

    fn describe(&self) -> String {
        format!("random-forest({} trees)", self.trees.len())
    }
}

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX-exported ensemble run through tract
pub struct OnnxClassifier {
    model: TractModel,
}

impl OnnxClassifier {
    /// Parse and optimize an ONNX model for a `[1, 24]` f32 input
    pub fn from_bytes(model_bytes: &[u8]) -> TractResult<Self> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, SCALE_WIDTH]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;

        Ok(Self { model })
    }

    fn to_tensor(features: &ScaledVector) -> TractResult<Tensor> {
        let data: Vec<f32> = features.as_slice().iter().map(|v| *v as f32).collect();
        Ok(tract_ndarray::Array2::from_shape_vec((1, SCALE_WIDTH), data)?.into())
    }

    /// Pick the positive-class probability out of the model outputs
    fn positive_probability(outputs: &[TValue]) -> Option<f64> {
        // Classifier exports emit (label, probabilities); take the last float output
        let probabilities = outputs
            .iter()
            .rev()
            .find_map(|o| o.to_array_view::<f32>().ok())?;
        let values: Vec<f32> = probabilities.iter().copied().collect();
        let p = match values.len() {
            0 => return None,
            1 => values[0],
            _ => values[POSITIVE_CLASS],
        };
        Some(p as f64)
    }
}

impl Classifier for OnnxClassifier {
    fn predict_proba(&self, features: &ScaledVector) -> Result<f64, PipelineError> {
        let start = Instant::now();

        let input = Self::to_tensor(features).map_err(|e| PipelineError::Inference(e.to_string()))?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| PipelineError::Inference(e.to_string()))?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > MAX_INFERENCE_MS {
            warn!(
                elapsed_ms = elapsed.as_millis(),
                "Inference exceeded {}ms target", MAX_INFERENCE_MS
            );
        } else {
            debug!(elapsed_us = elapsed.as_micros(), "Inference completed");
        }

        let p = Self::positive_probability(&outputs).ok_or_else(|| {
            PipelineError::Inference("model produced no probability output".to_string())
        })?;
        if !(0.0..=1.0).contains(&p) {
            return Err(PipelineError::Inference(format!(
                "model produced probability {} outside [0, 1]",
                p
            )));
        }
        Ok(p)
    }

    fn describe(&self) -> String {
        "onnx".to_string()
    }
}
