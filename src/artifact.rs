use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::features::FeatureConfig;

pub const ARTIFACT_VERSION: u32 = 1;
pub const CLASS_COUNT: usize = 3;

/// Trained model exported by the offline pipeline. The JSON layout is the
/// contract: standardization stats travel with the weights so inference can
/// never drift from training.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelArtifact {
    pub version: u32,
    pub feature_names: Vec<String>,
    pub feature_means: Vec<f64>,
    pub feature_scales: Vec<f64>,
    /// Class labels in the trainer's encoding order (alphabetical: draw, loss, win).
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linear: Option<LinearModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trees: Option<TreeEnsemble>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provenance: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearModel {
    /// One row of weights per class, each as long as the feature vector.
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeEnsemble {
    /// Per-class margin before any tree contributes.
    pub base_scores: Vec<f64>,
    /// Tree t adds its leaf to class t mod 3.
    pub trees: Vec<Tree>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    /// Feature index split on, or -1 for a leaf.
    pub feature: i32,
    pub threshold: f64,
    pub left: u32,
    pub right: u32,
    /// Leaf output. Ignored on interior nodes.
    pub value: f64,
}

impl ModelArtifact {
    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    pub fn config(&self) -> Option<FeatureConfig> {
        FeatureConfig::from_names(&self.feature_names)
    }

    pub fn class_index(&self, label: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == label)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != ARTIFACT_VERSION {
            bail!(
                "model artifact version {} does not match supported version {}",
                self.version,
                ARTIFACT_VERSION
            );
        }
        let n = self.feature_count();
        if n == 0 {
            bail!("model artifact declares no features");
        }
        if self.feature_means.len() != n || self.feature_scales.len() != n {
            bail!(
                "feature stats misaligned: {} names, {} means, {} scales",
                n,
                self.feature_means.len(),
                self.feature_scales.len()
            );
        }
        if self.feature_scales.iter().any(|s| !s.is_finite() || *s == 0.0) {
            bail!("feature scales must be finite and nonzero");
        }
        if self.classes.len() != CLASS_COUNT {
            bail!("expected {} classes, found {}", CLASS_COUNT, self.classes.len());
        }
        for label in ["win", "draw", "loss"] {
            if self.class_index(label).is_none() {
                bail!("class list {:?} is missing '{label}'", self.classes);
            }
        }
        match (&self.linear, &self.trees) {
            (None, None) => bail!("model artifact carries neither linear weights nor trees"),
            (Some(_), Some(_)) => bail!("model artifact carries both linear weights and trees"),
            (Some(linear), None) => validate_linear(linear, n)?,
            (None, Some(trees)) => validate_trees(trees, n)?,
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<ModelArtifact> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read model artifact {}", path.display()))?;
        let artifact: ModelArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("parse model artifact {}", path.display()))?;
        artifact
            .validate()
            .with_context(|| format!("validate model artifact {}", path.display()))?;
        Ok(artifact)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate().context("refusing to save an invalid model artifact")?;
        let json = serde_json::to_string_pretty(self).context("serialize model artifact")?;
        write_atomic(path, &json)
    }
}

fn validate_linear(linear: &LinearModel, features: usize) -> Result<()> {
    if linear.coefficients.len() != CLASS_COUNT || linear.intercepts.len() != CLASS_COUNT {
        bail!(
            "linear model shape: {} coefficient rows, {} intercepts, want {}",
            linear.coefficients.len(),
            linear.intercepts.len(),
            CLASS_COUNT
        );
    }
    for (idx, row) in linear.coefficients.iter().enumerate() {
        if row.len() != features {
            bail!("coefficient row {idx} has {} weights, want {features}", row.len());
        }
    }
    Ok(())
}

fn validate_trees(ensemble: &TreeEnsemble, features: usize) -> Result<()> {
    if ensemble.base_scores.len() != CLASS_COUNT {
        bail!("tree ensemble carries {} base scores, want {}", ensemble.base_scores.len(), CLASS_COUNT);
    }
    if ensemble.trees.is_empty() {
        bail!("tree ensemble carries no trees");
    }
    for (t, tree) in ensemble.trees.iter().enumerate() {
        if tree.nodes.is_empty() {
            bail!("tree {t} has no nodes");
        }
        let len = tree.nodes.len() as u32;
        for (i, node) in tree.nodes.iter().enumerate() {
            if node.feature >= 0 {
                if node.feature as usize >= features {
                    bail!("tree {t} node {i} splits on feature {} of {features}", node.feature);
                }
                if node.left >= len || node.right >= len {
                    bail!("tree {t} node {i} points past the node table");
                }
            }
        }
    }
    Ok(())
}

/// Write through a sibling tmp file so readers never observe a torn artifact.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename {} into place", tmp.display()))?;
    Ok(())
}
