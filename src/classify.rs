use anyhow::{Context, Result, bail};

use crate::artifact::{LinearModel, ModelArtifact, Tree, TreeEnsemble};
use crate::features::{self, FeatureConfig, TeamContext};
use crate::match_state::{MatchState, Prob3};

/// A trained backend scoring a standardized vector. Outputs stay in the
/// artifact's class order until the caller maps them to outcomes.
pub trait Classifier: Send + Sync {
    fn classify(&self, z: &[f64]) -> [f64; 3];
}

pub fn standardize(raw: &[f64], means: &[f64], scales: &[f64]) -> Vec<f64> {
    raw.iter()
        .zip(means.iter().zip(scales))
        .map(|(x, (mean, scale))| (x - mean) / scale)
        .collect()
}

/// Max-subtracted softmax keeps huge logits from overflowing the exp.
pub fn softmax3(logits: [f64; 3]) -> [f64; 3] {
    let mx = logits[0].max(logits[1]).max(logits[2]);
    let e0 = (logits[0] - mx).exp();
    let e1 = (logits[1] - mx).exp();
    let e2 = (logits[2] - mx).exp();
    let den = (e0 + e1 + e2).max(1e-12);
    [e0 / den, e1 / den, e2 / den]
}

pub struct LinearClassifier {
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

impl LinearClassifier {
    pub fn new(model: &LinearModel) -> LinearClassifier {
        LinearClassifier {
            coefficients: model.coefficients.clone(),
            intercepts: model.intercepts.clone(),
        }
    }
}

impl Classifier for LinearClassifier {
    fn classify(&self, z: &[f64]) -> [f64; 3] {
        let mut logits = [0.0; 3];
        for (c, row) in self.coefficients.iter().enumerate() {
            let mut acc = self.intercepts[c];
            for (w, x) in row.iter().zip(z) {
                acc += w * x;
            }
            logits[c] = acc;
        }
        softmax3(logits)
    }
}

pub struct TreeClassifier {
    base_scores: [f64; 3],
    trees: Vec<Tree>,
}

impl TreeClassifier {
    pub fn new(ensemble: &TreeEnsemble) -> TreeClassifier {
        TreeClassifier {
            base_scores: [ensemble.base_scores[0], ensemble.base_scores[1], ensemble.base_scores[2]],
            trees: ensemble.trees.clone(),
        }
    }
}

fn eval_tree(tree: &Tree, z: &[f64]) -> f64 {
    let mut idx = 0usize;
    loop {
        let node = tree.nodes[idx];
        if node.feature < 0 {
            return node.value;
        }
        let x = z[node.feature as usize];
        idx = if x < node.threshold { node.left as usize } else { node.right as usize };
    }
}

impl Classifier for TreeClassifier {
    fn classify(&self, z: &[f64]) -> [f64; 3] {
        let mut margins = self.base_scores;
        // Round-robin: tree t belongs to class t mod 3.
        for (t, tree) in self.trees.iter().enumerate() {
            margins[t % 3] += eval_tree(tree, z);
        }
        softmax3(margins)
    }
}

/// Positions of the three outcomes inside the artifact's class list.
#[derive(Debug, Clone, Copy)]
struct ClassOrder {
    win: usize,
    draw: usize,
    loss: usize,
}

impl ClassOrder {
    fn resolve(artifact: &ModelArtifact) -> Result<ClassOrder> {
        let position = |label: &str| {
            artifact
                .class_index(label)
                .with_context(|| format!("class list {:?} is missing '{label}'", artifact.classes))
        };
        Ok(ClassOrder {
            win: position("win")?,
            draw: position("draw")?,
            loss: position("loss")?,
        })
    }
}

/// Standardizer plus backend bound to one artifact. The loaded feature
/// config fixes which raw vector `predict` assembles.
pub struct Predictor {
    config: FeatureConfig,
    means: Vec<f64>,
    scales: Vec<f64>,
    order: ClassOrder,
    backend: Box<dyn Classifier>,
}

impl Predictor {
    pub fn from_artifact(artifact: &ModelArtifact) -> Result<Predictor> {
        artifact.validate()?;
        let Some(config) = artifact.config() else {
            bail!("unsupported feature set {:?}", artifact.feature_names);
        };
        let order = ClassOrder::resolve(artifact)?;
        let backend: Box<dyn Classifier> = if let Some(linear) = &artifact.linear {
            Box::new(LinearClassifier::new(linear))
        } else if let Some(trees) = &artifact.trees {
            Box::new(TreeClassifier::new(trees))
        } else {
            bail!("model artifact carries no backend");
        };
        Ok(Predictor {
            config,
            means: artifact.feature_means.clone(),
            scales: artifact.feature_scales.clone(),
            order,
            backend,
        })
    }

    pub fn config(&self) -> FeatureConfig {
        self.config
    }

    /// Score a raw feature vector already laid out in this model's order.
    pub fn predict_vector(&self, raw: &[f64]) -> Result<Prob3> {
        if raw.len() != self.means.len() {
            bail!("feature vector has {} values, model wants {}", raw.len(), self.means.len());
        }
        let z = standardize(raw, &self.means, &self.scales);
        let probs = self.backend.classify(&z);
        Ok(Prob3 {
            win: probs[self.order.win],
            draw: probs[self.order.draw],
            loss: probs[self.order.loss],
        })
    }

    /// Extract features for this model's config and score them.
    pub fn predict(&self, state: &MatchState, ctx: &TeamContext) -> Result<Prob3> {
        let raw = features::extract(state, ctx, self.config);
        self.predict_vector(&raw)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::artifact::{ARTIFACT_VERSION, TreeNode};
    use crate::features::SCORECARD_FEATURES;

    fn artifact_with(linear: Option<LinearModel>, trees: Option<TreeEnsemble>) -> ModelArtifact {
        let n = SCORECARD_FEATURES.len();
        ModelArtifact {
            version: ARTIFACT_VERSION,
            feature_names: SCORECARD_FEATURES.iter().map(|s| s.to_string()).collect(),
            feature_means: vec![0.0; n],
            feature_scales: vec![1.0; n],
            classes: vec!["draw".into(), "loss".into(), "win".into()],
            linear,
            trees,
            provenance: vec![],
        }
    }

    #[test]
    fn standardize_centers_and_scales() {
        let z = standardize(&[10.0, 4.0], &[8.0, 4.0], &[2.0, 0.5]);
        assert_abs_diff_eq!(z[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn softmax_normalizes_and_orders() {
        let p = softmax3([0.0, 2.0_f64.ln(), 3.0_f64.ln()]);
        assert_abs_diff_eq!(p[0], 1.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p[1], 2.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p[2], 3.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p[0] + p[1] + p[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn softmax_survives_huge_logits() {
        let p = softmax3([1e9, -1e9, 0.0]);
        assert!(p.iter().all(|v| v.is_finite() && *v >= 0.0 && *v <= 1.0));
        assert_abs_diff_eq!(p[0], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn intercept_only_model_reproduces_class_ratios() {
        let n = SCORECARD_FEATURES.len();
        let artifact = artifact_with(
            Some(LinearModel {
                coefficients: vec![vec![0.0; n]; 3],
                intercepts: vec![0.0, 2.0_f64.ln(), 3.0_f64.ln()],
            }),
            None,
        );
        let predictor = Predictor::from_artifact(&artifact).unwrap();
        let probs = predictor.predict_vector(&vec![0.0; n]).unwrap();
        // Classes are [draw, loss, win]: draw 1/6, loss 2/6, win 3/6.
        assert_abs_diff_eq!(probs.draw, 1.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(probs.loss, 2.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(probs.win, 3.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn class_order_follows_the_artifact_not_the_struct() {
        let n = SCORECARD_FEATURES.len();
        let mut artifact = artifact_with(
            Some(LinearModel {
                coefficients: vec![vec![0.0; n]; 3],
                intercepts: vec![3.0_f64.ln(), 0.0, 2.0_f64.ln()],
            }),
            None,
        );
        artifact.classes = vec!["win".into(), "draw".into(), "loss".into()];
        let predictor = Predictor::from_artifact(&artifact).unwrap();
        let probs = predictor.predict_vector(&vec![0.0; n]).unwrap();
        assert_abs_diff_eq!(probs.win, 3.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(probs.draw, 1.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(probs.loss, 2.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn single_split_trees_route_to_the_expected_leaves() {
        // One tree per class. Each splits on feature 0 at 0.0 and pays 1.0
        // on the high side, so positive inputs tilt all margins equally.
        let stump = |low: f64, high: f64| Tree {
            nodes: vec![
                TreeNode { feature: 0, threshold: 0.0, left: 1, right: 2, value: 0.0 },
                TreeNode { feature: -1, threshold: 0.0, left: 0, right: 0, value: low },
                TreeNode { feature: -1, threshold: 0.0, left: 0, right: 0, value: high },
            ],
        };
        let artifact = artifact_with(
            None,
            Some(TreeEnsemble {
                base_scores: vec![0.0; 3],
                trees: vec![stump(0.0, 2.0_f64.ln()), stump(0.0, 0.0), stump(0.0, 0.0)],
            }),
        );
        let predictor = Predictor::from_artifact(&artifact).unwrap();

        let n = SCORECARD_FEATURES.len();
        let mut raw = vec![0.5; n];
        // feature 0 above threshold: draw margin ln2, others 0 -> draw 0.5.
        let high = predictor.predict_vector(&raw).unwrap();
        assert_abs_diff_eq!(high.draw, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(high.loss, 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(high.win, 0.25, epsilon = 1e-12);

        raw[0] = -0.5;
        let low = predictor.predict_vector(&raw).unwrap();
        assert_abs_diff_eq!(low.draw, 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn vector_length_is_checked() {
        let n = SCORECARD_FEATURES.len();
        let artifact = artifact_with(
            Some(LinearModel { coefficients: vec![vec![0.0; n]; 3], intercepts: vec![0.0; 3] }),
            None,
        );
        let predictor = Predictor::from_artifact(&artifact).unwrap();
        assert!(predictor.predict_vector(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn probabilities_stay_clean_for_extreme_states() {
        let n = SCORECARD_FEATURES.len();
        let artifact = artifact_with(
            Some(LinearModel {
                coefficients: vec![vec![1.0; n], vec![-1.0; n], vec![0.5; n]],
                intercepts: vec![0.1, -0.1, 0.0],
            }),
            None,
        );
        let predictor = Predictor::from_artifact(&artifact).unwrap();
        for raw in [vec![1e9; n], vec![-1e9; n], vec![0.0; n]] {
            let p = predictor.predict_vector(&raw).unwrap();
            assert!(p.win.is_finite() && p.draw.is_finite() && p.loss.is_finite());
            assert!(p.win >= 0.0 && p.draw >= 0.0 && p.loss >= 0.0);
            assert_abs_diff_eq!(p.sum(), 1.0, epsilon = 1e-9);
        }
    }
}
