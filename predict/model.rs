use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- Public Data Structures ---
// These structs define the human-readable format of a trained regressor inside the
// TOML model artifact. Training happens elsewhere; this crate only evaluates them.

/// Anything that maps one normalized feature vector to a continuous score.
///
/// The inference engine only talks to models through this trait, so tests and callers
/// can substitute their own scorer without building a full artifact file.
pub trait Scorer: Send + Sync {
    /// The width of the input vector the scorer was trained on.
    fn n_features(&self) -> usize;

    /// Scores a single row. `row.len()` must equal `n_features()`.
    fn score_row(&self, row: ArrayView1<'_, f64>) -> f64;

    /// Scores every row of `x` (shape `[n_students, n_features]`), preserving row order.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.outer_iter().map(|row| self.score_row(row)).collect()
    }
}

/// An ordinary linear model: `intercept + coefficients · x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressor {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

/// One node of a binary regression tree, stored in a flat array.
///
/// Children always live at a higher index than their parent, which is checked when the
/// artifact is loaded and guarantees that traversal terminates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        /// Where a NaN feature value is routed.
        #[serde(default)]
        missing_left: bool,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

/// An additive ensemble of regression trees, as produced by histogram-based gradient
/// boosting. Leaf values are already scaled by the learning rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub n_features: usize,
    pub baseline: f64,
    #[serde(default)]
    pub trees: Vec<RegressionTree>,
}

/// The model families an artifact may carry. The `kind` key selects the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Regressor {
    Linear(LinearRegressor),
    GradientBoosting(TreeEnsemble),
}

/// Structural problems found while validating a regressor.
#[derive(Error, Debug, PartialEq)]
pub enum ModelError {
    #[error("Model parameter '{0}' is not a finite number.")]
    NonFiniteParameter(String),
    #[error("Tree {tree} has no nodes.")]
    EmptyTree { tree: usize },
    #[error("Tree {tree}, node {node}: {reason}")]
    InvalidNode {
        tree: usize,
        node: usize,
        reason: String,
    },
}

impl Scorer for LinearRegressor {
    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn score_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.intercept + row.dot(&ArrayView1::from(self.coefficients.as_slice()))
    }
}

impl RegressionTree {
    /// Walks the tree from the root to a leaf and returns the leaf value.
    pub fn leaf_value(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    missing_left,
                } => {
                    let x = row[*feature];
                    index = if x.is_nan() {
                        if *missing_left { *left } else { *right }
                    } else if x <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    fn validate(&self, tree: usize, n_features: usize) -> Result<(), ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::EmptyTree { tree });
        }
        let invalid = |node: usize, reason: String| ModelError::InvalidNode { tree, node, reason };

        for (node, entry) in self.nodes.iter().enumerate() {
            match entry {
                TreeNode::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(invalid(node, "leaf value is not finite".to_string()));
                    }
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(invalid(
                            node,
                            format!("split feature {feature} is outside the {n_features} model inputs"),
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(invalid(node, "split threshold is not finite".to_string()));
                    }
                    for child in [*left, *right] {
                        if child <= node || child >= self.nodes.len() {
                            return Err(invalid(
                                node,
                                format!(
                                    "child index {child} must be after the node and below {}",
                                    self.nodes.len()
                                ),
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl Scorer for TreeEnsemble {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn score_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.baseline + self.trees.iter().map(|tree| tree.leaf_value(row)).sum::<f64>()
    }
}

impl Regressor {
    /// The `kind` tag used in the artifact file.
    pub fn family(&self) -> &'static str {
        match self {
            Regressor::Linear(_) => "linear",
            Regressor::GradientBoosting(_) => "gradient_boosting",
        }
    }

    /// Checks every parameter so that scoring can never index out of bounds or loop.
    pub fn validate(&self) -> Result<(), ModelError> {
        match self {
            Regressor::Linear(linear) => {
                if !linear.intercept.is_finite() {
                    return Err(ModelError::NonFiniteParameter("intercept".to_string()));
                }
                if let Some(j) = linear.coefficients.iter().position(|c| !c.is_finite()) {
                    return Err(ModelError::NonFiniteParameter(format!("coefficients[{j}]")));
                }
                Ok(())
            }
            Regressor::GradientBoosting(ensemble) => {
                if !ensemble.baseline.is_finite() {
                    return Err(ModelError::NonFiniteParameter("baseline".to_string()));
                }
                for (i, tree) in ensemble.trees.iter().enumerate() {
                    tree.validate(i, ensemble.n_features)?;
                }
                Ok(())
            }
        }
    }
}

impl Scorer for Regressor {
    fn n_features(&self) -> usize {
        match self {
            Regressor::Linear(linear) => linear.n_features(),
            Regressor::GradientBoosting(ensemble) => ensemble.n_features(),
        }
    }

    fn score_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        match self {
            Regressor::Linear(linear) => linear.score_row(row),
            Regressor::GradientBoosting(ensemble) => ensemble.score_row(row),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{stump_ensemble, two_feature_linear};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn linear_regressor_scores_each_row() {
        let model = two_feature_linear();
        let x = array![[0.0, 0.0], [1.0, 0.0], [0.5, -1.0]];
        let scores = model.predict(x.view());

        assert_eq!(scores.len(), 3);
        assert_abs_diff_eq!(scores[0], 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(scores[1], 3.5, epsilon = 1e-12);
        assert_abs_diff_eq!(scores[2], 2.6, epsilon = 1e-12);
    }

    #[test]
    fn tree_ensemble_follows_thresholds_and_missing_direction() {
        let model = stump_ensemble();

        // Split on feature 0 at 0.0: left leaf -0.5, right leaf +0.5, NaN goes left.
        assert_abs_diff_eq!(model.score_row(array![-0.2, 9.0].view()), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(model.score_row(array![0.0, 9.0].view()), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(model.score_row(array![0.1, 9.0].view()), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(
            model.score_row(array![f64::NAN, 9.0].view()),
            2.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn empty_ensemble_predicts_baseline() {
        let model = TreeEnsemble {
            n_features: 3,
            baseline: 2.75,
            trees: Vec::new(),
        };
        assert_abs_diff_eq!(model.score_row(array![1.0, 2.0, 3.0].view()), 2.75);
    }

    #[test]
    fn validation_rejects_backward_child_pointers() {
        let model = Regressor::GradientBoosting(TreeEnsemble {
            n_features: 1,
            baseline: 0.0,
            trees: vec![RegressionTree {
                nodes: vec![
                    TreeNode::Split {
                        feature: 0,
                        threshold: 0.0,
                        left: 1,
                        right: 0,
                        missing_left: false,
                    },
                    TreeNode::Leaf { value: 1.0 },
                ],
            }],
        });

        match model.validate() {
            Err(ModelError::InvalidNode { tree, node, .. }) => {
                assert_eq!(tree, 0);
                assert_eq!(node, 0);
            }
            other => panic!("Expected InvalidNode, got {other:?}"),
        }
    }

    #[test]
    fn validation_rejects_out_of_range_split_feature() {
        let mut ensemble = stump_ensemble();
        ensemble.n_features = 0;
        let err = Regressor::GradientBoosting(ensemble).validate().unwrap_err();
        assert!(matches!(err, ModelError::InvalidNode { node: 0, .. }));
    }

    #[test]
    fn validation_rejects_non_finite_coefficients() {
        let model = Regressor::Linear(LinearRegressor {
            intercept: 1.0,
            coefficients: vec![0.3, f64::INFINITY],
        });
        assert_eq!(
            model.validate(),
            Err(ModelError::NonFiniteParameter("coefficients[1]".to_string()))
        );
    }

    #[test]
    fn regressor_dispatches_to_its_family() {
        let linear = Regressor::Linear(two_feature_linear());
        let trees = Regressor::GradientBoosting(stump_ensemble());

        assert_eq!(linear.family(), "linear");
        assert_eq!(trees.family(), "gradient_boosting");
        assert_eq!(linear.n_features(), 2);
        assert_eq!(trees.n_features(), 2);
        assert_abs_diff_eq!(linear.score_row(array![1.0, 1.0].view()), 3.9, epsilon = 1e-12);
    }
}
