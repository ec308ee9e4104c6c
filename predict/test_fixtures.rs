//! Test fixtures shared by the unit tests.
//!
//! Small hand-checkable models and raw mark tables, so that each test module does not
//! rebuild the same boilerplate.

use crate::artifact::ModelArtifact;
use crate::model::{LinearRegressor, Regressor, RegressionTree, TreeEnsemble, TreeNode};
use polars::prelude::*;

/// `2.5 + 1.0 * x0 + 0.4 * x1`
pub fn two_feature_linear() -> LinearRegressor {
    LinearRegressor {
        intercept: 2.5,
        coefficients: vec![1.0, 0.4],
    }
}

/// A single stump on feature 0 at threshold 0.0: -0.5 on the left (and for NaN),
/// +0.5 on the right, around a baseline of 2.5.
pub fn stump_ensemble() -> TreeEnsemble {
    TreeEnsemble {
        n_features: 2,
        baseline: 2.5,
        trees: vec![RegressionTree {
            nodes: vec![
                TreeNode::Split {
                    feature: 0,
                    threshold: 0.0,
                    left: 1,
                    right: 2,
                    missing_left: true,
                },
                TreeNode::Leaf { value: -0.5 },
                TreeNode::Leaf { value: 0.5 },
            ],
        }],
    }
}

pub fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// A linear artifact over `MATH, ENG` using `two_feature_linear`.
pub fn math_eng_artifact() -> ModelArtifact {
    ModelArtifact::new(
        Regressor::Linear(two_feature_linear()),
        columns(&["MATH", "ENG"]),
    )
    .unwrap()
}

/// Builds a long-format mark table with the default `Emplid, Name, Course, Mark`
/// header. Marks are strings so that non-numeric cells can be expressed.
pub fn raw_frame(rows: &[(&str, &str, &str, &str)]) -> DataFrame {
    let ids: Vec<&str> = rows.iter().map(|r| r.0).collect();
    let names: Vec<&str> = rows.iter().map(|r| r.1).collect();
    let courses: Vec<&str> = rows.iter().map(|r| r.2).collect();
    let marks: Vec<&str> = rows.iter().map(|r| r.3).collect();
    df!(
        "Emplid" => ids,
        "Name" => names,
        "Course" => courses,
        "Mark" => marks
    )
    .unwrap()
}

/// The three-row scenario used throughout: Alice has MATH and ENG, Bob only MATH.
pub fn alice_bob_frame() -> DataFrame {
    raw_frame(&[
        ("S1", "Alice", "MATH", "80"),
        ("S1", "Alice", "ENG", "60"),
        ("S2", "Bob", "MATH", "40"),
    ])
}
