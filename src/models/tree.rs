//! Native gradient-boosted tree ensemble.
//!
//! Reads the JSON tree dump of a binary:logistic XGBoost model wrapped as
//! `{ "model_type", "base_score", "feature_names"?, "trees": [...] }` and
//! scores it without an inference runtime. Split features are referenced as
//! `fN` (position in the feature list) or by feature name.

use crate::error::{InferenceError, LoadError};
use crate::features::normalizer::FeatureVector;
use crate::models::classifier::{check_feature_count, checked_probability, RiskClassifier};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Node of an XGBoost JSON dump
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DumpNode {
    Split {
        nodeid: u32,
        split: String,
        split_condition: f32,
        yes: u32,
        no: u32,
        missing: u32,
        children: Vec<DumpNode>,
    },
    Leaf {
        nodeid: u32,
        leaf: f32,
    },
}

impl DumpNode {
    fn nodeid(&self) -> u32 {
        match self {
            DumpNode::Split { nodeid, .. } | DumpNode::Leaf { nodeid, .. } => *nodeid,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DumpFile {
    #[serde(default)]
    model_type: Option<String>,
    #[serde(default = "default_base_score")]
    base_score: f64,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
    trees: Vec<DumpNode>,
}

fn default_base_score() -> f64 {
    0.5
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Split {
        feature: usize,
        threshold: f32,
        yes: usize,
        no: usize,
        missing: usize,
    },
    Leaf(f32),
}

/// One regression tree, root at index 0
#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn leaf_value(&self, features: &[f32]) -> f32 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    yes,
                    no,
                    missing,
                } => {
                    let x = features[*feature];
                    index = if x.is_nan() {
                        *missing
                    } else if x < *threshold {
                        *yes
                    } else {
                        *no
                    };
                }
            }
        }
    }
}

/// Gradient-boosted trees evaluated natively
#[derive(Debug, Clone)]
pub struct TreeEnsembleClassifier {
    trees: Vec<Tree>,
    base_margin: f64,
    feature_count: usize,
    model_type: String,
}

impl TreeEnsembleClassifier {
    /// Load a JSON tree dump and bind its split features to `feature_names`.
    pub fn load<P: AsRef<Path>>(path: P, feature_names: &[String]) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let classifier = Self::from_json(&contents, feature_names).map_err(|e| match e {
            LoadError::Malformed { reason, .. } => LoadError::Malformed {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;

        info!(
            path = %path.display(),
            trees = classifier.trees.len(),
            features = classifier.feature_count,
            model_type = %classifier.model_type,
            "Tree ensemble loaded"
        );
        Ok(classifier)
    }

    /// Parse a dump held in memory.
    pub fn from_json(contents: &str, feature_names: &[String]) -> Result<Self, LoadError> {
        let dump: DumpFile = serde_json::from_str(contents).map_err(|e| malformed(e.to_string()))?;

        if let Some(names) = &dump.feature_names {
            if names.len() != feature_names.len() {
                return Err(LoadError::FeatureCountMismatch {
                    model: names.len(),
                    schema: feature_names.len(),
                });
            }
            if let Some(position) = names.iter().zip(feature_names).position(|(a, b)| a != b) {
                return Err(malformed(format!(
                    "feature order differs at position {}: model has {:?}, list has {:?}",
                    position, names[position], feature_names[position]
                )));
            }
        }

        if dump.trees.is_empty() {
            return Err(malformed("ensemble has no trees".to_string()));
        }
        if !(dump.base_score > 0.0 && dump.base_score < 1.0) {
            return Err(malformed(format!(
                "base_score {} is not a probability in (0, 1)",
                dump.base_score
            )));
        }

        let index: HashMap<&str, usize> = feature_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let trees = dump
            .trees
            .iter()
            .map(|root| build_tree(root, &index, feature_names.len()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            trees,
            base_margin: (dump.base_score / (1.0 - dump.base_score)).ln(),
            feature_count: feature_names.len(),
            model_type: dump.model_type.unwrap_or_else(|| "xgboost".to_string()),
        })
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Raw margin before the logistic link.
    fn margin(&self, features: &[f32]) -> f64 {
        self.base_margin
            + self
                .trees
                .iter()
                .map(|tree| tree.leaf_value(features) as f64)
                .sum::<f64>()
    }
}

impl RiskClassifier for TreeEnsembleClassifier {
    fn score(&self, vector: &FeatureVector) -> Result<f64, InferenceError> {
        check_feature_count(self.feature_count, vector)?;
        let margin = self.margin(vector.as_slice());
        checked_probability(sigmoid(margin))
    }

    fn feature_count(&self) -> usize {
        self.feature_count
    }

    fn backend(&self) -> &'static str {
        "tree_ensemble"
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn malformed(reason: String) -> LoadError {
    LoadError::Malformed {
        path: PathBuf::new(),
        reason,
    }
}

/// Flatten a dump tree into an arena, checking that every branch target is
/// a direct child so evaluation always terminates.
fn build_tree(root: &DumpNode, index: &HashMap<&str, usize>, feature_count: usize) -> Result<Tree, LoadError> {
    let mut nodes = Vec::new();
    push_node(root, index, feature_count, &mut nodes)?;
    Ok(Tree { nodes })
}

fn push_node(
    node: &DumpNode,
    index: &HashMap<&str, usize>,
    feature_count: usize,
    nodes: &mut Vec<Node>,
) -> Result<usize, LoadError> {
    let position = nodes.len();

    match node {
        DumpNode::Leaf { leaf, .. } => {
            nodes.push(Node::Leaf(*leaf));
        }
        DumpNode::Split {
            nodeid,
            split,
            split_condition,
            yes,
            no,
            missing,
            children,
        } => {
            let feature = resolve_feature(split, index, feature_count)?;
            // Placeholder until children are placed.
            nodes.push(Node::Leaf(0.0));

            let mut child_positions = HashMap::new();
            for child in children {
                let child_position = push_node(child, index, feature_count, nodes)?;
                child_positions.insert(child.nodeid(), child_position);
            }

            let target = |id: &u32| {
                child_positions.get(id).copied().ok_or_else(|| {
                    malformed(format!("node {} branches to {} which is not a child", nodeid, id))
                })
            };

            nodes[position] = Node::Split {
                feature,
                threshold: *split_condition,
                yes: target(yes)?,
                no: target(no)?,
                missing: target(missing)?,
            };
        }
    }

    Ok(position)
}

fn resolve_feature(split: &str, index: &HashMap<&str, usize>, feature_count: usize) -> Result<usize, LoadError> {
    if let Some(&i) = index.get(split) {
        return Ok(i);
    }

    let position = split
        .strip_prefix('f')
        .and_then(|n| n.parse::<usize>().ok())
        .ok_or_else(|| malformed(format!("split references unknown feature {:?}", split)))?;

    if position >= feature_count {
        return Err(LoadError::FeatureCountMismatch {
            model: position + 1,
            schema: feature_count,
        });
    }
    Ok(position)
}
