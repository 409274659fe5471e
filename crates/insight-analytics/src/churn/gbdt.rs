//! Gradient-boosted decision trees for binary classification
//!
//! Trees are fitted to the gradient and hessian of the logistic loss and
//! grown level by level with exact greedy splits. Feature columns are held
//! sparsely: only non-zero cells are stored and scanned, zeros are handled
//! as one aggregated bucket. One-hot encoded frames are mostly zeros.
//!
//! Author: hephaex@gmail.com

use serde::{Deserialize, Serialize};

use insight_core::{InsightError, Result};

// ============================================================================
// Feature rows
// ============================================================================

/// Read access to one feature vector
pub trait FeatureLookup {
    /// Value of feature `index`, zero when absent
    fn feature(&self, index: usize) -> f64;
}

impl FeatureLookup for [f64] {
    fn feature(&self, index: usize) -> f64 {
        self.get(index).copied().unwrap_or(0.0)
    }
}

/// Feature vector storing only its non-zero cells, ordered by feature index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseRow {
    entries: Vec<(usize, f64)>,
}

impl SparseRow {
    /// Build from `(feature, value)` pairs; zeros are dropped, a repeated
    /// feature keeps its last value
    pub fn from_entries(entries: impl IntoIterator<Item = (usize, f64)>) -> Self {
        let mut entries: Vec<(usize, f64)> = entries.into_iter().collect();
        entries.sort_by_key(|(index, _)| *index);
        let mut deduped: Vec<(usize, f64)> = Vec::with_capacity(entries.len());
        for (index, value) in entries {
            match deduped.last_mut() {
                Some(last) if last.0 == index => last.1 = value,
                _ => deduped.push((index, value)),
            }
        }
        deduped.retain(|(_, value)| *value != 0.0);
        Self { entries: deduped }
    }

    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    /// Expand to a dense vector of `width` features
    pub fn to_dense(&self, width: usize) -> Vec<f64> {
        let mut dense = vec![0.0; width];
        for &(index, value) in &self.entries {
            if index < width {
                dense[index] = value;
            }
        }
        dense
    }
}

impl FeatureLookup for SparseRow {
    fn feature(&self, index: usize) -> f64 {
        self.entries
            .binary_search_by_key(&index, |(i, _)| *i)
            .map(|pos| self.entries[pos].1)
            .unwrap_or(0.0)
    }
}

// ============================================================================
// Model
// ============================================================================

/// Boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// L2 regularization on leaf weights
    pub lambda: f64,
    /// Minimum hessian sum on each side of a split
    pub min_child_weight: f64,
    /// Initial probability before any tree
    pub base_score: f64,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            max_depth: 3,
            learning_rate: 0.3,
            lambda: 1.0,
            min_child_weight: 1.0,
            base_score: 0.5,
        }
    }
}

/// Tree node; children are indices into the owning tree's node list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        /// Rows with `value < threshold` go left
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One regression tree, root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<TreeNode>,
}

impl Tree {
    /// Leaf value reached by `row`
    pub fn evaluate<R: FeatureLookup + ?Sized>(&self, row: &R) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row.feature(*feature) < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], index: usize) -> usize {
            match &nodes[index] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        walk(&self.nodes, 0)
    }

    /// Children must point forward and stay in bounds, which also rules out
    /// cycles
    fn validate(&self) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree without nodes".to_string());
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split { left, right, .. } = node {
                for child in [*left, *right] {
                    if child <= index || child >= self.nodes.len() {
                        return Err(format!("node {index} has invalid child {child}"));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Boosted tree ensemble on the logistic loss
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtClassifier {
    params: GbdtParams,
    n_features: usize,
    trees: Vec<Tree>,
}

impl GbdtClassifier {
    /// Fit on `rows` with 0/1 `labels`
    pub fn fit(
        rows: &[SparseRow],
        labels: &[f64],
        n_features: usize,
        params: GbdtParams,
    ) -> Result<Self> {
        if rows.is_empty() {
            return Err(InsightError::training("no training rows"));
        }
        if rows.len() != labels.len() {
            return Err(InsightError::training(format!(
                "{} rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        if labels.iter().any(|&y| y != 0.0 && y != 1.0) {
            return Err(InsightError::training("labels must be 0 or 1"));
        }
        if !(params.base_score > 0.0 && params.base_score < 1.0) {
            return Err(InsightError::training("base_score must lie in (0, 1)"));
        }
        if let Some(row) = rows
            .iter()
            .find(|r| r.entries().iter().any(|(i, _)| *i >= n_features))
        {
            return Err(InsightError::training(format!(
                "row references feature beyond {n_features}: {:?}",
                row.entries().last()
            )));
        }

        let columns = ColumnIndex::build(rows, n_features);
        let base_margin = logit(params.base_score);
        let mut margins = vec![base_margin; rows.len()];
        let mut grad = vec![0.0; rows.len()];
        let mut hess = vec![0.0; rows.len()];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for round in 0..params.n_estimators {
            for i in 0..rows.len() {
                let p = sigmoid(margins[i]);
                grad[i] = p - labels[i];
                hess[i] = (p * (1.0 - p)).max(1e-16);
            }

            let tree = grow_tree(&columns, &grad, &hess, &params);
            for (margin, row) in margins.iter_mut().zip(rows) {
                *margin += tree.evaluate(row);
            }
            tracing::trace!(round, nodes = tree.nodes.len(), "Fitted tree");
            trees.push(tree);
        }

        Ok(Self {
            params,
            n_features,
            trees,
        })
    }

    /// Probability of the positive class
    pub fn predict_proba<R: FeatureLookup + ?Sized>(&self, row: &R) -> f64 {
        let margin = logit(self.params.base_score)
            + self.trees.iter().map(|t| t.evaluate(row)).sum::<f64>();
        sigmoid(margin)
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn params(&self) -> &GbdtParams {
        &self.params
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    /// Serialize as JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| InsightError::training(format!("Failed to serialize model: {e}")))
    }

    /// Parse a JSON model and check its tree structure
    pub fn from_json(json: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(json)
            .map_err(|e| InsightError::Prediction(format!("Invalid model file: {e}")))?;
        for (i, tree) in model.trees.iter().enumerate() {
            tree.validate()
                .map_err(|e| InsightError::Prediction(format!("Invalid tree {i}: {e}")))?;
        }
        Ok(model)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

// ============================================================================
// Tree growing
// ============================================================================

/// Per-feature non-zero cells, sorted by value
struct ColumnIndex {
    columns: Vec<Vec<(f64, usize)>>,
}

impl ColumnIndex {
    fn build(rows: &[SparseRow], n_features: usize) -> Self {
        let mut columns: Vec<Vec<(f64, usize)>> = vec![Vec::new(); n_features];
        for (row_index, row) in rows.iter().enumerate() {
            for &(feature, value) in row.entries() {
                columns[feature].push((value, row_index));
            }
        }
        for column in &mut columns {
            column.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        }
        Self { columns }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct GradStats {
    g: f64,
    h: f64,
    count: usize,
}

impl GradStats {
    fn add(&mut self, g: f64, h: f64) {
        self.g += g;
        self.h += h;
        self.count += 1;
    }

    fn minus(&self, other: &GradStats) -> GradStats {
        GradStats {
            g: self.g - other.g,
            h: self.h - other.h,
            count: self.count - other.count,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Left-to-right sweep state of one node over one feature
#[derive(Debug, Clone, Copy, Default)]
struct Sweep {
    g_left: f64,
    h_left: f64,
    previous: Option<f64>,
    zero_done: bool,
}

fn score(g: f64, h: f64, lambda: f64) -> f64 {
    g * g / (h + lambda)
}

fn leaf_weight(stats: &GradStats, params: &GbdtParams) -> f64 {
    -stats.g / (stats.h + params.lambda) * params.learning_rate
}

fn midpoint(low: f64, high: f64) -> f64 {
    let mid = low + (high - low) / 2.0;
    if mid > low {
        mid
    } else {
        high
    }
}

fn grow_tree(columns: &ColumnIndex, grad: &[f64], hess: &[f64], params: &GbdtParams) -> Tree {
    let n = grad.len();
    let mut nodes = vec![TreeNode::Leaf { value: 0.0 }];
    let mut frontier: Vec<usize> = vec![0];
    let mut slot_of: Vec<Option<usize>> = vec![Some(0); n];

    for depth in 0..=params.max_depth {
        let mut totals = vec![GradStats::default(); frontier.len()];
        for row in 0..n {
            if let Some(slot) = slot_of[row] {
                totals[slot].add(grad[row], hess[row]);
            }
        }

        let splits = if depth < params.max_depth {
            find_splits(columns, grad, hess, &slot_of, &totals, params)
        } else {
            vec![None; frontier.len()]
        };

        let mut next_frontier = Vec::new();
        let mut children: Vec<Option<(usize, usize)>> = vec![None; frontier.len()];
        for (slot, split) in splits.iter().enumerate() {
            let id = frontier[slot];
            match split {
                None => {
                    nodes[id] = TreeNode::Leaf {
                        value: leaf_weight(&totals[slot], params),
                    };
                }
                Some(split) => {
                    let left = nodes.len();
                    nodes.push(TreeNode::Leaf { value: 0.0 });
                    nodes.push(TreeNode::Leaf { value: 0.0 });
                    nodes[id] = TreeNode::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left,
                        right: left + 1,
                    };
                    children[slot] = Some((next_frontier.len(), next_frontier.len() + 1));
                    next_frontier.push(left);
                    next_frontier.push(left + 1);
                }
            }
        }

        if next_frontier.is_empty() {
            break;
        }

        // Rows without a stored cell for the split feature hold zero
        let mut next_slot = vec![None; n];
        for row in 0..n {
            let Some(slot) = slot_of[row] else { continue };
            if let (Some(split), Some((left, right))) = (&splits[slot], children[slot]) {
                next_slot[row] = Some(if 0.0 < split.threshold { left } else { right });
            }
        }
        for (slot, split) in splits.iter().enumerate() {
            let (Some(split), Some((left, right))) = (split, children[slot]) else {
                continue;
            };
            for &(value, row) in &columns.columns[split.feature] {
                if slot_of[row] == Some(slot) {
                    next_slot[row] = Some(if value < split.threshold { left } else { right });
                }
            }
        }

        slot_of = next_slot;
        frontier = next_frontier;
    }

    Tree { nodes }
}

/// Best split per frontier node, `None` where no split has positive gain
fn find_splits(
    columns: &ColumnIndex,
    grad: &[f64],
    hess: &[f64],
    slot_of: &[Option<usize>],
    totals: &[GradStats],
    params: &GbdtParams,
) -> Vec<Option<SplitCandidate>> {
    let slots = totals.len();
    let mut best: Vec<Option<SplitCandidate>> = vec![None; slots];
    let mut non_zero = vec![GradStats::default(); slots];
    let mut sweeps = vec![Sweep::default(); slots];

    for (feature, column) in columns.columns.iter().enumerate() {
        if column.is_empty() {
            continue;
        }

        non_zero.fill(GradStats::default());
        for &(_, row) in column {
            if let Some(slot) = slot_of[row] {
                non_zero[slot].add(grad[row], hess[row]);
            }
        }
        sweeps.fill(Sweep::default());

        for &(value, row) in column {
            let Some(slot) = slot_of[row] else { continue };
            let sweep = &mut sweeps[slot];
            if value > 0.0 && !sweep.zero_done {
                sweep_zeros(sweep, &mut best[slot], feature, &totals[slot], &non_zero[slot], params);
            }
            sweep_value(sweep, &mut best[slot], feature, value, grad[row], hess[row], &totals[slot], params);
        }

        // Nodes whose cells were all negative still owe their zero bucket
        for slot in 0..slots {
            if !sweeps[slot].zero_done {
                sweep_zeros(&mut sweeps[slot], &mut best[slot], feature, &totals[slot], &non_zero[slot], params);
            }
        }
    }

    best
}

fn sweep_zeros(
    sweep: &mut Sweep,
    best: &mut Option<SplitCandidate>,
    feature: usize,
    total: &GradStats,
    non_zero: &GradStats,
    params: &GbdtParams,
) {
    sweep.zero_done = true;
    let zeros = total.minus(non_zero);
    if zeros.count > 0 {
        sweep_value(sweep, best, feature, 0.0, zeros.g, zeros.h, total, params);
    }
}

#[allow(clippy::too_many_arguments)]
fn sweep_value(
    sweep: &mut Sweep,
    best: &mut Option<SplitCandidate>,
    feature: usize,
    value: f64,
    g: f64,
    h: f64,
    total: &GradStats,
    params: &GbdtParams,
) {
    if let Some(previous) = sweep.previous {
        if previous < value {
            consider(best, feature, midpoint(previous, value), sweep.g_left, sweep.h_left, total, params);
        }
    }
    sweep.g_left += g;
    sweep.h_left += h;
    sweep.previous = Some(value);
}

fn consider(
    best: &mut Option<SplitCandidate>,
    feature: usize,
    threshold: f64,
    g_left: f64,
    h_left: f64,
    total: &GradStats,
    params: &GbdtParams,
) {
    let g_right = total.g - g_left;
    let h_right = total.h - h_left;
    if h_left < params.min_child_weight || h_right < params.min_child_weight {
        return;
    }

    let gain = score(g_left, h_left, params.lambda) + score(g_right, h_right, params.lambda)
        - score(total.g, total.h, params.lambda);
    if gain <= 1e-12 {
        return;
    }
    if best.map_or(true, |b| gain > b.gain) {
        *best = Some(SplitCandidate {
            feature,
            threshold,
            gain,
        });
    }
}
