//! Classifiers map sparse cell or column patterns back to the labels that
//! produced them:
//! - The `OverlapClassifier` keeps, per label, a count of how often each
//!   pattern bit appeared. Inference ranks labels by how many of the query's
//!   bits that label has ever seen. Saturated counts decay so stale bits
//!   eventually stop voting.
//! - The `FeedForwardClassifier` keeps, per label, a weight per pattern bit
//!   and learns them online from the prediction error. Inference sums the
//!   weights of the query's bits per label, squares the activations and
//!   normalizes them into a probability distribution, which emphasizes
//!   strong activations.
//!
//! Both classifiers intern labels in order of first appearance, and ties in
//! the rankings resolve toward the label seen first.

use super::error::{RegionError, Result};
use fnv::FnvHashMap;
use std::hash::Hash;

/// A small value used to prevent division by zero.
const EPSILON: f32 = 0.001;

/// Interns labels, assigning ids in order of first appearance.
struct LabelArena<L> {
    ids: FnvHashMap<L, usize>,
    labels: Vec<L>,
}

impl<L: Clone + Eq + Hash> LabelArena<L> {
    fn new() -> Self {
        Self {
            ids: FnvHashMap::default(),
            labels: Vec::new(),
        }
    }

    /// Returns the label's id, assigning the next free one on first sight.
    fn intern(&mut self, label: L) -> usize {
        if let Some(&id) = self.ids.get(&label) {
            return id;
        }
        let id = self.labels.len();
        self.ids.insert(label.clone(), id);
        self.labels.push(label);
        id
    }

    #[inline]
    fn label(&self, id: usize) -> &L {
        &self.labels[id]
    }

    #[inline]
    fn len(&self) -> usize {
        self.labels.len()
    }
}

/// Rejects patterns containing bits outside the classifier's width.
fn check_pattern(pattern: &[usize], width: usize) -> Result<()> {
    for &bit in pattern {
        if bit >= width {
            return Err(RegionError::IndexOutOfBounds {
                index: bit,
                size: width,
            });
        }
    }
    Ok(())
}

fn check_alpha(alpha: f32) -> Result<()> {
    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(RegionError::InvalidParameter {
            name: "alpha",
            message: "must lie in (0, 1]".to_string(),
        });
    }
    Ok(())
}

/// Associates labels with sparse patterns by counting, per label, how often
/// each bit appeared. `alpha` controls the decay ceiling: once any count of a
/// label exceeds `1 / alpha` times seen, the label's nonzero counts all drop
/// by their minimum, so long-unused bits fall back to zero.
pub struct OverlapClassifier<L> {
    arena: LabelArena<L>,
    /// Per label id, one appearance count per pattern bit.
    history: Vec<Vec<u32>>,
    pattern_width: usize,
    alpha: f32,
    max_times_seen: u32,
}

impl<L: Clone + Eq + Hash> OverlapClassifier<L> {
    /// Builds a classifier for patterns of `pattern_width` bits.
    pub fn new(pattern_width: usize, alpha: f32) -> Result<Self> {
        if pattern_width == 0 {
            return Err(RegionError::InvalidParameter {
                name: "pattern_width",
                message: "must be positive".to_string(),
            });
        }
        check_alpha(alpha)?;
        Ok(Self {
            arena: LabelArena::new(),
            history: Vec::new(),
            pattern_width,
            alpha,
            max_times_seen: (1.0 / alpha) as u32,
        })
    }

    /// Records one observation of `pattern` under `label`: the pattern's bits
    /// gain one appearance each, then the label's counts decay if any of them
    /// passed the ceiling.
    pub fn record(&mut self, label: L, pattern: &[usize]) -> Result<()> {
        check_pattern(pattern, self.pattern_width)?;
        let id = self.arena.intern(label);
        if id == self.history.len() {
            self.history.push(vec![0; self.pattern_width]);
        }
        let ceiling = self.max_times_seen;
        let counts = &mut self.history[id];
        for &bit in pattern {
            counts[bit] += 1;
        }
        if counts.iter().any(|&count| count > ceiling) {
            let min_seen = counts
                .iter()
                .copied()
                .filter(|&count| count > 0)
                .min()
                .unwrap_or(0);
            if min_seen != ceiling {
                for count in counts.iter_mut() {
                    if *count > 0 {
                        *count -= min_seen;
                    }
                }
            }
        }
        Ok(())
    }

    /// Ranks all recorded labels by how many of the query's bits they have
    /// seen, highest overlap first. Equal overlaps rank the earlier label
    /// first.
    pub fn infer(&self, pattern: &[usize]) -> Result<Vec<(L, usize)>> {
        check_pattern(pattern, self.pattern_width)?;
        let mut ranked: Vec<(usize, usize)> = self
            .history
            .iter()
            .enumerate()
            .map(|(id, counts)| {
                let overlap = pattern.iter().filter(|&&bit| counts[bit] > 0).count();
                (id, overlap)
            })
            .collect();
        ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(ranked
            .into_iter()
            .map(|(id, overlap)| (self.arena.label(id).clone(), overlap))
            .collect())
    }

    /// Number of distinct labels recorded so far.
    #[inline]
    pub fn num_labels(&self) -> usize {
        self.arena.len()
    }

    /// Width of the patterns this classifier accepts.
    #[inline]
    pub fn pattern_width(&self) -> usize {
        self.pattern_width
    }

    /// The decay rate.
    #[inline]
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Updates the decay rate and re-derives the count ceiling from it.
    pub fn set_alpha(&mut self, alpha: f32) -> Result<()> {
        check_alpha(alpha)?;
        self.alpha = alpha;
        self.max_times_seen = (1.0 / alpha) as u32;
        Ok(())
    }
}

/// A single-layer classifier over sparse patterns: one weight per label and
/// pattern bit, updated online from the prediction error. Inference sums the
/// weights of the query's bits per label, squares the activations and
/// normalizes them into a probability distribution.
pub struct FeedForwardClassifier<L> {
    arena: LabelArena<L>,
    /// Per label id, one weight per pattern bit.
    weights: Vec<Vec<f32>>,
    pattern_width: usize,
    alpha: f32,
}

impl<L: Clone + Eq + Hash> FeedForwardClassifier<L> {
    /// Builds a classifier for patterns of `pattern_width` bits with learning
    /// rate `alpha`.
    pub fn new(pattern_width: usize, alpha: f32) -> Result<Self> {
        if pattern_width == 0 {
            return Err(RegionError::InvalidParameter {
                name: "pattern_width",
                message: "must be positive".to_string(),
            });
        }
        check_alpha(alpha)?;
        Ok(Self {
            arena: LabelArena::new(),
            weights: Vec::new(),
            pattern_width,
            alpha,
        })
    }

    /// Records one observation: every label's weights on the pattern's bits
    /// move toward the target distribution (one for `label`, zero for the
    /// rest) in proportion to the prediction error.
    pub fn record(&mut self, label: L, pattern: &[usize]) -> Result<()> {
        check_pattern(pattern, self.pattern_width)?;
        let id = self.arena.intern(label);
        if id == self.weights.len() {
            self.weights.push(vec![0.0; self.pattern_width]);
        }
        let scores = self.scores(pattern);
        for (other, score) in scores.into_iter().enumerate() {
            let target = if other == id { 1.0 } else { 0.0 };
            let error = target - score;
            for &bit in pattern {
                self.weights[other][bit] += self.alpha * error;
            }
        }
        Ok(())
    }

    /// Ranks all recorded labels by probability, highest first. Equal
    /// probabilities rank the earlier label first.
    pub fn infer(&self, pattern: &[usize]) -> Result<Vec<(L, f32)>> {
        check_pattern(pattern, self.pattern_width)?;
        let mut ranked: Vec<(usize, f32)> = self.scores(pattern).into_iter().enumerate().collect();
        ranked.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(ranked
            .into_iter()
            .map(|(id, score)| (self.arena.label(id).clone(), score))
            .collect())
    }

    /// Per-label scores for a pattern: weighted sums of the active bits,
    /// squared and normalized. Activations below `EPSILON` drop to zero, so
    /// weakly or negatively activated labels never gain probability mass.
    fn scores(&self, pattern: &[usize]) -> Vec<f32> {
        let mut scores: Vec<f32> = self
            .weights
            .iter()
            .map(|row| pattern.iter().map(|&bit| row[bit]).sum())
            .collect();
        for value in scores.iter_mut() {
            if *value < EPSILON {
                *value = 0.0;
            } else {
                *value *= *value;
            }
        }
        let total: f32 = scores.iter().sum();
        if total > EPSILON {
            for value in scores.iter_mut() {
                *value /= total;
            }
        }
        scores
    }

    /// Number of distinct labels recorded so far.
    #[inline]
    pub fn num_labels(&self) -> usize {
        self.arena.len()
    }

    /// Width of the patterns this classifier accepts.
    #[inline]
    pub fn pattern_width(&self) -> usize {
        self.pattern_width
    }

    /// The learning rate.
    #[inline]
    pub fn alpha(&self) -> f32 {
        self.alpha
    }
}
