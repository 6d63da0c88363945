//! The `SpatialPooler` maps dense boolean input vectors onto sparse sets of
//! active columns:
//! - Every column owns a fixed potential pool, a random subset of the input
//!   space chosen once at construction.
//! - Each pooled synapse carries a permanence value; at or above the
//!   permanence threshold the synapse is connected.
//! - A column's overlap score counts its connected synapses whose input bit
//!   is ON.
//! - Inhibition is global: the columns with the highest overlap scores win,
//!   and exactly as many as configured, so every output has the same
//!   cardinality.
//! - Learning nudges the pooled permanences of the winning columns toward the
//!   input: ON bits gain, OFF bits lose, always clipped to [0, 1].
//!
//! Repeated inputs thereby tune columns onto the patterns they keep winning,
//! which stabilizes the sparse representation over time.

use super::error::{RegionError, Result};
use rand::{rngs::StdRng, seq::IteratorRandom, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// A potential synapse of one column into the input space.
#[derive(Clone, Copy, Debug)]
pub struct InputSynapse {
    /// Which input bit this synapse connects to.
    pub input: usize,

    /// Strength of the connection; connected at or above the permanence threshold.
    pub permanence: f32,
}

/// Hyperparameters for building a `SpatialPooler`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpatialPoolerParams {
    /// Width of the input vectors fed into `compute`.
    pub input_width: usize,

    /// Number of columns.
    pub column_count: usize,

    /// Number of columns active in every output.
    pub active_column_count: usize,

    /// Fraction of the input space each column can potentially connect to.
    pub potential_pct: f64,

    /// Permanence at or above which a synapse counts as connected.
    pub permanence_threshold: f32,

    /// Permanence gain for pooled synapses whose input bit was ON.
    pub active_increment: f32,

    /// Permanence loss for pooled synapses whose input bit was OFF.
    pub inactive_decrement: f32,

    /// Seed for the pooler-owned random number generator.
    pub seed: u64,
}

impl Default for SpatialPoolerParams {
    fn default() -> Self {
        Self {
            input_width: 1024,
            column_count: 2048,
            active_column_count: 40,
            potential_pct: 0.5,
            permanence_threshold: 0.1,
            active_increment: 0.05,
            inactive_decrement: 0.008,
            seed: 23,
        }
    }
}

impl SpatialPoolerParams {
    /// Checks every hyperparameter range, naming the offending parameter.
    pub fn validate(&self) -> Result<()> {
        if self.input_width == 0 {
            return Err(invalid("input_width", "must be positive"));
        }
        if self.column_count == 0 {
            return Err(invalid("column_count", "must be positive"));
        }
        if self.active_column_count == 0 || self.active_column_count > self.column_count {
            return Err(invalid(
                "active_column_count",
                "must lie in 1..=column_count",
            ));
        }
        if !(self.potential_pct > 0.0 && self.potential_pct <= 1.0) {
            return Err(invalid("potential_pct", "must lie in (0, 1]"));
        }
        if self.pool_size() == 0 {
            return Err(invalid(
                "potential_pct",
                "rounds to an empty potential pool for this input width",
            ));
        }
        if !(self.permanence_threshold > 0.0 && self.permanence_threshold <= 1.0) {
            return Err(invalid("permanence_threshold", "must lie in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.active_increment) {
            return Err(invalid("active_increment", "must lie in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.inactive_decrement) {
            return Err(invalid("inactive_decrement", "must lie in [0, 1]"));
        }
        Ok(())
    }

    /// Number of pooled synapses per column.
    fn pool_size(&self) -> usize {
        ((self.input_width as f64 * self.potential_pct) + 0.5) as usize
    }
}

fn invalid(name: &'static str, message: &str) -> RegionError {
    RegionError::InvalidParameter {
        name,
        message: message.to_string(),
    }
}

/// The spatial pooler: a set of columns competing to represent the input
/// space. Pooled synapses live in one flat, column-strided vec; each column's
/// pool occupies a contiguous range at a fixed stride.
pub struct SpatialPooler {
    input_width: usize,
    column_count: usize,
    active_column_count: usize,
    potential_pct: f64,
    permanence_threshold: f32,
    active_increment: f32,
    inactive_decrement: f32,
    /// Pooled synapses per column; the stride of `synapses`.
    synapses_per_column: usize,
    /// All pooled synapses, column by column.
    synapses: Vec<InputSynapse>,
    /// Overlap score per column from the most recent `compute`.
    overlaps: Vec<usize>,
}

impl SpatialPooler {
    /// Builds a pooler from validated hyperparameters: samples each column's
    /// potential pool without replacement and initializes the pooled
    /// permanences from a normal distribution centered at the permanence
    /// threshold (standard deviation a quarter of it), clipped to [0, 1].
    pub fn new(params: SpatialPoolerParams) -> Result<Self> {
        params.validate()?;
        let synapses_per_column = params.pool_size();
        let mut rand = StdRng::seed_from_u64(params.seed);
        let init = Normal::new(params.permanence_threshold, 0.25 * params.permanence_threshold)
            .map_err(|err| invalid("permanence_threshold", &err.to_string()))?;
        let mut synapses = Vec::with_capacity(params.column_count * synapses_per_column);
        for _ in 0..params.column_count {
            let mut pool = (0..params.input_width).choose_multiple(&mut rand, synapses_per_column);
            pool.sort_unstable();
            for input in pool {
                let permanence = init.sample(&mut rand).clamp(0.0, 1.0);
                synapses.push(InputSynapse { input, permanence });
            }
        }
        Ok(Self {
            input_width: params.input_width,
            column_count: params.column_count,
            active_column_count: params.active_column_count,
            potential_pct: params.potential_pct,
            permanence_threshold: params.permanence_threshold,
            active_increment: params.active_increment,
            inactive_decrement: params.inactive_decrement,
            synapses_per_column,
            synapses,
            overlaps: vec![0; params.column_count],
        })
    }

    /// Processes one input vector and returns the sorted indices of the
    /// active columns, always exactly `active_column_count` of them. With
    /// `learn` set, the winning columns adapt their pooled permanences.
    pub fn compute(&mut self, input_pattern: &[bool], learn: bool) -> Result<Vec<usize>> {
        if input_pattern.len() != self.input_width {
            return Err(RegionError::ShapeMismatch {
                expected: self.input_width,
                actual: input_pattern.len(),
            });
        }
        self.calculate_overlaps(input_pattern);
        let active_columns = self.select_active_columns();
        if learn {
            self.adapt_synapses(input_pattern, &active_columns);
        }
        Ok(active_columns)
    }

    /// Dense boolean form of `compute`, one flag per column.
    pub fn compute_dense(&mut self, input_pattern: &[bool], learn: bool) -> Result<Vec<bool>> {
        let active_columns = self.compute(input_pattern, learn)?;
        let mut dense = vec![false; self.column_count];
        for column in active_columns {
            dense[column] = true;
        }
        Ok(dense)
    }

    /// Counts, per column, the connected pooled synapses whose input bit is ON.
    fn calculate_overlaps(&mut self, input_pattern: &[bool]) {
        for column in 0..self.column_count {
            self.overlaps[column] = self
                .column_pool(column)
                .iter()
                .filter(|synapse| synapse.permanence >= self.permanence_threshold && input_pattern[synapse.input])
                .count();
        }
    }

    /// Global inhibition: the columns with the highest overlap scores win.
    /// Equal scores resolve toward the lower column index.
    fn select_active_columns(&self) -> Vec<usize> {
        let mut candidates: Vec<usize> = (0..self.column_count).collect();
        candidates.sort_unstable_by(|&a, &b| self.overlaps[b].cmp(&self.overlaps[a]).then(a.cmp(&b)));
        candidates.truncate(self.active_column_count);
        candidates.sort_unstable();
        candidates
    }

    /// Adjusts the pooled synapses of each winner column: ON input bits gain
    /// `active_increment`, OFF bits lose `inactive_decrement`, clipped to
    /// [0, 1]. Bits outside a column's pool are never touched.
    fn adapt_synapses(&mut self, input_pattern: &[bool], active_columns: &[usize]) {
        for &column in active_columns {
            let first = column * self.synapses_per_column;
            for synapse in &mut self.synapses[first..first + self.synapses_per_column] {
                if input_pattern[synapse.input] {
                    synapse.permanence = (synapse.permanence + self.active_increment).min(1.0);
                } else {
                    synapse.permanence = (synapse.permanence - self.inactive_decrement).max(0.0);
                }
            }
        }
    }

    /// The pooled synapses of one column.
    pub fn column_pool(&self, column: usize) -> &[InputSynapse] {
        let first = column * self.synapses_per_column;
        &self.synapses[first..first + self.synapses_per_column]
    }

    /// Overlap scores of the most recent `compute`, one per column.
    #[inline]
    pub fn overlap_scores(&self) -> &[usize] {
        &self.overlaps
    }

    /// Number of active columns every output contains.
    #[inline]
    pub fn width(&self) -> usize {
        self.active_column_count
    }

    /// Width of the input vectors this pooler accepts.
    #[inline]
    pub fn input_width(&self) -> usize {
        self.input_width
    }

    /// Number of columns.
    #[inline]
    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Number of pooled synapses per column.
    #[inline]
    pub fn synapses_per_column(&self) -> usize {
        self.synapses_per_column
    }

    /// Fraction of the input space each column pools from.
    #[inline]
    pub fn potential_pct(&self) -> f64 {
        self.potential_pct
    }

    /// Permanence gain for pooled synapses whose input bit was ON.
    #[inline]
    pub fn active_increment(&self) -> f32 {
        self.active_increment
    }

    /// Updates the permanence gain for ON input bits.
    pub fn set_active_increment(&mut self, value: f32) {
        self.active_increment = value;
    }

    /// Permanence loss for pooled synapses whose input bit was OFF.
    #[inline]
    pub fn inactive_decrement(&self) -> f32 {
        self.inactive_decrement
    }

    /// Updates the permanence loss for OFF input bits.
    pub fn set_inactive_decrement(&mut self, value: f32) {
        self.inactive_decrement = value;
    }

    /// Permanence at or above which a pooled synapse counts as connected.
    #[inline]
    pub fn permanence_threshold(&self) -> f32 {
        self.permanence_threshold
    }

    /// Updates the connection threshold.
    pub fn set_permanence_threshold(&mut self, value: f32) {
        self.permanence_threshold = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> SpatialPoolerParams {
        SpatialPoolerParams {
            input_width: 64,
            column_count: 32,
            active_column_count: 8,
            potential_pct: 0.5,
            permanence_threshold: 0.2,
            active_increment: 0.05,
            inactive_decrement: 0.01,
            seed: 23,
        }
    }

    #[test]
    fn new_rejects_invalid_params() {
        let cases = [
            SpatialPoolerParams {
                input_width: 0,
                ..small_params()
            },
            SpatialPoolerParams {
                column_count: 0,
                ..small_params()
            },
            SpatialPoolerParams {
                active_column_count: 0,
                ..small_params()
            },
            SpatialPoolerParams {
                active_column_count: 33,
                ..small_params()
            },
            SpatialPoolerParams {
                potential_pct: 0.0,
                ..small_params()
            },
            SpatialPoolerParams {
                potential_pct: 1.1,
                ..small_params()
            },
            SpatialPoolerParams {
                permanence_threshold: 0.0,
                ..small_params()
            },
            SpatialPoolerParams {
                active_increment: 1.5,
                ..small_params()
            },
            SpatialPoolerParams {
                inactive_decrement: -0.2,
                ..small_params()
            },
        ];
        for params in cases {
            assert!(matches!(
                SpatialPooler::new(params),
                Err(RegionError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn tiny_potential_pct_rounds_to_empty_pool() {
        let params = SpatialPoolerParams {
            input_width: 10,
            potential_pct: 0.01,
            ..small_params()
        };
        assert!(matches!(
            SpatialPooler::new(params),
            Err(RegionError::InvalidParameter { name: "potential_pct", .. })
        ));
    }

    #[test]
    fn pools_are_fixed_distinct_and_in_range() {
        let sp = SpatialPooler::new(small_params()).unwrap();
        assert_eq!(sp.synapses_per_column(), 32);
        for column in 0..sp.column_count() {
            let pool = sp.column_pool(column);
            assert_eq!(pool.len(), 32);
            let mut inputs: Vec<usize> = pool.iter().map(|s| s.input).collect();
            assert!(inputs.iter().all(|&input| input < sp.input_width()));
            inputs.dedup();
            assert_eq!(inputs.len(), 32, "pool indices must be distinct");
            for synapse in pool {
                assert!((0.0..=1.0).contains(&synapse.permanence));
            }
        }
    }

    #[test]
    fn identical_seeds_build_identical_pools() {
        let a = SpatialPooler::new(small_params()).unwrap();
        let b = SpatialPooler::new(small_params()).unwrap();
        for column in 0..a.column_count() {
            let pool_a = a.column_pool(column);
            let pool_b = b.column_pool(column);
            for (syn_a, syn_b) in pool_a.iter().zip(pool_b) {
                assert_eq!(syn_a.input, syn_b.input);
                assert_eq!(syn_a.permanence, syn_b.permanence);
            }
        }
    }

    #[test]
    fn compute_rejects_wrong_input_width() {
        let mut sp = SpatialPooler::new(small_params()).unwrap();
        let input = vec![true; 63];
        assert!(matches!(
            sp.compute(&input, false),
            Err(RegionError::ShapeMismatch { expected: 64, actual: 63 })
        ));
    }

    #[test]
    fn compute_emits_exactly_the_configured_cardinality() {
        let mut sp = SpatialPooler::new(small_params()).unwrap();
        let inputs = [vec![false; 64], vec![true; 64], {
            let mut half = vec![false; 64];
            for bit in half.iter_mut().step_by(2) {
                *bit = true;
            }
            half
        }];
        for input in inputs {
            let active = sp.compute(&input, false).unwrap();
            assert_eq!(active.len(), 8);
            assert!(active.windows(2).all(|pair| pair[0] < pair[1]));
            assert!(active.iter().all(|&column| column < 32));
        }
    }

    #[test]
    fn selection_is_overlap_monotonic() {
        let mut sp = SpatialPooler::new(small_params()).unwrap();
        let mut input = vec![false; 64];
        for bit in input.iter_mut().step_by(3) {
            *bit = true;
        }
        let active = sp.compute(&input, false).unwrap();
        let scores = sp.overlap_scores();
        let boundary = active.iter().map(|&column| scores[column]).min().unwrap();
        for column in 0..sp.column_count() {
            if !active.contains(&column) {
                assert!(scores[column] <= boundary);
            }
        }
        // At the boundary score, the selected columns are exactly the
        // lowest-indexed ones.
        let selected_at: Vec<usize> = active.iter().copied().filter(|&c| scores[c] == boundary).collect();
        let unselected_at: Vec<usize> = (0..sp.column_count())
            .filter(|&c| scores[c] == boundary && !active.contains(&c))
            .collect();
        if let (Some(&max_selected), Some(&min_unselected)) =
            (selected_at.iter().max(), unselected_at.iter().min())
        {
            assert!(max_selected < min_unselected);
        }
    }

    #[test]
    fn all_zero_overlaps_select_the_lowest_columns() {
        let mut sp = SpatialPooler::new(small_params()).unwrap();
        let input = vec![false; 64];
        let active = sp.compute(&input, false).unwrap();
        assert_eq!(active, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn saturated_winners_clip_at_the_ceiling() {
        let mut sp = SpatialPooler::new(small_params()).unwrap();
        let input = vec![true; 64];
        // With every input bit ON the first winners only gain overlap, so the
        // winner set is stable and saturates.
        for _ in 0..100 {
            sp.compute(&input, true).unwrap();
        }
        let active = sp.compute(&input, false).unwrap();
        for &column in &active {
            for synapse in sp.column_pool(column) {
                assert!((synapse.permanence - 1.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn learning_moves_winner_permanences_and_clips() {
        let mut sp = SpatialPooler::new(small_params()).unwrap();
        let mut input = vec![false; 64];
        for bit in input.iter_mut().take(32) {
            *bit = true;
        }
        let active = sp.compute(&input, false).unwrap();
        let before: Vec<Vec<f32>> = active
            .iter()
            .map(|&column| sp.column_pool(column).iter().map(|s| s.permanence).collect())
            .collect();
        sp.compute(&input, true).unwrap();
        for (&column, old) in active.iter().zip(&before) {
            for (synapse, &was) in sp.column_pool(column).iter().zip(old) {
                assert!((0.0..=1.0).contains(&synapse.permanence));
                if input[synapse.input] {
                    assert!(synapse.permanence >= was);
                } else {
                    assert!(synapse.permanence <= was);
                }
            }
        }
    }

    #[test]
    fn learning_never_touches_other_columns_or_pools() {
        let mut sp = SpatialPooler::new(small_params()).unwrap();
        let input = vec![true; 64];
        let active = sp.compute(&input, false).unwrap();
        let untouched: Vec<usize> = (0..sp.column_count()).filter(|c| !active.contains(c)).collect();
        let before: Vec<Vec<f32>> = untouched
            .iter()
            .map(|&column| sp.column_pool(column).iter().map(|s| s.permanence).collect())
            .collect();
        let pools_before: Vec<Vec<usize>> = (0..sp.column_count())
            .map(|column| sp.column_pool(column).iter().map(|s| s.input).collect())
            .collect();
        sp.compute(&input, true).unwrap();
        for (&column, old) in untouched.iter().zip(&before) {
            for (synapse, &was) in sp.column_pool(column).iter().zip(old) {
                assert_eq!(synapse.permanence, was);
            }
        }
        // The potential pools themselves never change.
        for column in 0..sp.column_count() {
            let now: Vec<usize> = sp.column_pool(column).iter().map(|s| s.input).collect();
            assert_eq!(now, pools_before[column]);
        }
    }

    #[test]
    fn compute_dense_matches_sparse_output() {
        let mut sp = SpatialPooler::new(small_params()).unwrap();
        let input = vec![true; 64];
        let active = sp.compute(&input, false).unwrap();
        let dense = sp.compute_dense(&input, false).unwrap();
        assert_eq!(dense.len(), sp.column_count());
        for column in 0..sp.column_count() {
            assert_eq!(dense[column], active.contains(&column));
        }
    }

    #[test]
    fn accessors_and_setters_roundtrip() {
        let mut sp = SpatialPooler::new(small_params()).unwrap();
        assert_eq!(sp.width(), 8);
        assert_eq!(sp.input_width(), 64);
        assert!((sp.potential_pct() - 0.5).abs() < 1e-9);
        sp.set_active_increment(0.1);
        sp.set_inactive_decrement(0.02);
        sp.set_permanence_threshold(0.3);
        assert!((sp.active_increment() - 0.1).abs() < 1e-6);
        assert!((sp.inactive_decrement() - 0.02).abs() < 1e-6);
        assert!((sp.permanence_threshold() - 0.3).abs() < 1e-6);
    }
}
