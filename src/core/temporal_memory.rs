//! The `TemporalMemory` layer learns and predicts temporal sequences.
//!
//! At a high level, it models a set of columns, where each column contains
//! multiple cells, and every cell owns dendritic segments built from synapses
//! to other cells (see the `cell` module). The layer consumes the active
//! columns produced by spatial pooling and learns which cell activity tends to
//! follow which.
//!
//! Column:
//! - A group of cells that share the same feed-forward input.
//! - The active columns of a step are the layer's external input.
//!
//! Cell:
//! - An individual unit within a column, addressed here by its flat index
//!   (`column * cells_per_column + cell`).
//! - Different cells of the same column represent the same input in different
//!   sequence contexts.
//!
//! Bursting:
//! - When a column becomes active without any of its cells having been
//!   predicted, every cell in the column activates.
//! - Bursting marks unlearned transitions; it fades as the sequence is learned.
//!
//! Winner cells:
//! - The cells allowed to learn for their column in a step: every correctly
//!   predicted cell, or a single chosen cell in a bursting column.
//! - Winner cells are the growth targets that future steps connect to.
//!
//! How a step works:
//! - The previous step's active and winner cells are snapshotted; learning
//!   only ever reads these snapshots.
//! - Columns with predicted cells activate exactly those cells; the remaining
//!   active columns burst.
//! - Each bursting column picks its winner once the step's full active set is
//!   known: the cell whose segment best matches the active set, or the cell
//!   with the fewest segments when nothing matches. Ties go to the lower
//!   index, so a step is reproducible.
//! - Correctly predicted cells reinforce the segments that predicted them;
//!   the winner of a bursting column reinforces its best matching segment or
//!   grows a new one toward the previous winners; cells that predicted a
//!   column that stayed inactive are punished.
//! - Finally every cell re-evaluates its segments against the new active set,
//!   which produces the predictive states the next step starts from.

use super::{
    cell::{Cell, CellConfig},
    error::{RegionError, Result},
};
use fxhash::FxHashSet;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::mem;

/// Hyperparameters for building a `TemporalMemory` layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemporalMemoryParams {
    /// Number of columns in the layer.
    pub column_count: usize,

    /// Number of cells per column.
    pub cells_per_column: usize,

    /// Connected overlap a segment needs to become active.
    pub activation_threshold: usize,

    /// Potential overlap a segment needs to count as matching.
    pub min_active: usize,

    /// Permanence at or above which a synapse counts as connected.
    pub permanence_threshold: f32,

    /// Permanence assigned to newly grown synapses.
    pub initial_permanence: f32,

    /// Permanence gain for synapses into cells that were active.
    pub permanence_increment: f32,

    /// Permanence loss for synapses into cells that were not active,
    /// and for punished synapses after a false prediction.
    pub permanence_decrement: f32,

    /// Sample size for synapse growth on a segment per learning step.
    pub max_new_synapses: usize,

    /// Hard cap on segments per cell.
    pub max_segments_per_cell: usize,

    /// Hard cap on synapses per segment.
    pub max_synapses_per_segment: usize,

    /// Seed for the layer-owned random number generator.
    pub seed: u64,
}

impl Default for TemporalMemoryParams {
    fn default() -> Self {
        Self {
            column_count: 2048,
            cells_per_column: 32,
            activation_threshold: 13,
            min_active: 10,
            permanence_threshold: 0.5,
            initial_permanence: 0.21,
            permanence_increment: 0.1,
            permanence_decrement: 0.1,
            max_new_synapses: 20,
            max_segments_per_cell: 255,
            max_synapses_per_segment: 255,
            seed: 45,
        }
    }
}

impl TemporalMemoryParams {
    /// Checks every hyperparameter range, naming the offending parameter.
    pub fn validate(&self) -> Result<()> {
        if self.column_count == 0 {
            return Err(invalid("column_count", "must be positive"));
        }
        if self.cells_per_column == 0 {
            return Err(invalid("cells_per_column", "must be positive"));
        }
        if self.activation_threshold == 0 {
            return Err(invalid("activation_threshold", "must be at least 1"));
        }
        if self.min_active == 0 {
            return Err(invalid("min_active", "must be at least 1"));
        }
        if self.max_new_synapses == 0 {
            return Err(invalid("max_new_synapses", "must be at least 1"));
        }
        if self.max_segments_per_cell == 0 {
            return Err(invalid("max_segments_per_cell", "must be at least 1"));
        }
        if self.max_synapses_per_segment == 0 {
            return Err(invalid("max_synapses_per_segment", "must be at least 1"));
        }
        if !(self.permanence_threshold > 0.0 && self.permanence_threshold <= 1.0) {
            return Err(invalid("permanence_threshold", "must lie in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.initial_permanence) {
            return Err(invalid("initial_permanence", "must lie in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.permanence_increment) {
            return Err(invalid("permanence_increment", "must lie in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.permanence_decrement) {
            return Err(invalid("permanence_decrement", "must lie in [0, 1]"));
        }
        Ok(())
    }
}

fn invalid(name: &'static str, message: &str) -> RegionError {
    RegionError::InvalidParameter {
        name,
        message: message.to_string(),
    }
}

/// A layer of columns whose cells learn transitions between successive
/// active-column sets and predict which cells fire next.
pub struct TemporalMemory {
    /// A seeded pseudo-random number generator driving synapse sampling.
    rand: StdRng,
    column_count: usize,
    cells_per_column: usize,
    permanence_threshold: f32,
    initial_permanence: f32,
    permanence_increment: f32,
    permanence_decrement: f32,
    max_new_synapses: usize,
    /// Every cell of the layer, indexed flat.
    cells: Vec<Cell>,
    /// Active cells of the most recent step, sorted.
    active_cells: Vec<usize>,
    /// Winner cells of the most recent step, sorted.
    winner_cells: Vec<usize>,
    /// Columns that burst in the most recent step, sorted.
    bursting_columns: Vec<usize>,
}

impl TemporalMemory {
    /// Builds a layer from validated hyperparameters.
    pub fn new(params: TemporalMemoryParams) -> Result<Self> {
        params.validate()?;
        let config = CellConfig {
            permanence_threshold: params.permanence_threshold,
            activation_threshold: params.activation_threshold,
            min_active: params.min_active,
            max_segments: params.max_segments_per_cell,
            max_synapses_per_segment: params.max_synapses_per_segment,
        };
        let cells = (0..params.column_count * params.cells_per_column)
            .map(|_| Cell::new(config))
            .collect();
        Ok(Self {
            rand: StdRng::seed_from_u64(params.seed),
            column_count: params.column_count,
            cells_per_column: params.cells_per_column,
            permanence_threshold: params.permanence_threshold,
            initial_permanence: params.initial_permanence,
            permanence_increment: params.permanence_increment,
            permanence_decrement: params.permanence_decrement,
            max_new_synapses: params.max_new_synapses,
            cells,
            active_cells: Vec::new(),
            winner_cells: Vec::new(),
            bursting_columns: Vec::new(),
        })
    }

    /// Processes one step of feed-forward input and returns the sorted flat
    /// indices of the now-active cells and of the cells predicted for the
    /// next step. With `learn` set, segments adapt along the way.
    pub fn compute(&mut self, active_columns: &[usize], learn: bool) -> Result<(Vec<usize>, Vec<usize>)> {
        for &column in active_columns {
            if column >= self.column_count {
                return Err(RegionError::IndexOutOfBounds {
                    index: column,
                    size: self.column_count,
                });
            }
        }
        let mut columns = active_columns.to_vec();
        columns.sort_unstable();
        columns.dedup();

        // Snapshot of the previous step; learning below only reads these.
        let prev_active = mem::take(&mut self.active_cells);
        let prev_winners = mem::take(&mut self.winner_cells);
        let prev_active_set: FxHashSet<usize> = prev_active.iter().copied().collect();

        let mut active = Vec::new();
        let mut winners = Vec::new();
        let mut bursting = Vec::new();
        let mut predicted_active = Vec::new();

        // Predicted cells capture their columns; columns without any
        // predicted cell burst, activating every cell.
        for &column in &columns {
            let first = column * self.cells_per_column;
            let cells = first..first + self.cells_per_column;
            let predicted: Vec<usize> = cells.clone().filter(|&cell| self.cells[cell].predictive()).collect();
            if predicted.is_empty() {
                bursting.push(column);
                active.extend(cells);
            } else {
                active.extend(predicted.iter().copied());
                winners.extend(predicted.iter().copied());
                predicted_active.extend(predicted);
            }
        }
        let active_set: FxHashSet<usize> = active.iter().copied().collect();

        // One winner per bursting column, chosen against the step's full
        // active set: the cell owning the segment with the highest positive
        // potential overlap, otherwise the cell with the fewest segments.
        // Ties go to the lower cell (and segment) index.
        for &column in &bursting {
            let first = column * self.cells_per_column;
            let mut best: Option<(usize, usize)> = None;
            let mut best_potential = 0;
            for cell in first..first + self.cells_per_column {
                let potentials = self.cells[cell].active_potentials(&active_set);
                for (segment, &potential) in potentials.iter().enumerate() {
                    if potential > best_potential {
                        best_potential = potential;
                        best = Some((cell, segment));
                    }
                }
            }
            let winner = match best {
                Some((cell, segment)) => {
                    if learn {
                        self.cells[cell].adapt_segment(
                            segment,
                            &prev_winners,
                            self.max_new_synapses,
                            self.initial_permanence,
                            self.permanence_increment,
                            self.permanence_decrement,
                            &mut self.rand,
                        );
                    }
                    cell
                }
                None => {
                    let mut least_used = first;
                    for cell in first + 1..first + self.cells_per_column {
                        if self.cells[cell].num_segments() < self.cells[least_used].num_segments() {
                            least_used = cell;
                        }
                    }
                    if learn {
                        self.cells[least_used].create_segment(
                            self.max_new_synapses,
                            &prev_winners,
                            self.initial_permanence,
                            &mut self.rand,
                        );
                    }
                    least_used
                }
            };
            winners.push(winner);
        }

        if learn {
            // Correctly predicted cells reinforce the segments that
            // predicted them and keep sampling the previous winners.
            for &cell in &predicted_active {
                self.cells[cell].adapt_active_segments(
                    &prev_active_set,
                    self.max_new_synapses,
                    &prev_winners,
                    self.initial_permanence,
                    self.permanence_increment,
                    self.permanence_decrement,
                    &mut self.rand,
                );
            }
            // Cells that predicted a column that stayed inactive made a
            // false prediction and get punished.
            let column_set: FxHashSet<usize> = columns.iter().copied().collect();
            for column in 0..self.column_count {
                if column_set.contains(&column) {
                    continue;
                }
                let first = column * self.cells_per_column;
                for cell in first..first + self.cells_per_column {
                    if self.cells[cell].predictive() {
                        self.cells[cell].punish_matching_segments(&prev_active_set, self.permanence_decrement);
                    }
                }
            }
        }

        // Re-evaluate segment activity against the new active set; this
        // yields the predictive states the next step starts from.
        for cell in &mut self.cells {
            cell.activate_segments(&active_set);
        }

        active.sort_unstable();
        winners.sort_unstable();
        self.active_cells = active;
        self.winner_cells = winners;
        self.bursting_columns = bursting;

        let predicted = self.predictive_cells();
        Ok((self.active_cells.clone(), predicted))
    }

    /// Clears all transient state: active, winner and bursting sets plus the
    /// segment activity of every cell. Learned segments stay untouched. Call
    /// between unrelated sequences.
    pub fn reset(&mut self) {
        self.active_cells.clear();
        self.winner_cells.clear();
        self.bursting_columns.clear();
        for cell in &mut self.cells {
            cell.reset();
        }
    }

    /// Sorted flat indices of the cells active in the most recent step.
    #[inline]
    pub fn active_cells(&self) -> &[usize] {
        &self.active_cells
    }

    /// Sorted flat indices of the winner cells of the most recent step.
    #[inline]
    pub fn winner_cells(&self) -> &[usize] {
        &self.winner_cells
    }

    /// Columns that burst in the most recent step, sorted.
    #[inline]
    pub fn bursting_columns(&self) -> &[usize] {
        &self.bursting_columns
    }

    /// Sorted flat indices of every cell currently in the predictive state.
    pub fn predictive_cells(&self) -> Vec<usize> {
        (0..self.cells.len())
            .filter(|&cell| self.cells[cell].predictive())
            .collect()
    }

    /// Columns containing at least one predictive cell, sorted.
    pub fn predicted_columns(&self) -> Vec<usize> {
        let mut columns: Vec<usize> = self
            .predictive_cells()
            .iter()
            .map(|cell| cell / self.cells_per_column)
            .collect();
        columns.dedup();
        columns
    }

    /// The cell at (column, index within the column).
    pub fn cell(&self, column: usize, cell: usize) -> &Cell {
        &self.cells[column * self.cells_per_column + cell]
    }

    /// Number of columns in the layer.
    #[inline]
    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Number of cells per column.
    #[inline]
    pub fn cells_per_column(&self) -> usize {
        self.cells_per_column
    }

    /// Total number of cells in the layer.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Permanence gain applied to reinforced synapses.
    #[inline]
    pub fn permanence_increment(&self) -> f32 {
        self.permanence_increment
    }

    /// Updates the permanence gain applied to reinforced synapses.
    pub fn set_permanence_increment(&mut self, value: f32) {
        self.permanence_increment = value;
    }

    /// Permanence loss applied to decayed and punished synapses.
    #[inline]
    pub fn permanence_decrement(&self) -> f32 {
        self.permanence_decrement
    }

    /// Updates the permanence loss applied to decayed and punished synapses.
    pub fn set_permanence_decrement(&mut self, value: f32) {
        self.permanence_decrement = value;
    }

    /// Permanence at or above which a synapse counts as connected.
    #[inline]
    pub fn permanence_threshold(&self) -> f32 {
        self.permanence_threshold
    }

    /// Updates the connection threshold on the layer and on every cell.
    pub fn set_permanence_threshold(&mut self, value: f32) {
        self.permanence_threshold = value;
        for cell in &mut self.cells {
            cell.set_permanence_threshold(value);
        }
    }
}
