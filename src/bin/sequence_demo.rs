//! Character sequence demo.
//!
//! Feeds a repeating character sequence through the full pipeline, encoder
//! into spatial pooler into temporal memory into classifiers, and shows the
//! layer's next-step predictions converging onto the sequence: the bursting
//! column count falls toward zero as the transitions are learned.
//!
//! Usage:
//!   cargo run --bin sequence_demo

use htm_region::core::classifier::{FeedForwardClassifier, OverlapClassifier};
use htm_region::core::encoder::{CharacterEncoder, Encoder};
use htm_region::core::spatial_pooler::{SpatialPooler, SpatialPoolerParams};
use htm_region::core::temporal_memory::{TemporalMemory, TemporalMemoryParams};

const SEQUENCE: &str = "abcd";
const EPOCHS: usize = 10;

fn main() -> anyhow::Result<()> {
    let encoder = CharacterEncoder::default();
    let mut pooler = SpatialPooler::new(SpatialPoolerParams {
        input_width: encoder.width(),
        column_count: 1024,
        active_column_count: 20,
        ..SpatialPoolerParams::default()
    })?;
    let mut memory = TemporalMemory::new(TemporalMemoryParams {
        column_count: 1024,
        cells_per_column: 8,
        activation_threshold: 10,
        min_active: 8,
        initial_permanence: 0.55,
        ..TemporalMemoryParams::default()
    })?;
    let mut by_overlap = OverlapClassifier::new(memory.num_cells(), 0.01)?;
    let mut by_weights = FeedForwardClassifier::new(memory.num_cells(), 0.1)?;

    let chars: Vec<char> = SEQUENCE.chars().collect();
    println!("learning the sequence {:?} over {} epochs", SEQUENCE, EPOCHS);
    for epoch in 0..EPOCHS {
        let mut bursting = 0;
        for (position, &value) in chars.iter().enumerate() {
            let next = chars[(position + 1) % chars.len()];
            let input = encoder.encode_dense(value);
            let columns = pooler.compute(&input, true)?;
            memory.compute(&columns, true)?;
            bursting += memory.bursting_columns().len();
            by_overlap.record(next, memory.active_cells())?;
            by_weights.record(next, memory.active_cells())?;
        }
        println!("epoch {}: {} bursting columns", epoch, bursting);
    }

    println!("replaying without learning:");
    let mut hits = 0;
    for (position, &value) in chars.iter().enumerate() {
        let next = chars[(position + 1) % chars.len()];
        let input = encoder.encode_dense(value);
        let columns = pooler.compute(&input, false)?;
        let (active, predicted) = memory.compute(&columns, false)?;
        let ranked = by_overlap.infer(&active)?;
        let weighted = by_weights.infer(&active)?;
        if let (Some((guess, overlap)), Some((soft_guess, probability))) =
            (ranked.first(), weighted.first())
        {
            if *guess == next {
                hits += 1;
            }
            println!(
                "  {:?}: {} active cells, {} predictive cells, next by overlap {:?} ({}), by weights {:?} ({:.2})",
                value,
                active.len(),
                predicted.len(),
                guess,
                overlap,
                soft_guess,
                probability
            );
        }
    }
    println!("{}/{} next-step predictions correct", hits, chars.len());
    Ok(())
}
