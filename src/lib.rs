//! An HTM-style learning region: spatial pooling, sequence memory and
//! classification over sparse distributed representations (SDRs).
//!
//! The region wires four kinds of components into one pipeline:
//! - Encoders turn raw values into fixed-width boolean vectors with a fixed number of ON bits.
//! - The `SpatialPooler` maps each input vector onto a small, stable set of active columns.
//! - The `TemporalMemory` learns transitions between successive column sets and predicts upcoming activity.
//! - Classifiers map column or cell activity back to the labels that produced it.
//!
//! Per timestep: encode the input, feed the dense vector to the spatial pooler,
//! feed the resulting active columns to the temporal memory, then record or
//! query a classifier with the resulting cell activity.
//!
//! Every randomized component owns an explicitly seeded generator, so a region
//! built twice from the same parameters replays identically.

pub mod core;

pub use crate::core::error::{RegionError, Result};
