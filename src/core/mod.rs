//! Core building blocks of the learning region.

pub mod cell;
pub mod classifier;
pub mod encoder;
pub mod error;
pub mod spatial_pooler;
pub mod temporal_memory;
