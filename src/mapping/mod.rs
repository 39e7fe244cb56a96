//! Control-parameter to sound-parameter mapping
//!
//! Resolves a mapping and the current value of its bound control parameter
//! into the engine tables to read at playback time, or into a plain
//! interpolated scalar for parameters that never go through a table.

mod interpolate;
mod morph;

pub use interpolate::interpolate_sound_param;
pub use morph::{morph_index, Resolver};

use std::fmt;

/// A resolved mapping output
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MappedValue {
    /// A plain scalar
    Scalar(f32),
    /// The number of the engine table holding the resolved curve
    TableRef(u32),
}

impl fmt::Display for MappedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappedValue::Scalar(value) => write!(f, "{}", value),
            MappedValue::TableRef(number) => write!(f, "{}", number),
        }
    }
}
