//! Synthesis engine boundary
//!
//! The engine owns all table memory and runs its performance loop on a
//! dedicated thread; this crate only talks to it through line-oriented
//! messages and control channels.

mod offline;
pub mod score;

pub use offline::OfflineEngine;

use thiserror::Error;

use crate::config::{ImmediateTable, SampleTable, SegmentTable};

/// Errors surfaced by an engine adapter
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine failed to initialize
    #[error("engine failed to initialize")]
    StartFailed,

    /// A table was not observable in the engine within the readiness window;
    /// the creation can be retried
    #[error("table {0} did not become available in the engine")]
    TableUnavailable(u32),
}

/// Capability set the control layer consumes
///
/// Implementations are thread-safe by contract: the performance loop runs
/// on the adapter's own thread, and every method here may be called from
/// the control thread while it does.
pub trait Engine: Send + Sync {
    /// Bring the engine up
    fn start(&self) -> Result<(), EngineError>;

    /// Ask the engine to shut down its performance loop
    fn stop(&self);

    /// Whether the performance thread is still running
    fn is_performance_running(&self) -> bool;

    /// Duration of one control period in seconds
    fn control_period(&self) -> f32;

    /// Send a line-oriented real-time instruction (score event or control
    /// instruction)
    fn send_message(&self, message: &str);

    /// Whether a numbered table currently exists in the engine
    fn table_exists(&self, number: u32) -> bool;

    /// Realize a sample table from its file reference
    fn create_sample_table(&self, table: &SampleTable);

    /// Realize an immediate table from literal values
    fn create_immediate_table(&self, table: &ImmediateTable);

    /// Realize a segment table from its breakpoints
    fn create_segment_table(&self, table: &SegmentTable);

    /// Delete a numbered table
    fn delete_table(&self, number: u32);

    /// Read back a table's contents; `None` if the table does not exist
    fn table_data(&self, number: u32) -> Option<Vec<f32>>;

    /// Write a value to a named control channel
    fn set_channel(&self, value: f32, name: &str);

    /// Read a value from a named control channel
    fn channel(&self, name: &str) -> f32;
}
