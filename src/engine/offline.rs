//! Offline engine for dry runs and tests
//!
//! Stores tables in memory, records every message it is sent, and renders
//! table contents so the control plane is fully observable without a
//! synthesis runtime. No audio is produced.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{error, warn};

use super::{score, Engine, EngineError};
use crate::config::{ImmediateTable, SampleTable, SegmentTable};

/// Control period reported by the offline engine, in seconds
pub const CONTROL_PERIOD: f32 = 0.01;

#[derive(Default)]
struct State {
    running: bool,
    tables: HashMap<u32, Vec<f32>>,
    channels: HashMap<String, f32>,
    messages: Vec<String>,
}

/// In-process engine stand-in
pub struct OfflineEngine {
    state: Mutex<State>,
}

impl OfflineEngine {
    /// Create a stopped offline engine with no tables
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Every message received so far, in order
    pub fn messages(&self) -> Vec<String> {
        self.state.lock().unwrap().messages.clone()
    }

    /// Forget recorded messages (table and channel state is kept)
    pub fn clear_messages(&self) {
        self.state.lock().unwrap().messages.clear();
    }

    fn record(&self, message: String) {
        self.state.lock().unwrap().messages.push(message);
    }
}

impl Default for OfflineEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for OfflineEngine {
    fn start(&self) -> Result<(), EngineError> {
        self.state.lock().unwrap().running = true;
        Ok(())
    }

    fn stop(&self) {
        self.state.lock().unwrap().running = false;
    }

    fn is_performance_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    fn control_period(&self) -> f32 {
        CONTROL_PERIOD
    }

    fn send_message(&self, message: &str) {
        self.record(message.to_string());
    }

    fn table_exists(&self, number: u32) -> bool {
        self.state.lock().unwrap().tables.contains_key(&number)
    }

    fn create_sample_table(&self, table: &SampleTable) {
        let Some(number) = table.number else {
            error!("Sample table for '{}' has no number", table.file);
            return;
        };

        self.record(score::sample_table_gen(number, table));

        let data = match hound::WavReader::open(&table.file) {
            Ok(reader) => {
                let spec = reader.spec();
                match spec.sample_format {
                    hound::SampleFormat::Float => reader
                        .into_samples::<f32>()
                        .filter_map(Result::ok)
                        .collect(),
                    hound::SampleFormat::Int => {
                        let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
                        reader
                            .into_samples::<i32>()
                            .filter_map(Result::ok)
                            .map(|sample| sample as f32 / scale)
                            .collect()
                    }
                }
            }
            Err(e) => {
                warn!("Could not read '{}' ({}); table {} will be empty", table.file, e, number);
                Vec::new()
            }
        };

        self.state.lock().unwrap().tables.insert(number, data);
    }

    fn create_immediate_table(&self, table: &ImmediateTable) {
        let Some(number) = table.number else {
            error!("Immediate table has no number");
            return;
        };

        if table.values.len() > table.size {
            error!("Value count can not exceed table size for immediate table {}", number);
            return;
        }

        self.record(score::immediate_table_gen(number, table));

        let mut data = table.values.clone();
        data.resize(table.size, 0.0);
        self.state.lock().unwrap().tables.insert(number, data);
    }

    fn create_segment_table(&self, table: &SegmentTable) {
        let Some(number) = table.number else {
            error!("Segment table has no number");
            return;
        };

        self.record(score::segment_table_gen(number, table));

        let data = render_segments(table);
        self.state.lock().unwrap().tables.insert(number, data);
    }

    fn delete_table(&self, number: u32) {
        if self.state.lock().unwrap().tables.remove(&number).is_some() {
            self.record(score::delete_table_gen(number));
        }
    }

    fn table_data(&self, number: u32) -> Option<Vec<f32>> {
        self.state.lock().unwrap().tables.get(&number).cloned()
    }

    fn set_channel(&self, value: f32, name: &str) {
        self.state
            .lock()
            .unwrap()
            .channels
            .insert(name.to_string(), value);
    }

    fn channel(&self, name: &str) -> f32 {
        self.state
            .lock()
            .unwrap()
            .channels
            .get(name)
            .copied()
            .unwrap_or(0.0)
    }
}

/// Render breakpoints into table contents, ramping each segment toward
/// the next value and holding the last
fn render_segments(table: &SegmentTable) -> Vec<f32> {
    let total: f32 = table.segments.iter().map(|s| s.length).sum();

    if !table.segments.is_empty() {
        if (total as usize) < table.size {
            warn!(
                "Segment length sum is less than table size. Padding table end with zeros."
            );
        } else if total as usize > table.size {
            warn!(
                "Segment length sum is bigger than table size. Excess segments will not be included."
            );
        }
    }

    let mut data = Vec::with_capacity(table.size);

    'outer: for (i, segment) in table.segments.iter().enumerate() {
        let start = segment.value;
        let end = table
            .segments
            .get(i + 1)
            .map(|next| next.value)
            .unwrap_or(start);
        let steps = segment.length.round() as usize;

        for j in 0..steps {
            if data.len() == table.size {
                break 'outer;
            }
            let t = j as f32 / steps.max(1) as f32;
            data.push(start + (end - start) * t);
        }
    }

    data.resize(table.size, 0.0);
    data
}
