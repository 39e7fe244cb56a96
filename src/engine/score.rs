//! Score and table-generator message formatting
//!
//! Everything the control layer sends to the engine is a line of
//! space-separated tokens: `i` statements schedule instrument events,
//! `f` statements create and delete tables.

use crate::config::{ImmediateTable, SampleTable, SegmentTable};
use crate::mapping::MappedValue;

/// Turnoff instrument; stops a named instance
pub const INSTR_STOP: u32 = 1;

/// Granular playback instrument
pub const INSTR_GRAIN: u32 = 2;

/// Table-morph instrument; blends table contents at a fractional index
pub const INSTR_TABLE_MORPH: u32 = 3;

/// One-shot instance monitor
pub const INSTR_MONITOR_ONESHOT: u32 = 4;

/// Continuous instance monitor
pub const INSTR_MONITOR_CONTINUOUS: u32 = 5;

/// Score event that starts one sound instance
#[allow(clippy::too_many_arguments)]
pub fn play_event(
    instance_tag: &str,
    duration: &MappedValue,
    sample_table: u32,
    instance_name: &str,
    amplitude: &MappedValue,
    density: &MappedValue,
    grain_start: f32,
    grain_duration: i32,
    position: &MappedValue,
) -> String {
    format!(
        "i {} 0 {} {} \"{}\" {} {} {} {} {}",
        instance_tag,
        duration,
        sample_table,
        instance_name,
        amplitude,
        density,
        grain_start,
        grain_duration,
        position
    )
}

/// Score event that terminates a named instance after one control period
pub fn stop_event(control_period: f32, instance_tag: &str) -> String {
    format!("i {} 0 {} {}", INSTR_STOP, control_period, instance_tag)
}

/// Control instruction that blends across a table-of-tables at a
/// fractional index, writing into the destination table
pub fn morph_event(
    control_period: f32,
    fraction: f32,
    table_of_tables: u32,
    destination: u32,
) -> String {
    format!(
        "i {} 0 {} {} {} {}",
        INSTR_TABLE_MORPH, control_period, fraction, table_of_tables, destination
    )
}

/// Start monitoring an instrument's instances
pub fn monitor_start(target: u32, oneshot: bool) -> String {
    if oneshot {
        format!("i {} 0 0 {}", INSTR_MONITOR_ONESHOT, target)
    } else {
        format!("i {} 0 -1 {}", INSTR_MONITOR_CONTINUOUS, target)
    }
}

/// Stop monitoring an instrument's instances
pub fn monitor_stop(target: u32, oneshot: bool) -> String {
    let monitor = if oneshot {
        INSTR_MONITOR_ONESHOT
    } else {
        INSTR_MONITOR_CONTINUOUS
    };
    format!("i -{} 0 0 {}", monitor, target)
}

/// Generator statement realizing a sample table from a file (GEN01)
pub fn sample_table_gen(number: u32, table: &SampleTable) -> String {
    format!(
        "f {} 0 0 1 \"{}\" {} {} {}",
        number, table.file, table.skip_time, table.format, table.channel
    )
}

/// Generator statement realizing an immediate table from raw values (GEN02)
pub fn immediate_table_gen(number: u32, table: &ImmediateTable) -> String {
    let mut message = format!("f {} 0 {} -2", number, table.size);
    for value in &table.values {
        message.push_str(&format!(" {}", value));
    }
    message
}

/// Generator statement realizing a segment table from value/length
/// breakpoint pairs (GEN07)
pub fn segment_table_gen(number: u32, table: &SegmentTable) -> String {
    let mut message = format!("f {} 0 {} -7", number, table.size);
    for segment in &table.segments {
        message.push_str(&format!(" {} {}", segment.value, segment.length));
    }
    message
}

/// Statement deleting a numbered table
pub fn delete_table_gen(number: u32) -> String {
    format!("f -{} 0", number)
}
