//! Table-number allocation and bookkeeping
//!
//! The engine owns the actual table memory; the registry owns the numbers.
//! It hands out process-unique identifiers, sequences creation so a table
//! is observably present before anyone reads it back, and keeps deletion
//! idempotent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::config::{ImmediateTable, SampleTable, SegmentTable};
use crate::engine::{Engine, EngineError};

/// Lowest table number handed out when a config does not set its own base
pub const TABLE_BASE_OFFSET: u32 = 100;

/// How long to wait for the engine to realize a table
const READINESS_TIMEOUT: Duration = Duration::from_secs(1);

/// Poll interval while waiting for readiness
const READINESS_POLL: Duration = Duration::from_millis(1);

/// Allocates table numbers and drives table creation in the engine
pub struct TableRegistry {
    engine: Arc<dyn Engine>,
    base: u32,
    next: u32,
}

impl TableRegistry {
    /// Create a registry allocating from the default base offset
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            base: TABLE_BASE_OFFSET,
            next: TABLE_BASE_OFFSET,
        }
    }

    /// Current base number
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Hand out a fresh table number
    ///
    /// Numbers are strictly increasing from the base and wrap to the base
    /// offset on overflow. A wrapped number may still be referenced by a
    /// live table; callers must delete before reuse.
    pub fn allocate(&mut self) -> u32 {
        let number = self.next;
        self.next = if self.next == u32::MAX {
            TABLE_BASE_OFFSET
        } else {
            self.next + 1
        };
        number
    }

    /// Raise the base number
    ///
    /// Raising the base above the current counter pulls the counter forward
    /// so previously issued numbers stay valid; anything else is a no-op.
    pub fn set_base(&mut self, number: u32) {
        if number > self.next {
            self.next = number;
            self.base = number;
        }
    }

    /// Rewind counter and base to an initial value (config clear)
    pub fn reset(&mut self, base: u32) {
        self.base = base;
        self.next = base;
    }

    /// Realize a sample table and read back its sample count
    ///
    /// The file length is not known until the engine loads it, so `size`
    /// is filled in from the realized table data.
    pub fn create_sample(&mut self, table: &mut SampleTable) -> Result<usize, EngineError> {
        if self.already_exists(table.number) {
            return Ok(table.size);
        }

        let number = self.assign_number(&mut table.number);
        self.engine.create_sample_table(table);
        self.await_table(number)?;

        table.size = self
            .engine
            .table_data(number)
            .map(|data| data.len())
            .unwrap_or(0);
        Ok(table.size)
    }

    /// Realize an immediate table
    pub fn create_immediate(&mut self, table: &mut ImmediateTable) -> Result<(), EngineError> {
        if self.already_exists(table.number) {
            return Ok(());
        }

        let number = self.assign_number(&mut table.number);
        self.engine.create_immediate_table(table);
        self.await_table(number)
    }

    /// Realize a segment table
    pub fn create_segment(&mut self, table: &mut SegmentTable) -> Result<(), EngineError> {
        if self.already_exists(table.number) {
            return Ok(());
        }

        let number = self.assign_number(&mut table.number);
        self.engine.create_segment_table(table);
        self.await_table(number)
    }

    /// Whether a numbered table exists in the engine
    pub fn exists(&self, number: u32) -> bool {
        self.engine.table_exists(number)
    }

    /// Delete a table
    ///
    /// Idempotent: `None` or a number the engine does not know is a silent
    /// no-op and sends no command.
    pub fn delete(&self, number: Option<u32>) {
        if let Some(number) = number {
            if self.engine.table_exists(number) {
                self.engine.delete_table(number);
            }
        }
    }

    fn already_exists(&self, number: Option<u32>) -> bool {
        match number {
            Some(number) if self.engine.table_exists(number) => {
                warn!("Table {} already exists.", number);
                true
            }
            _ => false,
        }
    }

    fn assign_number(&mut self, number: &mut Option<u32>) -> u32 {
        match *number {
            Some(existing) => existing,
            None => {
                let fresh = self.allocate();
                *number = Some(fresh);
                fresh
            }
        }
    }

    fn await_table(&self, number: u32) -> Result<(), EngineError> {
        let deadline = Instant::now() + READINESS_TIMEOUT;

        while !self.engine.table_exists(number) {
            if Instant::now() >= deadline {
                return Err(EngineError::TableUnavailable(number));
            }
            std::thread::sleep(READINESS_POLL);
        }

        Ok(())
    }
}
