//! Configuration schema definitions

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::tables::TABLE_BASE_OFFSET;

/// A bounded scalar driven by the application (e.g. a game variable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlParam {
    /// Name, filled in from the config map key
    #[serde(skip)]
    pub name: String,

    /// Lower bound
    pub min: f32,

    /// Upper bound
    pub max: f32,

    /// Current value; clamped into [min, max] on every update
    #[serde(default)]
    pub value: f32,
}

impl ControlParam {
    /// Midpoint of the parameter's range
    pub fn midpoint(&self) -> f32 {
        self.min + 0.5 * (self.max - self.min)
    }
}

/// The four synthesis inputs a mapping can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundParam {
    /// Length of one triggered note, in seconds
    NoteDuration,
    /// Overall note amplitude
    NoteAmplitude,
    /// Grains per second, normalized
    GrainDensity,
    /// Spatial placement of grains, normalized
    GrainSpatialPosition,
}

impl SoundParam {
    /// All parameters, in score-event order
    pub const ALL: [SoundParam; 4] = [
        SoundParam::NoteDuration,
        SoundParam::NoteAmplitude,
        SoundParam::GrainDensity,
        SoundParam::GrainSpatialPosition,
    ];

    /// Stable name used in config keys and channel names
    pub fn name(self) -> &'static str {
        match self {
            SoundParam::NoteDuration => "note_duration",
            SoundParam::NoteAmplitude => "note_amplitude",
            SoundParam::GrainDensity => "grain_density",
            SoundParam::GrainSpatialPosition => "grain_spatial_position",
        }
    }

    /// Lower bound
    pub fn min(self) -> f32 {
        0.0
    }

    /// Upper bound
    pub fn max(self) -> f32 {
        match self {
            SoundParam::NoteDuration => 2.0,
            _ => 1.0,
        }
    }

    /// Value used when a mapping cannot resolve
    pub fn default_value(self) -> f32 {
        match self {
            SoundParam::NoteDuration => 1.0,
            _ => 0.5,
        }
    }
}

/// A recorded waveform, realized by the engine from a file
///
/// The sample count is only known once the engine has loaded the file,
/// so `size` is filled in at creation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleTable {
    /// Engine table number; `None` until allocated by the registry
    #[serde(skip)]
    pub number: Option<u32>,

    /// Sound file the engine loads the waveform from
    pub file: String,

    /// Seconds to skip into the file
    #[serde(default)]
    pub skip_time: f32,

    /// Sample format hint passed to the engine (0 = use file header)
    #[serde(default)]
    pub format: u32,

    /// Channel to extract (0 = all)
    #[serde(default)]
    pub channel: u32,

    /// Sample count, read back from the engine after creation
    #[serde(skip)]
    pub size: usize,
}

/// A small fixed vector of literal values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImmediateTable {
    /// Engine table number; `None` until allocated by the registry
    #[serde(skip)]
    pub number: Option<u32>,

    /// Table length in points
    pub size: usize,

    /// Literal contents; must fit within `size`
    #[serde(default)]
    pub values: Vec<f32>,
}

/// One breakpoint of a piecewise-linear curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Curve value at this breakpoint
    pub value: f32,
    /// Distance to the next breakpoint, in table points
    pub length: f32,
}

/// An ordered sequence of breakpoints describing a piecewise-linear curve
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentTable {
    /// Engine table number; `None` until allocated by the registry
    #[serde(skip)]
    pub number: Option<u32>,

    /// Table length in points
    pub size: usize,

    /// Breakpoints; empty for pure morph destinations
    #[serde(default)]
    pub segments: Vec<Segment>,
}

/// One morph vertex at a given control-parameter value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Modifier {
    /// Control-parameter value this vertex sits at
    pub control_value: f32,

    /// Min-side response curve
    pub min_table: Option<SegmentTable>,

    /// Max-side response curve (range/mask mappings only)
    pub max_table: Option<SegmentTable>,
}

/// Mapping topologies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingKind {
    /// No mapping; the sound parameter keeps its default
    #[default]
    Undefined,
    /// Single fixed value table
    Constant,
    /// Fixed segment curve
    Segment,
    /// Blended range between min and max curves
    Range,
    /// Discrete masked selection between min and max curves
    Mask,
}

impl MappingKind {
    /// Every defined kind drives the min-side tables
    pub fn uses_min_side(self) -> bool {
        self != MappingKind::Undefined
    }

    /// Range and mask additionally drive the max and intra sides
    pub fn uses_max_side(self) -> bool {
        matches!(self, MappingKind::Range | MappingKind::Mask)
    }
}

/// How one control parameter translates into one sound parameter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mapping {
    /// Mapping topology
    #[serde(default)]
    pub kind: MappingKind,

    /// Name of the bound control parameter; an unbound mapping always
    /// yields the sound parameter's default value
    pub control_param: Option<String>,

    /// Min-side morph destination
    pub morph_min_table: Option<SegmentTable>,

    /// Table-of-tables listing the modifiers' min-side table numbers
    pub morph_min_table_table: Option<ImmediateTable>,

    /// Max-side morph destination (range/mask only)
    pub morph_max_table: Option<SegmentTable>,

    /// Table-of-tables listing the modifiers' max-side table numbers
    pub morph_max_table_table: Option<ImmediateTable>,

    /// Destination of the stochastic blend between the resolved min and
    /// max tables (range/mask only)
    pub morph_intra_table: Option<SegmentTable>,

    /// Table-of-tables naming the min and max destinations
    pub morph_intra_table_table: Option<ImmediateTable>,

    /// Morph vertices, ascending by control value
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
}

/// One triggerable sound, looked up by `"<source_name>.<source_event>"`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sound {
    /// Name, filled in from the config map key
    #[serde(skip)]
    pub name: String,

    /// Waveform the grains are drawn from
    pub wave_table: SampleTable,

    /// Offset into the wave table where grains start, normalized
    #[serde(default)]
    pub grain_start: f32,

    /// Grain length in samples
    #[serde(default = "default_grain_duration")]
    pub grain_duration: i32,

    /// One mapping per sound parameter; absent entries behave as undefined
    #[serde(default)]
    pub mappings: HashMap<SoundParam, Mapping>,
}

fn default_grain_duration() -> i32 {
    2205
}

impl Sound {
    /// Look up the mapping for a sound parameter
    pub fn mapping(&self, param: SoundParam) -> Option<&Mapping> {
        self.mappings.get(&param)
    }
}

/// The whole configuration, loaded and cleared wholesale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// First table number the registry hands out
    #[serde(default = "default_base_table_number")]
    pub base_table_number: u32,

    /// Control parameters by name
    #[serde(default)]
    pub control_params: HashMap<String, ControlParam>,

    /// Sounds by `"<source_name>.<source_event>"`
    #[serde(default)]
    pub sounds: HashMap<String, Sound>,
}

fn default_base_table_number() -> u32 {
    TABLE_BASE_OFFSET
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_table_number: TABLE_BASE_OFFSET,
            control_params: HashMap::new(),
            sounds: HashMap::new(),
        }
    }
}

impl Config {
    /// Copy map keys into the name fields serde skipped
    pub fn resolve_names(&mut self) {
        for (name, param) in &mut self.control_params {
            param.name = name.clone();
        }
        for (name, sound) in &mut self.sounds {
            sound.name = name.clone();
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (name, param) in &self.control_params {
            if param.min > param.max {
                bail!("Control param '{}' has min above max", name);
            }
        }

        for (name, sound) in &self.sounds {
            if sound.wave_table.file.is_empty() {
                bail!("Sound '{}' has no wave table file", name);
            }

            for (param, mapping) in &sound.mappings {
                validate_mapping(name, *param, mapping, &self.control_params)?;
            }
        }

        Ok(())
    }
}

fn validate_mapping(
    sound: &str,
    param: SoundParam,
    mapping: &Mapping,
    control_params: &HashMap<String, ControlParam>,
) -> Result<()> {
    let context = format!("{}/{}", sound, param.name());

    if let Some(ref cp) = mapping.control_param {
        if !control_params.contains_key(cp) {
            bail!("Mapping {} references unknown control param '{}'", context, cp);
        }
    }

    for pair in mapping.modifiers.windows(2) {
        if pair[1].control_value < pair[0].control_value {
            bail!("Mapping {} has modifiers out of ascending order", context);
        }
    }

    if mapping.kind.uses_min_side() {
        if mapping.morph_min_table.is_none() || mapping.morph_min_table_table.is_none() {
            bail!("Mapping {} is missing its min-side morph tables", context);
        }

        if let Some(ref table_table) = mapping.morph_min_table_table {
            if table_table.size < mapping.modifiers.len() {
                bail!("Mapping {} min table-of-tables is too small", context);
            }
        }

        for (i, modifier) in mapping.modifiers.iter().enumerate() {
            if modifier.min_table.is_none() {
                bail!("Mapping {} modifier {} has no min table", context, i);
            }
        }
    }

    if mapping.kind.uses_max_side() {
        if mapping.morph_max_table.is_none()
            || mapping.morph_max_table_table.is_none()
            || mapping.morph_intra_table.is_none()
            || mapping.morph_intra_table_table.is_none()
        {
            bail!("Mapping {} is missing its max/intra morph tables", context);
        }

        if let Some(ref table_table) = mapping.morph_max_table_table {
            if table_table.size < mapping.modifiers.len() {
                bail!("Mapping {} max table-of-tables is too small", context);
            }
        }

        // The intra blend always runs across the two resolved destinations.
        if let Some(ref table_table) = mapping.morph_intra_table_table {
            if table_table.size < 2 {
                bail!("Mapping {} intra table-of-tables must hold two entries", context);
            }
        }

        for (i, modifier) in mapping.modifiers.iter().enumerate() {
            if modifier.max_table.is_none() {
                bail!("Mapping {} modifier {} has no max table", context, i);
            }
        }
    }

    Ok(())
}
