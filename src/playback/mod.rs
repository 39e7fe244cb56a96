//! Playback orchestration
//!
//! The conductor is the facade over everything else: it brings the engine
//! up and down, loads and clears configuration state, triggers and stops
//! sounds, and takes control-parameter updates from the application.

mod instance;

pub use instance::{instance_tag, InstanceManager, MAX_INSTANCES};

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::config::{self, Config, Mapping, SoundParam};
use crate::engine::{score, Engine, EngineError};
use crate::mapping::{interpolate_sound_param, Resolver};
use crate::tables::{TableRegistry, TABLE_BASE_OFFSET};

/// Poll interval while waiting for the performance thread to end
const STOP_POLL: Duration = Duration::from_millis(1);

/// One control-parameter update
#[derive(Debug, Clone)]
pub struct ParamUpdate {
    /// Control parameter name
    pub name: String,
    /// New value; clamped into the parameter's bounds on arrival
    pub value: f32,
}

/// Transient identifiers of one playback request
///
/// Filled in by `play_sound`, cleared again by `stop_sound`.
#[derive(Debug, Clone, Default)]
pub struct SoundInfo {
    /// Sound source, e.g. "ambience"
    pub source_name: String,

    /// Event within the source, e.g. "swell"
    pub source_event: String,

    /// Assigned instance number; `None` while not playing
    pub instance: Option<u32>,

    /// Fractional instrument tag of the live instance
    pub instance_tag: String,

    /// Full per-instance name, also the control-channel prefix
    pub complete_name: String,
}

impl SoundInfo {
    /// Create a request for `"<source_name>.<source_event>"`
    pub fn new(source_name: impl Into<String>, source_event: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            source_event: source_event.into(),
            ..Default::default()
        }
    }

    /// Name the sound is looked up by
    pub fn sound_name(&self) -> String {
        format!("{}.{}", self.source_name, self.source_event)
    }
}

/// The control-layer facade
pub struct Conductor {
    engine: Arc<dyn Engine>,
    config: Config,
    tables: TableRegistry,
    resolver: Resolver,
    instances: InstanceManager,
}

impl Conductor {
    /// Create a conductor over an engine, with no configuration loaded
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            tables: TableRegistry::new(engine.clone()),
            resolver: Resolver::new(engine.clone()),
            config: Config::default(),
            instances: InstanceManager::new(),
            engine,
        }
    }

    /// Use a fixed seed for the resolver's intra-morph draws
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.resolver = Resolver::new(self.engine.clone()).with_seed(seed);
        self
    }

    /// The loaded configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bring the engine up; fails fast when it cannot initialize
    pub fn start(&self) -> Result<(), EngineError> {
        if let Err(e) = self.engine.start() {
            error!("Engine failed initialization");
            return Err(e);
        }
        info!("Engine initialized");
        Ok(())
    }

    /// Shut the engine down
    ///
    /// Does not return until the performance thread has ended; there is no
    /// cancellation path.
    pub fn stop(&self) {
        if self.is_running() {
            self.engine.stop();

            while self.is_running() {
                thread::sleep(STOP_POLL);
            }

            info!("Engine terminated");
        }
    }

    /// Whether the engine's performance thread is running
    pub fn is_running(&self) -> bool {
        self.engine.is_performance_running()
    }

    /// Load a configuration, replacing any prior one
    ///
    /// Creates every table the mappings reference, binds each bound
    /// control parameter to its midpoint, and runs one eager morph and
    /// read-back per mapping so the engine has materialized dependent
    /// state before the first real playback.
    pub fn load_config(&mut self, path: &Path) -> Result<()> {
        self.config = config::load_config(path)
            .with_context(|| format!("Could not load config {:?}", path.display()))?;

        self.tables.set_base(self.config.base_table_number);

        let Config { sounds, control_params, .. } = &mut self.config;

        for sound in sounds.values_mut() {
            if sound.wave_table.file.is_empty() {
                error!("Wave table for sound '{}' is undefined.", sound.name);
            } else {
                let exists = sound
                    .wave_table
                    .number
                    .map(|number| self.tables.exists(number))
                    .unwrap_or(false);
                if !exists {
                    self.tables.create_sample(&mut sound.wave_table)?;
                }
            }

            for mapping in sound.mappings.values_mut() {
                if let Some(ref name) = mapping.control_param {
                    if let Some(control_param) = control_params.get_mut(name) {
                        control_param.value = control_param.midpoint();
                    }
                }

                create_mapping_tables(&mut self.tables, mapping)?;

                let control_value = mapping
                    .control_param
                    .as_ref()
                    .and_then(|name| control_params.get(name))
                    .map(|param| param.value)
                    .unwrap_or(0.0);

                self.resolver.morph_tables(mapping, control_value);

                for table in [
                    &mapping.morph_min_table,
                    &mapping.morph_max_table,
                    &mapping.morph_intra_table,
                ] {
                    if let Some(number) = table.as_ref().and_then(|t| t.number) {
                        let _ = self.engine.table_data(number);
                    }
                }
            }
        }

        self.instances.reset();
        info!("Configuration '{}' loaded", path.display());
        info!("Base table number is: {}", self.config.base_table_number);

        Ok(())
    }

    /// Tear the configuration down
    ///
    /// Deletes every table the registry allocated on the configuration's
    /// behalf (only the sides each mapping's kind uses), then resets all
    /// in-memory state and rewinds the instance and table counters.
    /// Idempotent: a second clear issues no engine commands.
    pub fn clear_config(&mut self) {
        for sound in self.config.sounds.values_mut() {
            self.tables.delete(sound.wave_table.number);

            for mapping in sound.mappings.values_mut() {
                reset_mapping(&self.tables, mapping);
            }
        }

        self.config = Config::default();
        self.instances.reset();
        self.tables.reset(TABLE_BASE_OFFSET);

        info!("Configuration cleared");
    }

    /// Trigger one instance of a sound
    ///
    /// Allocates an instance number, re-morphs every mapping of the sound
    /// at the bound control parameters' current values, and sends the
    /// resulting score event. `info` is filled in with the assigned
    /// instance identifiers.
    pub fn play_sound(&mut self, info: &mut SoundInfo) {
        let instance = self.instances.next();
        let sound_name = info.sound_name();

        let Some(sound) = self.config.sounds.get(&sound_name) else {
            error!("Invalid sound '{}'", sound_name);
            return;
        };

        let Some(wave_table) = sound.wave_table.number else {
            info!("Sound has no wave table.");
            return;
        };

        info.instance = Some(instance);
        info.instance_tag = instance_tag(score::INSTR_GRAIN, instance);
        info.complete_name = format!("{}.{}", sound_name, info.instance_tag);

        let control_params = &self.config.control_params;
        let duration = self
            .resolver
            .mapped_value(sound, SoundParam::NoteDuration, control_params);
        let amplitude = self
            .resolver
            .mapped_value(sound, SoundParam::NoteAmplitude, control_params);
        let density = self
            .resolver
            .mapped_value(sound, SoundParam::GrainDensity, control_params);
        let position = self
            .resolver
            .mapped_value(sound, SoundParam::GrainSpatialPosition, control_params);

        let message = score::play_event(
            &info.instance_tag,
            &duration,
            wave_table,
            &info.complete_name,
            &amplitude,
            &density,
            sound.grain_start,
            sound.grain_duration,
            &position,
        );
        self.engine.send_message(&message);
    }

    /// Terminate a playing instance after one control period
    pub fn stop_sound(&self, info: &mut SoundInfo) {
        let message = score::stop_event(self.engine.control_period(), &info.instance_tag);
        self.engine.send_message(&message);

        info.instance = None;
        info.instance_tag.clear();
        info.complete_name.clear();
    }

    /// Update one control parameter
    ///
    /// The sole external write path into control-parameter state. Unknown
    /// names are logged and ignored; values are clamped into bounds.
    pub fn update_control_param(&mut self, update: &ParamUpdate) {
        let Some(param) = self.config.control_params.get_mut(&update.name) else {
            error!("Could not find control param '{}' in config", update.name);
            return;
        };

        param.value = update.value.clamp(param.min, param.max);
    }

    /// Update a batch of control parameters
    pub fn update_control_params(&mut self, updates: &[ParamUpdate]) {
        for update in updates {
            self.update_control_param(update);
        }
    }

    /// Push a sound-parameter value straight to a live instance
    ///
    /// Bypasses mapping; writes the clamped value to the instance's
    /// per-parameter control channel.
    pub fn set_sound_param(&self, param: SoundParam, value: f32, info: &SoundInfo) {
        let channel = format!("{}.{}", info.complete_name, param.name());
        let value = value.clamp(param.min(), param.max());
        self.engine.set_channel(value, &channel);
    }

    /// Direct interpolated value for a sound parameter, bypassing tables
    pub fn interpolated_sound_param(&self, sound_name: &str, param: SoundParam) -> f32 {
        let Some(sound) = self.config.sounds.get(sound_name) else {
            error!("Invalid sound '{}'", sound_name);
            return param.default_value();
        };

        match sound.mapping(param) {
            Some(mapping) => interpolate_sound_param(param, mapping, &self.config.control_params),
            None => param.default_value(),
        }
    }

    /// Start monitoring an instrument's instances
    pub fn start_instance_monitor(&self, target: u32, oneshot: bool) {
        self.engine.send_message(&score::monitor_start(target, oneshot));
    }

    /// Stop monitoring an instrument's instances
    pub fn stop_instance_monitor(&self, target: u32, oneshot: bool) {
        self.engine.send_message(&score::monitor_stop(target, oneshot));
    }

    /// Latest value reported by the instance monitor
    pub fn monitor_result(&self) -> f32 {
        self.engine.channel("InstanceMonitor")
    }
}

/// Create every engine table a mapping's kind requires
///
/// Modifier tables come first so the table-of-tables can be filled with
/// their numbers; the intra table-of-tables names the two resolved
/// destinations.
fn create_mapping_tables(
    tables: &mut TableRegistry,
    mapping: &mut Mapping,
) -> Result<(), EngineError> {
    if mapping.kind.uses_min_side() {
        let mut numbers = Vec::with_capacity(mapping.modifiers.len());
        for modifier in &mut mapping.modifiers {
            if let Some(table) = modifier.min_table.as_mut() {
                tables.create_segment(table)?;
                if let Some(number) = table.number {
                    numbers.push(number as f32);
                }
            }
        }

        if let Some(table_table) = mapping.morph_min_table_table.as_mut() {
            table_table.values = numbers;
            tables.create_immediate(table_table)?;
        }

        if let Some(table) = mapping.morph_min_table.as_mut() {
            tables.create_segment(table)?;
        }
    }

    if mapping.kind.uses_max_side() {
        let mut numbers = Vec::with_capacity(mapping.modifiers.len());
        for modifier in &mut mapping.modifiers {
            if let Some(table) = modifier.max_table.as_mut() {
                tables.create_segment(table)?;
                if let Some(number) = table.number {
                    numbers.push(number as f32);
                }
            }
        }

        if let Some(table_table) = mapping.morph_max_table_table.as_mut() {
            table_table.values = numbers;
            tables.create_immediate(table_table)?;
        }

        if let Some(table) = mapping.morph_max_table.as_mut() {
            tables.create_segment(table)?;
        }

        let destinations: Vec<f32> = [&mapping.morph_min_table, &mapping.morph_max_table]
            .iter()
            .filter_map(|table| table.as_ref().and_then(|t| t.number))
            .map(|number| number as f32)
            .collect();

        if let Some(table_table) = mapping.morph_intra_table_table.as_mut() {
            table_table.values = destinations;
            tables.create_immediate(table_table)?;
        }

        if let Some(table) = mapping.morph_intra_table.as_mut() {
            tables.create_segment(table)?;
        }
    }

    Ok(())
}

/// Delete a mapping's tables for exactly the sides its kind uses, then
/// reset it
fn reset_mapping(tables: &TableRegistry, mapping: &mut Mapping) {
    if mapping.kind.uses_min_side() {
        tables.delete(mapping.morph_min_table.as_ref().and_then(|t| t.number));
        tables.delete(mapping.morph_min_table_table.as_ref().and_then(|t| t.number));
    }

    if mapping.kind.uses_max_side() {
        tables.delete(mapping.morph_max_table.as_ref().and_then(|t| t.number));
        tables.delete(mapping.morph_max_table_table.as_ref().and_then(|t| t.number));
        tables.delete(mapping.morph_intra_table.as_ref().and_then(|t| t.number));
        tables.delete(mapping.morph_intra_table_table.as_ref().and_then(|t| t.number));
    }

    for modifier in &mapping.modifiers {
        if mapping.kind.uses_min_side() {
            tables.delete(modifier.min_table.as_ref().and_then(|t| t.number));
        }
        if mapping.kind.uses_max_side() {
            tables.delete(modifier.max_table.as_ref().and_then(|t| t.number));
        }
    }

    *mapping = Mapping::default();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OfflineEngine;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const RANGE_CONFIG: &str = r#"
base_table_number: 200

control_params:
  intensity:
    min: 0.0
    max: 100.0

sounds:
  ambience.swell:
    wave_table: { file: swell.wav }
    grain_start: 0.0
    grain_duration: 2205
    mappings:
      grain_density:
        kind: range
        control_param: intensity
        morph_min_table: { size: 16 }
        morph_min_table_table: { size: 4 }
        morph_max_table: { size: 16 }
        morph_max_table_table: { size: 4 }
        morph_intra_table: { size: 16 }
        morph_intra_table_table: { size: 2 }
        modifiers:
          - control_value: 0.0
            min_table: { size: 16, segments: [{ value: 0.1, length: 16 }] }
            max_table: { size: 16, segments: [{ value: 0.3, length: 16 }] }
          - control_value: 100.0
            min_table: { size: 16, segments: [{ value: 0.7, length: 16 }] }
            max_table: { size: 16, segments: [{ value: 0.9, length: 16 }] }
"#;

    fn config_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn loaded_conductor(seed: u64) -> (Arc<OfflineEngine>, Conductor) {
        let engine = Arc::new(OfflineEngine::new());
        let mut conductor = Conductor::new(engine.clone()).with_seed(seed);
        conductor.start().unwrap();

        let file = config_file(RANGE_CONFIG);
        conductor.load_config(file.path()).unwrap();
        (engine, conductor)
    }

    #[test]
    fn test_start_and_stop() {
        let engine = Arc::new(OfflineEngine::new());
        let conductor = Conductor::new(engine);

        conductor.start().unwrap();
        assert!(conductor.is_running());

        conductor.stop();
        assert!(!conductor.is_running());
    }

    #[test]
    fn test_control_param_updates_are_clamped() {
        let (_, mut conductor) = loaded_conductor(7);

        conductor.update_control_param(&ParamUpdate {
            name: "intensity".to_string(),
            value: 250.0,
        });
        assert_eq!(conductor.config().control_params["intensity"].value, 100.0);

        conductor.update_control_param(&ParamUpdate {
            name: "intensity".to_string(),
            value: -50.0,
        });
        assert_eq!(conductor.config().control_params["intensity"].value, 0.0);
    }

    #[test]
    fn test_unknown_control_param_changes_nothing() {
        let (_, mut conductor) = loaded_conductor(7);
        let before = conductor.config().control_params["intensity"].value;

        conductor.update_control_param(&ParamUpdate {
            name: "nonexistent".to_string(),
            value: 42.0,
        });

        assert_eq!(conductor.config().control_params["intensity"].value, before);
    }

    #[test]
    fn test_load_binds_control_params_to_midpoint() {
        let (_, conductor) = loaded_conductor(7);
        assert_eq!(conductor.config().control_params["intensity"].value, 50.0);
    }

    #[test]
    fn test_load_allocates_tables_from_base() {
        let (engine, conductor) = loaded_conductor(7);

        // Sample table first, then the mapping's tables in creation order.
        let sound = &conductor.config().sounds["ambience.swell"];
        assert_eq!(sound.wave_table.number, Some(200));

        let mapping = sound.mapping(SoundParam::GrainDensity).unwrap();
        assert_eq!(
            mapping.morph_intra_table.as_ref().unwrap().number,
            Some(210)
        );
        assert!(engine.table_exists(210));

        // The intra table-of-tables names the two destinations.
        assert_eq!(engine.table_data(209).unwrap(), vec![204.0, 208.0]);
    }

    #[test]
    fn test_play_sound_emits_morphs_then_play_event() {
        let (engine, mut conductor) = loaded_conductor(7);
        engine.clear_messages();

        conductor.update_control_param(&ParamUpdate {
            name: "intensity".to_string(),
            value: 25.0,
        });

        let mut info = SoundInfo::new("ambience", "swell");
        conductor.play_sound(&mut info);

        assert_eq!(info.instance, Some(0));
        assert_eq!(info.instance_tag, "2.000000");
        assert_eq!(info.complete_name, "ambience.swell.2.000000");

        // The eager morph during load consumed the first draw.
        let mut rng = StdRng::seed_from_u64(7);
        let _ = rng.gen::<f32>();
        let intra = rng.gen::<f32>();

        let messages = engine.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], "i 3 0 0.01 0.25 203 204");
        assert_eq!(messages[1], "i 3 0 0.01 0.25 207 208");
        assert_eq!(messages[2], format!("i 3 0 0.01 {} 209 210", intra));

        // Unmapped params fall back to defaults; density reads the intra table.
        assert_eq!(
            messages[3],
            "i 2.000000 0 1 200 \"ambience.swell.2.000000\" 0.5 210 0 2205 0.5"
        );
    }

    #[test]
    fn test_play_unknown_sound_sends_nothing() {
        let (engine, mut conductor) = loaded_conductor(7);
        engine.clear_messages();

        let mut info = SoundInfo::new("no", "such");
        conductor.play_sound(&mut info);

        assert!(engine.messages().is_empty());
        assert_eq!(info.instance, None);
    }

    #[test]
    fn test_stop_sound_clears_info() {
        let (engine, mut conductor) = loaded_conductor(7);

        let mut info = SoundInfo::new("ambience", "swell");
        conductor.play_sound(&mut info);
        engine.clear_messages();

        conductor.stop_sound(&mut info);

        assert_eq!(engine.messages(), vec!["i 1 0 0.01 2.000000".to_string()]);
        assert_eq!(info.instance, None);
        assert!(info.instance_tag.is_empty());
        assert!(info.complete_name.is_empty());
    }

    #[test]
    fn test_clear_config_is_idempotent() {
        let (engine, mut conductor) = loaded_conductor(7);
        engine.clear_messages();

        conductor.clear_config();
        let deletes: Vec<String> = engine.messages();
        assert!(!deletes.is_empty());
        assert!(deletes.iter().all(|m| m.starts_with("f -")));

        engine.clear_messages();
        conductor.clear_config();
        assert!(engine.messages().is_empty());
    }

    #[test]
    fn test_clear_config_rewinds_counters() {
        let (_, mut conductor) = loaded_conductor(7);
        conductor.clear_config();

        let file = config_file(RANGE_CONFIG);
        conductor.load_config(file.path()).unwrap();

        // Allocation starts over from the configured base.
        let sound = &conductor.config().sounds["ambience.swell"];
        assert_eq!(sound.wave_table.number, Some(200));

        let mut info = SoundInfo::new("ambience", "swell");
        conductor.play_sound(&mut info);
        assert_eq!(info.instance, Some(0));
    }

    #[test]
    fn test_set_sound_param_writes_clamped_channel_value() {
        let (engine, mut conductor) = loaded_conductor(7);

        let mut info = SoundInfo::new("ambience", "swell");
        conductor.play_sound(&mut info);

        conductor.set_sound_param(SoundParam::NoteAmplitude, 3.5, &info);

        assert_eq!(
            engine.channel("ambience.swell.2.000000.note_amplitude"),
            1.0
        );
    }

    #[test]
    fn test_monitor_messages_and_result() {
        let (engine, conductor) = loaded_conductor(7);
        engine.clear_messages();

        conductor.start_instance_monitor(score::INSTR_GRAIN, true);
        conductor.stop_instance_monitor(score::INSTR_GRAIN, true);

        assert_eq!(
            engine.messages(),
            vec!["i 4 0 0 2".to_string(), "i -4 0 0 2".to_string()]
        );

        engine.set_channel(3.0, "InstanceMonitor");
        assert_eq!(conductor.monitor_result(), 3.0);
    }
}
