//! Morph-index computation and table morphing

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error};

use super::MappedValue;
use crate::config::{ControlParam, ImmediateTable, Mapping, Modifier, SegmentTable, Sound, SoundParam};
use crate::engine::{score, Engine};

/// Fractional index into a mapping's modifier list for a control value
///
/// The integer part selects the greatest modifier whose control value does
/// not exceed `value`; the fraction interpolates toward the next modifier.
/// Values below every modifier yield 0; values at or beyond the last
/// modifier are clamped to it, never extrapolated. Modifiers must be
/// supplied in ascending control-value order.
pub fn morph_index(modifiers: &[Modifier], value: f32) -> f32 {
    let mut found: Option<usize> = None;

    for (i, modifier) in modifiers.iter().enumerate() {
        if value >= modifier.control_value {
            found = Some(i);
        }
    }

    let Some(index) = found else {
        debug!("Could not find morph table index.");
        return 0.0;
    };

    let mut lerp_value = index as f32;

    if index < modifiers.len() - 1 {
        let rel = value - modifiers[index].control_value;
        let delta = modifiers[index + 1].control_value - modifiers[index].control_value;
        // A zero-length interval between adjacent modifiers contributes nothing.
        if delta > 0.0 {
            lerp_value += rel / delta;
        }
    }

    lerp_value
}

/// Resolves mappings into engine tables and values
///
/// Owns the random source for the intra blend; seed it for reproducible
/// draws.
pub struct Resolver {
    engine: Arc<dyn Engine>,
    rng: StdRng,
}

impl Resolver {
    /// Create a resolver with an entropy-seeded random source
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            rng: StdRng::from_entropy(),
        }
    }

    /// Use a fixed seed so intra-morph draws are reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Re-blend every table the mapping's kind requires
    ///
    /// The min side (and for range/mask the max side) blends at the
    /// control value's morph index. The intra side blends the two resolved
    /// destinations at a fresh uniform draw in [0, 1), so repeated
    /// triggers at the same control setting vary.
    pub fn morph_tables(&mut self, mapping: &Mapping, control_value: f32) {
        let index = morph_index(&mapping.modifiers, control_value);

        if mapping.kind.uses_min_side() {
            if let Some((destination, table_of_tables)) = self.side_tables(
                mapping.morph_min_table.as_ref(),
                mapping.morph_min_table_table.as_ref(),
                "min",
            ) {
                self.morph_table(index, destination, table_of_tables);
            }
        }

        if mapping.kind.uses_max_side() {
            if let Some((destination, table_of_tables)) = self.side_tables(
                mapping.morph_max_table.as_ref(),
                mapping.morph_max_table_table.as_ref(),
                "max",
            ) {
                self.morph_table(index, destination, table_of_tables);
            }

            if let Some((destination, table_of_tables)) = self.side_tables(
                mapping.morph_intra_table.as_ref(),
                mapping.morph_intra_table_table.as_ref(),
                "intra",
            ) {
                let intra_index = self.rng.gen::<f32>();
                self.morph_table(intra_index, destination, table_of_tables);
            }
        }
    }

    /// Resolve the value the engine should use for one sound parameter
    ///
    /// Table-backed kinds morph first and yield the destination table
    /// reference; note duration additionally reads the resolved table back
    /// and yields its first datum. Anything unresolvable yields the
    /// parameter's default.
    pub fn mapped_value(
        &mut self,
        sound: &Sound,
        param: SoundParam,
        control_params: &HashMap<String, ControlParam>,
    ) -> MappedValue {
        let default = MappedValue::Scalar(param.default_value());

        let Some(mapping) = sound.mapping(param) else {
            return default;
        };
        let Some(ref name) = mapping.control_param else {
            return default;
        };
        let Some(control_param) = control_params.get(name) else {
            error!("Could not find control param '{}' in config", name);
            return default;
        };

        self.morph_tables(mapping, control_param.value);

        let resolved = if mapping.kind.uses_max_side() {
            mapping.morph_intra_table.as_ref().and_then(|t| t.number)
        } else if mapping.kind.uses_min_side() {
            mapping.morph_min_table.as_ref().and_then(|t| t.number)
        } else {
            None
        };

        let Some(number) = resolved else {
            return default;
        };

        if param == SoundParam::NoteDuration {
            match self.engine.table_data(number) {
                Some(data) if !data.is_empty() => MappedValue::Scalar(data[0]),
                _ => default,
            }
        } else {
            MappedValue::TableRef(number)
        }
    }

    /// Send one real-time morph instruction, scheduled for one control
    /// period
    fn morph_table(&self, index: f32, destination: u32, table_of_tables: u32) {
        let message =
            score::morph_event(self.engine.control_period(), index, table_of_tables, destination);
        self.engine.send_message(&message);
    }

    fn side_tables(
        &self,
        table: Option<&SegmentTable>,
        table_table: Option<&ImmediateTable>,
        side: &str,
    ) -> Option<(u32, u32)> {
        let destination = table.and_then(|t| t.number);
        let table_of_tables = table_table.and_then(|t| t.number);

        let (Some(destination), Some(table_of_tables)) = (destination, table_of_tables) else {
            error!("Morph {} table undefined or does not exist.", side);
            return None;
        };

        #[cfg(debug_assertions)]
        {
            if !self.engine.table_exists(destination) {
                error!("Morph {} table undefined or does not exist.", side);
                return None;
            }
            if !self.engine.table_exists(table_of_tables) {
                error!("Morph {} table table undefined or does not exist.", side);
                return None;
            }
        }

        Some((destination, table_of_tables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MappingKind, Segment};
    use crate::engine::OfflineEngine;

    fn modifiers(values: &[f32]) -> Vec<Modifier> {
        values
            .iter()
            .map(|&control_value| Modifier {
                control_value,
                min_table: None,
                max_table: None,
            })
            .collect()
    }

    #[test]
    fn test_morph_index_interpolates_between_modifiers() {
        let modifiers = modifiers(&[0.0, 10.0, 20.0]);
        assert_eq!(morph_index(&modifiers, 5.0), 0.5);
        assert_eq!(morph_index(&modifiers, 15.0), 1.5);
    }

    #[test]
    fn test_morph_index_clamps_at_top() {
        let modifiers = modifiers(&[0.0, 10.0, 20.0]);
        assert_eq!(morph_index(&modifiers, 20.0), 2.0);
        assert_eq!(morph_index(&modifiers, 25.0), 2.0);
    }

    #[test]
    fn test_morph_index_below_all_thresholds() {
        let modifiers = modifiers(&[0.0, 10.0, 20.0]);
        assert_eq!(morph_index(&modifiers, -5.0), 0.0);
    }

    #[test]
    fn test_morph_index_exact_threshold() {
        let modifiers = modifiers(&[0.0, 10.0, 20.0]);
        assert_eq!(morph_index(&modifiers, 10.0), 1.0);
    }

    #[test]
    fn test_morph_index_empty_modifiers() {
        assert_eq!(morph_index(&[], 5.0), 0.0);
    }

    #[test]
    fn test_morph_index_zero_length_interval() {
        let modifiers = modifiers(&[0.0, 10.0, 10.0]);
        let index = morph_index(&modifiers, 10.0);
        assert!(index.is_finite());
        assert_eq!(index, 2.0);
    }

    fn allocated_segment_table(engine: &OfflineEngine, number: u32) -> Option<SegmentTable> {
        let table = SegmentTable {
            number: Some(number),
            size: 8,
            segments: vec![Segment { value: 1.6, length: 8.0 }],
        };
        engine.create_segment_table(&table);
        Some(table)
    }

    fn allocated_immediate_table(engine: &OfflineEngine, number: u32) -> Option<ImmediateTable> {
        let table = ImmediateTable {
            number: Some(number),
            size: 4,
            values: vec![],
        };
        engine.create_immediate_table(&table);
        Some(table)
    }

    fn range_mapping(engine: &OfflineEngine) -> Mapping {
        Mapping {
            kind: MappingKind::Range,
            control_param: Some("intensity".to_string()),
            morph_min_table: allocated_segment_table(engine, 110),
            morph_min_table_table: allocated_immediate_table(engine, 111),
            morph_max_table: allocated_segment_table(engine, 112),
            morph_max_table_table: allocated_immediate_table(engine, 113),
            morph_intra_table: allocated_segment_table(engine, 114),
            morph_intra_table_table: allocated_immediate_table(engine, 115),
            modifiers: vec![
                Modifier { control_value: 0.0, min_table: None, max_table: None },
                Modifier { control_value: 10.0, min_table: None, max_table: None },
            ],
        }
    }

    fn sound_with(param: SoundParam, mapping: Mapping) -> Sound {
        let mut sound = Sound {
            name: "ambience.swell".to_string(),
            wave_table: Default::default(),
            grain_start: 0.0,
            grain_duration: 2205,
            mappings: HashMap::new(),
        };
        sound.mappings.insert(param, mapping);
        sound
    }

    fn intensity(value: f32) -> HashMap<String, ControlParam> {
        let mut params = HashMap::new();
        params.insert(
            "intensity".to_string(),
            ControlParam { name: "intensity".to_string(), min: 0.0, max: 10.0, value },
        );
        params
    }

    #[test]
    fn test_range_morph_sends_min_max_and_intra() {
        let engine = Arc::new(OfflineEngine::new());
        let mapping = range_mapping(&engine);
        engine.clear_messages();

        let mut resolver = Resolver::new(engine.clone()).with_seed(7);
        resolver.morph_tables(&mapping, 5.0);

        let expected_intra = StdRng::seed_from_u64(7).gen::<f32>();
        let messages = engine.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], "i 3 0 0.01 0.5 111 110");
        assert_eq!(messages[1], "i 3 0 0.01 0.5 113 112");
        assert_eq!(messages[2], format!("i 3 0 0.01 {} 115 114", expected_intra));
    }

    #[test]
    fn test_constant_morph_only_uses_min_side() {
        let engine = Arc::new(OfflineEngine::new());
        let mut mapping = range_mapping(&engine);
        mapping.kind = MappingKind::Constant;
        engine.clear_messages();

        let mut resolver = Resolver::new(engine.clone()).with_seed(7);
        resolver.morph_tables(&mapping, 5.0);

        assert_eq!(engine.messages().len(), 1);
    }

    #[test]
    fn test_undefined_mapping_never_morphs() {
        let engine = Arc::new(OfflineEngine::new());
        let mut mapping = range_mapping(&engine);
        mapping.kind = MappingKind::Undefined;
        engine.clear_messages();

        let mut resolver = Resolver::new(engine.clone()).with_seed(7);
        resolver.morph_tables(&mapping, 5.0);

        assert!(engine.messages().is_empty());
    }

    #[test]
    fn test_mapped_value_unbound_yields_default() {
        let engine = Arc::new(OfflineEngine::new());
        let mut mapping = range_mapping(&engine);
        mapping.control_param = None;
        let sound = sound_with(SoundParam::GrainDensity, mapping);
        engine.clear_messages();

        let mut resolver = Resolver::new(engine.clone()).with_seed(7);
        let value = resolver.mapped_value(&sound, SoundParam::GrainDensity, &intensity(5.0));

        assert_eq!(value, MappedValue::Scalar(0.5));
        assert!(engine.messages().is_empty());
    }

    #[test]
    fn test_mapped_value_missing_control_param_yields_default() {
        let engine = Arc::new(OfflineEngine::new());
        let mapping = range_mapping(&engine);
        let sound = sound_with(SoundParam::GrainDensity, mapping);
        engine.clear_messages();

        let mut resolver = Resolver::new(engine.clone()).with_seed(7);
        let value = resolver.mapped_value(&sound, SoundParam::GrainDensity, &HashMap::new());

        assert_eq!(value, MappedValue::Scalar(0.5));
        assert!(engine.messages().is_empty());
    }

    #[test]
    fn test_mapped_value_range_yields_intra_table() {
        let engine = Arc::new(OfflineEngine::new());
        let mapping = range_mapping(&engine);
        let sound = sound_with(SoundParam::GrainDensity, mapping);

        let mut resolver = Resolver::new(engine.clone()).with_seed(7);
        let value = resolver.mapped_value(&sound, SoundParam::GrainDensity, &intensity(5.0));

        assert_eq!(value, MappedValue::TableRef(114));
    }

    #[test]
    fn test_mapped_value_constant_yields_min_table() {
        let engine = Arc::new(OfflineEngine::new());
        let mut mapping = range_mapping(&engine);
        mapping.kind = MappingKind::Constant;
        let sound = sound_with(SoundParam::GrainDensity, mapping);

        let mut resolver = Resolver::new(engine.clone()).with_seed(7);
        let value = resolver.mapped_value(&sound, SoundParam::GrainDensity, &intensity(5.0));

        assert_eq!(value, MappedValue::TableRef(110));
    }

    #[test]
    fn test_note_duration_reads_table_back() {
        let engine = Arc::new(OfflineEngine::new());
        let mut mapping = range_mapping(&engine);
        mapping.kind = MappingKind::Segment;
        let sound = sound_with(SoundParam::NoteDuration, mapping);

        let mut resolver = Resolver::new(engine.clone()).with_seed(7);
        let value = resolver.mapped_value(&sound, SoundParam::NoteDuration, &intensity(5.0));

        // First datum of the min destination table (rendered from its segments).
        assert_eq!(value, MappedValue::Scalar(1.6));
    }
}
