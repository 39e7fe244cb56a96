//! Direct curve interpolation for non-table-driven parameters

use std::collections::HashMap;

use tracing::{debug, error};

use crate::config::{ControlParam, Mapping, SoundParam};

/// Interpolate a sound parameter straight from the first modifier's
/// min-side curve
///
/// Walks the curve's breakpoints with their x positions scaled into the
/// control parameter's range and lerps the bracketing pair around the
/// current control value. Unlike the morph path this always reads the
/// first modifier, whatever the control value is.
pub fn interpolate_sound_param(
    param: SoundParam,
    mapping: &Mapping,
    control_params: &HashMap<String, ControlParam>,
) -> f32 {
    let Some(ref name) = mapping.control_param else {
        debug!(
            "Sound param '{}' has no mapping. Using default param value.",
            param.name()
        );
        return param.default_value();
    };

    let Some(control_param) = control_params.get(name) else {
        error!("Could not find control param '{}' in config", name);
        return param.default_value();
    };

    let table = mapping
        .modifiers
        .first()
        .and_then(|modifier| modifier.min_table.as_ref());

    let Some(table) = table else {
        error!("Segment table not defined. Using default param value.");
        return param.default_value();
    };

    if table.number.is_none() {
        error!("Segment table not defined. Using default param value.");
        return param.default_value();
    }

    let range_x = control_param.max - control_param.min;
    let mut lower_x = 0.0;
    let mut lower_y = 0.0;
    let mut upper_x = 0.0;
    let mut upper_y = 0.0;

    for i in 1..table.segments.len() {
        lower_x = upper_x;
        lower_y = table.segments[i - 1].value;
        upper_x += table.segments[i - 1].length / table.size as f32 * range_x + control_param.min;
        upper_y = table.segments[i].value;

        if upper_x > control_param.value {
            break;
        }
    }

    lerp(lower_x, lower_y, upper_x, upper_y, control_param.value)
}

/// Linear interpolation between two points; a degenerate interval yields
/// the lower value
fn lerp(x0: f32, y0: f32, x1: f32, y1: f32, x: f32) -> f32 {
    if (x1 - x0).abs() < f32::EPSILON {
        return y0;
    }
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}
