use quick_xml::de::from_str;
use std::fs;
use std::path::Path;

use crate::error::{EngineError, Result};
use crate::fixtures::definition::{Channel, FixtureDefinition};
use crate::fixtures::{FixtureFunction, FunctionType};
use crate::models::universe::UNIVERSE_SIZE;

pub fn parse_definition(path: &Path) -> Result<FixtureDefinition> {
    let content = fs::read_to_string(path)?;
    parse_definition_str(&content)
        .map_err(|e| EngineError::Definition(format!("{}: {}", path.display(), e)))
}

pub fn parse_definition_str(xml: &str) -> Result<FixtureDefinition> {
    from_str(xml).map_err(|e| EngineError::Definition(e.to_string()))
}

/// Lays out the functions of `mode` starting at the 0-based `start_channel`.
///
/// A fine channel is attached to the closest preceding coarse function of the
/// same type; a fine channel with no partner becomes a generic function.
pub fn functions_for_mode(
    definition: &FixtureDefinition,
    mode_name: &str,
    universe: usize,
    start_channel: usize,
) -> Result<Vec<FixtureFunction>> {
    let mode = definition.mode(mode_name).ok_or_else(|| {
        EngineError::Definition(format!(
            "{} {} has no mode '{}'",
            definition.manufacturer, definition.model, mode_name
        ))
    })?;

    let mut channels: Vec<_> = mode.channels.iter().collect();
    channels.sort_by_key(|c| c.number);

    if start_channel + channels.len() > UNIVERSE_SIZE {
        return Err(EngineError::Definition(format!(
            "mode '{}' needs {} channels from {}, past the end of the universe",
            mode_name,
            channels.len(),
            start_channel
        )));
    }

    let mut functions: Vec<FixtureFunction> = Vec::with_capacity(channels.len());
    for mode_channel in channels {
        let dmx_channel = start_channel + mode_channel.number as usize;
        let Some(channel) = definition.channel(&mode_channel.name) else {
            log::warn!(
                "[fixtures] mode '{}' references unknown channel '{}'",
                mode_name,
                mode_channel.name
            );
            functions.push(FixtureFunction::new(
                &mode_channel.name,
                FunctionType::Generic,
                universe,
                dmx_channel,
            ));
            continue;
        };

        let function_type = classify(channel);
        if channel.is_fine() {
            let partner = functions
                .iter_mut()
                .rev()
                .find(|f| f.function_type == function_type && f.fine_channel.is_none());
            if let Some(coarse) = partner {
                coarse.fine_channel = Some(dmx_channel);
                continue;
            }
        }

        functions.push(FixtureFunction::new(
            &channel.name,
            function_type,
            universe,
            dmx_channel,
        ));
    }

    Ok(functions)
}

/// Maps a QLC+ channel onto a function type from its preset, or failing that
/// its group and colour.
pub fn classify(channel: &Channel) -> FunctionType {
    if let Some(preset) = &channel.preset {
        let base = preset.trim_end_matches("Fine");
        let from_preset = match base {
            "IntensityMasterDimmer" | "IntensityDimmer" => Some(FunctionType::MasterDimmer),
            "IntensityRed" => Some(FunctionType::Red),
            "IntensityGreen" => Some(FunctionType::Green),
            "IntensityBlue" => Some(FunctionType::Blue),
            "IntensityWhite" => Some(FunctionType::White),
            "IntensityAmber" => Some(FunctionType::Amber),
            "IntensityUV" => Some(FunctionType::Uv),
            "PositionPan" => Some(FunctionType::Pan),
            "PositionTilt" => Some(FunctionType::Tilt),
            p if p.starts_with("ShutterStrobe") => Some(FunctionType::Strobe),
            _ => None,
        };
        if let Some(function_type) = from_preset {
            return function_type;
        }
    }

    let Some(group) = &channel.group else {
        return FunctionType::Generic;
    };
    match group.value.as_str() {
        "Pan" => FunctionType::Pan,
        "Tilt" => FunctionType::Tilt,
        "Shutter" => FunctionType::Strobe,
        "Intensity" => {
            let colour = channel.colour.as_deref().unwrap_or("").to_ascii_lowercase();
            match colour.as_str() {
                "red" => FunctionType::Red,
                "green" => FunctionType::Green,
                "blue" => FunctionType::Blue,
                "white" => FunctionType::White,
                "amber" => FunctionType::Amber,
                "uv" => FunctionType::Uv,
                _ => FunctionType::MasterDimmer,
            }
        }
        _ => FunctionType::Generic,
    }
}
