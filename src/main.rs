//! Morpho - control-parameter mapping for granular synthesis

use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;
use morpho::config::{self, SoundParam};
use morpho::engine::OfflineEngine;
use morpho::playback::{Conductor, ParamUpdate, SoundInfo};

mod cli;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config: config_path } => {
            println!("Checking configuration at {:?}...", config_path);

            match config::load_config(&config_path) {
                Ok(cfg) => {
                    println!("Configuration is valid!");
                    println!("  Base table number: {}", cfg.base_table_number);
                    println!("  Control params: {}", cfg.control_params.len());
                    for (name, param) in &cfg.control_params {
                        println!("    - {} [{}, {}]", name, param.min, param.max);
                    }
                    println!("  Sounds: {}", cfg.sounds.len());
                    for (name, sound) in &cfg.sounds {
                        println!("    - {} ({})", name, sound.wave_table.file);
                        for (param, mapping) in &sound.mappings {
                            println!(
                                "      {} <- {:?} ({} modifiers)",
                                param.name(),
                                mapping.kind,
                                mapping.modifiers.len()
                            );
                        }
                    }
                }
                Err(e) => {
                    println!("Configuration is invalid: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Trace { config: config_path, sound, params, seed } => {
            let engine = Arc::new(OfflineEngine::new());
            let mut conductor = Conductor::new(engine.clone());
            if let Some(seed) = seed {
                conductor = conductor.with_seed(seed);
            }

            conductor.start()?;
            conductor.load_config(&config_path)?;

            let updates = params
                .iter()
                .map(|raw| parse_param(raw))
                .collect::<Result<Vec<ParamUpdate>>>()?;
            conductor.update_control_params(&updates);

            let (source_name, source_event) = sound
                .split_once('.')
                .ok_or_else(|| anyhow!("Sound name must be \"<source>.<event>\""))?;

            engine.clear_messages();
            let mut info = SoundInfo::new(source_name, source_event);
            conductor.play_sound(&mut info);
            conductor.stop_sound(&mut info);

            println!("Messages for '{}':", sound);
            for message in engine.messages() {
                println!("  {}", message);
            }

            println!("\nInterpolated values:");
            for param in SoundParam::ALL {
                println!(
                    "  {}: {}",
                    param.name(),
                    conductor.interpolated_sound_param(&sound, param)
                );
            }

            conductor.stop();
        }

        Commands::Init => {
            let example_config = include_str!("../morpho.example.yaml");

            let path = "morpho.yaml";
            if std::path::Path::new(path).exists() {
                println!("morpho.yaml already exists. Not overwriting.");
            } else {
                std::fs::write(path, example_config)?;
                println!("Created morpho.yaml with example configuration.");
            }
        }
    }

    Ok(())
}

fn parse_param(raw: &str) -> Result<ParamUpdate> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Parameter updates must be \"name=value\", got '{}'", raw))?;

    Ok(ParamUpdate {
        name: name.to_string(),
        value: value.parse()?,
    })
}
