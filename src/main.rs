use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use beatfinder::BeatFinder;
use clap::{Parser, Subcommand};
use stagemix::fixtures::{functions_for_mode, parse_definition, FixtureFunction, FunctionType};
use stagemix::graph::{EffectKind, Graph, GraphDescription};
use stagemix::models::{ControlValue, FolderId, Transition, Trigger};
use stagemix::{EngineSettings, Management};

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time DMX mixing engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the engine until interrupted or for a fixed time.
    Run {
        /// Settings file; defaults to the user config directory.
        #[arg(short, long)]
        settings: Option<PathBuf>,
        /// Graph description (JSON). A small demo rig is used when omitted.
        #[arg(short, long)]
        graph: Option<PathBuf>,
        /// Stop after this many seconds.
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Print the modes and channel layout of a QLC+ fixture definition.
    InspectFixture {
        path: PathBuf,
        /// Only show the functions of this mode.
        #[arg(short, long)]
        mode: Option<String>,
    },
    /// Write the demo rig as a graph description.
    Demo {
        /// Output file; stdout when omitted.
        output: Option<PathBuf>,
    },
}

fn main() -> stagemix::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            settings,
            graph,
            seconds,
        } => run(settings.as_deref(), graph.as_deref(), seconds),
        Commands::InspectFixture { path, mode } => inspect_fixture(&path, mode.as_deref()),
        Commands::Demo { output } => write_demo(output.as_deref()),
    }
}

fn run(settings: Option<&Path>, graph: Option<&Path>, seconds: Option<u64>) -> stagemix::Result<()> {
    let settings = match settings {
        Some(path) => EngineSettings::load(path)?,
        None => EngineSettings::load_default()?,
    };
    let graph = match graph {
        Some(path) => {
            let description: GraphDescription = serde_json::from_str(&fs::read_to_string(path)?)?;
            Graph::from_description(&description)?
        }
        None => demo_graph()?,
    };

    let beat_finder = settings.beat_finder_enabled.then(|| {
        let finder = Arc::new(BeatFinder::new(settings.beat_finder_config()));
        finder.start();
        finder
    });

    let engine = Management::from_settings(graph, &settings, beat_finder.clone());
    engine.run()?;
    log::info!("[main] engine running ({} universe(s))", engine.universe_count());

    let started = Instant::now();
    let limit = seconds.map(Duration::from_secs);
    while limit.map_or(true, |limit| started.elapsed() < limit) {
        thread::sleep(Duration::from_secs(1));
        let snapshot = engine.snapshot_arc();
        let (beat, confidence) = beat_finder
            .as_ref()
            .map(|f| f.get_beat_value())
            .unwrap_or((0.0, 0.0));
        log::info!(
            "[main] t={}ms active channels={} beat={:.2} ({:.0}%)",
            engine.show_time_ms(),
            snapshot.active_channels(),
            beat,
            confidence * 100.0
        );
    }

    engine.stop();
    if let Some(finder) = beat_finder {
        finder.stop();
    }
    Ok(())
}

fn inspect_fixture(path: &Path, mode: Option<&str>) -> stagemix::Result<()> {
    let definition = parse_definition(path)?;
    println!("{} {}", definition.manufacturer, definition.model);

    match mode {
        Some(mode) => {
            for function in functions_for_mode(&definition, mode, 0, 0)? {
                let fine = function
                    .fine_channel
                    .map(|c| format!(" (fine {})", c + 1))
                    .unwrap_or_default();
                println!(
                    "  {:>3} {:<24} {:?}{}",
                    function.channel + 1,
                    function.name,
                    function.function_type,
                    fine
                );
            }
        }
        None => {
            for mode in &definition.modes {
                println!("  {} ({} channels)", mode.name, mode.channels.len());
            }
        }
    }
    Ok(())
}

fn write_demo(output: Option<&Path>) -> stagemix::Result<()> {
    let json = serde_json::to_string_pretty(&demo_graph()?.describe())?;
    match output {
        Some(path) => fs::write(path, json)?,
        None => println!("{}", json),
    }
    Ok(())
}

/// Four RGB pars, a red and a blue look, a chase between them and a pulse on
/// the chase master.
fn demo_graph() -> stagemix::Result<Graph> {
    let mut graph = Graph::new();
    let rig = graph.add_folder("rig", FolderId::ROOT)?;
    let looks = graph.add_folder("looks", FolderId::ROOT)?;

    let red = graph.add_preset_collection("red", looks)?;
    let blue = graph.add_preset_collection("blue", looks)?;

    for i in 0..4 {
        let base = i * 4;
        let name = format!("par {}", i + 1);
        let fixture = graph.add_fixture(
            &name,
            vec![
                FixtureFunction::new("Dimmer", FunctionType::MasterDimmer, 0, base),
                FixtureFunction::new("Red", FunctionType::Red, 0, base + 1),
                FixtureFunction::new("Green", FunctionType::Green, 0, base + 2),
                FixtureFunction::new("Blue", FunctionType::Blue, 0, base + 3),
            ],
        )?;
        let control = graph.add_fixture_control(&name, rig, fixture)?;
        graph.add_preset_value(control, 0, ControlValue::MAX)?;
        graph.add_to_collection(red, control, 1, ControlValue::MAX)?;
        graph.add_to_collection(blue, control, 3, ControlValue::MAX)?;
    }

    let chase = graph.add_chase("colours", FolderId::ROOT, Trigger::Beat { count: 4 }, Transition::CUT)?;
    graph.add_step(chase, red)?;
    graph.add_step(chase, blue)?;

    let pulse = graph.add_effect(
        "breathe",
        FolderId::ROOT,
        EffectKind::Pulse {
            attack_ms: 500,
            hold_ms: 250,
            release_ms: 500,
            sleep_ms: 250,
        },
    )?;
    graph.connect(pulse, chase, 0)?;
    graph.add_preset_value(pulse, 0, ControlValue::MAX)?;
    Ok(graph)
}
