//! Benchmark for the per-tick mix pass.
//!
//! Builds a synthetic rig (many RGB fixtures spread over several universes,
//! collections, chases and effects) and times each stage of a tick.
//!
//! Run with: cargo run --profile perf --bin bench_mix

use std::time::{Duration, Instant};

use stagemix::fixtures::{FixtureFunction, FunctionType};
use stagemix::graph::{EffectKind, Graph};
use stagemix::models::{ChannelBuffer, ControlValue, FolderId, Transition, Trigger, UNIVERSE_SIZE};
use stagemix::Timing;

const UNIVERSES: usize = 8;
const FIXTURES_PER_UNIVERSE: usize = UNIVERSE_SIZE / 4;
const LOOKS: usize = 16;

fn build_rig() -> stagemix::Result<Graph> {
    let mut graph = Graph::new();
    let mut controls = Vec::new();
    for universe in 0..UNIVERSES {
        for i in 0..FIXTURES_PER_UNIVERSE {
            let base = i * 4;
            let fixture = graph.add_fixture(
                &format!("u{} par {}", universe, i),
                vec![
                    FixtureFunction::new("Dimmer", FunctionType::MasterDimmer, universe, base),
                    FixtureFunction::new("Red", FunctionType::Red, universe, base + 1),
                    FixtureFunction::new("Green", FunctionType::Green, universe, base + 2),
                    FixtureFunction::new("Blue", FunctionType::Blue, universe, base + 3),
                ],
            )?;
            let control =
                graph.add_fixture_control(&format!("u{} par {}", universe, i), FolderId::ROOT, fixture)?;
            graph.add_preset_value(control, 0, ControlValue::MAX)?;
            controls.push(control);
        }
    }

    let mut looks = Vec::new();
    for look in 0..LOOKS {
        let collection = graph.add_preset_collection(&format!("look {}", look), FolderId::ROOT)?;
        for (i, control) in controls.iter().enumerate() {
            let level = ControlValue::from_u8(((i * 7 + look * 31) % 256) as u8);
            graph.add_to_collection(collection, *control, 1 + look % 3, level)?;
        }
        looks.push(collection);
    }

    for (i, pair) in looks.chunks(2).enumerate() {
        let chase = graph.add_chase(
            &format!("chase {}", i),
            FolderId::ROOT,
            Trigger::Delay { ms: 400 },
            Transition::fade(200),
        )?;
        for look in pair {
            graph.add_step(chase, *look)?;
        }
        let flicker = graph.add_effect(
            &format!("flicker {}", i),
            FolderId::ROOT,
            EffectKind::Flicker { speed_ms: 50 },
        )?;
        graph.connect(flicker, chase, 0)?;
        graph.add_preset_value(flicker, 0, ControlValue::MAX)?;
    }
    Ok(graph)
}

fn bench<F: FnMut(u64) -> R, R>(name: &str, iterations: u64, mut f: F) -> Duration {
    // Warmup
    for i in 0..2 {
        std::hint::black_box(f(i));
    }

    let start = Instant::now();
    for i in 0..iterations {
        std::hint::black_box(f(i));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;

    println!(
        "  {:<40} {:>8.3}ms  ({} iters, {:.2}ms total)",
        name,
        per_iter.as_secs_f64() * 1000.0,
        iterations,
        elapsed.as_secs_f64() * 1000.0,
    );
    per_iter
}

fn main() -> stagemix::Result<()> {
    println!("Building rig: {} universes, {} fixtures...", UNIVERSES, UNIVERSES * FIXTURES_PER_UNIVERSE);
    let start = Instant::now();
    let mut graph = build_rig()?;
    println!(
        "Built {} controllables in {:.1}ms\n",
        graph.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    let iterations = 200;
    let mut buffer = ChannelBuffer::new(UNIVERSES);

    bench("reset + preset values", iterations, |_| {
        graph.reset_inputs();
        graph.apply_preset_values();
    });

    let full = bench("full tick (mix + quantize)", iterations, |i| {
        buffer.reset();
        graph.mix_tick(&mut buffer, &Timing::at(i * 25));
        buffer.quantize()
    });

    let snapshot = buffer.quantize();
    bench("quantize", iterations, |_| buffer.quantize());
    bench("describe", 20, |_| graph.describe());

    println!(
        "\n  {} active channels; headroom at 40Hz: {:.1}x",
        snapshot.active_channels(),
        Duration::from_millis(25).as_secs_f64() / full.as_secs_f64().max(1e-9)
    );
    Ok(())
}
