use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use stagemix::fixtures::{FixtureFunction, FunctionType};
use stagemix::graph::Graph;
use stagemix::models::{ControlValue, FolderId};
use stagemix::output::{DummyDevice, OutputDevice};
use stagemix::Management;

fn one_par() -> Graph {
    let mut graph = Graph::new();
    let fixture = graph
        .add_fixture(
            "par",
            vec![FixtureFunction::new("Dimmer", FunctionType::MasterDimmer, 0, 0)],
        )
        .expect("fits");
    let control = graph
        .add_fixture_control("par", FolderId::ROOT, fixture)
        .expect("control");
    graph
        .add_preset_value(control, 0, ControlValue::MAX)
        .expect("input");
    graph
}

fn channel_zero(device: &dyn OutputDevice) -> u8 {
    device.get_values(0).map(|u| u[0]).unwrap_or(0)
}

#[test]
fn dry_mode_is_isolated_until_swapped() {
    let stage = Arc::new(DummyDevice::new("stage", 1, Duration::from_millis(5)));
    let live = Management::new(one_par(), vec![stage.clone() as Arc<dyn OutputDevice>], None);
    live.tick_at(0).expect("idle engine ticks");
    assert_eq!(channel_zero(stage.as_ref()), 255);

    let dry = live.make_dry_mode().expect("copyable");
    assert_eq!(dry.devices().len(), 1);
    assert_eq!(dry.devices()[0].universe_count(), 1);
    {
        let mut graph = dry.edit();
        let preset = graph.preset_values().next().map(|p| p.id).expect("copied preset");
        graph
            .set_preset_value(preset, ControlValue::from_u8(100))
            .expect("exists");
    }

    assert_eq!(dry.tick_at(0).expect("tick").value(0, 0), 100);
    assert_eq!(live.tick_at(0).expect("tick").value(0, 0), 255);
    assert_eq!(channel_zero(stage.as_ref()), 255);
    assert_eq!(channel_zero(dry.devices()[0].as_ref()), 100);

    {
        let mut graph = live.edit();
        let preset = graph.preset_values().next().map(|p| p.id).expect("live preset");
        graph
            .set_preset_value(preset, ControlValue::from_u8(40))
            .expect("exists");
    }
    assert_eq!(live.tick_at(5).expect("tick").value(0, 0), 40);
    assert_eq!(dry.tick_at(5).expect("tick").value(0, 0), 100);
    assert_eq!(channel_zero(dry.devices()[0].as_ref()), 100);
    {
        let mut graph = live.edit();
        let preset = graph.preset_values().next().map(|p| p.id).expect("live preset");
        graph.set_preset_value(preset, ControlValue::MAX).expect("exists");
    }
    assert_eq!(live.tick_at(6).expect("tick").value(0, 0), 255);

    live.swap_devices(&dry).expect("swap");
    assert_eq!(dry.devices()[0].name(), "stage");
    assert_eq!(live.devices()[0].name(), "dry stage");

    dry.tick_at(10).expect("tick");
    assert_eq!(channel_zero(stage.as_ref()), 100);
    live.tick_at(10).expect("tick");
    assert_eq!(channel_zero(stage.as_ref()), 100);
    assert_eq!(live.snapshot().value(0, 0), 255);
}

#[test]
fn swap_restarts_running_engines() {
    let live = Management::new(
        one_par(),
        vec![Arc::new(DummyDevice::new("stage", 1, Duration::from_millis(5))) as Arc<dyn OutputDevice>],
        None,
    );
    let dry = live.make_dry_mode().expect("copyable");
    live.run().expect("spawn");

    live.swap_devices(&dry).expect("swap");
    assert!(live.is_running());
    assert!(!dry.is_running());
    assert_eq!(live.devices()[0].name(), "dry stage");
    live.stop();
}

#[test]
fn equal_graphs_publish_equal_snapshots() {
    let a = Management::new(one_par(), Vec::new(), None);
    let b = Management::new(one_par(), Vec::new(), None);

    let first = a.tick_at(250).expect("tick");
    assert_eq!(*first, *b.tick_at(250).expect("tick"));
    assert_eq!(a.snapshot(), b.snapshot());

    let held = a.snapshot_arc();
    a.edit().remove_fixture(stagemix::models::FixtureId(0)).expect("patched");
    a.tick_at(500).expect("tick");
    assert_eq!(held.value(0, 0), 255);
    assert_eq!(a.snapshot().value(0, 0), 0);
}

#[test]
fn stop_interrupts_a_slow_device() {
    let slow = Arc::new(DummyDevice::new("slow", 1, Duration::from_secs(30)));
    let engine = Management::new(one_par(), vec![slow.clone() as Arc<dyn OutputDevice>], None);
    engine.run().expect("spawn");

    let deadline = Instant::now() + Duration::from_secs(5);
    while channel_zero(slow.as_ref()) != 255 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(channel_zero(slow.as_ref()), 255);

    let stopping = Instant::now();
    engine.stop();
    assert!(stopping.elapsed() < Duration::from_secs(10));
    assert!(!engine.is_running());
}
