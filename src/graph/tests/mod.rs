use super::resolver::{evaluation_order, is_valid_order};
use super::*;
use crate::fixtures::FunctionType;
use crate::show::SceneItem;

fn par(graph: &mut Graph, folder: FolderId, name: &str, first_channel: usize) -> ControllableId {
    let fixture = graph
        .add_fixture(
            name,
            vec![
                FixtureFunction::new("Dimmer", FunctionType::MasterDimmer, 0, first_channel),
                FixtureFunction::new("Red", FunctionType::Red, 0, first_channel + 1),
            ],
        )
        .expect("fixture fits");
    graph
        .add_fixture_control(name, folder, fixture)
        .expect("control for fixture")
}

fn tick(graph: &mut Graph, time_ms: u64) -> crate::models::universe::ValueSnapshot {
    let mut buffer = ChannelBuffer::new(1);
    graph.mix_tick(&mut buffer, &Timing::at(time_ms));
    buffer.quantize()
}

fn assert_order_valid(graph: &Graph) {
    assert!(is_valid_order(graph.evaluation_order(), graph.registry()));
    let fresh = evaluation_order(graph).expect("acyclic");
    assert!(is_valid_order(&fresh, graph.registry()));
}

#[test]
fn preset_value_drives_fixture_channels() {
    let mut graph = Graph::new();
    let control = par(&mut graph, FolderId::ROOT, "par", 0);
    graph
        .add_preset_value(control, 0, ControlValue::MAX)
        .expect("valid input");

    let snapshot = tick(&mut graph, 0);
    assert_eq!(snapshot.value(0, 0), 255);
    assert_eq!(snapshot.value(0, 1), 0);
}

#[test]
fn collection_output_is_scaled_by_its_master() {
    let mut graph = Graph::new();
    let control = par(&mut graph, FolderId::ROOT, "par", 0);
    let warm = graph
        .add_preset_collection("warm", FolderId::ROOT)
        .expect("root exists");
    graph
        .add_to_collection(warm, control, 0, ControlValue::MAX)
        .expect("no cycle");
    graph
        .add_preset_value(warm, 0, ControlValue::from_u8(128))
        .expect("master input");

    assert_eq!(tick(&mut graph, 0).value(0, 0), 128);
    assert_order_valid(&graph);
}

#[test]
fn collection_without_master_contributes_nothing() {
    let mut graph = Graph::new();
    let control = par(&mut graph, FolderId::ROOT, "par", 0);
    let warm = graph
        .add_preset_collection("warm", FolderId::ROOT)
        .expect("root exists");
    graph
        .add_to_collection(warm, control, 0, ControlValue::MAX)
        .expect("no cycle");

    assert_eq!(tick(&mut graph, 0).active_channels(), 0);
}

#[test]
fn cyclic_edit_is_rejected_and_rolled_back() {
    let mut graph = Graph::new();
    let a = graph.add_preset_collection("a", FolderId::ROOT).expect("root");
    let b = graph.add_preset_collection("b", FolderId::ROOT).expect("root");
    graph
        .add_to_collection(a, b, 0, ControlValue::MAX)
        .expect("a into b is acyclic");

    let err = graph
        .add_to_collection(b, a, 0, ControlValue::MAX)
        .expect_err("b into a closes a cycle");
    assert!(matches!(err, EngineError::Cycle { .. }));

    let ControllableKind::PresetCollection(collection) = graph.controllable(b).expect("b").kind()
    else {
        panic!("b is a collection");
    };
    assert!(collection.values().is_empty());
    assert_eq!(graph.references_to(a), 0);
    assert_order_valid(&graph);
}

#[test]
fn effect_cannot_feed_itself() {
    let mut graph = Graph::new();
    let inverter = graph
        .add_effect("inv", FolderId::ROOT, EffectKind::Inverter)
        .expect("root");

    assert!(matches!(
        graph.connect(inverter, inverter, 0),
        Err(EngineError::Cycle { .. })
    ));
    let ControllableKind::Effect(effect) = graph.controllable(inverter).expect("effect").kind()
    else {
        panic!("inverter is an effect");
    };
    assert!(effect.connections().is_empty());
}

#[test]
fn invalid_edits_leave_graph_untouched() {
    let mut graph = Graph::new();
    let control = par(&mut graph, FolderId::ROOT, "par", 0);
    let chase = graph
        .add_chase("chase", FolderId::ROOT, Trigger::default(), Transition::CUT)
        .expect("root");

    assert!(matches!(
        graph.add_preset_value(control, 5, ControlValue::MAX),
        Err(EngineError::InputOutOfRange { input: 5, count: 2, .. })
    ));
    assert!(matches!(
        graph.add_step(chase, control),
        Err(EngineError::InvalidEdit(_))
    ));
    assert!(matches!(
        graph.add_preset_collection("x", FolderId(42)),
        Err(EngineError::UnknownFolder(FolderId(42)))
    ));
    assert_eq!(graph.preset_values().count(), 0);
    assert_eq!(graph.len(), 2);
}

#[test]
fn chase_switches_collections_over_time() {
    let mut graph = Graph::new();
    let control = par(&mut graph, FolderId::ROOT, "par", 0);
    let dim = graph.add_preset_collection("dim", FolderId::ROOT).expect("root");
    let red = graph.add_preset_collection("red", FolderId::ROOT).expect("root");
    graph
        .add_to_collection(dim, control, 0, ControlValue::MAX)
        .expect("acyclic");
    graph
        .add_to_collection(red, control, 1, ControlValue::MAX)
        .expect("acyclic");
    let chase = graph
        .add_chase(
            "chase",
            FolderId::ROOT,
            Trigger::Delay { ms: 500 },
            Transition::CUT,
        )
        .expect("root");
    assert_eq!(graph.add_step(chase, dim).expect("step"), 0);
    assert_eq!(graph.add_step(chase, red).expect("step"), 1);
    graph
        .add_preset_value(chase, 0, ControlValue::MAX)
        .expect("master");
    assert_order_valid(&graph);

    let early = tick(&mut graph, 100);
    assert_eq!((early.value(0, 0), early.value(0, 1)), (255, 0));
    let later = tick(&mut graph, 600);
    assert_eq!((later.value(0, 0), later.value(0, 1)), (0, 255));
    assert_eq!(tick(&mut graph, 100), early);
}

#[test]
fn removing_a_controllable_drops_every_reference() {
    let mut graph = Graph::new();
    let control = par(&mut graph, FolderId::ROOT, "par", 0);
    let warm = graph.add_preset_collection("warm", FolderId::ROOT).expect("root");
    graph
        .add_to_collection(warm, control, 0, ControlValue::MAX)
        .expect("acyclic");
    let chase = graph
        .add_chase("chase", FolderId::ROOT, Trigger::default(), Transition::CUT)
        .expect("root");
    graph.add_step(chase, warm).expect("step");
    graph.add_step(chase, warm).expect("repeated step");
    let sequence = graph.add_time_sequence("seq", FolderId::ROOT).expect("root");
    graph.add_step(sequence, warm).expect("step");
    let inverter = graph
        .add_effect("inv", FolderId::ROOT, EffectKind::Inverter)
        .expect("root");
    graph.connect(inverter, warm, 0).expect("acyclic");
    graph
        .add_preset_value(warm, 0, ControlValue::MAX)
        .expect("master");
    let scene = graph.add_scene("intro").expect("scene id");
    graph
        .add_scene_item(
            scene,
            SceneItem {
                start_ms: 0,
                duration_ms: 1000,
                fade_in_ms: 0,
                fade_out_ms: 0,
                target: warm,
                input: 0,
                level: ControlValue::MAX,
            },
        )
        .expect("valid item");
    assert_eq!(graph.references_to(warm), 6);

    graph.remove_controllable(warm).expect("exists");

    assert!(graph.controllable(warm).is_none());
    assert_eq!(graph.references_to(warm), 0);
    assert!(graph
        .controllables()
        .all(|c| c.outputs().iter().all(|o| o.target != warm)));
    assert_order_valid(&graph);
    assert_eq!(tick(&mut graph, 0).active_channels(), 0);
}

#[test]
fn removing_a_fixture_removes_its_controls() {
    let mut graph = Graph::new();
    let control = par(&mut graph, FolderId::ROOT, "par", 0);
    let ControllableKind::FixtureControl(fc) = graph.controllable(control).expect("control").kind()
    else {
        panic!("fixture control");
    };
    let fixture = fc.fixture();
    graph
        .add_preset_value(control, 0, ControlValue::MAX)
        .expect("input");

    graph.remove_fixture(fixture).expect("patched");

    assert!(graph.is_empty());
    assert!(graph.theatre().is_empty());
    assert_eq!(graph.preset_values().count(), 0);
}

#[test]
fn folder_paths_resolve_both_ways() {
    let mut graph = Graph::new();
    let stage = graph.add_folder("stage", FolderId::ROOT).expect("root");
    let left = graph.add_folder("left", stage).expect("stage");
    let control = par(&mut graph, left, "par", 0);
    let top = graph.add_preset_collection("all", FolderId::ROOT).expect("root");

    assert_eq!(graph.path_of(control).as_deref(), Some("stage/left/par"));
    assert_eq!(graph.path_of(top).as_deref(), Some("all"));
    assert_eq!(graph.find("stage/left/par"), Some(control));
    assert_eq!(graph.find("all"), Some(top));
    assert_eq!(graph.find("stage/par"), None);

    graph.remove_folder(stage).expect("not root");
    assert_eq!(graph.find("stage/left/par"), None);
    assert_eq!(graph.len(), 1);
}

#[test]
fn capture_records_current_fixture_levels() {
    let mut graph = Graph::new();
    let control = par(&mut graph, FolderId::ROOT, "par", 0);
    let look = graph.add_preset_collection("look", FolderId::ROOT).expect("root");
    let level = graph
        .add_preset_value(control, 1, ControlValue::from_u8(200))
        .expect("input");
    tick(&mut graph, 0);

    assert_eq!(graph.capture_collection(look).expect("collection"), 1);
    graph.remove_preset_value(level).expect("exists");
    graph
        .add_preset_value(look, 0, ControlValue::MAX)
        .expect("master");

    assert_eq!(tick(&mut graph, 0).value(0, 1), 200);
}

#[test]
fn scene_overlay_lasts_for_its_items() {
    let mut graph = Graph::new();
    let control = par(&mut graph, FolderId::ROOT, "par", 0);
    let scene = graph.add_scene("flash").expect("scene id");
    graph
        .add_scene_item(
            scene,
            SceneItem {
                start_ms: 0,
                duration_ms: 1000,
                fade_in_ms: 0,
                fade_out_ms: 0,
                target: control,
                input: 0,
                level: ControlValue::MAX,
            },
        )
        .expect("valid item");
    graph.start_scene(scene, 0).expect("exists");

    assert_eq!(tick(&mut graph, 500).value(0, 0), 255);
    assert_eq!(tick(&mut graph, 1500).value(0, 0), 0);
    assert!(!graph.show().is_playing(scene));
}

#[test]
fn set_preset_value_reaches_collection_entries() {
    let mut graph = Graph::new();
    let control = par(&mut graph, FolderId::ROOT, "par", 0);
    let warm = graph.add_preset_collection("warm", FolderId::ROOT).expect("root");
    let entry = graph
        .add_to_collection(warm, control, 0, ControlValue::MAX)
        .expect("acyclic");
    graph
        .add_preset_value(warm, 0, ControlValue::MAX)
        .expect("master");

    graph
        .set_preset_value(entry, ControlValue::ZERO)
        .expect("entry exists");
    assert_eq!(tick(&mut graph, 0).value(0, 0), 0);
    assert!(matches!(
        graph.set_preset_value(PresetValueId(999), ControlValue::MAX),
        Err(EngineError::UnknownPresetValue(_))
    ));
}
