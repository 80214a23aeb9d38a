mod common;

use std::cell::Cell;
use std::rc::Rc;
use std::thread::sleep;
use std::time::Duration;

use serde_json::json;

use common::{number, run, runtime, runtime_with, sprite_position, stage_variable, text, TargetBuilder};
use rustphorus_vm::error::Error;
use rustphorus_vm::pen::{Color, PenInstruction};
use rustphorus_vm::script::{Continuation, Op};
use rustphorus_vm::{Config, Value};

fn repeat_count(times: f64) -> Value {
  let mut stage = TargetBuilder::stage().variable("n", json!(0));
  let change = stage.change("n", 1.);
  let repeat = stage.repeat(number(times), &[change]);
  stage.green_flag(&[repeat]);
  let mut runtime = runtime(vec![stage]);
  runtime.trigger_green_flag();
  run(&mut runtime, 100);
  stage_variable(&runtime, "n")
}

#[test]
fn repeat_rounds_its_count() {
  assert_eq!(repeat_count(3.5), Value::Number(4.));
  assert_eq!(repeat_count(3.4), Value::Number(3.));
  assert_eq!(repeat_count(0.4), Value::Number(0.));
}

#[test]
fn repeat_yields_between_iterations() {
  let mut stage = TargetBuilder::stage().variable("n", json!(0));
  let change = stage.change("n", 1.);
  let repeat = stage.repeat(number(3.), &[change]);
  stage.green_flag(&[repeat]);
  let mut runtime = runtime(vec![stage]);
  runtime.trigger_green_flag();
  runtime.sweep().unwrap();
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(1.));
  runtime.sweep().unwrap();
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(2.));
}

#[test]
fn warp_procedures_finish_in_one_sweep() {
  let mut stage = TargetBuilder::stage()
    .variable("n", json!(0))
    .variable("done", json!(0));
  let change = stage.change("n", 1.);
  let repeat = stage.repeat(number(10.), &[change]);
  stage.define("count", &[], true, &[repeat]);
  let call = stage.call("count", &[]);
  let set = stage.set("done", number(1.));
  stage.green_flag(&[call, set]);
  let mut runtime = runtime(vec![stage]);
  runtime.trigger_green_flag();
  runtime.sweep().unwrap();
  assert_eq!(runtime.queue_len(), 0);
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(10.));
  assert_eq!(stage_variable(&runtime, "done"), Value::Number(1.));
}

#[test]
fn warp_blocks_finish_in_one_sweep() {
  let mut stage = TargetBuilder::stage().variable("n", json!(0));
  let change = stage.change("n", 1.);
  let repeat = stage.repeat(number(5.), &[change]);
  let warp = stage.block("control_warp", json!({"SUBSTACK": [2, repeat]}), json!({}));
  stage.green_flag(&[warp]);
  let mut runtime = runtime(vec![stage]);
  runtime.trigger_green_flag();
  runtime.sweep().unwrap();
  assert_eq!(runtime.queue_len(), 0);
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(5.));
}

#[test]
fn procedures_receive_arguments() {
  let mut stage = TargetBuilder::stage().variable("n", json!(0));
  let argument = stage.argument("x");
  let set = stage.set("n", argument);
  stage.define("put %s", &["x"], false, &[set]);
  let call = stage.call("put %s", &[("x", text("hello"))]);
  stage.green_flag(&[call]);
  let mut runtime = runtime(vec![stage]);
  runtime.trigger_green_flag();
  run(&mut runtime, 10);
  assert_eq!(stage_variable(&runtime, "n"), Value::from("hello"));
}

#[test]
fn recursion_defers_to_the_next_sweep() {
  let mut stage = TargetBuilder::stage().variable("n", json!(0));
  let change = stage.change("n", 1.);
  let recurse = stage.call("again", &[]);
  stage.define("again", &[], false, &[change, recurse]);
  let call = stage.call("again", &[]);
  stage.green_flag(&[call]);
  let mut runtime = runtime(vec![stage]);
  runtime.trigger_green_flag();
  for _ in 0..50 {
    runtime.sweep().unwrap();
    assert_eq!(runtime.queue_len(), 1);
  }
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(50.));
}

#[test]
fn broadcasts_without_receivers_do_not_yield() {
  let mut stage = TargetBuilder::stage().variable("n", json!(0));
  let broadcast = stage.broadcast("nobody", false);
  let wait = stage.broadcast("nobody", true);
  let change = stage.change("n", 1.);
  stage.green_flag(&[broadcast, wait, change]);
  let mut runtime = runtime(vec![stage]);
  runtime.trigger_green_flag();
  runtime.sweep().unwrap();
  assert_eq!(runtime.queue_len(), 0);
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(1.));
}

#[test]
fn broadcast_and_wait_resumes_after_receivers() {
  let mut stage = TargetBuilder::stage()
    .variable("n", json!(0))
    .variable("done", json!(0));
  let broadcast = stage.broadcast("go", true);
  let set = stage.set("done", number(1.));
  stage.green_flag(&[broadcast, set]);

  let mut sprite = TargetBuilder::sprite("Cat", 1);
  let wait = sprite.wait(0.);
  let change = sprite.change("n", 1.);
  sprite.when_received("Go", &[wait, change]);

  let mut runtime = runtime(vec![stage, sprite]);
  runtime.trigger_green_flag();
  runtime.sweep().unwrap();
  assert_eq!(runtime.queue_len(), 2);
  runtime.sweep().unwrap();
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(1.));
  assert_eq!(stage_variable(&runtime, "done"), Value::Number(0.));
  runtime.sweep().unwrap();
  assert_eq!(stage_variable(&runtime, "done"), Value::Number(1.));
  assert_eq!(runtime.queue_len(), 0);
}

#[test]
fn rebroadcasting_restarts_the_receiver() {
  let mut stage = TargetBuilder::stage()
    .variable("n", json!(0))
    .variable("after", json!(0));
  let change = stage.change("n", 1.);
  let broadcast = stage.broadcast("loop", false);
  let after = stage.change("after", 1.);
  stage.when_received("loop", &[change, broadcast, after]);
  let mut runtime = runtime(vec![stage]);
  assert_eq!(runtime.broadcast("LOOP").len(), 1);
  runtime.sweep().unwrap();
  runtime.sweep().unwrap();
  assert_eq!(runtime.queue_len(), 1);
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(2.));
  assert_eq!(stage_variable(&runtime, "after"), Value::Number(0.));
}

#[test]
fn wait_zero_yields_once() {
  let mut stage = TargetBuilder::stage().variable("n", json!(0));
  let wait = stage.wait(0.);
  let change = stage.change("n", 1.);
  stage.green_flag(&[wait, change]);
  let mut runtime = runtime(vec![stage]);
  runtime.start();
  runtime.trigger_green_flag();
  runtime.sweep().unwrap();
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(0.));
  assert_eq!(runtime.queue_len(), 1);
  runtime.sweep().unwrap();
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(1.));
  assert_eq!(runtime.queue_len(), 0);
}

#[test]
fn labels_increase_across_scripts() {
  let mut stage = TargetBuilder::stage();
  let first = stage.wait(1.);
  stage.green_flag(&[first]);
  let second = stage.wait(1.);
  stage.green_flag(&[second]);
  let runtime = runtime(vec![stage]);
  let target = runtime.project.stage().unwrap();
  let scripts = target.data.scripts.borrow();
  assert_eq!(scripts.listeners.green_flag, vec![0, 2]);
  assert_eq!(scripts.continuations.len(), 4);
}

#[test]
fn green_flag_runs_sprites_front_to_back_then_the_stage() {
  let mut stage = TargetBuilder::stage().variable("order", json!(""));
  let join = |target: &mut TargetBuilder, name: &str| {
    let order = target.block("data_variable", json!({}), json!({"VARIABLE": ["order", "order-id"]}));
    let joined = target.block(
      "operator_join",
      json!({"STRING1": [3, order, [10, ""]], "STRING2": text(name)}),
      json!({}),
    );
    target.set("order", json!([3, joined, [10, ""]]))
  };
  let set = join(&mut stage, "S");
  stage.green_flag(&[set]);
  let mut back = TargetBuilder::sprite("Back", 1);
  let set = join(&mut back, "B");
  back.green_flag(&[set]);
  let mut front = TargetBuilder::sprite("Front", 2);
  let set = join(&mut front, "F");
  front.green_flag(&[set]);

  let mut runtime = runtime(vec![stage, back, front]);
  runtime.trigger_green_flag();
  runtime.sweep().unwrap();
  assert_eq!(stage_variable(&runtime, "order"), Value::from("FBS"));
}

#[test]
fn clones_copy_lists() {
  let mut sprite = TargetBuilder::sprite("Cat", 1).list("items", json!([1, 2, 3]));
  let clone = sprite.create_clone("_myself_");
  sprite.green_flag(&[clone]);
  let add = sprite.block(
    "data_addtolist",
    json!({"ITEM": text("4")}),
    json!({"LIST": ["items", "items-id"]}),
  );
  let hat = sprite.block("control_start_as_clone", json!({}), json!({}));
  sprite.script(hat, &[add]);

  let mut runtime = runtime(vec![TargetBuilder::stage(), sprite]);
  runtime.trigger_green_flag();
  run(&mut runtime, 10);

  let project = &runtime.project;
  assert_eq!(project.order.len(), 2);
  let clone = project.targets.values().find(|target| target.is_clone).unwrap();
  let original = project.sprite_by_name("Cat").unwrap();
  assert_eq!(clone.state.lists["items"].len(), 4);
  assert_eq!(original.state.lists["items"].len(), 3);
  assert_eq!(project.order[0], clone.id);
}

#[test]
fn clones_can_delete_themselves() {
  let mut sprite = TargetBuilder::sprite("Cat", 1);
  let clone = sprite.create_clone("Cat");
  sprite.green_flag(&[clone]);
  let delete = sprite.block("control_delete_this_clone", json!({}), json!({}));
  let hat = sprite.block("control_start_as_clone", json!({}), json!({}));
  sprite.script(hat, &[delete]);

  let mut runtime = runtime(vec![TargetBuilder::stage(), sprite]);
  runtime.trigger_green_flag();
  runtime.sweep().unwrap();
  assert_eq!(runtime.queue_len(), 0);
  assert_eq!(runtime.project.order.len(), 1);
  assert!(runtime.project.targets.values().all(|target| !target.is_clone));
}

#[test]
fn stop_all_ends_every_thread() {
  let mut stage = TargetBuilder::stage().variable("n", json!(0));
  let wait = stage.wait(0.);
  let stop = stage.stop("all");
  stage.green_flag(&[wait, stop]);

  let mut sprite = TargetBuilder::sprite("Cat", 1);
  let change = sprite.change("n", 1.);
  let forever = sprite.block("control_forever", json!({"SUBSTACK": [2, change]}), json!({}));
  sprite.green_flag(&[forever]);

  let mut runtime = runtime(vec![stage, sprite]);
  runtime.trigger_green_flag();
  let sweeps = run(&mut runtime, 10);
  assert_eq!(sweeps, 2);
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(2.));
}

#[test]
fn stop_this_script_ends_only_the_script() {
  let mut stage = TargetBuilder::stage().variable("n", json!(0));
  let stop = stage.stop("this script");
  let change = stage.change("n", 1.);
  stage.green_flag(&[stop, change]);
  let other = stage.change("n", 10.);
  stage.green_flag(&[other]);
  let mut runtime = runtime(vec![stage]);
  runtime.trigger_green_flag();
  runtime.sweep().unwrap();
  assert_eq!(runtime.queue_len(), 0);
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(10.));
}

#[test]
fn ask_waits_for_an_answer() {
  let mut stage = TargetBuilder::stage().variable("n", json!(0));
  let ask = stage.block("sensing_askandwait", json!({"QUESTION": text("name?")}), json!({}));
  let answer = stage.block("sensing_answer", json!({}), json!({}));
  let set = stage.set("n", json!([3, answer, [10, ""]]));
  stage.green_flag(&[ask, set]);
  let mut runtime = runtime(vec![stage]);
  runtime.trigger_green_flag();
  runtime.sweep().unwrap();
  runtime.sweep().unwrap();
  assert_eq!(runtime.question(), Some("name?"));
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(0.));
  runtime.answer("Ada");
  runtime.sweep().unwrap();
  assert_eq!(runtime.question(), None);
  assert_eq!(stage_variable(&runtime, "n"), Value::from("Ada"));
  assert_eq!(runtime.queue_len(), 0);
}

#[test]
fn malformed_procedures_skip_only_their_script() {
  let mut stage = TargetBuilder::stage().variable("n", json!(0));
  let call = stage.call("broken", &[]);
  stage.mutate(
    &call,
    json!({"tagName": "mutation", "proccode": "broken", "argumentids": "[oops"}),
  );
  stage.green_flag(&[call]);
  let set = stage.set("n", number(1.));
  stage.green_flag(&[set]);
  let mut runtime = runtime(vec![stage]);
  assert_eq!(runtime.project.warnings.len(), 1);
  {
    let target = runtime.project.stage().unwrap();
    assert_eq!(target.data.scripts.borrow().listeners.green_flag.len(), 1);
  }
  runtime.trigger_green_flag();
  run(&mut runtime, 10);
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(1.));
}

#[test]
fn errors_pause_the_runtime() {
  let mut runtime = runtime(vec![TargetBuilder::stage()]);
  {
    let target = runtime.project.stage().unwrap();
    let mut scripts = target.data.scripts.borrow_mut();
    let label = scripts.continuations.len();
    scripts.continuations.push(Continuation {
      code: Rc::from(vec![Op::Restore]),
      pc: 0,
    });
    scripts.listeners.green_flag.push(label);
  }
  let reported = Rc::new(Cell::new(0));
  let counter = Rc::clone(&reported);
  runtime.set_error_handler(move |_| counter.set(counter.get() + 1));
  runtime.start();
  runtime.trigger_green_flag();
  assert!(matches!(runtime.step(), Err(Error::FrameUnderflow(_))));
  assert!(!runtime.is_running());
  assert_eq!(reported.get(), 1);
  assert!(runtime.step().is_ok());
}

fn counting_sprite(show: bool) -> Vec<TargetBuilder> {
  let stage = TargetBuilder::stage().variable("n", json!(0));
  let mut sprite = TargetBuilder::sprite("Cat", 1);
  let mut body = vec![sprite.change("n", 1.)];
  if show {
    body.push(sprite.block("looks_show", json!({}), json!({})));
  }
  let forever = sprite.forever(&body);
  sprite.green_flag(&[forever]);
  vec![stage, sprite]
}

#[test]
fn step_keeps_sweeping_until_something_is_drawn() {
  let mut runtime = runtime(counting_sprite(false));
  runtime.start();
  runtime.trigger_green_flag();
  runtime.step().unwrap();
  assert!(stage_variable(&runtime, "n").to_f64() > 1.);
}

#[test]
fn visual_changes_end_the_step() {
  let mut runtime = runtime(counting_sprite(true));
  runtime.start();
  runtime.trigger_green_flag();
  runtime.step().unwrap();
  assert!(runtime.visual());
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(1.));
}

#[test]
fn turbo_ignores_visual_changes() {
  let config = Config {
    turbo: true,
    ..Config::default()
  };
  let mut runtime = runtime_with(counting_sprite(true), config);
  runtime.start();
  runtime.trigger_green_flag();
  runtime.step().unwrap();
  assert!(stage_variable(&runtime, "n").to_f64() > 1.);
}

#[test]
fn waits_yield_inside_warp() {
  let mut stage = TargetBuilder::stage().variable("n", json!(0));
  let wait = stage.wait(0.);
  let change = stage.change("n", 1.);
  let first = stage.stack(&[wait, change]);
  let warp = stage.block("control_warp", json!({"SUBSTACK": [2, first]}), json!({}));
  stage.green_flag(&[warp]);
  let mut runtime = runtime(vec![stage]);
  runtime.trigger_green_flag();
  runtime.sweep().unwrap();
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(0.));
  assert_eq!(runtime.queue_len(), 1);
  runtime.sweep().unwrap();
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(1.));
  assert_eq!(runtime.queue_len(), 0);
}

#[test]
fn stop_other_scripts_spares_other_targets() {
  let mut stage = TargetBuilder::stage()
    .variable("n", json!(0))
    .variable("k", json!(0))
    .variable("done", json!(0));
  let change = stage.change("n", 1.);
  let forever = stage.forever(&[change]);
  stage.green_flag(&[forever]);
  let wait = stage.wait(0.);
  let stop = stage.stop("other scripts in stage");
  let set = stage.set("done", number(1.));
  stage.green_flag(&[wait, stop, set]);

  let mut sprite = TargetBuilder::sprite("Cat", 1);
  let change = sprite.change("k", 1.);
  let forever = sprite.forever(&[change]);
  sprite.green_flag(&[forever]);

  let mut runtime = runtime(vec![stage, sprite]);
  runtime.trigger_green_flag();
  for _ in 0..3 {
    runtime.sweep().unwrap();
  }
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(2.));
  assert_eq!(stage_variable(&runtime, "done"), Value::Number(1.));
  assert_eq!(stage_variable(&runtime, "k"), Value::Number(3.));
  assert_eq!(runtime.queue_len(), 1);
}

#[test]
fn any_key_scripts_run_for_every_key() {
  let mut stage = TargetBuilder::stage()
    .variable("any", json!(0))
    .variable("a", json!(0))
    .variable("space", json!(0));
  let change = stage.change("any", 1.);
  stage.when_key_pressed("any", &[change]);
  let change = stage.change("a", 1.);
  stage.when_key_pressed("a", &[change]);
  let change = stage.change("space", 1.);
  stage.when_key_pressed("space", &[change]);
  let mut runtime = runtime(vec![stage]);

  assert_eq!(runtime.trigger_key("A").len(), 2);
  run(&mut runtime, 10);
  runtime.trigger_key("space");
  run(&mut runtime, 10);
  assert_eq!(stage_variable(&runtime, "any"), Value::Number(2.));
  assert_eq!(stage_variable(&runtime, "a"), Value::Number(1.));
  assert_eq!(stage_variable(&runtime, "space"), Value::Number(1.));
}

#[test]
fn zero_second_glides_move_then_yield_once() {
  let stage = TargetBuilder::stage().variable("n", json!(0));
  let mut sprite = TargetBuilder::sprite("Cat", 1);
  let glide = sprite.glide_to(0., 50., 20.);
  let change = sprite.change("n", 1.);
  sprite.green_flag(&[glide, change]);
  let mut runtime = runtime(vec![stage, sprite]);
  runtime.trigger_green_flag();
  runtime.sweep().unwrap();
  assert_eq!(sprite_position(&runtime, "Cat"), (50., 20.));
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(0.));
  runtime.sweep().unwrap();
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(1.));
  assert_eq!(runtime.queue_len(), 0);
}

#[test]
fn glides_stand_still_while_paused() {
  let mut sprite = TargetBuilder::sprite("Cat", 1);
  let glide = sprite.glide_to(10., 100., 0.);
  sprite.green_flag(&[glide]);
  let mut runtime = runtime(vec![TargetBuilder::stage(), sprite]);
  runtime.start();
  runtime.pause();
  runtime.trigger_green_flag();
  for _ in 0..5 {
    runtime.sweep().unwrap();
    sleep(Duration::from_millis(2));
  }
  assert_eq!(sprite_position(&runtime, "Cat"), (0., 0.));
  assert_eq!(runtime.queue_len(), 1);
}

#[test]
fn glides_finish_on_a_runtime_that_was_never_started() {
  let mut sprite = TargetBuilder::sprite("Cat", 1);
  let glide = sprite.glide_to(0.01, 100., 0.);
  sprite.green_flag(&[glide]);
  let mut runtime = runtime(vec![TargetBuilder::stage(), sprite]);
  runtime.trigger_green_flag();
  runtime.sweep().unwrap();
  assert_eq!(runtime.queue_len(), 1);
  sleep(Duration::from_millis(30));
  runtime.sweep().unwrap();
  assert_eq!(sprite_position(&runtime, "Cat"), (100., 0.));
  assert_eq!(runtime.queue_len(), 0);
}

#[test]
fn the_clock_stops_between_pause_and_start() {
  let mut runtime = runtime(vec![TargetBuilder::stage()]);
  let fresh = runtime.now();
  sleep(Duration::from_millis(5));
  assert!(runtime.now() > fresh);
  runtime.start();
  runtime.pause();
  let paused = runtime.now();
  sleep(Duration::from_millis(5));
  assert_eq!(runtime.now(), paused);
  runtime.start();
  sleep(Duration::from_millis(5));
  assert!(runtime.now() > paused);
}

#[test]
fn pen_colour_params_change_the_drawn_colour() {
  let stage = TargetBuilder::stage();
  let mut sprite = TargetBuilder::sprite("Pen", 1);
  let hue = sprite.block("pen_setPenHueToNumber", json!({"HUE": number(0.)}), json!({}));
  let down = sprite.block("pen_penDown", json!({}), json!({}));
  let menu = sprite.block("pen_menu_colorParam", json!({}), json!({"colorParam": ["transparency", null]}));
  let transparency = sprite.block(
    "pen_changePenColorParamBy",
    json!({"COLOR_PARAM": [1, menu], "VALUE": number(50.)}),
    json!({}),
  );
  let again = sprite.block("pen_penDown", json!({}), json!({}));
  sprite.green_flag(&[hue, down, transparency, again]);
  let mut runtime = runtime(vec![stage, sprite]);
  runtime.trigger_green_flag();
  run(&mut runtime, 10);
  let colors: Vec<Color> = runtime
    .project
    .shared
    .pen
    .iter()
    .filter_map(|instruction| match instruction {
      PenInstruction::Line { color, .. } => Some(*color),
      _ => None,
    })
    .collect();
  let red = Color { r: 255, g: 0, b: 0, a: 255 };
  assert_eq!(colors, vec![red, Color { a: 128, ..red }]);
}

#[test]
fn tempo_blocks_share_one_tempo() {
  let mut stage = TargetBuilder::stage().variable("n", json!(0));
  let set = stage.block("music_setTempo", json!({"TEMPO": number(120.)}), json!({}));
  let change = stage.block("music_changeTempo", json!({"TEMPO": number(-30.)}), json!({}));
  let tempo = stage.block("music_getTempo", json!({}), json!({}));
  let report = stage.set("n", json!([3, tempo, [10, ""]]));
  stage.green_flag(&[set, change, report]);
  let mut runtime = runtime(vec![stage]);
  assert_eq!(runtime.project.shared.tempo, 60.);
  runtime.trigger_green_flag();
  run(&mut runtime, 10);
  assert_eq!(stage_variable(&runtime, "n"), Value::Number(90.));
}
