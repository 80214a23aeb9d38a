use std::fs::{read_to_string, remove_dir_all};
use std::io::{stdin, BufRead};
use std::path::PathBuf;
use std::process::Command;
use std::thread::sleep;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use log::{debug, info, trace};

use rustphorus_vm::{Config, Project, Runtime};

/// Plays a Scratch 3 project without a window, logging what a renderer
/// would draw.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
  /// A .sb3 archive or an unpacked project.json
  path: PathBuf,

  #[arg(long, default_value_t = 30)]
  frame_rate: u32,

  /// Keep running threads after a visual change until the frame is over
  #[arg(long)]
  turbo: bool,

  #[arg(long, default_value_t = 5)]
  recursion_depth: usize,

  /// Stop after this many frames; runs until no thread is left otherwise
  #[arg(long)]
  ticks: Option<u64>,
}

fn read_project(path: &PathBuf) -> anyhow::Result<String> {
  if path.extension().is_some_and(|extension| extension == "sb3") {
    let status = Command::new("unzip")
      .arg("-o")
      .arg(path)
      .arg("project.json")
      .arg("-d")
      .arg("tmp")
      .status()
      .context("running unzip")?;
    if !status.success() {
      bail!("unzip failed on {}", path.display());
    }
    let text = read_to_string("tmp/project.json");
    remove_dir_all("tmp")?;
    return Ok(text?);
  }
  read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn log_state(runtime: &Runtime) {
  let project = &runtime.project;
  for id in &project.order {
    let Some(target) = project.targets.get(id) else {
      continue;
    };
    let state = &target.state;
    trace!(
      "{} {}: ({}, {}) {} {} {}",
      target.name(),
      target.id,
      state.x,
      state.y,
      state.direction,
      target.costume_name(),
      if state.visible { "shown" } else { "hidden" }
    );
    if let Some(say) = &state.say {
      info!(
        "{} {}: {}",
        target.name(),
        if say.think { "thinks" } else { "says" },
        say.message
      );
    }
  }
}

fn main() -> anyhow::Result<()> {
  pretty_env_logger::init();
  let cli = Cli::parse();
  let config = Config {
    frame_rate: cli.frame_rate.max(1),
    turbo: cli.turbo,
    recursion_depth: cli.recursion_depth,
    ..Config::default()
  };
  let text = read_project(&cli.path)?;
  let project = Project::load(&text, config)?;
  unsafe { libc::srand(std::process::id()) };

  let mut runtime = Runtime::new(project);
  runtime.start();
  runtime.trigger_green_flag();
  let frame = Duration::from_secs_f64(1. / cli.frame_rate.max(1) as f64);
  let mut input = stdin().lock().lines();
  let mut tick = 0;
  loop {
    runtime.step()?;
    tick += 1;
    if runtime.visual() {
      log_state(&runtime);
    }
    if let Some(question) = runtime.question().map(String::from) {
      info!("asked: {question}");
      let answer = input.next().transpose()?.unwrap_or_default();
      runtime.answer(&answer);
    }
    if cli.ticks.is_some_and(|ticks| tick >= ticks) {
      break;
    }
    if runtime.queue_len() == 0 {
      debug!("no threads left after {tick} ticks");
      break;
    }
    sleep(frame);
  }
  info!(
    "{} pen instructions drawn",
    runtime.project.shared.pen.len()
  );
  Ok(())
}
