use std::collections::{HashMap, HashSet, LinkedList};
use std::rc::Rc;

use derivative::Derivative;
use log::info;

use crate::compiler::{compile_target, DataNames, Warnings};
use crate::error::{Error, Result};
use crate::json::{self, TargetSource};
use crate::pen::PenInstruction;
use crate::target::{Target, TargetData, TargetId};

#[derive(Debug, Clone)]
pub struct Config {
  pub stage_width: u32,
  pub stage_height: u32,
  pub frame_rate: u32,
  /// Keep sweeping after a visual change until the frame budget is used.
  pub turbo: bool,
  /// How many callers a non-warp call looks through for itself before it
  /// defers to the next tick.
  pub recursion_depth: usize,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      stage_width: 480,
      stage_height: 360,
      frame_rate: 30,
      turbo: false,
      recursion_depth: 5,
    }
  }
}

/// State every target can see: the pen layer, the host's input and the
/// music tempo.
#[derive(Derivative)]
#[derivative(Debug, Default)]
pub struct SharedState {
  pub pen: LinkedList<PenInstruction>,
  pub mouse_x: f64,
  pub mouse_y: f64,
  pub mouse_down: bool,
  /// Codes of the keys held down.
  pub keys: HashSet<String>,
  pub answer: String,
  /// Prompt currently shown; asks with a higher ticket wait their turn.
  pub prompt_id: u64,
  pub next_prompt_id: u64,
  pub question: Option<String>,
  pub username: String,
  /// Beats per minute.
  #[derivative(Default(value = "60."))]
  pub tempo: f64,
}

#[derive(Debug)]
pub struct Project {
  pub config: Config,
  pub targets: HashMap<TargetId, Target>,
  /// Sprites and clones from back to front.
  pub order: Vec<TargetId>,
  pub stage: TargetId,
  pub shared: SharedState,
  pub warnings: Warnings,
  next_id: u32,
}

impl Project {
  /// Loads project.json and compiles every script in it.
  pub fn load(text: &str, config: Config) -> Result<Project> {
    let mut sources = json::load(text)?;
    let stage = sources
      .iter()
      .position(|source| source.is_stage)
      .ok_or(Error::MissingStage)?;
    let stage = sources.remove(stage);
    sources.sort_by_key(|source| source.layer_order);

    let mut project = Project {
      config,
      targets: HashMap::new(),
      order: Vec::with_capacity(sources.len()),
      stage: TargetId(0),
      shared: SharedState::default(),
      warnings: Warnings::default(),
      next_id: 0,
    };
    let mut warnings = Warnings::default();
    project.stage = project.add(stage, &DataNames::default(), &mut warnings);
    let globals = DataNames::of(&project.stage()?.state);
    for source in sources {
      let id = project.add(source, &globals, &mut warnings);
      project.order.push(id);
    }
    warnings.flush();
    info!(
      "loaded {} sprites, {} compiler warnings",
      project.order.len(),
      warnings.len()
    );
    project.warnings = warnings;
    Ok(project)
  }

  fn add(&mut self, source: TargetSource, globals: &DataNames, warnings: &mut Warnings) -> TargetId {
    let TargetSource {
      name,
      is_stage,
      blocks,
      mut state,
      costumes,
      sounds,
      ..
    } = source;
    let data = Rc::new(TargetData::new(name, is_stage, costumes, sounds));
    compile_target(&data, &blocks, globals, &mut state, warnings);
    let id = self.new_id();
    self.targets.insert(
      id,
      Target {
        id,
        data,
        state,
        is_clone: false,
      },
    );
    id
  }

  pub fn new_id(&mut self) -> TargetId {
    let id = TargetId(self.next_id);
    self.next_id += 1;
    id
  }

  pub fn target(&self, id: TargetId) -> Result<&Target> {
    self.targets.get(&id).ok_or(Error::MissingTarget(id))
  }

  pub fn target_mut(&mut self, id: TargetId) -> Result<&mut Target> {
    self.targets.get_mut(&id).ok_or(Error::MissingTarget(id))
  }

  pub fn stage(&self) -> Result<&Target> {
    self.target(self.stage)
  }

  /// The sprite called `name`, ignoring clones.
  pub fn sprite_by_name(&self, name: &str) -> Option<&Target> {
    self
      .order
      .iter()
      .filter_map(|id| self.targets.get(id))
      .find(|target| !target.is_clone && target.name() == name)
  }

  /// Like [`Project::sprite_by_name`], also finding the stage by its name
  /// or as `_stage_`.
  pub fn target_by_name(&self, name: &str) -> Option<&Target> {
    if let Some(sprite) = self.sprite_by_name(name) {
      return Some(sprite);
    }
    let stage = self.stage().ok()?;
    (name == "_stage_" || name == stage.name()).then_some(stage)
  }
}
