//! The cooperative scheduler.
//!
//! Threads live in a queue of slots. A sweep takes every occupied slot in
//! order, runs its continuation until it yields or ends, and writes the
//! thread back into its slot if it yielded. Threads started during a sweep
//! are appended and run later in the same sweep.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use derivative::Derivative;
use log::{debug, error, trace};

use crate::block::Value;
use crate::error::{Error, Result};
use crate::hat;
use crate::project::Project;
use crate::script::{Continuation, LabelId, Listeners};
use crate::target::TargetId;
use crate::thread::{ExecutionContext, Frame, Thread, ThreadKey};

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Runtime {
  pub project: Project,
  queue: Vec<Option<Thread>>,
  /// Slot of every queued thread. Entries may be stale and are checked
  /// against the queue on lookup.
  slots: HashMap<ThreadKey, usize>,
  /// Key and slot of the thread being run.
  running: Option<(ThreadKey, usize)>,
  is_running: bool,
  pub(crate) visual: bool,
  base_time: Instant,
  base_now: f64,
  /// Set by `pause`. The clock only stands still between `pause` and the
  /// next `start`, so a runtime that was never started still keeps time.
  clock_stopped: bool,
  pub(crate) timer_start: f64,
  #[derivative(Debug = "ignore")]
  error_handler: Box<dyn FnMut(&Error)>,
}

impl Runtime {
  pub fn new(project: Project) -> Self {
    Runtime {
      project,
      queue: Vec::new(),
      slots: HashMap::new(),
      running: None,
      is_running: false,
      visual: false,
      base_time: Instant::now(),
      base_now: 0.,
      clock_stopped: false,
      timer_start: 0.,
      error_handler: Box::new(|err| error!("{err}")),
    }
  }

  /// Project time in milliseconds since the runtime was made. Stands
  /// still while paused.
  pub fn now(&self) -> f64 {
    if self.clock_stopped {
      self.base_now
    } else {
      self.base_now + self.base_time.elapsed().as_secs_f64() * 1000.
    }
  }

  pub fn start(&mut self) {
    if self.is_running {
      return;
    }
    if self.clock_stopped {
      self.base_time = Instant::now();
      self.clock_stopped = false;
    }
    self.is_running = true;
  }

  pub fn pause(&mut self) {
    if !self.is_running {
      return;
    }
    self.base_now = self.now();
    self.clock_stopped = true;
    self.is_running = false;
  }

  pub fn is_running(&self) -> bool {
    self.is_running
  }

  /// Whether the last step changed anything a renderer would draw.
  pub fn visual(&self) -> bool {
    self.visual
  }

  pub fn queue_len(&self) -> usize {
    self.queue.iter().flatten().count()
  }

  /// Replaces the handler that is told about the error that paused the
  /// runtime.
  pub fn set_error_handler(&mut self, handler: impl FnMut(&Error) + 'static) {
    self.error_handler = Box::new(handler);
  }

  fn slot(&self, key: ThreadKey) -> Option<usize> {
    let index = *self.slots.get(&key)?;
    match self.queue.get(index) {
      Some(Some(thread)) if thread.key == key => Some(index),
      _ => None,
    }
  }

  /// Queues a thread running the script at `key`. A thread that is already
  /// queued or running is restarted when `replace` is set and left alone
  /// otherwise.
  pub(crate) fn start_thread(&mut self, key: ThreadKey, replace: bool) {
    let existing = self.slot(key).or_else(|| {
      self
        .running
        .filter(|(running, _)| *running == key)
        .map(|(_, index)| index)
    });
    if let Some(index) = existing {
      if replace {
        trace!("restarting thread {}:{}", key.target, key.base);
        self.queue[index] = Some(Thread::new(key));
        self.slots.insert(key, index);
      }
      return;
    }
    trace!("starting thread {}:{}", key.target, key.base);
    self.slots.insert(key, self.queue.len());
    self.queue.push(Some(Thread::new(key)));
  }

  /// Whether any of `keys` is still queued.
  pub fn running(&self, keys: &[ThreadKey]) -> bool {
    keys.iter().any(|&key| self.slot(key).is_some())
  }

  /// Runs every queued thread once.
  pub fn sweep(&mut self) -> Result<()> {
    let mut index = 0;
    while index < self.queue.len() {
      if let Some(thread) = self.queue[index].take() {
        self.running = Some((thread.key, index));
        let result = self.run_thread(thread, index);
        self.running = None;
        result?;
      }
      index += 1;
    }
    self.queue.retain(Option::is_some);
    self.slots = self
      .queue
      .iter()
      .enumerate()
      .filter_map(|(index, thread)| thread.as_ref().map(|thread| (thread.key, index)))
      .collect();
    Ok(())
  }

  fn run_thread(&mut self, thread: Thread, index: usize) -> Result<()> {
    let key = thread.key;
    let mut ctx = ExecutionContext::new(thread)?;
    while let Some(label) = ctx.immediate.take() {
      let continuation = self.continuation(ctx.target, label)?;
      self.execute(&mut ctx, &continuation)?;
    }
    if self.queue[index].is_none() {
      if let Some(thread) = ctx.into_thread() {
        self.queue[index] = Some(thread);
      } else {
        trace!("thread {}:{} finished", key.target, key.base);
      }
    }
    Ok(())
  }

  fn continuation(&self, target: TargetId, label: LabelId) -> Result<Continuation> {
    let target = self.project.target(target)?;
    let scripts = target.data.scripts.borrow();
    scripts
      .continuations
      .get(label)
      .cloned()
      .ok_or(Error::MissingContinuation(label))
  }

  /// Advances one frame: sweeps until something visual changed, the frame
  /// budget is used or no thread is left. An error pauses the runtime.
  pub fn step(&mut self) -> Result<()> {
    if !self.is_running {
      return Ok(());
    }
    self.visual = false;
    let start = Instant::now();
    let budget = Duration::from_secs_f64(1. / self.project.config.frame_rate.max(1) as f64);
    loop {
      if let Err(err) = self.sweep() {
        self.pause();
        (self.error_handler)(&err);
        return Err(err);
      }
      let turbo = self.project.config.turbo;
      if !((turbo || !self.visual) && start.elapsed() < budget && !self.queue.is_empty()) {
        return Ok(());
      }
    }
  }

  /// Starts the threads of `target` the listeners picked by `select` name.
  fn trigger_for(
    &mut self,
    target: TargetId,
    select: &dyn Fn(&Listeners) -> Vec<LabelId>,
    replace: bool,
  ) -> Vec<ThreadKey> {
    let Some(data) = self.project.targets.get(&target).map(|target| target.data.clone()) else {
      return Vec::new();
    };
    let labels = select(&data.scripts.borrow().listeners);
    let keys: Vec<ThreadKey> = labels
      .into_iter()
      .map(|base| ThreadKey { target, base })
      .collect();
    for &key in &keys {
      self.start_thread(key, replace);
    }
    keys
  }

  /// Triggers every sprite from front to back, then the stage.
  fn trigger(&mut self, select: &dyn Fn(&Listeners) -> Vec<LabelId>, replace: bool) -> Vec<ThreadKey> {
    let mut targets: Vec<TargetId> = self.project.order.iter().rev().copied().collect();
    targets.push(self.project.stage);
    targets
      .into_iter()
      .flat_map(|target| self.trigger_for(target, select, replace))
      .collect()
  }

  pub fn trigger_green_flag(&mut self) -> Vec<ThreadKey> {
    self.timer_start = self.now();
    debug!("green flag");
    self.trigger(&|listeners: &Listeners| listeners.green_flag.clone(), true)
  }

  /// Starts the scripts waiting for a message. Names match without regard
  /// to case.
  pub fn broadcast(&mut self, message: &str) -> Vec<ThreadKey> {
    let message = message.to_lowercase();
    trace!("broadcast {message:?}");
    self.trigger(
      &|listeners: &Listeners| listeners.receive.get(&message).cloned().unwrap_or_default(),
      true,
    )
  }

  pub(crate) fn backdrop_switched(&mut self, backdrop: &str) -> Vec<ThreadKey> {
    let backdrop = backdrop.to_lowercase();
    self.trigger(
      &|listeners: &Listeners| {
        listeners
          .backdrop_switch
          .get(&backdrop)
          .cloned()
          .unwrap_or_default()
      },
      true,
    )
  }

  /// Starts the key-pressed scripts of `key`. Running ones keep running.
  pub fn trigger_key(&mut self, key: &str) -> Vec<ThreadKey> {
    let code = hat::key_code(key);
    self.trigger(
      &|listeners: &Listeners| {
        let mut labels = listeners.key_pressed.get(&code).cloned().unwrap_or_default();
        if code != "any" {
          labels.extend(listeners.key_pressed.get("any").into_iter().flatten());
        }
        labels
      },
      false,
    )
  }

  pub fn key_down(&mut self, key: &str) -> Vec<ThreadKey> {
    self.project.shared.keys.insert(hat::key_code(key));
    self.trigger_key(key)
  }

  pub fn key_up(&mut self, key: &str) {
    self.project.shared.keys.remove(&hat::key_code(key));
  }

  pub fn trigger_click(&mut self, target: TargetId) -> Vec<ThreadKey> {
    self.trigger_for(target, &|listeners: &Listeners| listeners.clicked.clone(), true)
  }

  pub fn set_mouse(&mut self, x: f64, y: f64) {
    self.project.shared.mouse_x = x;
    self.project.shared.mouse_y = y;
  }

  pub fn set_mouse_down(&mut self, down: bool) {
    self.project.shared.mouse_down = down;
  }

  /// The question of the pending ask, if any.
  pub fn question(&self) -> Option<&str> {
    self.project.shared.question.as_deref()
  }

  /// Answers the pending ask. Does nothing when nobody asked.
  pub fn answer(&mut self, text: &str) {
    let shared = &mut self.project.shared;
    if shared.question.take().is_none() {
      return;
    }
    shared.answer = text.to_string();
    shared.prompt_id += 1;
  }

  /// Calls the procedure `proccode` of the running target. Unknown
  /// procedures continue at `then` right away.
  pub(crate) fn call(
    &mut self,
    ctx: &mut ExecutionContext,
    proccode: &str,
    then: LabelId,
    arguments: Vec<Value>,
  ) -> Result<()> {
    let procedure = {
      let target = self.project.target(ctx.target)?;
      let scripts = target.data.scripts.borrow();
      scripts.procedures.get(proccode).cloned()
    };
    let Some(procedure) = procedure else {
      ctx.immediate = Some(then);
      return Ok(());
    };
    ctx.push_call(Frame {
      base: Some(procedure.entry),
      return_to: Some(then),
      arguments,
      outer_warp: ctx.warp,
      ..Frame::default()
    });
    if procedure.warp || ctx.warp > 0 {
      ctx.warp += 1;
      ctx.immediate = Some(procedure.entry);
    } else if ctx.recursing(procedure.entry, self.project.config.recursion_depth) {
      trace!("deferring recursive call of {proccode:?}");
      ctx.force_queue(procedure.entry);
    } else {
      ctx.immediate = Some(procedure.entry);
    }
    Ok(())
  }

  /// Clones the sprite `name`, or the running target for `_myself_`.
  /// The stage and unknown names are ignored.
  pub(crate) fn clone_sprite(&mut self, ctx: &ExecutionContext, name: &str) -> Result<()> {
    let parent = if name == "_myself_" {
      Some(self.project.target(ctx.target)?)
    } else {
      self.project.sprite_by_name(name)
    };
    let Some(parent) = parent.filter(|parent| !parent.is_stage()).map(|parent| parent.id) else {
      return Ok(());
    };
    let id = self.project.new_id();
    let clone = self.project.target(parent)?.clone_as(id);
    let visible = clone.state.visible;
    debug!("cloning {} {} as {}", clone.name(), parent, id);
    self.project.targets.insert(id, clone);
    let order = &mut self.project.order;
    let position = order
      .iter()
      .position(|&target| target == parent)
      .unwrap_or(order.len());
    order.insert(position, id);
    self.trigger_for(id, &|listeners: &Listeners| listeners.cloned.clone(), true);
    if visible {
      self.visual = true;
    }
    Ok(())
  }

  /// Removes a clone and every thread running on it.
  pub(crate) fn remove_clone(&mut self, id: TargetId) {
    let Some(target) = self.project.targets.remove(&id) else {
      return;
    };
    debug!("removing clone {} of {}", id, target.name());
    self.project.order.retain(|&target| target != id);
    self.clear_threads(|key| key.target == id);
    if target.state.visible {
      self.visual = true;
    }
  }

  fn clear_threads(&mut self, mut filter: impl FnMut(ThreadKey) -> bool) {
    for slot in &mut self.queue {
      if slot.as_ref().is_some_and(|thread| filter(thread.key)) {
        *slot = None;
      }
    }
  }

  /// Stops the other threads of the running target.
  pub(crate) fn stop_others(&mut self, ctx: &ExecutionContext) {
    let target = ctx.target;
    let running = self.running.map(|(_, index)| index);
    for (index, slot) in self.queue.iter_mut().enumerate() {
      if Some(index) != running && slot.as_ref().is_some_and(|thread| thread.key.target == target) {
        *slot = None;
      }
    }
  }

  /// Stops every thread, removes all clones and resets speech bubbles,
  /// graphic effects and prompts.
  pub fn stop_all(&mut self) {
    self.clear_threads(|_| true);
    let project = &mut self.project;
    project.targets.retain(|_, target| !target.is_clone);
    let targets = &project.targets;
    project.order.retain(|id| targets.contains_key(id));
    for target in project.targets.values_mut() {
      target.state.effects.clear();
      if target.state.say.is_some() {
        target.say(String::new(), false);
      }
    }
    let shared = &mut project.shared;
    shared.prompt_id = 0;
    shared.next_prompt_id = 0;
    shared.question = None;
    self.visual = true;
    debug!("stopped all threads");
  }

  /// Seconds since the green flag or the last timer reset.
  pub(crate) fn timer(&self) -> f64 {
    (self.now() - self.timer_start) / 1000.
  }
}
