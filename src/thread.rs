use std::mem;

use crate::block::Value;
use crate::error::{Error, Result};
use crate::script::LabelId;
use crate::target::TargetId;

/// Identifies a thread: the target it runs on and the entry label of its
/// script. At most one thread per key is queued at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadKey {
  pub target: TargetId,
  pub base: LabelId,
}

/// Scratch registers of one block that spans several ticks. A block that
/// needs them saves the enclosing registers first and restores them when
/// it is done.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Locals {
  pub count: f64,
  pub start: f64,
  pub duration: f64,
  pub first: bool,
  pub base_x: f64,
  pub base_y: f64,
  pub delta_x: f64,
  pub delta_y: f64,
  pub say_id: u64,
  pub prompt: u64,
  pub threads: Vec<ThreadKey>,
}

/// One procedure call level.
#[derive(Debug, Clone, Default)]
pub struct Frame {
  /// Entry label of the called procedure, `None` for the script itself.
  pub base: Option<LabelId>,
  pub return_to: Option<LabelId>,
  pub arguments: Vec<Value>,
  /// Warp counter of the caller, put back when the call returns.
  pub outer_warp: u32,
  pub locals: Locals,
  pub saved: Vec<Locals>,
}

#[derive(Debug)]
pub struct Thread {
  pub key: ThreadKey,
  pub label: LabelId,
  pub calls: Vec<Frame>,
  pub warp: u32,
}

impl Thread {
  pub fn new(key: ThreadKey) -> Self {
    Thread {
      key,
      label: key.base,
      calls: vec![Frame::default()],
      warp: 0,
    }
  }
}

/// Everything a running continuation may touch besides the runtime:
/// the thread it belongs to, unpacked for the duration of one run.
#[derive(Debug)]
pub struct ExecutionContext {
  pub target: TargetId,
  pub base: LabelId,
  /// Frames below the live one.
  pub calls: Vec<Frame>,
  pub frame: Frame,
  pub warp: u32,
  pub stopped: bool,
  /// Where the thread continues next tick, if it yielded.
  pub resume: Option<LabelId>,
  /// Where it continues right now, without yielding.
  pub immediate: Option<LabelId>,
}

impl ExecutionContext {
  pub fn new(thread: Thread) -> Result<Self> {
    let Thread {
      key,
      label,
      mut calls,
      warp,
    } = thread;
    let frame = calls.pop().ok_or(Error::FrameUnderflow(key.target))?;
    Ok(ExecutionContext {
      target: key.target,
      base: key.base,
      calls,
      frame,
      warp,
      stopped: false,
      resume: None,
      immediate: Some(label),
    })
  }

  pub fn key(&self) -> ThreadKey {
    ThreadKey {
      target: self.target,
      base: self.base,
    }
  }

  /// Packs the context back into a thread when it asked to be resumed.
  pub fn into_thread(self) -> Option<Thread> {
    if self.stopped {
      return None;
    }
    let key = self.key();
    let label = self.resume?;
    let mut calls = self.calls;
    calls.push(self.frame);
    Some(Thread {
      key,
      label,
      calls,
      warp: self.warp,
    })
  }

  /// Yields until the next tick, or continues right away in warp mode.
  pub fn queue(&mut self, label: LabelId) {
    if self.warp > 0 {
      self.immediate = Some(label);
    } else {
      self.force_queue(label);
    }
  }

  /// Yields until the next tick, even in warp mode.
  pub fn force_queue(&mut self, label: LabelId) {
    if !self.stopped {
      self.resume = Some(label);
    }
  }

  pub fn save(&mut self) {
    let locals = mem::take(&mut self.frame.locals);
    self.frame.saved.push(locals);
  }

  pub fn restore(&mut self) -> Result<()> {
    self.frame.locals = self
      .frame
      .saved
      .pop()
      .ok_or(Error::FrameUnderflow(self.target))?;
    Ok(())
  }

  /// Pushes a call frame and makes it live.
  pub fn push_call(&mut self, frame: Frame) {
    let caller = mem::replace(&mut self.frame, frame);
    self.calls.push(caller);
  }

  /// Leaves the live procedure call. Returns `false` when there is no call
  /// to leave, which ends the thread.
  pub fn end_call(&mut self) -> bool {
    let Some(caller) = self.calls.pop() else {
      return false;
    };
    let frame = mem::replace(&mut self.frame, caller);
    self.warp = frame.outer_warp;
    self.immediate = frame.return_to;
    true
  }

  /// Whether one of the `depth` innermost callers is already running the
  /// procedure starting at `entry`.
  pub fn recursing(&self, entry: LabelId, depth: usize) -> bool {
    self
      .calls
      .iter()
      .rev()
      .take(depth)
      .any(|frame| frame.base == Some(entry))
  }
}
