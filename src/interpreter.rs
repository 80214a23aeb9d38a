//! Executes continuations on behalf of the scheduler.

use chrono::{Datelike, Local, Timelike, Utc};
use log::debug;

use crate::block::{list_to_string, Value};
use crate::error::Result;
use crate::expression::convert;
use crate::hat::key_code;
use crate::pen::{Color, ColorParam, PenColor, PenInstruction};
use crate::runtime::Runtime;
use crate::script::{
  Backdrop, BinaryOp, Continuation, DataRef, DatePart, Destination, Expr, MathFunc, Op, Scope, Sensor,
  Statement,
};
use crate::target::{degrees_to_radians, radians_to_degrees, Target, TargetId};
use crate::thread::ExecutionContext;

impl Runtime {
  /// Runs `continuation` until it yields, jumps to another label or ends.
  pub(crate) fn execute(&mut self, ctx: &mut ExecutionContext, continuation: &Continuation) -> Result<()> {
    let code = &continuation.code;
    let mut pc = continuation.pc;
    while let Some(op) = code.get(pc) {
      pc += 1;
      match op {
        Op::Do(statement) => self.statement(ctx, statement)?,
        Op::Jump(to) => pc = *to,
        Op::JumpUnless(condition, to) => {
          if !self.eval(ctx, condition)?.to_bool() {
            pc = *to;
          }
        }
        Op::JumpIf(condition, to) => {
          if self.eval(ctx, condition)?.to_bool() {
            pc = *to;
          }
        }
        Op::Save => ctx.save(),
        Op::Restore => ctx.restore()?,
        Op::SetCount(times) => ctx.frame.locals.count = self.eval(ctx, times)?.to_f64(),
        Op::CountDown(to) => {
          let locals = &mut ctx.frame.locals;
          if locals.count >= 0.5 {
            locals.count -= 1.;
          } else {
            pc = *to;
          }
        }
        Op::StartTimer(duration) => {
          let duration = self.eval(ctx, duration)?.to_f64();
          self.start_timer(ctx, duration);
        }
        Op::StartSound { sound, missing } => {
          let sound = self.eval(ctx, sound)?;
          let target = self.project.target(ctx.target)?;
          match target.data.sound(&sound) {
            Some(sound) => {
              debug!("{} plays {} until done", target.name(), sound.name);
              let duration = sound.duration();
              self.start_timer(ctx, duration);
            }
            None => pc = *missing,
          }
        }
        Op::AwaitTimer(label) => {
          let locals = &mut ctx.frame.locals;
          if self.now() - locals.start < locals.duration * 1000. || locals.first {
            locals.first = false;
            ctx.force_queue(*label);
            return Ok(());
          }
        }
        Op::StartGlide {
          duration,
          destination,
        } => self.start_glide(ctx, duration, destination)?,
        Op::GlideStep(label) => {
          let locals = &ctx.frame.locals;
          let fraction = if locals.duration <= 0. {
            1.
          } else {
            ((self.now() - locals.start) / (locals.duration * 1000.)).min(1.)
          };
          let x = locals.base_x + fraction * locals.delta_x;
          let y = locals.base_y + fraction * locals.delta_y;
          self.move_sprite(ctx.target, x, y)?;
          let locals = &mut ctx.frame.locals;
          if fraction < 1. || locals.first {
            locals.first = false;
            ctx.force_queue(*label);
            return Ok(());
          }
        }
        Op::Queue(label) => {
          ctx.queue(*label);
          return Ok(());
        }
        Op::ForceQueue(label) => {
          ctx.force_queue(*label);
          return Ok(());
        }
        Op::Broadcast { message, wait } => {
          let message = self.eval(ctx, message)?.to_string();
          let threads = self.broadcast(&message);
          if threads.contains(&ctx.key()) {
            return Ok(());
          }
          if *wait {
            ctx.frame.locals.threads = threads;
          }
        }
        Op::AwaitThreads(label) => {
          if self.running(&ctx.frame.locals.threads) {
            ctx.force_queue(*label);
            return Ok(());
          }
        }
        Op::SwitchBackdrop { backdrop, wait } => {
          let backdrop = match backdrop {
            Backdrop::To(backdrop) => Some(self.eval(ctx, backdrop)?),
            Backdrop::Next => None,
          };
          let stage = self.project.stage;
          let stage = self.project.target_mut(stage)?;
          match backdrop {
            Some(backdrop) => stage.set_costume(&backdrop),
            None => stage.next_costume(),
          }
          let name = stage.costume_name().to_string();
          self.visual = true;
          let threads = self.backdrop_switched(&name);
          if threads.contains(&ctx.key()) {
            return Ok(());
          }
          if *wait {
            ctx.frame.locals.threads = threads;
          }
        }
        Op::Call {
          proccode,
          arguments,
          then,
        } => {
          let arguments = arguments
            .iter()
            .map(|argument| self.eval(ctx, argument))
            .collect::<Result<Vec<_>>>()?;
          return self.call(ctx, proccode, *then, arguments);
        }
        Op::EndCall => {
          ctx.end_call();
          return Ok(());
        }
        Op::StopAll => {
          self.stop_all();
          ctx.stopped = true;
          return Ok(());
        }
        Op::StopOthers => self.stop_others(ctx),
        Op::DeleteClone => {
          if self.project.target(ctx.target)?.is_clone {
            self.remove_clone(ctx.target);
            ctx.stopped = true;
            return Ok(());
          }
        }
        Op::WarpEnter => ctx.warp += 1,
        Op::WarpExit => ctx.warp = ctx.warp.saturating_sub(1),
        Op::TakePromptTicket => {
          let shared = &mut self.project.shared;
          ctx.frame.locals.prompt = shared.next_prompt_id;
          shared.next_prompt_id += 1;
        }
        Op::AwaitPromptTurn(label) => {
          if self.project.shared.prompt_id < ctx.frame.locals.prompt {
            ctx.force_queue(*label);
            return Ok(());
          }
        }
        Op::Ask(question) => {
          let question = self.eval(ctx, question)?.to_string();
          debug!("{} asks {question:?}", self.project.target(ctx.target)?.name());
          let shared = &mut self.project.shared;
          shared.question = Some(question);
        }
        Op::AwaitAnswer(label) => {
          if self.project.shared.prompt_id == ctx.frame.locals.prompt {
            ctx.force_queue(*label);
            return Ok(());
          }
        }
      }
    }
    Ok(())
  }

  fn start_timer(&self, ctx: &mut ExecutionContext, duration: f64) {
    let locals = &mut ctx.frame.locals;
    locals.start = self.now();
    locals.duration = duration;
    locals.first = true;
  }

  fn start_glide(&mut self, ctx: &mut ExecutionContext, duration: &Expr, destination: &Destination) -> Result<()> {
    let duration = self.eval(ctx, duration)?.to_f64();
    let point = match destination {
      Destination::Point(x, y) => Some((self.eval(ctx, x)?.to_f64(), self.eval(ctx, y)?.to_f64())),
      Destination::Object(object) => {
        let object = self.eval(ctx, object)?.to_string();
        self.position(&object)
      }
    };
    let target = self.project.target(ctx.target)?;
    let (base_x, base_y) = (target.state.x, target.state.y);
    let now = self.now();
    let locals = &mut ctx.frame.locals;
    locals.start = now;
    locals.first = true;
    locals.base_x = base_x;
    locals.base_y = base_y;
    match point {
      Some((x, y)) if !target.is_stage() => {
        locals.duration = duration;
        locals.delta_x = x - base_x;
        locals.delta_y = y - base_y;
      }
      _ => {
        locals.duration = 0.;
        locals.delta_x = 0.;
        locals.delta_y = 0.;
      }
    }
    Ok(())
  }

  /// Position of `_mouse_`, a random point or a sprite.
  fn position(&self, name: &str) -> Option<(f64, f64)> {
    let shared = &self.project.shared;
    let config = &self.project.config;
    match name {
      "_mouse_" => Some((shared.mouse_x, shared.mouse_y)),
      "_random_" => {
        let (width, height) = (config.stage_width as f64, config.stage_height as f64);
        Some((
          (width * unit_random() - width / 2.).round(),
          (height * unit_random() - height / 2.).round(),
        ))
      }
      _ => self
        .project
        .sprite_by_name(name)
        .map(|sprite| (sprite.state.x, sprite.state.y)),
    }
  }

  /// Flags a redraw if the target shows up on screen.
  fn touch(&mut self, id: TargetId) {
    if let Some(target) = self.project.targets.get(&id) {
      if target.state.visible || target.state.pen.down {
        self.visual = true;
      }
    }
  }

  fn draw(&mut self, instruction: Option<PenInstruction>) {
    if let Some(instruction) = instruction {
      self.project.shared.pen.push_back(instruction);
      self.visual = true;
    }
  }

  fn move_sprite(&mut self, id: TargetId, x: f64, y: f64) -> Result<()> {
    let target = self.project.target_mut(id)?;
    if target.is_stage() {
      return Ok(());
    }
    let line = target.move_to(x, y);
    self.draw(line);
    self.touch(id);
    Ok(())
  }

  /// The running target, or `None` for the stage.
  fn sprite_mut(&mut self, id: TargetId) -> Result<Option<&mut Target>> {
    let target = self.project.target_mut(id)?;
    Ok((!target.is_stage()).then_some(target))
  }

  fn owner(&self, ctx: &ExecutionContext, scope: Scope) -> Result<&Target> {
    match scope {
      Scope::Stage => self.project.stage(),
      Scope::Target => self.project.target(ctx.target),
    }
  }

  fn owner_mut(&mut self, ctx: &ExecutionContext, scope: Scope) -> Result<&mut Target> {
    let id = match scope {
      Scope::Stage => self.project.stage,
      Scope::Target => ctx.target,
    };
    self.project.target_mut(id)
  }

  fn list(&self, ctx: &ExecutionContext, list: &DataRef) -> Result<&[Value]> {
    let owner = self.owner(ctx, list.scope)?;
    Ok(owner.state.lists.get(&*list.name).map(Vec::as_slice).unwrap_or(&[]))
  }

  fn list_mut(&mut self, ctx: &ExecutionContext, list: &DataRef) -> Result<&mut Vec<Value>> {
    let owner = self.owner_mut(ctx, list.scope)?;
    Ok(owner.state.lists.entry(list.name.to_string()).or_default())
  }

  fn statement(&mut self, ctx: &mut ExecutionContext, statement: &Statement) -> Result<()> {
    let id = ctx.target;
    match statement {
      Statement::MoveSteps(steps) => {
        let steps = self.eval(ctx, steps)?.to_f64();
        if let Some(sprite) = self.sprite_mut(id)? {
          let line = sprite.forward(steps);
          self.draw(line);
          self.touch(id);
        }
      }
      Statement::Turn(degrees) => {
        let degrees = self.eval(ctx, degrees)?.to_f64();
        if let Some(sprite) = self.sprite_mut(id)? {
          sprite.set_direction(sprite.state.direction + degrees);
          self.touch(id);
        }
      }
      Statement::GoTo(to) => {
        let to = self.eval(ctx, to)?.to_string();
        if let Some((x, y)) = self.position(&to) {
          self.move_sprite(id, x, y)?;
        }
      }
      Statement::GoToXY(x, y) => {
        let x = self.eval(ctx, x)?.to_f64();
        let y = self.eval(ctx, y)?.to_f64();
        self.move_sprite(id, x, y)?;
      }
      Statement::PointInDirection(direction) => {
        let direction = self.eval(ctx, direction)?.to_f64();
        if let Some(sprite) = self.sprite_mut(id)? {
          sprite.set_direction(direction);
          self.touch(id);
        }
      }
      Statement::PointTowards(towards) => {
        let towards = self.eval(ctx, towards)?.to_string();
        if let Some((x, y)) = self.position(&towards) {
          if let Some(sprite) = self.sprite_mut(id)? {
            sprite.point_towards(x, y);
            self.touch(id);
          }
        }
      }
      Statement::ChangeX(dx) => {
        let dx = self.eval(ctx, dx)?.to_f64();
        let state = &self.project.target(id)?.state;
        let (x, y) = (state.x + dx, state.y);
        self.move_sprite(id, x, y)?;
      }
      Statement::SetX(x) => {
        let x = self.eval(ctx, x)?.to_f64();
        let y = self.project.target(id)?.state.y;
        self.move_sprite(id, x, y)?;
      }
      Statement::ChangeY(dy) => {
        let dy = self.eval(ctx, dy)?.to_f64();
        let state = &self.project.target(id)?.state;
        let (x, y) = (state.x, state.y + dy);
        self.move_sprite(id, x, y)?;
      }
      Statement::SetY(y) => {
        let y = self.eval(ctx, y)?.to_f64();
        let x = self.project.target(id)?.state.x;
        self.move_sprite(id, x, y)?;
      }
      Statement::BounceOnEdge => {
        let config = &self.project.config;
        let (width, height) = (config.stage_width as f64, config.stage_height as f64);
        if let Some(sprite) = self.sprite_mut(id)? {
          sprite.bounce_on_edge(width, height);
          self.touch(id);
        }
      }
      Statement::SetRotationStyle(style) => {
        if let Some(sprite) = self.sprite_mut(id)? {
          sprite.state.rotation_style = *style;
          self.touch(id);
        }
      }
      Statement::Say {
        message,
        think,
        remember,
      } => {
        let message = self.eval(ctx, message)?.to_string();
        if let Some(sprite) = self.sprite_mut(id)? {
          let bubble = sprite.say(message, *think);
          if *remember {
            ctx.frame.locals.say_id = bubble;
          }
          self.touch(id);
        }
      }
      Statement::Unsay => {
        if let Some(sprite) = self.sprite_mut(id)? {
          if sprite.state.say_id == ctx.frame.locals.say_id {
            sprite.say(String::new(), false);
            self.touch(id);
          }
        }
      }
      Statement::SwitchCostume(costume) => {
        let costume = self.eval(ctx, costume)?;
        self.project.target_mut(id)?.set_costume(&costume);
        self.touch(id);
      }
      Statement::NextCostume => {
        self.project.target_mut(id)?.next_costume();
        self.touch(id);
      }
      Statement::ChangeSize(change) => {
        let change = self.eval(ctx, change)?.to_f64();
        let target = self.project.target_mut(id)?;
        target.set_size(target.state.size + change);
        self.touch(id);
      }
      Statement::SetSize(size) => {
        let size = self.eval(ctx, size)?.to_f64();
        self.project.target_mut(id)?.set_size(size);
        self.touch(id);
      }
      Statement::ChangeEffect(effect, change) => {
        let change = self.eval(ctx, change)?.to_f64();
        self.project.target_mut(id)?.change_effect(effect, change);
        self.touch(id);
      }
      Statement::SetEffect(effect, value) => {
        let value = self.eval(ctx, value)?.to_f64();
        self.project.target_mut(id)?.set_effect(effect, value);
        self.touch(id);
      }
      Statement::ClearEffects => {
        self.project.target_mut(id)?.state.effects.clear();
        self.touch(id);
      }
      Statement::Show | Statement::Hide => {
        if let Some(sprite) = self.sprite_mut(id)? {
          sprite.state.visible = matches!(statement, Statement::Show);
          self.visual = true;
        }
      }
      Statement::GoToFront | Statement::GoToBack => {
        let order = &mut self.project.order;
        if let Some(index) = order.iter().position(|&target| target == id) {
          order.remove(index);
          if matches!(statement, Statement::GoToFront) {
            order.push(id);
          } else {
            order.insert(0, id);
          }
          self.touch(id);
        }
      }
      Statement::ChangeLayer(layers) => {
        let layers = self.eval(ctx, layers)?.to_f64();
        let order = &mut self.project.order;
        if let Some(index) = order.iter().position(|&target| target == id) {
          order.remove(index);
          let index = (index as f64 + layers.trunc()).clamp(0., order.len() as f64);
          order.insert(index as usize, id);
          self.touch(id);
        }
      }
      Statement::PlaySound(sound) => {
        let sound = self.eval(ctx, sound)?;
        let target = self.project.target(id)?;
        if let Some(sound) = target.data.sound(&sound) {
          debug!("{} plays {}", target.name(), sound.name);
        }
      }
      Statement::StopAllSounds => debug!("stop all sounds"),
      Statement::ChangeVolume(change) => {
        let change = self.eval(ctx, change)?.to_f64();
        let target = self.project.target_mut(id)?;
        target.set_volume(target.state.volume + change);
      }
      Statement::SetVolume(volume) => {
        let volume = self.eval(ctx, volume)?.to_f64();
        self.project.target_mut(id)?.set_volume(volume);
      }
      Statement::SetDragMode(draggable) => {
        self.project.target_mut(id)?.state.draggable = *draggable;
      }
      Statement::ResetTimer => self.timer_start = self.now(),
      Statement::SetVariable(variable, value) => {
        let value = self.eval(ctx, value)?;
        let owner = self.owner_mut(ctx, variable.scope)?;
        owner.state.variables.insert(variable.name.to_string(), value);
      }
      Statement::ChangeVariable(variable, change) => {
        let change = self.eval(ctx, change)?.to_f64();
        let owner = self.owner_mut(ctx, variable.scope)?;
        let value = owner
          .state
          .variables
          .entry(variable.name.to_string())
          .or_default();
        *value = Value::Number(value.to_f64() + change);
      }
      Statement::ShowVariable(variable, show) => {
        let watchers = &mut self.owner_mut(ctx, variable.scope)?.state.watchers;
        if *show {
          watchers.insert(variable.name.to_string());
        } else {
          watchers.remove(&*variable.name);
        }
        self.visual = true;
      }
      Statement::AddToList(list, item) => {
        let item = self.eval(ctx, item)?;
        self.list_mut(ctx, list)?.push(item);
      }
      Statement::DeleteOfList(list, index) => {
        let index = self.eval(ctx, index)?;
        let list = self.list_mut(ctx, list)?;
        if matches!(&index, Value::String(all) if all == "all") {
          list.clear();
        } else if let Some(index) = list_index(&index, list.len()) {
          list.remove(index);
        }
      }
      Statement::DeleteAllOfList(list) => self.list_mut(ctx, list)?.clear(),
      Statement::InsertAtList(list, index, item) => {
        let index = self.eval(ctx, index)?;
        let item = self.eval(ctx, item)?;
        let list = self.list_mut(ctx, list)?;
        if let Some(index) = list_index(&index, list.len() + 1) {
          list.insert(index, item);
        }
      }
      Statement::ReplaceItemOfList(list, index, item) => {
        let index = self.eval(ctx, index)?;
        let item = self.eval(ctx, item)?;
        let list = self.list_mut(ctx, list)?;
        if let Some(index) = list_index(&index, list.len()) {
          list[index] = item;
        }
      }
      Statement::Clone(of) => {
        let of = self.eval(ctx, of)?.to_string();
        self.clone_sprite(ctx, &of)?;
      }
      Statement::PenClear => {
        self.project.shared.pen.clear();
        self.visual = true;
      }
      Statement::Stamp => {
        let target = self.project.target(id)?;
        if !target.is_stage() {
          let state = &target.state;
          let stamp = PenInstruction::Stamp {
            costume: target.costume_name().to_string(),
            x: state.x,
            y: state.y,
            size: state.size,
            direction: state.direction,
          };
          self.draw(Some(stamp));
        }
      }
      Statement::PenDown => {
        if let Some(sprite) = self.sprite_mut(id)? {
          let state = &mut sprite.state;
          state.pen.down = true;
          let dot = PenInstruction::Line {
            size: state.pen.size,
            color: state.pen.color.rgba(),
            x1: state.x,
            y1: state.y,
            x2: state.x,
            y2: state.y,
          };
          self.draw(Some(dot));
        }
      }
      Statement::PenUp => {
        if let Some(sprite) = self.sprite_mut(id)? {
          sprite.state.pen.down = false;
        }
      }
      Statement::SetPenColor(color) => {
        let color = self.eval(ctx, color)?.to_string();
        if let (Some(color), Some(sprite)) = (Color::parse(&color), self.sprite_mut(id)?) {
          sprite.state.pen.color = PenColor::shifted(color);
        }
      }
      Statement::SetPenParam(param, value) => {
        let param = self.eval(ctx, param)?.to_string();
        let value = self.eval(ctx, value)?.to_f64();
        if let (Some(param), Some(sprite)) = (ColorParam::parse(&param), self.sprite_mut(id)?) {
          sprite.state.pen.color.set_param(param, value);
        }
      }
      Statement::ChangePenParam(param, change) => {
        let param = self.eval(ctx, param)?.to_string();
        let change = self.eval(ctx, change)?.to_f64();
        if let (Some(param), Some(sprite)) = (ColorParam::parse(&param), self.sprite_mut(id)?) {
          sprite.state.pen.color.change_param(param, change);
        }
      }
      Statement::ChangePenSize(change) => {
        let change = self.eval(ctx, change)?.to_f64();
        if let Some(sprite) = self.sprite_mut(id)? {
          sprite.state.pen.size = (sprite.state.pen.size + change).max(1.);
        }
      }
      Statement::SetPenSize(size) => {
        let size = self.eval(ctx, size)?.to_f64();
        if let Some(sprite) = self.sprite_mut(id)? {
          sprite.state.pen.size = size.max(1.);
        }
      }
      Statement::SetTempo(tempo) => {
        let tempo = self.eval(ctx, tempo)?.to_f64();
        self.project.shared.tempo = tempo;
      }
      Statement::ChangeTempo(change) => {
        let change = self.eval(ctx, change)?.to_f64();
        self.project.shared.tempo += change;
      }
    }
    Ok(())
  }

  pub(crate) fn eval(&self, ctx: &ExecutionContext, expr: &Expr) -> Result<Value> {
    Ok(match expr {
      Expr::Const(value) => value.clone(),
      Expr::Variable(variable) => self
        .owner(ctx, variable.scope)?
        .state
        .variables
        .get(&*variable.name)
        .cloned()
        .unwrap_or_default(),
      Expr::ListContents(list) => Value::String(list_to_string(self.list(ctx, list)?)),
      Expr::Argument(index) => ctx.frame.arguments.get(*index).cloned().unwrap_or_default(),
      Expr::Cast(ty, expr) => convert(&self.eval(ctx, expr)?, *ty),
      Expr::Not(expr) => Value::Bool(!self.eval(ctx, expr)?.to_bool()),
      Expr::Binary(op, lhs, rhs) => self.binary(ctx, *op, lhs, rhs)?,
      Expr::Round(expr) => Value::Number((self.eval(ctx, expr)?.to_f64() + 0.5).floor()),
      Expr::Length(expr) => Value::Number(self.eval(ctx, expr)?.to_string().chars().count() as f64),
      Expr::Math(func, expr) => Value::Number(math(*func, self.eval(ctx, expr)?.to_f64())),
      Expr::Sensor(sensor) => self.sensor(ctx, *sensor)?,
      Expr::Current(part) => Value::Number(current(*part)),
      Expr::KeyPressed(key) => {
        let key = key_code(&self.eval(ctx, key)?.to_string());
        let keys = &self.project.shared.keys;
        Value::Bool(if key == "any" {
          !keys.is_empty()
        } else {
          keys.contains(&key)
        })
      }
      Expr::Attribute { property, object } => {
        let object = self.eval(ctx, object)?.to_string();
        self.attribute(property, &object)
      }
      Expr::DistanceTo(object) => {
        let object = self.eval(ctx, object)?.to_string();
        let target = self.project.target(ctx.target)?;
        let position = match object.as_str() {
          "_mouse_" => self.position(&object),
          _ => self
            .project
            .sprite_by_name(&object)
            .map(|sprite| (sprite.state.x, sprite.state.y)),
        };
        Value::Number(match position {
          Some((x, y)) if !target.is_stage() => (x - target.state.x).hypot(y - target.state.y),
          _ => 10000.,
        })
      }
      Expr::ItemOfList(list, index) => {
        let index = self.eval(ctx, index)?;
        let list = self.list(ctx, list)?;
        list_index(&index, list.len())
          .and_then(|index| list.get(index).cloned())
          .unwrap_or_else(|| Value::String(String::new()))
      }
      Expr::ItemNumOfList(list, item) => {
        let item = self.eval(ctx, item)?;
        let list = self.list(ctx, list)?;
        Value::Number(
          list
            .iter()
            .position(|value| value.equals(&item))
            .map_or(0., |index| (index + 1) as f64),
        )
      }
      Expr::LengthOfList(list) => Value::Number(self.list(ctx, list)?.len() as f64),
      Expr::ListContains(list, item) => {
        let item = self.eval(ctx, item)?;
        Value::Bool(self.list(ctx, list)?.iter().any(|value| value.equals(&item)))
      }
    })
  }

  fn binary(&self, ctx: &ExecutionContext, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<Value> {
    let lhs = self.eval(ctx, lhs)?;
    match op {
      BinaryOp::And if !lhs.to_bool() => return Ok(Value::Bool(false)),
      BinaryOp::Or if lhs.to_bool() => return Ok(Value::Bool(true)),
      _ => {}
    }
    let rhs = self.eval(ctx, rhs)?;
    let number = |f: fn(f64, f64) -> f64| Value::Number(f(lhs.to_f64(), rhs.to_f64()));
    Ok(match op {
      BinaryOp::Add => number(|x, y| x + y),
      BinaryOp::Subtract => number(|x, y| x - y),
      BinaryOp::Multiply => number(|x, y| x * y),
      BinaryOp::Divide => number(|x, y| x / y),
      BinaryOp::Mod => number(modulo),
      BinaryOp::Random => Value::Number(random(&lhs, &rhs)),
      BinaryOp::Lt => Value::Bool(lhs.compare(&rhs) < 0.),
      BinaryOp::Gt => Value::Bool(lhs.compare(&rhs) > 0.),
      BinaryOp::Equals => Value::Bool(lhs.equals(&rhs)),
      BinaryOp::And | BinaryOp::Or => Value::Bool(rhs.to_bool()),
      BinaryOp::Join => Value::String(format!("{lhs}{rhs}")),
      BinaryOp::LetterOf => {
        let index = lhs.to_f64().trunc();
        let letter = if index >= 1. {
          rhs.to_string().chars().nth(index as usize - 1)
        } else {
          None
        };
        Value::String(letter.map(String::from).unwrap_or_default())
      }
      BinaryOp::Contains => {
        let haystack = lhs.to_string().to_lowercase();
        Value::Bool(haystack.contains(&rhs.to_string().to_lowercase()))
      }
    })
  }

  fn sensor(&self, ctx: &ExecutionContext, sensor: Sensor) -> Result<Value> {
    let target = self.project.target(ctx.target)?;
    let shared = &self.project.shared;
    Ok(match sensor {
      Sensor::X => Value::Number(target.state.x),
      Sensor::Y => Value::Number(target.state.y),
      Sensor::Direction => Value::Number(target.state.direction),
      Sensor::CostumeNumber => Value::Number((target.state.current_costume + 1) as f64),
      Sensor::CostumeName => Value::from(target.costume_name()),
      Sensor::BackdropNumber => Value::Number((self.project.stage()?.state.current_costume + 1) as f64),
      Sensor::BackdropName => Value::from(self.project.stage()?.costume_name()),
      Sensor::Size => Value::Number(target.state.size),
      Sensor::Volume => Value::Number(target.state.volume),
      Sensor::Answer => Value::from(shared.answer.as_str()),
      Sensor::MouseX => Value::Number(shared.mouse_x),
      Sensor::MouseY => Value::Number(shared.mouse_y),
      Sensor::MouseDown => Value::Bool(shared.mouse_down),
      Sensor::Loudness => Value::Number(-1.),
      Sensor::Timer => Value::Number(self.timer()),
      Sensor::DaysSince2000 => Value::Number(millis_since_2000() / 86_400_000.),
      Sensor::Username => Value::from(shared.username.as_str()),
      Sensor::Tempo => Value::Number(shared.tempo),
    })
  }

  /// The `of` reporter: a property of a sprite or the stage, or one of its
  /// variables.
  fn attribute(&self, property: &str, object: &str) -> Value {
    let Some(target) = self.project.target_by_name(object) else {
      return Value::Number(0.);
    };
    let state = &target.state;
    let builtin = if target.is_stage() {
      match property {
        "background #" | "backdrop #" => Some(Value::Number((state.current_costume + 1) as f64)),
        "backdrop name" => Some(Value::from(target.costume_name())),
        "volume" => Some(Value::Number(state.volume)),
        _ => None,
      }
    } else {
      match property {
        "x position" => Some(Value::Number(state.x)),
        "y position" => Some(Value::Number(state.y)),
        "direction" => Some(Value::Number(state.direction)),
        "costume #" => Some(Value::Number((state.current_costume + 1) as f64)),
        "costume name" => Some(Value::from(target.costume_name())),
        "size" => Some(Value::Number(state.size)),
        "volume" => Some(Value::Number(state.volume)),
        _ => None,
      }
    };
    builtin
      .or_else(|| state.variables.get(property).cloned())
      .unwrap_or(Value::Number(0.))
  }
}

/// Resolves a list index: a 1-based number, `last`, or `random`/`any`.
/// Returns a 0-based index below `length`.
pub fn list_index(index: &Value, length: usize) -> Option<usize> {
  if let Value::String(keyword) = index {
    match keyword.as_str() {
      "random" | "any" => {
        return (length > 0).then(|| ((unit_random() * length as f64) as usize).min(length - 1));
      }
      "last" => return length.checked_sub(1),
      _ => {}
    }
  }
  let index = index.to_f64().trunc();
  (index >= 1. && index <= length as f64).then(|| index as usize - 1)
}

/// Modulo with the sign of the divisor.
pub fn modulo(x: f64, y: f64) -> f64 {
  let mut result = x % y;
  if result / y < 0. {
    result += y;
  }
  result
}

/// A random number between two bounds, inclusive. Integers unless a bound
/// is fractional or written with a decimal point.
pub fn random(x: &Value, y: &Value) -> f64 {
  let (mut low, mut high) = (x.to_f64(), y.to_f64());
  if low > high {
    std::mem::swap(&mut low, &mut high);
  }
  if x.is_int() && y.is_int() {
    (unit_random() * (high - low + 1.)).floor() + low
  } else {
    unit_random() * (high - low) + low
  }
}

/// Uniform in `[0, 1)`.
fn unit_random() -> f64 {
  let value = unsafe { libc::rand() };
  value as f64 / (libc::RAND_MAX as f64 + 1.)
}

fn round_to_ten_places(x: f64) -> f64 {
  (x * 1e10 + 0.5).floor() / 1e10
}

pub fn math(func: MathFunc, x: f64) -> f64 {
  match func {
    MathFunc::Abs => x.abs(),
    MathFunc::Floor => x.floor(),
    MathFunc::Ceiling => x.ceil(),
    MathFunc::Sqrt => x.sqrt(),
    MathFunc::Sin => round_to_ten_places(degrees_to_radians(x).sin()),
    MathFunc::Cos => round_to_ten_places(degrees_to_radians(x).cos()),
    MathFunc::Tan => {
      let angle = x - (x / 360.).floor() * 360.;
      if angle == 90. {
        f64::INFINITY
      } else if angle == 270. {
        f64::NEG_INFINITY
      } else {
        round_to_ten_places(degrees_to_radians(angle).tan())
      }
    }
    MathFunc::Asin => radians_to_degrees(x.asin()),
    MathFunc::Acos => radians_to_degrees(x.acos()),
    MathFunc::Atan => radians_to_degrees(x.atan()),
    MathFunc::Ln => x.ln(),
    MathFunc::Log => x.log10(),
    MathFunc::Exp => x.exp(),
    MathFunc::Pow10 => 10f64.powf(x),
  }
}

/// Milliseconds since 2000-01-01 UTC.
fn millis_since_2000() -> f64 {
  (Utc::now().timestamp_millis() - 946_684_800_000) as f64
}

/// Part of the current local date.
fn current(part: DatePart) -> f64 {
  let now = Local::now();
  (match part {
    DatePart::Year => now.year() as u32,
    DatePart::Month => now.month(),
    DatePart::Date => now.day(),
    DatePart::DayOfWeek => now.weekday().number_from_sunday(),
    DatePart::Hour => now.hour(),
    DatePart::Minute => now.minute(),
    DatePart::Second => now.second(),
  }) as f64
}
