// core/src/pipeline/definition.rs

//! The `Pipeline<TData, Err>` struct and its structural editing methods.

use crate::core::context::Handler;
use crate::core::step::{SkipCondition, StepDef};
use crate::error::FlowError;
use std::collections::HashMap;

/// The three phases a step's handlers can be attached to, run in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Phase {
  Before,
  On,
  After,
}

impl Phase {
  pub(crate) const ORDERED: [Phase; 3] = [Phase::Before, Phase::On, Phase::After];

  pub(crate) fn label(self) -> &'static str {
    match self {
      Phase::Before => "before",
      Phase::On => "on",
      Phase::After => "after",
    }
  }
}

/// An ordered list of named steps over a root context `TData`.
///
/// Handlers return `Result<PipelineControl, Err>`. `Err` must be buildable
/// from `FlowError` so that engine failures (a non-optional step without
/// handlers, a registry dispatch mismatch) surface in the caller's own error
/// type.
pub struct Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) steps: Vec<StepDef<TData>>,
  pub(crate) handlers: HashMap<(String, Phase), Vec<Handler<TData, Err>>>,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Creates a pipeline from `(name, optional, skip_if)` triples.
  pub fn new(step_defs: &[(&str, bool, Option<SkipCondition<TData>>)]) -> Self {
    let steps = step_defs
      .iter()
      .map(|(name, optional, skip_if)| StepDef::new(*name, *optional, skip_if.clone()))
      .collect();

    Self {
      steps,
      handlers: HashMap::new(),
    }
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name.as_str()).collect()
  }

  fn position_of(&self, step_name: &str) -> Option<usize> {
    self.steps.iter().position(|s| s.name == step_name)
  }

  /// Panics when the step is unknown. A typo in a step name is a wiring bug,
  /// not a runtime condition.
  pub(crate) fn ensure_step_exists(&self, step_name: &str) -> usize {
    match self.position_of(step_name) {
      Some(idx) => idx,
      None => panic!("satify-flow setup error: step '{}' is not defined in this pipeline", step_name),
    }
  }

  fn ensure_step_not_exists(&self, step_name: &str) {
    if self.position_of(step_name).is_some() {
      panic!("satify-flow setup error: step '{}' is already defined", step_name);
    }
  }

  pub fn insert_before_step(
    &mut self,
    existing_step_name: &str,
    new_step_name: impl Into<String>,
    optional: bool,
    skip_if: Option<SkipCondition<TData>>,
  ) {
    let idx = self.ensure_step_exists(existing_step_name);
    let name = new_step_name.into();
    self.ensure_step_not_exists(&name);
    self.steps.insert(idx, StepDef::new(name, optional, skip_if));
  }

  pub fn insert_after_step(
    &mut self,
    existing_step_name: &str,
    new_step_name: impl Into<String>,
    optional: bool,
    skip_if: Option<SkipCondition<TData>>,
  ) {
    let idx = self.ensure_step_exists(existing_step_name);
    let name = new_step_name.into();
    self.ensure_step_not_exists(&name);
    self.steps.insert(idx + 1, StepDef::new(name, optional, skip_if));
  }

  /// Removes a step together with all of its handlers. Unknown names are ignored.
  pub fn remove_step(&mut self, step_name: &str) {
    if let Some(idx) = self.position_of(step_name) {
      self.steps.remove(idx);
      self.handlers.retain(|(name, _), _| name != step_name);
    }
  }

  pub fn set_optional(&mut self, step_name: &str, optional: bool) {
    let idx = self.ensure_step_exists(step_name);
    self.steps[idx].optional = optional;
  }

  pub fn set_skip_condition(&mut self, step_name: &str, skip_if: Option<SkipCondition<TData>>) {
    let idx = self.ensure_step_exists(step_name);
    self.steps[idx].skip_if = skip_if;
  }

  pub(crate) fn handlers_for(&self, step_name: &str, phase: Phase) -> &[Handler<TData, Err>] {
    self
      .handlers
      .get(&(step_name.to_string(), phase))
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }
}
