// core/src/pipeline/execution.rs

//! `Pipeline::run()`.

use crate::core::context_data::ContextData;
use crate::core::control::{PipelineControl, PipelineResult};
use crate::error::FlowError;
use crate::pipeline::definition::{Phase, Pipeline};
use tracing::{event, info_span, instrument, Instrument, Level};

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Runs every step in order against `ctx_data`.
  ///
  /// Within a step, `before` handlers run first, then `on`, then `after`.
  /// The first handler to return `Stop` ends the run with
  /// `PipelineResult::Stopped`; the first error is returned as-is.
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(
      context_type = %std::any::type_name::<TData>(),
      num_steps = self.steps.len(),
    ),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    event!(Level::DEBUG, "Pipeline run starting.");

    for (step_index, step_def) in self.steps.iter().enumerate() {
      let step_name = step_def.name.as_str();

      if let Some(skip_if) = &step_def.skip_if {
        if skip_if(ctx_data.clone()) {
          event!(Level::DEBUG, step_name, "Step skipped by its skip condition.");
          continue;
        }
      }

      let has_handlers = Phase::ORDERED
        .iter()
        .any(|phase| !self.handlers_for(step_name, *phase).is_empty());
      if !has_handlers {
        if step_def.optional {
          event!(Level::DEBUG, step_name, "Optional step has no handlers, skipping.");
          continue;
        }
        event!(Level::ERROR, step_name, "Non-optional step has no handlers.");
        return Err(Err::from(FlowError::HandlerMissing {
          step_name: step_def.name.clone(),
        }));
      }

      for phase in Phase::ORDERED {
        for (handler_index, handler_fn) in self.handlers_for(step_name, phase).iter().enumerate() {
          let span = info_span!(
            "pipeline_step",
            step_name,
            step_index,
            phase = phase.label(),
            handler_index
          );
          match handler_fn(ctx_data.clone()).instrument(span).await {
            Ok(PipelineControl::Continue) => {}
            Ok(PipelineControl::Stop) => {
              event!(Level::INFO, step_name, phase = phase.label(), "Pipeline stopped by handler.");
              return Ok(PipelineResult::Stopped);
            }
            Err(e) => {
              event!(Level::WARN, step_name, phase = phase.label(), error = %e, "Handler failed.");
              return Err(e);
            }
          }
        }
      }
    }

    event!(Level::DEBUG, "Pipeline run completed.");
    Ok(PipelineResult::Completed)
  }
}
