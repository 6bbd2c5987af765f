// src/lib.rs

//! satify-flow: a small async step pipeline engine.
//!
//! A pipeline is an ordered list of named steps. Each step may carry
//! `before`, `on` and `after` handlers that operate on a shared, lockable
//! context (`ContextData<T>`). Any handler can halt the run early with
//! `PipelineControl::Stop`, which is how business outcomes that are not
//! errors (a rejected callback, an already-settled order) leave a pipeline.
//!
//! Pipelines are registered in a `Flows` registry keyed by their context
//! type, so call sites only need to build a context and call `run`.

pub mod core;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use crate::core::context::{Handler, HandlerFuture};
pub use crate::core::context_data::ContextData;
pub use crate::core::control::{PipelineControl, PipelineResult};
pub use crate::core::step::{SkipCondition, StepDef};

pub use crate::pipeline::definition::Pipeline;

pub use crate::error::{FlowError, FlowResult};

pub use crate::registry::Flows;
