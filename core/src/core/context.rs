// core/src/core/context.rs

//! Handler signatures shared by every pipeline phase.

use crate::core::context_data::ContextData;
use crate::core::control::PipelineControl;
use std::future::Future;
use std::pin::Pin;

/// Boxed future produced by a step handler.
pub type HandlerFuture<Err> = Pin<Box<dyn Future<Output = Result<PipelineControl, Err>> + Send>>;

/// A step handler.
///
/// Handlers receive a clone of the run's `ContextData<TData>`. Lock guards
/// taken inside a handler must be released before the next `.await`.
pub type Handler<TData, Err> = Box<dyn Fn(ContextData<TData>) -> HandlerFuture<Err> + Send + Sync>;
