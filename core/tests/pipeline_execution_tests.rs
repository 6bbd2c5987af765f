// tests/pipeline_execution_tests.rs
mod common;

use common::*;
use satify_flow::{ContextData, FlowError, Pipeline, PipelineControl, PipelineResult};
use serial_test::serial;
use std::sync::Arc;

#[tokio::test]
#[serial]
async fn steps_run_in_declaration_order() {
  setup_tracing();
  reset_counters();
  let mut pipeline =
    Pipeline::<TestContext, TestError>::new(&[("validate", false, None), ("price", false, None), ("persist", false, None)]);

  pipeline.on_root("validate", create_simple_handler("validate", " V"));
  pipeline.on_root("price", create_simple_handler("price", " P"));
  pipeline.on_root("persist", create_simple_handler("persist", " W"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Completed);
  let guard = ctx.read();
  assert_eq!(guard.counter, 3);
  assert_eq!(guard.message, " V P W");
  assert_eq!(guard.steps_executed, vec!["validate", "price", "persist"]);
  assert_eq!(handler_exec_count(), 3);
}

#[tokio::test]
#[serial]
async fn stop_signal_halts_remaining_steps() {
  setup_tracing();
  reset_counters();
  let mut pipeline =
    Pipeline::<TestContext, TestError>::new(&[("load", false, None), ("halt", false, None), ("settle", false, None)]);

  pipeline.on_root("load", create_simple_handler("load", "L"));
  pipeline.on_root("halt", |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      ctx.write().steps_executed.push("halt".to_string());
      Ok::<PipelineControl, FlowError>(PipelineControl::Stop)
    })
  });
  pipeline.on_root("settle", create_simple_handler("settle", "C"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Stopped);
  let guard = ctx.read();
  assert_eq!(guard.message, "L");
  assert_eq!(guard.steps_executed, vec!["load", "halt"]);
  assert_eq!(handler_exec_count(), 1);
}

#[tokio::test]
#[serial]
async fn stop_in_before_phase_skips_on_and_after() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("guarded", false, None)]);
  pipeline.before_root("guarded", create_simple_handler("before_guarded", "B"));
  pipeline.on_root("guarded", create_simple_handler("on_guarded", "O"));
  pipeline.after_root("guarded", create_simple_handler("after_guarded", "A"));

  let ctx = ContextData::new(TestContext {
    should_stop_at: Some("before_guarded".to_string()),
    ..Default::default()
  });
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Stopped);
  assert_eq!(ctx.read().steps_executed, vec!["before_guarded"]);
}

#[tokio::test]
#[serial]
async fn handler_error_is_returned_and_later_steps_do_not_run() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[
    ("load_order", false, None),
    ("reserve_stock", false, None),
    ("persist_order", false, None),
  ]);

  pipeline.on_root("load_order", create_simple_handler("load_order", "Loaded"));
  pipeline.on_root("reserve_stock", create_failing_handler("reserve_stock", "stock service unavailable"));
  pipeline.on_root("persist_order", create_simple_handler("persist_order", "NeverRun"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap_err(), TestError::Handler("stock service unavailable".to_string()));
  let guard = ctx.read();
  assert_eq!(guard.message, "Loaded");
  assert_eq!(guard.steps_executed, vec!["load_order", "reserve_stock"]);
}

#[tokio::test]
#[serial]
async fn skip_condition_bypasses_step() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[
    ("validate", false, None),
    (
      "apply_coupon",
      false,
      Some(Arc::new(|ctx: ContextData<TestContext>| ctx.read().counter > 0)),
    ),
    ("persist", false, None),
  ]);

  pipeline.on_root("validate", create_simple_handler("validate", " V"));
  pipeline.on_root("apply_coupon", create_simple_handler("apply_coupon", " COUPON"));
  pipeline.on_root("persist", create_simple_handler("persist", " W"));

  let ctx = ContextData::new(TestContext::default());
  assert_eq!(pipeline.run(ctx.clone()).await.unwrap(), PipelineResult::Completed);
  assert_eq!(ctx.read().message, " V W");
}

#[tokio::test]
#[serial]
async fn before_on_after_run_in_phase_order() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("checkout", false, None)]);

  // Registered out of order on purpose.
  pipeline.after_root("checkout", create_simple_handler("after_checkout", "After;"));
  pipeline.on_root("checkout", create_simple_handler("on_checkout", "On;"));
  pipeline.before_root("checkout", create_simple_handler("before_checkout", "Before;"));

  let ctx = ContextData::new(TestContext::default());
  pipeline.run(ctx.clone()).await.unwrap();

  let guard = ctx.read();
  assert_eq!(guard.message, "Before;On;After;");
  assert_eq!(guard.steps_executed, vec!["before_checkout", "on_checkout", "after_checkout"]);
}

#[tokio::test]
#[serial]
async fn optional_step_without_handlers_is_skipped() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("notify", true, None), ("price", false, None)]);
  pipeline.on_root("price", create_simple_handler("price", "2"));

  let ctx = ContextData::new(TestContext::default());
  assert_eq!(pipeline.run(ctx.clone()).await.unwrap(), PipelineResult::Completed);
  assert_eq!(ctx.read().steps_executed, vec!["price"]);
}

#[tokio::test]
#[serial]
async fn inserted_and_removed_steps_change_execution() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("first", false, None), ("last", false, None)]);
  pipeline.insert_before_step("last", "middle", false, None);
  pipeline.insert_after_step("last", "cleanup", false, None);
  assert_eq!(pipeline.step_names(), vec!["first", "middle", "last", "cleanup"]);

  pipeline.on_root("first", create_simple_handler("first", "1"));
  pipeline.on_root("middle", create_simple_handler("middle", "2"));
  pipeline.on_root("last", create_simple_handler("last", "3"));
  pipeline.on_root("cleanup", create_simple_handler("cleanup", "4"));
  pipeline.remove_step("middle");

  let ctx = ContextData::new(TestContext::default());
  pipeline.run(ctx.clone()).await.unwrap();
  assert_eq!(ctx.read().message, "134");
}

#[test]
#[should_panic(expected = "not defined")]
fn registering_handler_on_unknown_step_panics() {
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("only", false, None)]);
  pipeline.on_root("typo", create_simple_handler("typo", ""));
}
