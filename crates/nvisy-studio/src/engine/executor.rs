//! Single-node execution engine.

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::try_stream;
use futures::Stream;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::{EngineConfig, NodeCompiler};
use crate::definition::{ExecutionState, Node, Workflow, autoparse_fields};
use crate::error::{Error, Result};
use crate::event::{ExecuteComponentPayload, StudioServerEvent};
use crate::module::{HasCost, InvocationContext, InvocationSettings, Prediction};
use crate::report::{ErrorContext, ErrorReporter, LogReporter};
use crate::trace::{NoopTracer, TraceGuard, TraceOptions, Tracer};

/// Tracing target for engine operations.
const TRACING_TARGET: &str = "nvisy_studio::engine";

/// Runs single nodes of a workflow and reports their progress as events.
///
/// One execution compiles one node, invokes it once inside an optional trace
/// scope and emits, in order: a `debug` note, the start state change and
/// either the end state change or an error.
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    compiler: Arc<NodeCompiler>,
    tracer: Arc<dyn Tracer>,
    reporter: Arc<dyn ErrorReporter>,
    semaphore: Arc<Semaphore>,
}

impl Engine {
    /// Creates an engine that traces nothing and logs failures.
    ///
    /// A zero concurrency limit is raised to one.
    pub fn new(config: EngineConfig, compiler: NodeCompiler) -> Self {
        if config.max_concurrent_executions == 0 {
            tracing::warn!(
                target: TRACING_TARGET,
                "max_concurrent_executions is 0, allowing one execution at a time"
            );
        }
        let permits = config.max_concurrent_executions.max(1);
        let semaphore = Arc::new(Semaphore::new(permits));

        tracing::info!(
            target: TRACING_TARGET,
            max_concurrent_executions = permits,
            platform = %config.platform,
            environment = %config.environment,
            "Studio engine initialized"
        );

        Self {
            config,
            compiler: Arc::new(compiler),
            tracer: Arc::new(NoopTracer),
            reporter: Arc::new(LogReporter),
            semaphore,
        }
    }

    /// Sets the tracer used by workflows with tracing enabled.
    #[must_use]
    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// Sets the error reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the node compiler.
    pub fn compiler(&self) -> &NodeCompiler {
        &self.compiler
    }

    /// Executes one node and streams its lifecycle events.
    ///
    /// A failed execution ends the stream with its error after the start
    /// event; no end event follows. When `cancel` fires, the in-flight
    /// invocation is abandoned and the stream ends with
    /// [`Error::Cancelled`]. An execution cancelled before it starts emits
    /// nothing else.
    ///
    /// The invocation and the trace flush run on their own task. Dropping the
    /// stream cancels the invocation, and the trace scope is still flushed.
    pub fn execute_component(
        &self,
        payload: ExecuteComponentPayload,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<StudioServerEvent>> + Send + 'static {
        let engine = self.clone();

        try_stream! {
            let permit = tokio::select! {
                biased;

                () = cancel.cancelled() => Err(Error::Cancelled),
                permit = engine.semaphore.clone().acquire_owned() => permit
                    .map_err(|e| Error::invocation(format!("semaphore closed: {e}"))),
            }?;

            let ExecuteComponentPayload { trace_id, workflow, node_id, inputs } = payload;

            tracing::debug!(
                target: TRACING_TARGET,
                trace_id = %trace_id,
                node_id = %node_id,
                workflow_id = %workflow.workflow_id,
                "Executing component"
            );
            yield StudioServerEvent::debug("executing component");

            workflow.validate()?;
            let node = workflow
                .node(&node_id)
                .cloned()
                .ok_or_else(|| Error::NodeNotFound(node_id.to_string()))?;

            if cancel.is_cancelled() {
                Err::<(), _>(Error::Cancelled)?;
            }

            yield StudioServerEvent::component_state(
                node_id.clone(),
                ExecutionState::running(&trace_id, raw_inputs(&inputs)),
            );

            let execution = cancel.child_token();
            let _abandon = execution.clone().drop_guard();
            let task = tokio::spawn({
                let engine = engine.clone();
                let trace_id = trace_id.clone();
                async move {
                    let _permit = permit;
                    engine
                        .run(&workflow, &node, &trace_id, &inputs, &execution)
                        .await
                }
            });

            let prediction = task
                .await
                .map_err(|e| Error::invocation(format!("execution task failed: {e}")))??;

            let cost = prediction.as_cost().map(HasCost::cost);
            tracing::debug!(
                target: TRACING_TARGET,
                trace_id = %trace_id,
                node_id = %node_id,
                cost = ?cost,
                "Component executed"
            );

            yield StudioServerEvent::component_state(
                node_id,
                ExecutionState::success(&trace_id, prediction.into_outputs(), cost),
            );
        }
    }

    /// Runs the node inside its trace scope and handles failure reporting.
    async fn run(
        &self,
        workflow: &Workflow,
        node: &Node,
        trace_id: &str,
        inputs: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Prediction> {
        let options = TraceOptions::new(trace_id, &workflow.api_key)
            .with_metadata("platform", &self.config.platform)
            .with_metadata("environment", &self.config.environment)
            .with_skip_root_span(true);

        let mut guard = TraceGuard::open(self.tracer.as_ref(), workflow.enable_tracing, options)
            .unwrap_or_else(|error| {
                tracing::warn!(
                    target: TRACING_TARGET,
                    trace_id = %trace_id,
                    error = %error,
                    "Failed to open trace scope, running untraced"
                );
                TraceGuard::Inactive
            });

        let result = self
            .invoke(&mut guard, workflow, node, trace_id, inputs, cancel)
            .await;

        if let Err(error) = &result
            && !error.is_cancelled()
            && !cancel.is_cancelled()
        {
            tracing::error!(
                target: TRACING_TARGET,
                trace_id = %trace_id,
                node_id = %node.id,
                node_type = node.type_name(),
                error = ?error,
                "Component execution failed"
            );
            self.reporter.report(
                error,
                &ErrorContext {
                    trace_id: trace_id.to_owned(),
                    workflow_id: workflow.workflow_id.clone(),
                },
            );
        }

        guard.finish().await;

        if cancel.is_cancelled() {
            tracing::debug!(
                target: TRACING_TARGET,
                trace_id = %trace_id,
                "Component execution cancelled"
            );
            return Err(Error::Cancelled);
        }

        result
    }

    /// Compiles the node and invokes it off the event-emitting task.
    async fn invoke(
        &self,
        guard: &mut TraceGuard,
        workflow: &Workflow,
        node: &Node,
        trace_id: &str,
        inputs: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Prediction> {
        let spans = guard.autotrack();
        let module = self.compiler.compile(node, workflow)?;
        let inputs = autoparse_fields(node.inputs(), inputs)?;

        let mut builder = InvocationContext::builder()
            .with_trace_id(trace_id)
            .with_settings(InvocationSettings::fresh())
            .with_cancel(cancel.clone());
        if let Some(spans) = spans {
            builder = builder.with_spans(spans);
        }
        let ctx = builder.build().map_err(Error::configuration)?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut handle = tokio::spawn(async move { module.forward(&ctx, inputs).await });

        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                handle.abort();
                Err(Error::Cancelled)
            }

            joined = &mut handle => match joined {
                Ok(result) => result,
                Err(error) => Err(Error::invocation(format!("invocation task failed: {error}"))),
            },
        }
    }
}

fn raw_inputs(inputs: &HashMap<String, String>) -> Map<String, Value> {
    inputs
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect()
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("compiler", &self.compiler)
            .field("available_permits", &self.semaphore.available_permits())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::{StreamExt, TryStreamExt};
    use serde_json::json;

    use super::*;
    use crate::definition::{
        Component, End, ExecutionStatus, Field, FieldType, LlmConfig, NodeId, Retriever,
        Signature,
    };
    use crate::mock::{
        MockLanguageModel, MockLanguageModelProvider, MockReporter, MockRetriever, MockTracer,
    };
    use crate::provider::RetrieverRegistry;

    struct Harness {
        engine: Engine,
        lm: Arc<MockLanguageModel>,
        tracer: Arc<MockTracer>,
        reporter: Arc<MockReporter>,
    }

    fn harness(lm: MockLanguageModel) -> Harness {
        let lm = Arc::new(lm);
        let compiler = NodeCompiler::new(Arc::new(MockLanguageModelProvider::new(lm.clone())))
            .with_retrievers(
                RetrieverRegistry::new()
                    .with_retriever("ColBERTv2", |_| Ok(Arc::new(MockRetriever::default()))),
            );
        let tracer = Arc::new(MockTracer::default());
        let reporter = Arc::new(MockReporter::default());
        let engine = Engine::new(EngineConfig::default(), compiler)
            .with_tracer(tracer.clone())
            .with_reporter(reporter.clone());

        Harness {
            engine,
            lm,
            tracer,
            reporter,
        }
    }

    fn workflow() -> Workflow {
        Workflow::new("wf_1", LlmConfig::new("openai/gpt-4o-mini"))
            .with_api_key("sk-test")
            .with_node(Node::new(
                "answer",
                Signature {
                    component: Component {
                        inputs: Some(vec![Field::new("question", FieldType::Str)]),
                        outputs: Some(vec![Field::new("answer", FieldType::Str)]),
                        ..Component::named("Answer")
                    },
                    ..Signature::default()
                },
            ))
            .with_node(Node::new(
                "retrieve",
                Retriever {
                    component: Component::named("Retrieve"),
                    cls: Some("Pinecone".into()),
                },
            ))
            .with_node(Node::new(
                "end",
                End {
                    component: Component {
                        inputs: Some(vec![Field::new("score", FieldType::Float)]),
                        ..Component::named("End")
                    },
                },
            ))
    }

    fn payload(trace_id: &str, node_id: &str) -> ExecuteComponentPayload {
        ExecuteComponentPayload {
            trace_id: trace_id.into(),
            workflow: workflow(),
            node_id: NodeId::new(node_id),
            inputs: HashMap::from([
                ("question".to_owned(), "What is Rust?".to_owned()),
                ("score".to_owned(), "0.5".to_owned()),
            ]),
        }
    }

    async fn collect(
        engine: &Engine,
        payload: ExecuteComponentPayload,
    ) -> (Vec<StudioServerEvent>, Option<Error>) {
        let stream = engine.execute_component(payload, CancellationToken::new());
        futures::pin_mut!(stream);

        let mut events = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => events.push(event),
                Err(error) => return (events, Some(error)),
            }
        }
        (events, None)
    }

    fn statuses(events: &[StudioServerEvent]) -> Vec<ExecutionStatus> {
        events
            .iter()
            .filter_map(|e| e.component_state_ref().map(|s| s.status))
            .collect()
    }

    #[tokio::test]
    async fn test_success_event_order() {
        let h = harness(MockLanguageModel::new("openai/gpt-4o-mini").with_cost(0.003));
        let (events, error) = collect(&h.engine, payload("trace_1", "answer")).await;

        assert!(error.is_none());
        assert_eq!(events[0].type_name(), "debug");
        assert_eq!(
            statuses(&events),
            vec![ExecutionStatus::Running, ExecutionStatus::Success]
        );

        let end = events.last().and_then(|e| e.component_state_ref()).unwrap();
        assert!(end.outputs.as_ref().unwrap().contains_key("answer"));
        assert_eq!(end.cost, Some(0.003));
        assert!(h.reporter.reports().is_empty());
    }

    #[tokio::test]
    async fn test_failure_has_no_end_event() {
        let h = harness(MockLanguageModel::new("openai/gpt-4o-mini").failing("rate limited"));
        let (events, error) = collect(&h.engine, payload("trace_1", "answer")).await;

        assert!(matches!(error, Some(Error::Invocation(_))));
        assert_eq!(statuses(&events), vec![ExecutionStatus::Running]);

        let reports = h.reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].1.trace_id, "trace_1");
        assert_eq!(reports[0].1.workflow_id, "wf_1");
    }

    #[tokio::test]
    async fn test_compilation_failure_is_reported() {
        let h = harness(MockLanguageModel::new("openai/gpt-4o-mini"));
        let (events, error) = collect(&h.engine, payload("trace_1", "retrieve")).await;

        assert!(matches!(error, Some(Error::Configuration(_))));
        assert_eq!(statuses(&events), vec![ExecutionStatus::Running]);
        assert_eq!(h.reporter.reports().len(), 1);
    }

    #[tokio::test]
    async fn test_flush_once_on_both_paths() {
        let h = harness(MockLanguageModel::new("openai/gpt-4o-mini"));
        collect(&h.engine, payload("trace_1", "answer")).await;
        assert_eq!(h.tracer.opened(), 1);
        assert_eq!(h.tracer.flushed(), 1);

        collect(&h.engine, payload("trace_2", "retrieve")).await;
        assert_eq!(h.tracer.opened(), 2);
        assert_eq!(h.tracer.flushed(), 2);

        let options = h.tracer.options();
        assert!(options[0].skip_root_span);
        assert_eq!(options[0].api_key, "sk-test");
        assert_eq!(
            options[0].metadata.get("platform").map(String::as_str),
            Some("optimization_studio")
        );
    }

    #[tokio::test]
    async fn test_flush_failure_does_not_mask_outcome() {
        let lm = Arc::new(MockLanguageModel::new("openai/gpt-4o-mini"));
        let tracer = Arc::new(MockTracer::failing_flush());
        let engine = Engine::new(
            EngineConfig::default(),
            NodeCompiler::new(Arc::new(MockLanguageModelProvider::new(lm))),
        )
        .with_tracer(tracer.clone());

        let (events, error) = collect(&engine, payload("trace_1", "answer")).await;
        assert!(error.is_none());
        assert_eq!(statuses(&events).last(), Some(&ExecutionStatus::Success));
        assert_eq!(tracer.flushed(), 1);
    }

    #[tokio::test]
    async fn test_tracing_disabled_opens_no_scope() {
        let h = harness(MockLanguageModel::new("openai/gpt-4o-mini"));
        let mut payload = payload("trace_1", "end");
        payload.workflow = payload.workflow.with_tracing(false);

        let (events, error) = collect(&h.engine, payload).await;
        assert!(error.is_none());
        assert_eq!(h.tracer.opened(), 0);
        assert_eq!(h.tracer.flushed(), 0);

        let end = events.last().and_then(|e| e.component_state_ref()).unwrap();
        assert_eq!(
            serde_json::Value::Object(end.outputs.clone().unwrap()),
            json!({ "score": 0.5 })
        );
    }

    #[tokio::test]
    async fn test_no_cache_reuse_across_runs() {
        let h = harness(MockLanguageModel::new("openai/gpt-4o-mini"));
        collect(&h.engine, payload("trace_1", "answer")).await;
        collect(&h.engine, payload("trace_2", "answer")).await;
        assert_eq!(h.lm.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_node_is_not_reported() {
        let h = harness(MockLanguageModel::new("openai/gpt-4o-mini"));
        let (events, error) = collect(&h.engine, payload("trace_1", "missing")).await;

        assert!(matches!(error, Some(Error::NodeNotFound(_))));
        assert!(statuses(&events).is_empty());
        assert!(h.reporter.reports().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_abandons_invocation() {
        let h = harness(MockLanguageModel::new("openai/gpt-4o-mini").slow(Duration::from_secs(60)));
        let cancel = CancellationToken::new();
        let stream = h
            .engine
            .execute_component(payload("trace_1", "answer"), cancel.clone());

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };

        let result: Result<Vec<_>> = stream.try_collect().await;
        canceller.await.unwrap();

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(h.reporter.reports().is_empty());
        assert_eq!(h.tracer.flushed(), 1);
    }

    #[tokio::test]
    async fn test_dropped_stream_still_flushes() {
        let h = harness(MockLanguageModel::new("openai/gpt-4o-mini").slow(Duration::from_secs(60)));
        let mut stream = Box::pin(
            h.engine
                .execute_component(payload("trace_1", "answer"), CancellationToken::new()),
        );

        let debug = stream.next().await.unwrap().unwrap();
        assert_eq!(debug.type_name(), "debug");
        let start = stream.next().await.unwrap().unwrap();
        assert_eq!(statuses(&[start]), vec![ExecutionStatus::Running]);

        let pending = tokio::time::timeout(Duration::from_millis(100), stream.next()).await;
        assert!(pending.is_err());
        assert_eq!(h.lm.calls(), 1);
        drop(stream);

        tokio::time::timeout(Duration::from_secs(5), async {
            while h.tracer.flushed() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(h.tracer.opened(), 1);
        assert_eq!(h.tracer.flushed(), h.tracer.opened());
        assert!(h.reporter.reports().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_emits_nothing() {
        let h = harness(MockLanguageModel::new("openai/gpt-4o-mini"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let items: Vec<_> = h
            .engine
            .execute_component(payload("trace_1", "answer"), cancel)
            .collect()
            .await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::Cancelled)));
        assert_eq!(h.lm.calls(), 0);
        assert_eq!(h.tracer.opened(), 0);
    }

    #[tokio::test]
    async fn test_zero_concurrency_from_config_still_runs() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "max_concurrent_executions": 0 }"#).unwrap();
        let lm = Arc::new(MockLanguageModel::new("openai/gpt-4o-mini"));
        let engine = Engine::new(
            config,
            NodeCompiler::new(Arc::new(MockLanguageModelProvider::new(lm))),
        );

        let (events, error) = tokio::time::timeout(
            Duration::from_secs(5),
            collect(&engine, payload("trace_1", "answer")),
        )
        .await
        .unwrap();

        assert!(error.is_none());
        assert_eq!(statuses(&events).last(), Some(&ExecutionStatus::Success));
    }

    #[tokio::test]
    async fn test_duplicate_node_ids_are_rejected() {
        let h = harness(MockLanguageModel::new("openai/gpt-4o-mini"));
        let mut payload = payload("trace_1", "answer");
        payload.workflow = payload.workflow.with_node(Node::new("answer", End::default()));

        let (events, error) = collect(&h.engine, payload).await;

        assert!(matches!(error, Some(Error::Configuration(_))));
        assert!(statuses(&events).is_empty());
        assert!(h.reporter.reports().is_empty());
        assert_eq!(h.lm.calls(), 0);
    }
}
