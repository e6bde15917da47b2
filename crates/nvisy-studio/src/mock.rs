//! Mock collaborators for testing.
//!
//! Every external collaborator of the engine has an in-memory double here:
//! language models, retrieval backends, evaluators, the hosted evaluation
//! service, tracers, span exporters and error reporters. The doubles record
//! what they were called with so tests can assert on it.
//!
//! # Feature Flag
//!
//! This module is only available when the `test-utils` feature is enabled:
//!
//! ```toml
//! [dev-dependencies]
//! nvisy-studio = { version = "...", features = ["test-utils"] }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::module::{InvocationContext, InvocationSettings, Inputs, Module, Outputs, Prediction};
use crate::provider::{
    Completion, CompletionRequest, EvaluationClient, EvaluationRequest, EvaluationResult,
    EvaluationStatus, LanguageModel, LanguageModelConfig, LanguageModelProvider, Passage,
    RetrieverBackend, TokenUsage,
};
use crate::report::{ErrorContext, ErrorReporter};
use crate::trace::{Span, SpanBatch, SpanExporter, SpanRecorder, TraceOptions, TraceScope, Tracer};
use crate::{Error, Result};

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Language model answering every output slot with a canned string.
///
/// Honors [`InvocationSettings::cache_enabled`]: identical requests are
/// served from an in-memory cache unless caching is disabled.
#[derive(Debug, Default)]
pub struct MockLanguageModel {
    model: String,
    outputs: Outputs,
    cost: Option<f64>,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    cache: Mutex<HashMap<String, Completion>>,
}

impl MockLanguageModel {
    /// Creates a mock for the given model name.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Reports the given cost with every completion.
    #[must_use]
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Returns a fixed output instead of answering the schema.
    #[must_use]
    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    /// Fails every call with the given message.
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Waits before answering.
    #[must_use]
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of calls that reached the model.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self, request: &CompletionRequest) -> Completion {
        let outputs = if self.outputs.is_empty() {
            request
                .schema
                .outputs
                .iter()
                .map(|slot| {
                    let answer = format!("{} for {}", slot.name, Value::Object(request.inputs.clone()));
                    (slot.name.clone(), Value::String(answer))
                })
                .collect()
        } else {
            self.outputs.clone()
        };

        Completion {
            outputs,
            usage: Some(TokenUsage {
                prompt_tokens: Some(10),
                completion_tokens: Some(5),
                cost: self.cost,
            }),
        }
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        settings: &InvocationSettings,
    ) -> Result<Completion> {
        let key = format!(
            "{}:{}",
            request.schema.name,
            Value::Object(request.inputs.clone())
        );
        if settings.cache_enabled {
            let cached = locked(&self.cache).get(&key).cloned();
            if let Some(cached) = cached {
                return Ok(cached);
            }
        }

        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(Error::invocation(message));
        }

        let completion = self.answer(request);
        if settings.cache_enabled {
            locked(&self.cache).insert(key, completion.clone());
        }
        Ok(completion)
    }
}

/// Provider handing out one shared [`MockLanguageModel`].
#[derive(Debug)]
pub struct MockLanguageModelProvider {
    lm: Arc<MockLanguageModel>,
    configs: Mutex<Vec<LanguageModelConfig>>,
}

impl MockLanguageModelProvider {
    /// Creates a provider returning `lm` for every configuration.
    pub fn new(lm: Arc<MockLanguageModel>) -> Self {
        Self {
            lm,
            configs: Mutex::new(Vec::new()),
        }
    }

    /// Returns the configurations clients were requested for.
    pub fn configs(&self) -> Vec<LanguageModelConfig> {
        locked(&self.configs).clone()
    }
}

impl Default for MockLanguageModelProvider {
    fn default() -> Self {
        Self::new(Arc::new(MockLanguageModel::new("mock/model")))
    }
}

impl LanguageModelProvider for MockLanguageModelProvider {
    fn language_model(&self, config: &LanguageModelConfig) -> Result<Arc<dyn LanguageModel>> {
        locked(&self.configs).push(config.clone());
        Ok(self.lm.clone())
    }
}

/// Retrieval backend returning a fixed passage list.
#[derive(Debug, Clone)]
pub struct MockRetriever {
    passages: Vec<Passage>,
}

impl MockRetriever {
    /// Creates a backend over the given passages.
    pub fn new<I, S>(passages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            passages: passages.into_iter().map(Passage::new).collect(),
        }
    }
}

impl Default for MockRetriever {
    fn default() -> Self {
        Self::new([
            "Rust is a systems programming language.",
            "Rust guarantees memory safety without a garbage collector.",
            "Cargo is the Rust package manager.",
            "Crates are published to crates.io.",
        ])
    }
}

#[async_trait]
impl RetrieverBackend for MockRetriever {
    async fn retrieve(
        &self,
        _query: &str,
        k: usize,
        _settings: &InvocationSettings,
    ) -> Result<Vec<Passage>> {
        Ok(self.passages.iter().take(k).cloned().collect())
    }
}

/// Local evaluator that passes everything.
#[derive(Debug, Clone, Default)]
pub struct MockEvaluator;

#[async_trait]
impl Module for MockEvaluator {
    fn name(&self) -> &str {
        "MockEvaluator"
    }

    async fn forward(&self, _ctx: &InvocationContext, _inputs: Inputs) -> Result<Prediction> {
        let mut outputs = Outputs::new();
        outputs.insert("passed".into(), json!(true));
        outputs.insert("score".into(), json!(1.0));
        Ok(Prediction::new(outputs))
    }
}

/// Hosted evaluation client returning a fixed result.
#[derive(Debug, Clone)]
pub struct MockEvaluationClient {
    result: EvaluationResult,
    requests: Arc<Mutex<Vec<(EvaluationRequest, String)>>>,
}

impl MockEvaluationClient {
    /// Creates a client answering every request with `result`.
    pub fn new(result: EvaluationResult) -> Self {
        Self {
            result,
            requests: Arc::default(),
        }
    }

    /// Returns the received requests with their API keys.
    pub fn requests(&self) -> Vec<(EvaluationRequest, String)> {
        locked(&self.requests).clone()
    }
}

impl Default for MockEvaluationClient {
    fn default() -> Self {
        Self::new(EvaluationResult {
            status: EvaluationStatus::Processed,
            score: Some(1.0),
            passed: Some(true),
            label: None,
            details: None,
            cost: None,
        })
    }
}

#[async_trait]
impl EvaluationClient for MockEvaluationClient {
    async fn evaluate(
        &self,
        request: EvaluationRequest,
        api_key: &str,
    ) -> Result<EvaluationResult> {
        locked(&self.requests).push((request, api_key.to_owned()));
        Ok(self.result.clone())
    }
}

/// Span recorder keeping every span in memory.
#[derive(Debug, Default)]
pub struct MockSpanRecorder {
    spans: Mutex<Vec<Span>>,
}

impl MockSpanRecorder {
    /// Returns the recorded spans.
    pub fn spans(&self) -> Vec<Span> {
        locked(&self.spans).clone()
    }
}

impl SpanRecorder for MockSpanRecorder {
    fn record(&self, span: Span) {
        locked(&self.spans).push(span);
    }
}

#[derive(Debug, Default)]
struct TracerState {
    opened: AtomicUsize,
    flushed: AtomicUsize,
    options: Mutex<Vec<TraceOptions>>,
    recorder: Arc<MockSpanRecorder>,
    fail_flush: bool,
}

/// Tracer counting opened and flushed scopes.
#[derive(Debug, Clone, Default)]
pub struct MockTracer {
    state: Arc<TracerState>,
}

impl MockTracer {
    /// Creates a tracer whose scopes fail to flush.
    pub fn failing_flush() -> Self {
        Self {
            state: Arc::new(TracerState {
                fail_flush: true,
                ..TracerState::default()
            }),
        }
    }

    /// Returns the number of opened scopes.
    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// Returns the number of flush calls.
    pub fn flushed(&self) -> usize {
        self.state.flushed.load(Ordering::SeqCst)
    }

    /// Returns the options of every opened scope.
    pub fn options(&self) -> Vec<TraceOptions> {
        locked(&self.state.options).clone()
    }

    /// Returns the spans recorded in any scope.
    pub fn spans(&self) -> Vec<Span> {
        self.state.recorder.spans()
    }
}

impl Tracer for MockTracer {
    fn open(&self, options: TraceOptions) -> Result<Box<dyn TraceScope>> {
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        let trace_id = options.trace_id.clone();
        locked(&self.state.options).push(options);
        Ok(Box::new(MockScope {
            trace_id,
            state: self.state.clone(),
        }))
    }
}

struct MockScope {
    trace_id: String,
    state: Arc<TracerState>,
}

#[async_trait]
impl TraceScope for MockScope {
    fn trace_id(&self) -> &str {
        &self.trace_id
    }

    fn autotrack_pipeline_calls(&mut self) -> Arc<dyn SpanRecorder> {
        self.state.recorder.clone()
    }

    async fn flush(&mut self) -> Result<()> {
        self.state.flushed.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_flush {
            return Err(Error::tracing("collector unavailable"));
        }
        Ok(())
    }
}

/// Span exporter keeping every batch in memory.
#[derive(Debug, Default)]
pub struct MockSpanExporter {
    batches: Mutex<Vec<SpanBatch>>,
}

impl MockSpanExporter {
    /// Returns the exported batches.
    pub fn batches(&self) -> Vec<SpanBatch> {
        locked(&self.batches).clone()
    }
}

#[async_trait]
impl SpanExporter for MockSpanExporter {
    async fn export(&self, batch: SpanBatch, _api_key: &str) -> Result<()> {
        locked(&self.batches).push(batch);
        Ok(())
    }
}

/// Error reporter keeping every report in memory.
#[derive(Debug, Default)]
pub struct MockReporter {
    reports: Mutex<Vec<(String, ErrorContext)>>,
}

impl MockReporter {
    /// Returns the reported error messages with their context.
    pub fn reports(&self) -> Vec<(String, ErrorContext)> {
        locked(&self.reports).clone()
    }
}

impl ErrorReporter for MockReporter {
    fn report(&self, error: &Error, context: &ErrorContext) {
        locked(&self.reports).push((error.to_string(), context.clone()));
    }
}
