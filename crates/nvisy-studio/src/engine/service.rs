//! Client command dispatcher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_stream::stream;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::Engine;
use crate::definition::NodeId;
use crate::error::Error;
use crate::event::{
    ExecuteComponentPayload, StopExecutionPayload, StudioClientEvent, StudioServerEvent,
};

/// Tracing target for the command dispatcher.
const TRACING_TARGET: &str = "nvisy_studio::service";

/// An execution that can still be stopped.
#[derive(Debug)]
struct RunningExecution {
    node_id: NodeId,
    token: CancellationToken,
    generation: u64,
}

type RunningMap = Arc<Mutex<HashMap<String, RunningExecution>>>;

fn lock(running: &RunningMap) -> MutexGuard<'_, HashMap<String, RunningExecution>> {
    running.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the execution from the running set when its stream is dropped.
struct Registration {
    running: RunningMap,
    trace_id: String,
    generation: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut running = lock(&self.running);
        if running
            .get(&self.trace_id)
            .is_some_and(|r| r.generation == self.generation)
        {
            running.remove(&self.trace_id);
        }
    }
}

/// Turns client commands into streams of server events.
///
/// Every stream ends with `done`, except for executions stopped by the
/// client or superseded by a newer one, which end without further events. Failures are reported as a
/// single `error` event before `done`.
#[derive(Clone)]
pub struct StudioService {
    engine: Engine,
    running: RunningMap,
    generation: Arc<AtomicU64>,
}

impl StudioService {
    /// Creates a dispatcher over the given engine.
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            running: Arc::default(),
            generation: Arc::default(),
        }
    }

    /// Returns the engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Returns the number of executions that can still be stopped.
    pub fn running(&self) -> usize {
        lock(&self.running).len()
    }

    /// Handles one client command.
    pub fn handle(&self, event: StudioClientEvent) -> BoxStream<'static, StudioServerEvent> {
        tracing::trace!(
            target: TRACING_TARGET,
            event = event.type_name(),
            trace_id = event.trace_id(),
            "Client event received"
        );

        match event {
            StudioClientEvent::IsAlive { .. } => {
                stream::iter([StudioServerEvent::IsAliveResponse, StudioServerEvent::Done]).boxed()
            }
            StudioClientEvent::ExecuteComponent { payload } => self.execute_component(payload),
            StudioClientEvent::StopExecution { payload } => {
                self.stop_execution(&payload);
                stream::iter([StudioServerEvent::Done]).boxed()
            }
        }
    }

    fn execute_component(
        &self,
        payload: ExecuteComponentPayload,
    ) -> BoxStream<'static, StudioServerEvent> {
        let token = CancellationToken::new();
        let registration = self.register(&payload.trace_id, &payload.node_id, token.clone());
        let events = self.engine.execute_component(payload, token);

        stream! {
            let _registration = registration;
            futures::pin_mut!(events);

            let mut cancelled = false;
            while let Some(item) = events.next().await {
                match item {
                    Ok(event) => yield event,
                    Err(Error::Cancelled) => {
                        cancelled = true;
                        break;
                    }
                    Err(error) => {
                        yield StudioServerEvent::error(error.to_string());
                        break;
                    }
                }
            }

            if !cancelled {
                yield StudioServerEvent::Done;
            }
        }
        .boxed()
    }

    /// Cancels the running execution of the trace, if any.
    fn stop_execution(&self, payload: &StopExecutionPayload) {
        let running = lock(&self.running);
        let Some(execution) = running.get(&payload.trace_id) else {
            tracing::debug!(
                target: TRACING_TARGET,
                trace_id = %payload.trace_id,
                "No running execution to stop"
            );
            return;
        };

        if payload
            .node_id
            .as_ref()
            .is_some_and(|node_id| node_id != &execution.node_id)
        {
            tracing::debug!(
                target: TRACING_TARGET,
                trace_id = %payload.trace_id,
                node_id = %execution.node_id,
                "Stop request targets another node, ignoring"
            );
            return;
        }

        tracing::info!(
            target: TRACING_TARGET,
            trace_id = %payload.trace_id,
            node_id = %execution.node_id,
            "Stopping execution"
        );
        execution.token.cancel();
    }

    /// Registers a new execution, cancelling any previous one of the trace.
    fn register(&self, trace_id: &str, node_id: &NodeId, token: CancellationToken) -> Registration {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let previous = lock(&self.running).insert(
            trace_id.to_owned(),
            RunningExecution {
                node_id: node_id.clone(),
                token,
                generation,
            },
        );

        if let Some(previous) = previous {
            tracing::debug!(
                target: TRACING_TARGET,
                trace_id = %trace_id,
                node_id = %previous.node_id,
                "Superseding running execution"
            );
            previous.token.cancel();
        }

        Registration {
            running: self.running.clone(),
            trace_id: trace_id.to_owned(),
            generation,
        }
    }
}

impl std::fmt::Debug for StudioService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StudioService")
            .field("engine", &self.engine)
            .field("running", &self.running())
            .finish()
    }
}
