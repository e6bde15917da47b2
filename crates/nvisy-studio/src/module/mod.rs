//! Executable modules produced by the node compiler.
//!
//! Every node kind compiles to a [`Module`] with one invocation contract:
//! named inputs in, a [`Prediction`] of named outputs out, optionally
//! exposing a cost through the [`HasCost`] capability.

mod context;
mod end;
mod evaluate;
mod predict;
mod retrieve;

use std::fmt;

use async_trait::async_trait;
pub use context::{InvocationContext, InvocationContextBuilder, InvocationSettings};
pub use end::EndModule;
pub use evaluate::{HOSTED_EVALUATOR_CLASS, HostedEvaluator};
pub use predict::{ANONYMOUS_SIGNATURE, Predict, SignatureSchema, Slot, SlotDirection};
pub use retrieve::{CONTEXTS_KEY, ContextsRetriever, DEFAULT_K};
use serde_json::{Map, Value};

use crate::Result;

/// Named values passed to a module.
pub type Inputs = Map<String, Value>;

/// Named values produced by a module.
pub type Outputs = Map<String, Value>;

/// Capability of a result that knows what it cost.
pub trait HasCost: Send + Sync {
    /// Returns the cost of producing the result.
    fn cost(&self) -> f64;
}

impl HasCost for f64 {
    fn cost(&self) -> f64 {
        *self
    }
}

/// The result of one module invocation.
pub struct Prediction {
    outputs: Outputs,
    cost: Option<Box<dyn HasCost>>,
}

impl Prediction {
    /// Creates a prediction without cost information.
    pub fn new(outputs: Outputs) -> Self {
        Self {
            outputs,
            cost: None,
        }
    }

    /// Attaches a cost reader.
    #[must_use]
    pub fn with_cost(mut self, cost: impl HasCost + 'static) -> Self {
        self.cost = Some(Box::new(cost));
        self
    }

    /// Returns the outputs.
    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    /// Consumes the prediction, returning its outputs.
    pub fn into_outputs(self) -> Outputs {
        self.outputs
    }

    /// Returns the cost capability, if any.
    pub fn as_cost(&self) -> Option<&dyn HasCost> {
        self.cost.as_deref()
    }
}

impl fmt::Debug for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prediction")
            .field("outputs", &self.outputs)
            .field("cost", &self.as_cost().map(HasCost::cost))
            .finish()
    }
}

/// A compiled, callable node.
#[async_trait]
pub trait Module: fmt::Debug + Send + Sync {
    /// Returns the module's exposed name.
    fn name(&self) -> &str;

    /// Runs the module on the given inputs.
    async fn forward(&self, ctx: &InvocationContext, inputs: Inputs) -> Result<Prediction>;

    /// Clears learned state. Stateless modules do nothing.
    fn reset(&mut self) {}
}
