//! Signature schemas and the prediction module bound to them.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display};

use super::{InvocationContext, Inputs, Module, Outputs, Prediction};
use crate::definition::{Field, FieldType, Signature};
use crate::provider::{CompletionRequest, LanguageModel, TokenUsage};
use crate::trace::{Span, SpanMetrics, SpanType};
use crate::{Error, Result};

/// Name used for signatures without a display name.
pub const ANONYMOUS_SIGNATURE: &str = "AnonymousSignature";

/// Direction of a signature slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SlotDirection {
    /// Provided by the caller.
    Input,
    /// Produced by the language model.
    Output,
}

/// A named, typed, directional slot of a signature schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    /// Slot name.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Slot direction.
    pub direction: SlotDirection,
    /// Description passed to the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    /// Whether the slot may be absent.
    #[serde(default)]
    pub optional: bool,
}

impl Slot {
    fn from_field(field: &Field, direction: SlotDirection) -> Self {
        Self {
            name: field.identifier.clone(),
            field_type: field.field_type,
            direction,
            desc: field.desc.clone(),
            optional: field.optional.unwrap_or(false),
        }
    }
}

/// Declarative description of a prompting step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureSchema {
    /// Signature name.
    pub name: String,
    /// Instruction text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Ordered input slots.
    pub inputs: Vec<Slot>,
    /// Ordered output slots.
    pub outputs: Vec<Slot>,
}

impl SignatureSchema {
    /// Builds the schema of a signature node.
    ///
    /// Fails with a configuration error when an identifier repeats within
    /// the inputs or the outputs, or appears on both sides.
    pub fn from_signature(signature: &Signature) -> Result<Self> {
        let component = &signature.component;
        let name = component
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| ANONYMOUS_SIGNATURE.to_owned());

        let inputs = collect_slots(&name, component.input_fields(), SlotDirection::Input)?;
        let outputs = collect_slots(&name, component.output_fields(), SlotDirection::Output)?;

        if let Some(collision) = outputs
            .iter()
            .find(|o| inputs.iter().any(|i| i.name == o.name))
        {
            return Err(Error::configuration(format!(
                "signature {name}: field '{}' is both an input and an output",
                collision.name
            )));
        }

        Ok(Self {
            name,
            instructions: signature.prompt.clone().filter(|p| !p.is_empty()),
            inputs,
            outputs,
        })
    }

    /// Returns the slot with the given name, on either side.
    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .find(|slot| slot.name == name)
    }
}

fn collect_slots(signature: &str, fields: &[Field], direction: SlotDirection) -> Result<Vec<Slot>> {
    let mut seen = HashSet::with_capacity(fields.len());
    fields
        .iter()
        .map(|field| {
            if !seen.insert(field.identifier.as_str()) {
                return Err(Error::configuration(format!(
                    "signature {signature}: duplicate {direction} field '{}'",
                    field.identifier
                )));
            }
            Ok(Slot::from_field(field, direction))
        })
        .collect()
}

/// Prediction module bound to a signature schema and a language model.
#[derive(Debug)]
pub struct Predict {
    schema: Arc<SignatureSchema>,
    lm: Arc<dyn LanguageModel>,
    resolved_lm: Arc<dyn LanguageModel>,
    demos: Vec<Map<String, Value>>,
}

impl Predict {
    /// Creates a module bound to the resolved language model.
    pub fn new(schema: SignatureSchema, lm: Arc<dyn LanguageModel>) -> Self {
        Self {
            schema: Arc::new(schema),
            resolved_lm: Arc::clone(&lm),
            lm,
            demos: Vec::new(),
        }
    }

    /// Attaches few-shot demonstrations.
    #[must_use]
    pub fn with_demos(mut self, demos: Vec<Map<String, Value>>) -> Self {
        self.demos = demos;
        self
    }

    /// Returns the signature schema.
    pub fn schema(&self) -> &SignatureSchema {
        &self.schema
    }

    /// Returns the attached demonstrations.
    pub fn demos(&self) -> &[Map<String, Value>] {
        &self.demos
    }

    /// Returns the language model currently in use.
    pub fn lm(&self) -> &Arc<dyn LanguageModel> {
        &self.lm
    }

    /// Rebinds the module to another language model until the next reset.
    pub fn set_lm(&mut self, lm: Arc<dyn LanguageModel>) {
        self.lm = lm;
    }

    fn collect_outputs(&self, mut produced: Outputs) -> Result<Outputs> {
        let mut outputs = Outputs::new();
        let mut missing = Vec::new();
        for slot in &self.schema.outputs {
            match produced.remove(&slot.name) {
                Some(value) => {
                    outputs.insert(slot.name.clone(), value);
                }
                None if slot.optional => {}
                None => missing.push(slot.name.as_str()),
            }
        }

        if !missing.is_empty() {
            return Err(Error::invocation(format!(
                "{} response is missing outputs: {}",
                self.lm.model(),
                missing.join(", ")
            )));
        }

        Ok(outputs)
    }
}

#[async_trait]
impl Module for Predict {
    fn name(&self) -> &str {
        &self.schema.name
    }

    async fn forward(&self, ctx: &InvocationContext, inputs: Inputs) -> Result<Prediction> {
        let span = ctx.is_tracing().then(|| {
            Span::start(SpanType::Llm, self.name())
                .with_model(self.lm.model())
                .with_input(Value::Object(inputs.clone()))
        });

        let request = CompletionRequest {
            schema: Arc::clone(&self.schema),
            inputs,
            demos: self.demos.clone(),
        };

        let result = self
            .lm
            .complete(&request, ctx.settings())
            .await
            .and_then(|completion| {
                let usage = completion.usage.unwrap_or_default();
                self.collect_outputs(completion.outputs)
                    .map(|outputs| (outputs, usage))
            });

        if let Some(mut span) = span {
            match &result {
                Ok((outputs, usage)) => {
                    span.output = Some(Value::Object(outputs.clone()));
                    span.metrics = Some(span_metrics(usage));
                }
                Err(err) => span.error = Some(err.to_string()),
            }
            span.finish();
            ctx.record(span);
        }

        let (outputs, usage) = result?;
        let prediction = Prediction::new(outputs);
        Ok(match usage.cost {
            Some(cost) => prediction.with_cost(cost),
            None => prediction,
        })
    }

    fn reset(&mut self) {
        self.demos.clear();
        self.lm = Arc::clone(&self.resolved_lm);
    }
}

fn span_metrics(usage: &TokenUsage) -> SpanMetrics {
    SpanMetrics {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        cost: usage.cost,
    }
}
