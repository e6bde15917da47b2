//! Terminal collector module.

use async_trait::async_trait;

use super::{InvocationContext, Inputs, Module, Prediction};
use crate::Result;

/// Returns its inputs unchanged.
#[derive(Debug, Clone, Default)]
pub struct EndModule;

#[async_trait]
impl Module for EndModule {
    fn name(&self) -> &str {
        "End"
    }

    async fn forward(&self, _ctx: &InvocationContext, inputs: Inputs) -> Result<Prediction> {
        Ok(Prediction::new(inputs))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_identity() {
        let mut inputs = Inputs::new();
        inputs.insert("a".into(), json!(1));
        inputs.insert("b".into(), json!("x"));

        let prediction = EndModule
            .forward(&InvocationContext::new("trace_1"), inputs.clone())
            .await
            .unwrap();
        assert_eq!(prediction.into_outputs(), inputs);
    }
}
