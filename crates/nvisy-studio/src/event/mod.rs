//! Execution event protocol.
//!
//! All messages are JSON objects with a `type` field naming the variant and,
//! where the variant carries data, a `payload` object:
//!
//! ```json
//! { "type": "debug", "payload": { "message": "executing component" } }
//! { "type": "done" }
//! ```
//!
//! [`StudioClientEvent`] travels from the editor to the server and
//! [`StudioServerEvent`] back.

mod client;
mod server;

pub use client::{
    ExecuteComponentPayload, IsAlivePayload, StopExecutionPayload, StudioClientEvent,
};
pub use server::{
    ComponentStateChangePayload, ExecutionStateChangePayload, MessagePayload, StudioServerEvent,
};
