//! Tool layer: static descriptors and the action-service boundary.

pub mod action_client;
pub mod catalog;

pub use action_client::{ActionInvoker, ActionServiceClient, InvokeError};
pub use catalog::{ToolCatalog, ToolDescriptor};
