//! Language-model collaborator boundary for pipecheck.
//!
//! The engine never talks to a model provider directly. It renders a prompt,
//! hands a [`ModelRequest`] to a [`ModelClient`], and interprets the reply as
//! free text or, when the node declares an [`OutputSchema`], as a validated
//! field map.

pub mod client;
pub mod errors;
pub mod openai;
pub mod schema;
pub mod testing;

pub use client::*;
pub use errors::*;
pub use openai::OpenAiCompatibleClient;
pub use schema::*;
pub use testing::ScriptedModelClient;
