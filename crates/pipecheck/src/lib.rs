//! Declarative pipeline test engine.
//!
//! A test case is a YAML pipeline: typed state, a list of nodes (toolkit
//! call, language-model call, inline code) and the transitions between them.
//! Documents are parsed into a [`PipelineDefinition`], checked by
//! [`build_graph`], run node by node by a [`PipelineEngine`], and fanned out
//! across a suite by the [`SuiteRunner`].

pub mod config;
pub mod env;
pub mod errors;
pub mod graph;
pub mod handlers;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod parse;
pub mod remote;
pub mod results;
pub mod runner;
pub mod runtime;
pub mod session;
pub mod state;
pub mod suite;

pub use config::*;
pub use env::*;
pub use errors::*;
pub use graph::*;
pub use handlers::code::CodeExecutor;
pub use handlers::llm::ModelExecutor;
pub use handlers::tool::{
    SharedToolkit, ToolCall, ToolExecutor, ToolFuture, ToolOperation, ToolRegistry, Toolkit,
};
pub use handlers::{ExecutionContext, ExecutorRegistry, NodeExecutor, SharedNodeExecutor};
pub use logging::init_tracing;
pub use mapping::*;
pub use model::*;
pub use parse::*;
pub use remote::*;
pub use results::*;
pub use runner::*;
pub use runtime::*;
pub use session::*;
pub use state::*;
pub use suite::*;
