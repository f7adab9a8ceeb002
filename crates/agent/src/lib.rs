//! Agent Runtime - stage orchestration with optional LLM assistance
//!
//! This crate provides the "brain" of the tenderflow system - the agent runtime
//! that:
//! - Routes each chat turn through the deterministic workflow router
//! - Executes the stage the router picked (scan, technical, pricing, compile)
//! - Persists the session snapshot and appends audit events
//! - Calls a language model only where the workflow permits one
//!
//! # Architecture
//!
//! The runtime follows a constrained loop:
//! 1. **Routing** (`tenderflow_core::workflow`) - classify the message, decide
//!    the next stage from the session snapshot
//! 2. **Stage Execution** (`stages`) - run the chosen stage handler against the
//!    stores and engines
//! 3. **Persistence** - save the updated snapshot; a failed stage saves nothing
//!
//! # Key Types
//!
//! - `AgentRuntime` - Main orchestrator (see `runtime` module)
//! - `LlmClient` - Pluggable trait for OpenAI/Anthropic/Ollama
//! - `StageReport` - Per-stage reply plus a degradation marker
//!
//! # Safety Principle
//!
//! The LLM is strictly an assistant. It NEVER decides routing, selection, or
//! prices. Those are deterministic decisions made by the core engines. Its two
//! uses, qualification assistance and the executive summary, are schema-checked
//! and either fall back to the deterministic path or fail closed.

pub mod llm;
pub mod runtime;
pub mod schema;
pub mod stages;

pub use llm::{client_from_config, HttpLlmClient, LlmClient, LlmError, NoopLlmClient};
pub use runtime::{AgentRuntime, ChatOutcome, RuntimeOptions, TurnStatus, WorkflowSummary};
pub use schema::QualificationAssist;
pub use stages::StageReport;
