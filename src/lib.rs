//! Team-based workflow orchestration for LLM-driven code refactoring.
//!
//! A work order (project path + intent + configuration overlays) runs
//! through a directed sequence of teams; each team executes agent tasks
//! that consult LLM providers, parse structured replies and ultimately
//! apply file modifications. Every invocation is recorded as an
//! append-only lineage event.

pub mod agents;
pub mod config;
pub mod lineage;
pub mod llm;
pub mod orchestrator;
pub mod shared;
pub mod skills;
pub mod team;
