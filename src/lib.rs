//! # quizchain
//!
//! A self-hosted solver for chained web quiz tasks.
//!
//! ## Flow
//!
//! ```text
//! POST /run ──▶ Session ──▶ FETCH ─▶ REASON ─▶ SUBMIT ─▶ DECIDE ─┐
//!                            ▲                                   │
//!                            └────────────── next_url ───────────┘
//!                                  (or Completed / Failed / Aborted)
//! ```
//!
//! The orchestrator drives each task through the loop above; the reasoning
//! engine answers one task at a time using its tools (page reading, file
//! download, isolated code execution). Guards on cycles, chain depth, and
//! wall clock make every session terminate.
//!
//! ## Modules
//! - `api`: HTTP trigger and session observability endpoints
//! - `solver`: session record, orchestrator state machine, reasoning engine
//! - `tools`: single-purpose adapters the engine and orchestrator invoke
//! - `llm`: LLM client abstraction with retry classification
//! - `error`: solver error taxonomy

pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod solver;
pub mod tools;

pub use config::Config;
