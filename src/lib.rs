//! Session lifecycle and knowledge bridge for agent runtimes.
//!
//! kbridge sits between a conversational agent host and a remote knowledge
//! substrate. It turns host sessions into durable source records, injects
//! recalled knowledge before each agent turn, and keeps working when the
//! substrate is slow, down, or answering nonsense.
//!
//! | Host event | Bridge action |
//! |------------|---------------|
//! | `session_start` | create remote session, track mapping |
//! | `message_received` / `message_sent` | append to remote session |
//! | `before_compaction` | flush (+ compile), background snapshot sync |
//! | `session_end` | finalize, stop tracking |
//! | `subagent_spawned` / `subagent_ended` | child session linked to parent |
//! | `before_agent_start` | recall → context injection (snapshot fallback) |
//! | `agent_end` | heuristic capture → store |
//!
//! # Architecture
//!
//! - **Transport**: one [`transport::Transport`] trait over JSON-RPC/HTTP, REST,
//!   or a CLI subprocess, each with a hard per-call timeout
//! - **Client**: typed operations in [`knowledge::KnowledgeClient`], no retries
//! - **Sessions**: in-memory local-key → remote-id map in [`session::SessionTracker`]
//! - **Fallback**: a local markdown snapshot written atomically by [`snapshot`]
//!
//! # Modules
//!
//! - [`config`] - Configuration loading from TOML files and environment variables
//! - [`error`] - Normalized failure taxonomy
//! - [`transport`] - RPC, REST, and CLI backends
//! - [`knowledge`] - Typed substrate operations
//! - [`session`] - Session tracker state machine
//! - [`recall`] - Per-turn recall injection and capture
//! - [`snapshot`] - Disaster-recovery snapshot sync
//! - [`lifecycle`] - Host events and the [`lifecycle::LifecycleHandler`] capability
//! - [`bridge`] - The handler wiring it all together
//! - [`hooks`] - NDJSON event loop with per-session ordering

pub mod bridge;
pub mod config;
pub mod error;
pub mod hooks;
pub mod knowledge;
pub mod lifecycle;
pub mod recall;
pub mod session;
pub mod snapshot;
pub mod transport;
