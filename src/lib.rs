//! Parley - a self-hosted chat orchestration server.
//!
//! Authenticated users hold persistent multi-turn conversations with
//! pluggable LLM backends (OpenAI-compatible, Ollama, or a deterministic
//! mock), receiving replies as a single JSON response, an SSE chunk
//! stream, or WebSocket pushes to every connection watching a session.

pub mod agent;
pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod handlers;
pub mod llm;
pub mod registry;
pub mod server;
pub mod sse_parser;
pub mod store;
