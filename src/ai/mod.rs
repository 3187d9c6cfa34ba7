//! AI assistant: provider configurations, roles, the chat completion client
//! and the prompt-building service on top of it.

pub mod client;
pub mod config;
pub mod service;

pub use client::{AiClient, ChatMessage, SseDecoder, SseFrame, StreamEvent};
pub use config::{AiConfig, AiConfigStore, AiRole, Provider, RoleRegistry, provider_catalog};
pub use service::{AiService, ChatRequest};
