#![deny(missing_docs)]
//! Fayol Bot - Rust implementation
//!
//! A chat-transport financial assistant: inbound messages are rate
//! limited, routed through guided login/onboarding scenes or terminal
//! handlers, and free text is classified into income/expense/transfer
//! entries persisted through the backend API.

/// Backend API client collaborator
pub mod api;
/// Keyword-based transaction classification
pub mod classifier;
/// Configuration management
pub mod config;
/// Message routing and terminal handlers
pub mod dispatch;
/// Quick-entry parsing and currency formatting
pub mod entry;
/// Optical character recognition collaborator
pub mod ocr;
/// Per-sender sliding-window admission control
pub mod rate_limit;
/// Guided multi-step conversation scenes
pub mod scene;
/// Conversational session state
pub mod session;
/// Speech-to-text collaborator
pub mod stt;
/// Chat transport abstraction and adapters
pub mod transport;
