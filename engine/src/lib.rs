//! Kestrel Engine Library
//!
//! This library provides the task executor, reflexes and their supporting
//! layers. It is used by both the main binary and integration tests.

/// Injectable time source
pub mod clock;

/// Configuration management module
pub mod config;

/// Shared collaborator handles
pub mod context;

/// Per-key cooldown tracking
pub mod cooldown;

/// Database persistence module
pub mod db;

/// Item name normalisation
pub mod items;

/// Message bus for inter-component communication
pub mod message_bus;

/// Wander and follow goal arbitration
pub mod movement;

/// Placement ledger
pub mod placement;

/// Health and threat reflexes
pub mod reflex;

/// Mining and placement safety checks
pub mod safety;

/// Event-driven scheduling loop
pub mod scheduler;

/// In-memory world simulator
pub mod sim;

/// One-shot composite actions
pub mod skills;

/// Task specs and the task executor
pub mod task;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
