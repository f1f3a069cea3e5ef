//! # AutoTemplate-RS: Predictive Code Templates for C#
//!
//! Learns what usually follows a statement in a C# codebase and offers it
//! back as a template at the cursor:
//!
//! - **Scope classification**: variables, invocations, null checks, loops and
//!   `using` blocks are keyed by the types and members they touch
//! - **Template synthesis**: the statement that follows a scope is rendered
//!   with `$name$` placeholders and per-placeholder suggestion lists
//! - **Corpus storage**: one XML corpus per solution, rebuilt whole or per file
//! - **Aggregation**: observations are counted across every corpus and the
//!   frequent ones published as suggestions
//! - **Live updates**: file saves are debounced into background updates
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 API Layer (engine, offers)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Core         │  Detectors   │  Language    │  I/O          │
//! │ • Pipeline    │ • Scopes     │ • C# parser  │ • Data dir    │
//! │ • Aggregation │ • Templates  │ • Symbols    │ • Corpus XML  │
//! │ • Config      │              │ • Workspace  │ • Catalog     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use autotemplate_rs::{AutoTemplateConfig, FsWorkspace, SuggestionEngine};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AutoTemplateConfig::default();
//!     let engine = SuggestionEngine::new(config)?;
//!     let workspace = FsWorkspace::open("./MySolution", &engine.config().analysis)?;
//!
//!     engine.analyze_solution(&workspace, None)?;
//!     let summary = engine.build_suggestions(None)?;
//!     println!("{} suggestions published", summary.published);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core mining pipeline
pub mod core {
    //! Core pipeline, aggregation and configuration.

    pub mod aggregation;
    pub mod config;
    pub mod errors;
    pub mod file_utils;
    pub mod pipeline;
}

// Scope classification and template synthesis
pub mod detectors {
    //! Statement scope classifiers and template builders.

    pub mod scopes;
    pub mod templates;
}

// Language front end
pub mod lang {
    //! C# parsing, symbol resolution and solution discovery.

    pub mod builder;
    pub mod common;
    pub mod csharp;
    pub mod symbols;
    pub mod workspace;
}

// Persistence
pub mod io {
    //! Data directory, corpus files and the published suggestion catalog.

    pub mod cache;
    pub mod corpus;
    pub mod data_dir;
    pub mod records;
}

// Background analysis
pub mod live {
    //! Save debouncing and file watching for background updates.

    pub mod debounce;
    pub mod watcher;
}

// Public API and engine interface
pub mod api {
    //! High-level engine, offers and template invocation.

    pub mod engine;
    pub mod invocation;
}

// Re-export primary types for convenience
pub use api::engine::{Offer, SuggestionEngine};
pub use core::config::AutoTemplateConfig;
pub use core::errors::{AutoTemplateError, Result, ResultExt};
pub use io::cache::AutoTemplate;
pub use lang::workspace::{FsWorkspace, InMemoryWorkspace, Workspace};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
