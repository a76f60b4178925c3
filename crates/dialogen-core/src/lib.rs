//! Dialogen Core - Schema-driven dialog asset generation
//!
//! This library turns a normalized schema of named properties into a
//! tree of per-locale dialog assets (`.lg` text generation, `.lu`
//! language understanding, `.qna` knowledge, `.dialog` configuration)
//! by recursively resolving named templates across ordered source
//! directories and evaluating embedded expressions.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! - **Boundary types** - `Schema`, `Scope`, the `Evaluator` and
//!   `Merger` traits, and the `Feedback` sink; external collaborators
//!   plug in here
//! - **Leaf components** - content fingerprints (`hash`), template
//!   lookup (`templates`), schema expansion (`expand`), file reference
//!   tracking (`tracker`)
//! - **Generation** - the recursive materializer and run orchestrator
//!   (`generate`), plus singleton flattening
//!
//! # Example Usage
//!
//! ```ignore
//! use dialogen_core::{generate, GenerateOptions, HandlebarsEvaluator, Schema};
//! use dialogen_core::feedback::CollectingFeedback;
//!
//! let schema = Schema::load(Path::new("sandwich.json")).await?;
//! let options = GenerateOptions::new(out_dir, "Sandwich");
//! let evaluator = HandlebarsEvaluator::new();
//! let feedback = CollectingFeedback::new();
//! let ok = generate(schema, &options, &evaluator, None, &feedback).await?;
//! ```

pub mod error;
pub mod expand;
pub mod feedback;
pub mod generate;
pub mod hash;
pub mod merge;
pub mod schema;
pub mod scope;
pub mod templates;
pub mod tracker;

// Re-export main types for convenience
pub use error::GenerationError;
pub use expand::expand_schema;
pub use feedback::{CollectingFeedback, Feedback, Severity};
pub use generate::{generate, GenerateOptions};
pub use merge::{CopyMerger, Merger};
pub use schema::Schema;
pub use scope::Scope;
pub use templates::{Evaluator, HandlebarsEvaluator, Template};

/// Default locale list when the caller provides none
pub const DEFAULT_LOCALES: &[&str] = &["en-us"];
