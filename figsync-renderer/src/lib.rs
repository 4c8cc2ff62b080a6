//! # figsync-renderer
//!
//! Deterministic code generation from an
//! [`IntermediateTree`](figsync_core::IntermediateTree).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use figsync_renderer::{GenerationPolicy, OutputPrefix, TemplatePolicy};
//! use figsync_core::IntermediateTree;
//!
//! fn generate(tree: &IntermediateTree) {
//!     if let (Ok(policy), Ok(prefix)) = (TemplatePolicy::new(None), OutputPrefix::parse("src/design")) {
//!         if let Ok(files) = policy.generate(tree, &prefix) {
//!             for path in files.paths() {
//!                 println!("{path}");
//!             }
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;

pub use context::TemplateContext;
pub use engine::{GenerationPolicy, OutputPrefix, TemplateEngine, TemplatePolicy};
pub use error::RenderError;
