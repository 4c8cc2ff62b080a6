//! # figsync-design
//!
//! Fetching design documents and normalizing them into the generator-facing
//! [`IntermediateTree`](figsync_core::IntermediateTree).
//!
//! - [`client`]: [`DesignSource`] trait and the HTTP [`DesignClient`]
//! - [`decode`]: payload decoding shared by HTTP and local files
//! - [`normalize`]: the normalization policy
//! - [`fakes`]: [`StaticDesignSource`] for tests and offline use

pub mod client;
pub mod decode;
pub mod error;
pub mod fakes;
pub mod normalize;

pub use client::{DesignClient, DesignSource};
pub use decode::{decode_document, read_document_file};
pub use error::{FetchError, GenerationError};
pub use fakes::StaticDesignSource;
pub use normalize::{normalize, MAX_DEPTH};
