//! # Expectations Core
//!
//! Core data structures for the metric dependency graph and map-metric validation
//! engine.
//!
//! An *expectation* is a declarative assertion about a tabular batch
//! ("values in `animals` are in `{cat, fish, dog}`"). Checking it requires
//! *metrics*, statistics identified by a [`MetricConfiguration`]. This crate holds
//! the backend-independent pieces: the value model, metric identity, result format
//! normalisation, expectation configuration and the result types.
//!
//! ## Key Concepts
//!
//! - **MetricConfiguration**: metric name plus domain and value kwargs, with
//!   structural identity
//! - **ResultFormat**: verbosity level plus detail options, normalised at one boundary
//! - **ExpectationConfiguration**: expectation type plus kwargs
//! - **ExpectationValidationResult**: success flag, shaped payload, exception info
//!
//! ## Example
//!
//! ```rust
//! use expectations_core::{ExpectationBuilder, ResultFormatLevel};
//!
//! let expectation = ExpectationBuilder::in_set("animals", vec!["cat", "fish", "dog"])
//!     .result_format("SUMMARY")
//!     .build();
//!
//! let format = expectation.effective_result_format(None).unwrap();
//! assert_eq!(format.level, ResultFormatLevel::Summary);
//! ```

pub mod builder;
pub mod error;
pub mod expectation;
pub mod metric;
pub mod result;
pub mod result_format;
pub mod validator;
pub mod value;

pub use builder::*;
pub use error::*;
pub use expectation::*;
pub use metric::*;
pub use result::*;
pub use result_format::*;
pub use validator::*;
pub use value::*;
