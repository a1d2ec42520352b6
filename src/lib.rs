//! Layer-to-probe comparison of model representations and intracranial responses.
//!
//! Two pipelines share the numeric core: representational similarity analysis
//! (`rsa`) and ridge-regression mapping (`mapping`).

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod mapping;
pub mod rsa;
pub mod store;
pub mod synthetic;

pub use error::{CollusionError, Result};
