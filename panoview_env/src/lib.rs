//! PanoView Environment Abstraction Layer
//!
//! The navigator never does I/O. This crate is the boundary where panorama
//! records come in from the outside world:
//! - **Sources**: anything that can produce a panorama list (`PanoramaSource`)
//! - **Ingestion**: coordinate/identity validation before records reach the
//!   navigator
//!
//! # Example
//!
//! ```ignore
//! use panoview_env::{feed, JsonFileSource};
//! use panoview_core::SpatialNavigator;
//!
//! let mut navigator = SpatialNavigator::with_defaults();
//! let source = JsonFileSource::new("panoramas.json");
//! let report = feed(&source, &mut navigator).await?;
//! println!("{} panoramas loaded", report.accepted);
//! ```

mod error;
mod ingest;
mod source;

pub use error::SourceError;
pub use ingest::{feed, ingest, IngestReport, Rejection, RejectionReason};
pub use source::{JsonFileSource, PanoramaSource, StaticSource};
