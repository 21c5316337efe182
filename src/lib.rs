//! docflow: a resumable document-processing pipeline.
//!
//! Files are fingerprinted, deduplicated, uploaded to blob storage,
//! rendered to page images, embedded and indexed in Qdrant. Every step is
//! recorded in a SQLite tracking database so interrupted or failed work can
//! be resumed without redoing completed stages.

pub mod blob;
pub mod commands;
pub mod config;
pub mod convert;
pub mod dedupe;
pub mod embed;
pub mod error;
pub mod hash;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod store;
pub mod tracking;
