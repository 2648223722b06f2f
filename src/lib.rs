//! ragtier - Tiered retrieval for FAQ-first question answering
//!
//! Embeds curated FAQ entries and general reference documents into two
//! vector partitions, and for every question decides how much the FAQ can be
//! trusted: a strong FAQ match is answered from FAQs alone, a medium match
//! mixes FAQs with documents, and anything weaker falls back to documents.
//! The decision carries the passages and generation temperature an external
//! answering model should use.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod retrieval;
pub mod session;
pub mod storage;

pub use engine::{Engine, EngineStats, IngestOutcome};
pub use error::{RagtierError, Result};
