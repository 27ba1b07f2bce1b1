//! Engineering intelligence platform: event ingestion, the analytics
//! materialiser, and a supervisor-routed multi-specialist agent runtime
//! over a time-series log, a relational+vector store, and a knowledge
//! graph.

pub mod actions;
pub mod agent;
pub mod clients;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod graph_rag;
pub mod http;
pub mod ingest;
pub mod materializer;
pub mod rag;
pub mod streaming;
