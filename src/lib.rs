//! Documentation MCP Service
//!
//! This crate fetches documentation from heterogeneous remote sources
//! (HTML pages, XML standards documents, JSON schemas, repository-rendered
//! markdown), normalizes everything into clean markdown and serves the
//! cached corpus through MCP tools.
//!
//! # Features
//!
//! - Concurrent fetching with bounded exponential-backoff retry
//! - Content-type-specific normalization into canonical markdown
//! - In-memory catalog replaced atomically on each refresh cycle
//! - MCP server implementation for SSE and stdio transports
//!
//! # Modules
//!
//! - [`config`]: Source configuration model and loading
//! - [`fetcher`]: Retrying fetcher, per-source aggregation and refresh
//! - [`normalize`]: HTML/XML/JSON/repository-markdown normalizers
//! - [`catalog`]: Document catalog and its atomically-published cache
//! - [`mcp`]: MCP tool surface and response formatting
//! - [`server`]: Server startup and transports

pub mod catalog;
pub mod config;
pub mod fetcher;
pub mod mcp;
pub mod normalize;
pub mod server;
