//! Purpose: Library crate behind the `essayset` CLI, viewer server, and tests.
//! Exports: `core` (table pipeline, errors), `api` (datasets, sessions, hub publishing), `notice`.
//! Role: Keeps the pipeline pure and the I/O edges (files, HTTP) in `api`.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
//! Invariants: Untyped rows never cross the normalizer boundary.
pub mod api;
pub mod core;
pub mod notice;
