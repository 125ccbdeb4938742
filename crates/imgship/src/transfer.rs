//! 🚚 The transfer core: everything that happens to one job between "queued" and "done".
//!
//! 🧠 Knowledge graph:
//! - `existence`: skip what's already there (positive-only cache).
//! - `admission`: at most N jobs past the gate at once.
//! - `fetcher` / `uploader`: the two network legs, both through `retry`.
//! - `classify`: what counts as transient, shared by both legs.

pub(crate) mod admission;
pub(crate) mod classify;
pub(crate) mod existence;
pub(crate) mod fetcher;
pub(crate) mod retry;
pub(crate) mod uploader;
