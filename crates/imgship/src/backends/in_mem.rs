//! # Previously, on imgship...
//!
//! 🎬 The images were trapped on a CDN. The bucket was three time zones away.
//! Someone had to test the pipeline without paying for egress.
//! That someone was this module.
//!
//! `in_mem` provides an in-memory [`Source`](crate::backends::Source) and
//! [`ObjectStore`](crate::backends::ObjectStore). No network calls. No disk I/O.
//! Just vibes and heap memory. 🦆
//!
//! ⚠️ This is NOT for production. If you're deploying this to prod, please also deploy a therapist.

mod in_mem_source;
mod in_mem_store;

pub(crate) use in_mem_source::InMemorySource;
pub(crate) use in_mem_store::InMemoryStore;
