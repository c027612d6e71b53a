//! A collaborative ranking engine driven by a small email-shaped DSL.
//!
//! Submissions declare items under hashtags, set their attributes, and
//! cast pairwise votes between them. Every accepted submission is appended
//! to an on-disk log ([`ledger`]) and folded into in-memory state
//! ([`state`]) by the [`reducer`]. Rankings are derived on demand by the
//! [`ranker`] from whatever votes currently exist. [`api::Core`] is the
//! single entry point that ties these pieces together behind one lock.

pub mod api;
pub mod dsl;
pub mod error;
pub mod ledger;
pub mod ranker;
pub mod reducer;
pub mod state;

pub use api::{Core, IngestReceipt};
pub use error::{IngestError, LogError, ParseError, ReducerError, ReplayError};
pub use ranker::{Comparison, HashtagSummary, RankedItem};
