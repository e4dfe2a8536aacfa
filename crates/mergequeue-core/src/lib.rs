//! `mergequeue-core` — the merge-queue state machine.
//!
//! This crate is the entire merge-queue core: the data model and its
//! invariants, the readiness evaluator,
//! the merge-constructor strategy dispatch, the Controller state
//! machine, the poller's pure due-action dispatch, the
//! `Store`/`ForgeClient` trait boundaries their real implementations sit
//! behind, the inbound-event router, per-repository
//! configuration, and the unified error taxonomy.
//!
//! The forge REST client and the webhook HTTP receiver are out of
//! scope: only [`forge::ForgeClient`] and [`events::InboundEvent`], the
//! normalized shape a receiver would produce, are specified here.
//! Likewise persistence ships only [`store::Store`] and one in-process
//! reference implementation — a durable backend is a concern for
//! whoever deploys this crate.

pub mod config;
pub mod constructor;
pub mod controller;
pub mod error;
pub mod events;
pub mod forge;
pub mod ids;
pub mod model;
pub mod poller;
pub mod readiness;
pub mod store;
pub mod telemetry;
