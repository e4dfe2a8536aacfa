//! Merge-queue bot for a hosted git forge.
//!
//! Developers mark pull requests ready to land; the bot batches them,
//! builds a staging merge commit, waits for external CI on that exact
//! tree, and fast-forwards the protected branch once CI is green —
//! bisecting the batch on conflict or test failure so good PRs survive.
//!
//! This crate is a thin facade over [`mergequeue_core`], the state
//! machine: data model, readiness evaluator, merge constructor,
//! Controller, event router, poller.
//!
//! The forge REST client and the webhook HTTP receiver are out of
//! scope: this crate specifies their interface
//! ([`mergequeue_core::forge::ForgeClient`]) without shipping a
//! production implementation of it.

pub use mergequeue_core::*;
