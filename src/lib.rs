//! Cronista - attribute-indexed interval state system for trace analysis
//!
//! This library ingests ordered streams of decoded trace events (GPU
//! kernel launches, memory transfers, API call spans) and builds a
//! queryable, time-indexed record of nested activity: a hierarchical
//! namespace of attributes, each holding a time-ordered sequence of
//! non-overlapping value-intervals, mutated through a stack-like
//! push/pop protocol with support for deferred (future) mutations and
//! cross-stream correlation of asynchronous event pairs.

pub mod attribute_tree;
pub mod builder;
pub mod config;
pub mod correlation;
pub mod deferred;
pub mod errors;
pub mod event;
pub mod gpu_handler;
pub mod handler;
pub mod interval_store;
pub mod processor;
pub mod stack;
pub mod state_system;
pub mod value;
