//! Adaptive interview engine: a two-phase, timer-gated conversation driven by
//! a streaming text source.

pub mod controller;
pub mod countdown;
pub mod extractor;
pub mod handlers;
pub mod normalizer;
pub mod prompts;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod topic;
pub mod transcript;
