//! Built-in heuristic policy.
//!
//! This is one concrete way of judging content; the gateway itself only
//! depends on the evaluator contract and never on these rules.

pub mod heuristic;
pub mod pack;
pub mod patterns;

pub use heuristic::HeuristicPolicy;
pub use pack::{ChannelOverrides, DetectorRule, PhraseRule, PolicyError, PolicyPack, RuleAction};
pub use patterns::Detector;
