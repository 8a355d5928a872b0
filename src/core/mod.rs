//! Core signal path of the stress agent.
//!
//! This module contains:
//! - Frame parsing for the two-channel serial stream
//! - The classifier adapter around an opaque scorer
//! - The sliding-window aggregator behind the live display

pub mod aggregator;
pub mod classifier;
pub mod frame;

// Re-export commonly used types
pub use aggregator::{
    LiveAggregator, LivePoint, LiveSnapshot, SeverityBand, SeverityBands, SharedAggregator,
    SlidingWindow,
};
pub use classifier::{
    scorer_fn, ClassifierAdapter, ClassifierError, Inference, ModelError, ModelInput, Scorer,
    SoftmaxScorer, STRESS_CLASS,
};
pub use frame::{parse, parse_at, split_fields, ParseError, Sample};
