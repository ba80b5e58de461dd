// src/config/mod.rs
pub mod classifier;
pub mod pipeline;

pub use classifier::{ClassifierConfig, ClassifierProvider};
pub use pipeline::{
    AggregatorConfig, CombinationRule, OrchestratorConfig, PipelineConfig, SegmentUnit,
    SegmenterConfig,
};
