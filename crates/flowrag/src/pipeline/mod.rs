//! Dataflow graph engine: typed stages wired into a validated DAG

pub mod component;
pub mod graph;

pub use component::{
    Component, Inputs, Outputs, PortSpec, PortType, RunContext, RunCounters, RunStats, Value,
};
pub use graph::{Edge, Pipeline, PipelineBuilder, PipelineInputs, PipelineOutput, RunOptions, RunState};
