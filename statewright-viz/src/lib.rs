//! # statewright-viz
//!
//! Text diagrams of statewright machines.
//!
//! Output is deterministic: transitions are listed by source state and then
//! event, and states are listed in order.

pub mod graphviz;
pub mod mermaid;

pub use graphviz::{graphviz, Graphviz};
pub use mermaid::{mermaid, FlowChart, MermaidDiagram, StateDiagram};

use serde::{Deserialize, Serialize};
use statewright_core::{Label, Machine};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Visualization errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VizError {
    #[error("unknown visualize type: {0}")]
    UnknownVisualizeType(String),

    #[error("unknown mermaid diagram type: {0}")]
    UnknownDiagramType(String),
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VisualizeType {
    #[default]
    Graphviz,
    /// Same as [`VisualizeType::MermaidStateDiagram`].
    Mermaid,
    MermaidStateDiagram,
    MermaidFlowChart,
}

impl VisualizeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisualizeType::Graphviz => "graphviz",
            VisualizeType::Mermaid => "mermaid",
            VisualizeType::MermaidStateDiagram => "mermaid-state-diagram",
            VisualizeType::MermaidFlowChart => "mermaid-flow-chart",
        }
    }
}

impl fmt::Display for VisualizeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisualizeType {
    type Err = VizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "graphviz" => Ok(VisualizeType::Graphviz),
            "mermaid" => Ok(VisualizeType::Mermaid),
            "mermaid-state-diagram" => Ok(VisualizeType::MermaidStateDiagram),
            "mermaid-flow-chart" => Ok(VisualizeType::MermaidFlowChart),
            other => Err(VizError::UnknownVisualizeType(other.to_string())),
        }
    }
}

/// Renders `machine` in the requested format.
pub fn visualize<E: Label, S: Label>(machine: &Machine<E, S>, kind: VisualizeType) -> String {
    match kind {
        VisualizeType::Graphviz => graphviz(machine),
        VisualizeType::Mermaid | VisualizeType::MermaidStateDiagram => {
            mermaid(machine, MermaidDiagram::StateDiagram)
        }
        VisualizeType::MermaidFlowChart => mermaid(machine, MermaidDiagram::FlowChart),
    }
}
