//! Mermaid output, as a state diagram or a flow chart.

use crate::VizError;
use serde::{Deserialize, Serialize};
use statewright_core::{Label, Machine};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const HIGHLIGHT_COLOR: &str = "#00AA00";

/// Mermaid diagram flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MermaidDiagram {
    /// `graph LR` with the current state highlighted.
    FlowChart,
    /// `stateDiagram-v2` starting at the current state.
    StateDiagram,
}

impl FromStr for MermaidDiagram {
    type Err = VizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flowChart" => Ok(MermaidDiagram::FlowChart),
            "stateDiagram" => Ok(MermaidDiagram::StateDiagram),
            other => Err(VizError::UnknownDiagramType(other.to_string())),
        }
    }
}

/// Displays a machine as a Mermaid state diagram.
pub struct StateDiagram<'a, E, S>(pub &'a Machine<E, S>);

impl<E: Label, S: Label> fmt::Display for StateDiagram<'_, E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let machine = self.0;
        writeln!(f, "stateDiagram-v2")?;
        writeln!(f, "    [*] --> {}", machine.current())?;
        for (event, src, dst) in machine.table().entries() {
            writeln!(f, "    {src} --> {dst}: {event}")?;
        }
        Ok(())
    }
}

/// Displays a machine as a Mermaid flow chart.
///
/// States get ids `id0`, `id1`, ... in sorted order.
pub struct FlowChart<'a, E, S>(pub &'a Machine<E, S>);

impl<E: Label, S: Label> fmt::Display for FlowChart<'_, E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let machine = self.0;
        let ids: BTreeMap<S, String> = machine
            .all_states()
            .into_iter()
            .enumerate()
            .map(|(i, state)| (state, format!("id{i}")))
            .collect();

        writeln!(f, "graph LR")?;
        for (state, id) in &ids {
            writeln!(f, "    {id}[{state}]")?;
        }
        writeln!(f)?;

        for (event, src, dst) in machine.table().entries() {
            // Every source and destination is in `ids`.
            if let (Some(from), Some(to)) = (ids.get(src), ids.get(dst)) {
                writeln!(f, "    {from} --> |{event}| {to}")?;
            }
        }
        writeln!(f)?;

        // A state forced with `set_state` may be missing from the table.
        if let Some(id) = ids.get(&machine.current()) {
            writeln!(f, "    style {id} fill:{HIGHLIGHT_COLOR}")?;
        }
        Ok(())
    }
}

/// Renders a machine as a Mermaid diagram.
pub fn mermaid<E: Label, S: Label>(machine: &Machine<E, S>, diagram: MermaidDiagram) -> String {
    match diagram {
        MermaidDiagram::FlowChart => FlowChart(machine).to_string(),
        MermaidDiagram::StateDiagram => StateDiagram(machine).to_string(),
    }
}
