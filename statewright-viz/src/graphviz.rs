//! Graphviz DOT output.

use statewright_core::{Label, Machine};
use std::fmt;

/// Displays a machine as a DOT digraph.
///
/// Transitions out of the current state come first.
pub struct Graphviz<'a, E, S>(pub &'a Machine<E, S>);

impl<E: Label, S: Label> fmt::Display for Graphviz<'_, E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let machine = self.0;
        let current = machine.current();
        let entries = machine.table().entries();

        writeln!(f, "digraph fsm {{")?;
        let (from_current, rest): (Vec<_>, Vec<_>) =
            entries.iter().partition(|(_, src, _)| **src == current);
        for (event, src, dst) in from_current.into_iter().chain(rest) {
            writeln!(f, "    \"{src}\" -> \"{dst}\" [ label = \"{event}\" ];")?;
        }
        writeln!(f)?;

        for state in machine.all_states() {
            writeln!(f, "    \"{state}\";")?;
        }
        writeln!(f, "}}")
    }
}

/// Renders a machine as a DOT digraph.
pub fn graphviz<E: Label, S: Label>(machine: &Machine<E, S>) -> String {
    Graphviz(machine).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::door;

    #[test]
    fn test_graphviz_output() {
        let expected = r#"digraph fsm {
    "closed" -> "open" [ label = "open" ];
    "intermediate" -> "closed" [ label = "part-close" ];
    "open" -> "closed" [ label = "close" ];

    "closed";
    "intermediate";
    "open";
}
"#;
        assert_eq!(graphviz(&door()), expected);
    }

    #[test]
    fn test_current_state_edges_first() {
        let fsm = door();
        fsm.set_state("open");
        let out = graphviz(&fsm);
        let first_edge = out.lines().nth(1).unwrap();
        assert_eq!(first_edge, r#"    "open" -> "closed" [ label = "close" ];"#);
    }
}
