//! Transition table.

use crate::definition::Transition;
use crate::error::FsmError;
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Bound for event and state types.
///
/// Implemented for every type that qualifies, e.g. `String`, `&'static str`,
/// or a fieldless enum deriving the listed traits plus `Display`.
pub trait Label: Clone + Eq + Ord + Hash + Display + Debug + Send + Sync + 'static {}

impl<T> Label for T where T: Clone + Eq + Ord + Hash + Display + Debug + Send + Sync + 'static {}

/// Immutable mapping of `(event, source)` to destination.
#[derive(Debug, Clone)]
pub struct TransitionTable<E, S> {
    transitions: HashMap<(E, S), S>,
}

impl<E: Label, S: Label> TransitionTable<E, S> {
    /// Expands each transition into one entry per source state.
    ///
    /// A later entry for the same `(event, source)` pair replaces an earlier
    /// one.
    pub fn new<'a>(transitions: impl IntoIterator<Item = &'a Transition<E, S>>) -> Self {
        let mut table = HashMap::new();
        for t in transitions {
            for src in &t.sources {
                let key = (t.event.clone(), src.clone());
                if let Some(previous) = table.insert(key, t.destination.clone()) {
                    tracing::warn!(
                        "transition on '{}' from '{}' to '{}' replaced by one to '{}'",
                        t.event,
                        src,
                        previous,
                        t.destination
                    );
                }
            }
        }
        Self { transitions: table }
    }

    /// Looks up the destination for `event` fired in `state`.
    pub fn lookup(&self, event: &E, state: &S) -> Option<&S> {
        self.transitions.get(&(event.clone(), state.clone()))
    }

    /// Like [`lookup`](Self::lookup), but explains a miss.
    ///
    /// Returns `InvalidEvent` when the event is legal from some other state
    /// and `UnknownEvent` when no entry mentions it at all.
    pub fn resolve(&self, event: &E, state: &S) -> Result<&S, FsmError> {
        if let Some(dst) = self.lookup(event, state) {
            return Ok(dst);
        }
        if self.has_event(event) {
            Err(FsmError::InvalidEvent {
                event: event.to_string(),
                state: state.to_string(),
            })
        } else {
            Err(FsmError::UnknownEvent {
                event: event.to_string(),
            })
        }
    }

    /// Returns true if any entry is keyed by `event`.
    pub fn has_event(&self, event: &E) -> bool {
        self.transitions.keys().any(|(e, _)| e == event)
    }

    /// Events that can be fired from `state`, sorted.
    pub fn events_from(&self, state: &S) -> Vec<E> {
        let mut events: Vec<E> = self
            .transitions
            .keys()
            .filter(|(_, src)| src == state)
            .map(|(e, _)| e.clone())
            .collect();
        events.sort();
        events
    }

    /// All events mentioned by the table.
    pub fn events(&self) -> BTreeSet<E> {
        self.transitions.keys().map(|(e, _)| e.clone()).collect()
    }

    /// All states mentioned by the table, as sources or destinations.
    pub fn states(&self) -> BTreeSet<S> {
        self.transitions
            .iter()
            .flat_map(|((_, src), dst)| [src.clone(), dst.clone()])
            .collect()
    }

    /// States with a transition into `state`.
    pub fn predecessors(&self, state: &S) -> BTreeSet<S> {
        self.transitions
            .iter()
            .filter(|(_, dst)| *dst == state)
            .map(|((_, src), _)| src.clone())
            .collect()
    }

    /// States reachable from `state` with a single event.
    pub fn successors(&self, state: &S) -> BTreeSet<S> {
        self.transitions
            .iter()
            .filter(|((_, src), _)| src == state)
            .map(|(_, dst)| dst.clone())
            .collect()
    }

    /// All entries as `(event, source, destination)`, sorted by source and
    /// then event.
    pub fn entries(&self) -> Vec<(&E, &S, &S)> {
        let mut entries: Vec<(&E, &S, &S)> = self
            .transitions
            .iter()
            .map(|((e, src), dst)| (e, src, dst))
            .collect();
        entries.sort_by(|a, b| (a.1, a.0).cmp(&(b.1, b.0)));
        entries
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}
