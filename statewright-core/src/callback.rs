//! Callback bindings and dispatch.
//!
//! A [`Callback`] binds a handler to one of eight [`CallbackKind`]s. Each
//! transition runs four phases in order: before the event, leaving the source
//! state, entering the destination state, after the event. Within a phase the
//! handlers bound to the concrete event or state run first, then the handlers
//! bound to all events or all states.

use crate::context::{CancelHandle, Context};
use crate::engine::Machine;
use crate::error::{CallbackError, FsmError};
use crate::table::Label;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// When a callback runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackKind {
    /// Before a specific event.
    BeforeEvent,
    /// Before every event.
    BeforeAllEvents,
    /// Before leaving a specific state.
    LeaveState,
    /// Before leaving any state.
    LeaveAllStates,
    /// After entering a specific state.
    EnterState,
    /// After entering any state.
    EnterAllStates,
    /// After a specific event.
    AfterEvent,
    /// After every event.
    AfterAllEvents,
}

impl CallbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackKind::BeforeEvent => "before_event",
            CallbackKind::BeforeAllEvents => "before_all_events",
            CallbackKind::LeaveState => "leave_state",
            CallbackKind::LeaveAllStates => "leave_all_states",
            CallbackKind::EnterState => "enter_state",
            CallbackKind::EnterAllStates => "enter_all_states",
            CallbackKind::AfterEvent => "after_event",
            CallbackKind::AfterAllEvents => "after_all_events",
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback function.
pub type Handler<E, S> = Arc<dyn Fn(&mut CallbackContext<'_, E, S>) + Send + Sync>;

/// A handler bound to a kind and, for the specific kinds, an event or state.
pub struct Callback<E, S> {
    pub when: CallbackKind,
    /// Target of `BeforeEvent` and `AfterEvent`.
    pub event: Option<E>,
    /// Target of `LeaveState` and `EnterState`.
    pub state: Option<S>,
    pub handler: Handler<E, S>,
}

impl<E: Label, S: Label> Callback<E, S> {
    /// Raw constructor. The binding is checked when the machine is built.
    pub fn new(
        when: CallbackKind,
        event: Option<E>,
        state: Option<S>,
        handler: impl Fn(&mut CallbackContext<'_, E, S>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            when,
            event,
            state,
            handler: Arc::new(handler),
        }
    }

    pub fn before_event(
        event: E,
        handler: impl Fn(&mut CallbackContext<'_, E, S>) + Send + Sync + 'static,
    ) -> Self {
        Self::new(CallbackKind::BeforeEvent, Some(event), None, handler)
    }

    pub fn before_all_events(
        handler: impl Fn(&mut CallbackContext<'_, E, S>) + Send + Sync + 'static,
    ) -> Self {
        Self::new(CallbackKind::BeforeAllEvents, None, None, handler)
    }

    pub fn leave_state(
        state: S,
        handler: impl Fn(&mut CallbackContext<'_, E, S>) + Send + Sync + 'static,
    ) -> Self {
        Self::new(CallbackKind::LeaveState, None, Some(state), handler)
    }

    pub fn leave_all_states(
        handler: impl Fn(&mut CallbackContext<'_, E, S>) + Send + Sync + 'static,
    ) -> Self {
        Self::new(CallbackKind::LeaveAllStates, None, None, handler)
    }

    pub fn enter_state(
        state: S,
        handler: impl Fn(&mut CallbackContext<'_, E, S>) + Send + Sync + 'static,
    ) -> Self {
        Self::new(CallbackKind::EnterState, None, Some(state), handler)
    }

    pub fn enter_all_states(
        handler: impl Fn(&mut CallbackContext<'_, E, S>) + Send + Sync + 'static,
    ) -> Self {
        Self::new(CallbackKind::EnterAllStates, None, None, handler)
    }

    pub fn after_event(
        event: E,
        handler: impl Fn(&mut CallbackContext<'_, E, S>) + Send + Sync + 'static,
    ) -> Self {
        Self::new(CallbackKind::AfterEvent, Some(event), None, handler)
    }

    pub fn after_all_events(
        handler: impl Fn(&mut CallbackContext<'_, E, S>) + Send + Sync + 'static,
    ) -> Self {
        Self::new(CallbackKind::AfterAllEvents, None, None, handler)
    }

    /// Checks the targets match the kind.
    pub fn validate(&self) -> Result<(), FsmError> {
        let when = self.when;
        let reason = match when {
            CallbackKind::BeforeEvent | CallbackKind::AfterEvent => {
                match (&self.event, &self.state) {
                    (None, _) => Some(format!("{when} given but no event")),
                    (_, Some(state)) => Some(format!("{when} given but state {state} specified")),
                    _ => None,
                }
            }
            CallbackKind::EnterState | CallbackKind::LeaveState => {
                match (&self.state, &self.event) {
                    (None, _) => Some(format!("{when} given but no state")),
                    (_, Some(event)) => Some(format!("{when} given but event {event} specified")),
                    _ => None,
                }
            }
            CallbackKind::BeforeAllEvents
            | CallbackKind::AfterAllEvents
            | CallbackKind::EnterAllStates
            | CallbackKind::LeaveAllStates => match (&self.event, &self.state) {
                (Some(event), _) => Some(format!("{when} given with event {event}")),
                (_, Some(state)) => Some(format!("{when} given with state {state}")),
                _ => None,
            },
        };
        match reason {
            Some(reason) => Err(FsmError::InvalidCallback { reason }),
            None => Ok(()),
        }
    }
}

impl<E: fmt::Debug, S: fmt::Debug> fmt::Debug for Callback<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("when", &self.when)
            .field("event", &self.event)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Wraps a fallible handler so a returned error is stored on the context.
///
/// ```
/// use statewright_core::{with_error_handling, Callback, Context, Machine, Transition};
///
/// let machine = Machine::new(
///     "start",
///     vec![Transition::new("run", ["start"], "end")],
///     vec![Callback::before_all_events(with_error_handling(|_cb| {
///         Err::<(), _>("no credit left")
///     }))],
/// )
/// .unwrap();
///
/// let err = machine.fire(&Context::background(), "run").unwrap_err();
/// assert_eq!(err.to_string(), "no credit left");
/// assert_eq!(machine.current(), "end");
/// ```
pub fn with_error_handling<E, S, F, Er>(
    f: F,
) -> impl Fn(&mut CallbackContext<'_, E, S>) + Send + Sync + 'static
where
    E: Label,
    S: Label,
    F: Fn(&mut CallbackContext<'_, E, S>) -> Result<(), Er> + Send + Sync + 'static,
    Er: Into<Box<dyn Error + Send + Sync>>,
{
    move |cb: &mut CallbackContext<'_, E, S>| {
        if let Err(err) = f(&mut *cb) {
            cb.set_err(err);
        }
    }
}

/// Everything a single transition attempt carries between phases.
///
/// Lives on the stack of `Machine::event` for synchronous transitions and
/// inside the machine while a transition is deferred.
pub(crate) struct TransitionData<E, S> {
    pub(crate) event: E,
    pub(crate) src: S,
    pub(crate) dst: S,
    pub(crate) args: Vec<Value>,
    pub(crate) err: Option<CallbackError>,
    pub(crate) ctx: Context,
    pub(crate) cancel: CancelHandle,
    pub(crate) canceled: bool,
    pub(crate) deferred: bool,
}

impl<E, S> TransitionData<E, S> {
    pub(crate) fn new(
        event: E,
        src: S,
        dst: S,
        args: Vec<Value>,
        ctx: Context,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            event,
            src,
            dst,
            args,
            err: None,
            ctx,
            cancel,
            canceled: false,
            deferred: false,
        }
    }
}

/// What a callback sees of the transition it runs in.
pub struct CallbackContext<'a, E, S> {
    machine: &'a Machine<E, S>,
    data: &'a mut TransitionData<E, S>,
}

impl<'a, E: Label, S: Label> CallbackContext<'a, E, S> {
    pub(crate) fn new(machine: &'a Machine<E, S>, data: &'a mut TransitionData<E, S>) -> Self {
        Self { machine, data }
    }

    /// The machine running the transition.
    ///
    /// Enter and after callbacks may fire further events on it. Before and
    /// leave callbacks must not: the machine is still dispatching and the call
    /// would block forever.
    pub fn machine(&self) -> &'a Machine<E, S> {
        self.machine
    }

    pub fn event(&self) -> &E {
        &self.data.event
    }

    /// State before the transition.
    pub fn src(&self) -> &S {
        &self.data.src
    }

    /// State after the transition.
    pub fn dst(&self) -> &S {
        &self.data.dst
    }

    pub fn args(&self) -> &[Value] {
        &self.data.args
    }

    pub fn err(&self) -> Option<&CallbackError> {
        self.data.err.as_ref()
    }

    /// Attaches an error to the transition, replacing any earlier one.
    ///
    /// The error does not stop the transition. It is returned to the caller
    /// once all callbacks have run.
    pub fn set_err(&mut self, err: impl Into<Box<dyn Error + Send + Sync>>) {
        self.data.err = Some(Arc::from(err.into()));
    }

    /// Context of this transition attempt.
    pub fn context(&self) -> &Context {
        &self.data.ctx
    }

    /// Cancels the transition. Only honoured in before and leave callbacks.
    pub fn cancel(&mut self) {
        self.data.canceled = true;
        self.data.cancel.cancel();
    }

    /// Cancels the transition with an error, replacing any earlier one.
    pub fn cancel_with(&mut self, err: impl Into<Box<dyn Error + Send + Sync>>) {
        self.set_err(err);
        self.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.data.canceled
    }

    /// Defers the transition until [`Machine::transition`] is called.
    ///
    /// Only honoured in leave callbacks.
    pub fn set_async(&mut self) {
        self.data.deferred = true;
    }

    pub fn is_async(&self) -> bool {
        self.data.deferred
    }
}

/// One of the four dispatch phases of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Before,
    Leave,
    Enter,
    After,
}

impl Phase {
    fn kinds(self) -> (CallbackKind, CallbackKind) {
        match self {
            Phase::Before => (CallbackKind::BeforeEvent, CallbackKind::BeforeAllEvents),
            Phase::Leave => (CallbackKind::LeaveState, CallbackKind::LeaveAllStates),
            Phase::Enter => (CallbackKind::EnterState, CallbackKind::EnterAllStates),
            Phase::After => (CallbackKind::AfterEvent, CallbackKind::AfterAllEvents),
        }
    }

    fn is_cancelable(self) -> bool {
        matches!(self, Phase::Before | Phase::Leave)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Before => "before",
            Phase::Leave => "leave",
            Phase::Enter => "enter",
            Phase::After => "after",
        })
    }
}

/// How a phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Canceled,
    Deferred,
}

/// Validated callbacks indexed by kind and target.
pub struct CallbackRegistry<E, S> {
    by_event: HashMap<(CallbackKind, E), Vec<Handler<E, S>>>,
    by_state: HashMap<(CallbackKind, S), Vec<Handler<E, S>>>,
    generic: HashMap<CallbackKind, Vec<Handler<E, S>>>,
}

impl<E: Label, S: Label> CallbackRegistry<E, S> {
    /// Validates and indexes the callbacks.
    ///
    /// Handlers sharing a kind and target run in registration order.
    pub fn new(callbacks: impl IntoIterator<Item = Callback<E, S>>) -> Result<Self, FsmError> {
        let mut registry = Self {
            by_event: HashMap::new(),
            by_state: HashMap::new(),
            generic: HashMap::new(),
        };

        for cb in callbacks {
            cb.validate()?;
            match (cb.event, cb.state) {
                (Some(event), _) => registry
                    .by_event
                    .entry((cb.when, event))
                    .or_default()
                    .push(cb.handler),
                (_, Some(state)) => registry
                    .by_state
                    .entry((cb.when, state))
                    .or_default()
                    .push(cb.handler),
                (None, None) => registry
                    .generic
                    .entry(cb.when)
                    .or_default()
                    .push(cb.handler),
            }
        }

        Ok(registry)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.by_event.values().map(Vec::len).sum::<usize>()
            + self.by_state.values().map(Vec::len).sum::<usize>()
            + self.generic.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handlers for a phase: specific ones first, then generic ones.
    ///
    /// `state` is the source state for the leave phase and the destination
    /// state for the enter phase. The other phases ignore it.
    pub(crate) fn handlers(
        &self,
        phase: Phase,
        event: &E,
        state: &S,
    ) -> impl Iterator<Item = &Handler<E, S>> + '_ {
        let (specific, generic) = phase.kinds();
        let specific = match phase {
            Phase::Before | Phase::After => self.by_event.get(&(specific, event.clone())),
            Phase::Leave | Phase::Enter => self.by_state.get(&(specific, state.clone())),
        };
        specific
            .into_iter()
            .flatten()
            .chain(self.generic.get(&generic).into_iter().flatten())
    }

    /// Runs a phase's handlers against `cb`.
    ///
    /// Before and leave phases stop at the first handler that cancels. The
    /// leave phase also stops at the first handler that defers.
    pub(crate) fn run(&self, phase: Phase, cb: &mut CallbackContext<'_, E, S>) -> Flow {
        let event = cb.event().clone();
        let state = match phase {
            Phase::Enter => cb.dst().clone(),
            _ => cb.src().clone(),
        };

        for handler in self.handlers(phase, &event, &state) {
            handler(&mut *cb);
            if phase.is_cancelable() && cb.is_canceled() {
                return Flow::Canceled;
            }
            if phase == Phase::Leave && cb.is_async() {
                return Flow::Deferred;
            }
        }
        Flow::Continue
    }
}

impl<E, S> fmt::Debug for CallbackRegistry<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("event_bindings", &self.by_event.len())
            .field("state_bindings", &self.by_state.len())
            .field("generic_bindings", &self.generic.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut CallbackContext<'_, String, String>) {}

    fn reason(cb: Callback<String, String>) -> Option<String> {
        match cb.validate() {
            Ok(()) => None,
            Err(FsmError::InvalidCallback { reason }) => Some(reason),
            Err(other) => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_validate_messages() {
        let cases: Vec<(Callback<String, String>, Option<&str>)> = vec![
            (
                Callback::new(CallbackKind::BeforeEvent, None, None, noop),
                Some("before_event given but no event"),
            ),
            (
                Callback::new(
                    CallbackKind::BeforeEvent,
                    Some("open".into()),
                    Some("closed".into()),
                    noop,
                ),
                Some("before_event given but state closed specified"),
            ),
            (
                Callback::new(CallbackKind::BeforeAllEvents, Some("open".into()), None, noop),
                Some("before_all_events given with event open"),
            ),
            (
                Callback::new(CallbackKind::EnterState, None, None, noop),
                Some("enter_state given but no state"),
            ),
            (
                Callback::new(
                    CallbackKind::EnterState,
                    Some("open".into()),
                    Some("closed".into()),
                    noop,
                ),
                Some("enter_state given but event open specified"),
            ),
            (
                Callback::new(CallbackKind::EnterAllStates, None, Some("closed".into()), noop),
                Some("enter_all_states given with state closed"),
            ),
            (
                Callback::new(CallbackKind::AfterAllEvents, None, Some("closed".into()), noop),
                Some("after_all_events given with state closed"),
            ),
            (Callback::after_event("open".into(), noop), None),
            (Callback::leave_state("closed".into(), noop), None),
            (Callback::leave_all_states(noop), None),
        ];

        for (cb, expected) in cases {
            let when = cb.when;
            assert_eq!(reason(cb).as_deref(), expected, "{when}");
        }
    }

    #[test]
    fn test_registry_rejects_bad_binding() {
        let result = CallbackRegistry::new(vec![
            Callback::<String, String>::before_all_events(noop),
            Callback::new(CallbackKind::LeaveState, None, None, noop),
        ]);
        assert!(matches!(
            result,
            Err(FsmError::InvalidCallback { ref reason }) if reason == "leave_state given but no state"
        ));
    }

    #[test]
    fn test_handlers_specific_before_generic() {
        let registry: CallbackRegistry<&str, &str> = CallbackRegistry::new(vec![
            Callback::before_all_events(|cb| cb.set_err("generic")),
            Callback::before_event("run", |cb| cb.set_err("specific")),
            Callback::before_event("other", |cb| cb.set_err("other")),
            Callback::leave_state("start", |cb| cb.set_err("leave")),
        ])
        .unwrap();

        assert_eq!(registry.len(), 4);
        assert_eq!(registry.handlers(Phase::Before, &"run", &"start").count(), 2);
        assert_eq!(registry.handlers(Phase::Before, &"stop", &"start").count(), 1);
        assert_eq!(registry.handlers(Phase::Leave, &"run", &"start").count(), 1);
        assert_eq!(registry.handlers(Phase::Leave, &"run", &"end").count(), 0);
        assert_eq!(registry.handlers(Phase::Enter, &"run", &"start").count(), 0);
        assert_eq!(registry.handlers(Phase::After, &"run", &"start").count(), 0);
    }

    #[test]
    fn test_same_slot_keeps_registration_order() {
        let registry: CallbackRegistry<&str, &str> = CallbackRegistry::new(vec![
            Callback::after_all_events(|_| {}),
            Callback::after_all_events(|_| {}),
            Callback::after_event("run", |_| {}),
        ])
        .unwrap();
        assert_eq!(registry.handlers(Phase::After, &"run", &"end").count(), 3);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(CallbackKind::LeaveAllStates.to_string(), "leave_all_states");
        let parsed: CallbackKind = serde_json::from_str("\"enter_state\"").unwrap();
        assert_eq!(parsed, CallbackKind::EnterState);
    }
}
