//! The state machine: current state, dispatch protocol and deferred
//! transitions.
//!
//! Two locks guard a machine. The state lock covers the current state and
//! the pending-transition marker and is only ever held briefly. The dispatch
//! lock serializes [`Machine::event`] and [`Machine::transition`]; it is
//! released before enter and after callbacks run, so those callbacks can fire
//! further events on the same machine.

use crate::callback::{Callback, CallbackContext, CallbackRegistry, Flow, Phase, TransitionData};
use crate::context::Context;
use crate::definition::Transition;
use crate::error::{AsyncTransition, FsmError};
use crate::table::{Label, TransitionTable};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// A finite state machine.
///
/// `Machine` is `Send + Sync`; share it across threads behind an `Arc`.
pub struct Machine<E, S> {
    slot: RwLock<Slot<E, S>>,
    dispatch: Mutex<()>,
    table: TransitionTable<E, S>,
    callbacks: CallbackRegistry<E, S>,
    metadata: DashMap<String, Value>,
}

struct Slot<E, S> {
    current: S,
    pending: Option<Pending<E, S>>,
}

enum Pending<E, S> {
    /// A synchronous transition is between its leave and commit steps.
    Staged,
    /// A leave callback deferred the transition.
    Deferred(TransitionData<E, S>),
}

impl<E, S> Pending<E, S> {
    fn is_deferred(&self) -> bool {
        matches!(self, Pending::Deferred(_))
    }
}

/// Clears the staged marker if a leave callback panics.
struct UnstageOnPanic<'a, E, S> {
    slot: &'a RwLock<Slot<E, S>>,
}

impl<E, S> Drop for UnstageOnPanic<'_, E, S> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut slot = self.slot.write();
            if matches!(slot.pending, Some(Pending::Staged)) {
                slot.pending = None;
            }
        }
    }
}

impl<E: Label, S: Label> Machine<E, S> {
    /// Builds a machine in `initial`.
    ///
    /// Fails with [`FsmError::InvalidCallback`] if a callback's targets do not
    /// match its kind.
    pub fn new(
        initial: S,
        transitions: impl IntoIterator<Item = Transition<E, S>>,
        callbacks: impl IntoIterator<Item = Callback<E, S>>,
    ) -> Result<Self, FsmError> {
        let transitions: Vec<_> = transitions.into_iter().collect();
        let callbacks = CallbackRegistry::new(callbacks)?;

        Ok(Self {
            slot: RwLock::new(Slot {
                current: initial,
                pending: None,
            }),
            dispatch: Mutex::new(()),
            table: TransitionTable::new(&transitions),
            callbacks,
            metadata: DashMap::new(),
        })
    }

    /// Returns the current state.
    pub fn current(&self) -> S {
        self.slot.read().current.clone()
    }

    /// Returns true if the machine is in `state`.
    pub fn is(&self, state: &S) -> bool {
        self.slot.read().current == *state
    }

    /// Returns true if `event` can be fired now.
    ///
    /// Always false while a transition is pending.
    pub fn can(&self, event: &E) -> bool {
        let slot = self.slot.read();
        slot.pending.is_none() && self.table.lookup(event, &slot.current).is_some()
    }

    pub fn cannot(&self, event: &E) -> bool {
        !self.can(event)
    }

    /// Events with a transition out of the current state, sorted.
    pub fn available_transitions(&self) -> Vec<E> {
        let slot = self.slot.read();
        self.table.events_from(&slot.current)
    }

    /// Forces the current state.
    ///
    /// Meant for restoring a machine. No callbacks run and the transition
    /// table is not consulted.
    pub fn set_state(&self, state: S) {
        self.slot.write().current = state;
    }

    pub fn table(&self) -> &TransitionTable<E, S> {
        &self.table
    }

    pub fn all_events(&self) -> BTreeSet<E> {
        self.table.events()
    }

    pub fn all_states(&self) -> BTreeSet<S> {
        self.table.states()
    }

    /// Fires `event` without arguments.
    pub fn fire(&self, ctx: &Context, event: E) -> Result<(), FsmError> {
        self.event(ctx, event, Vec::new())
    }

    /// Fires `event`, moving the machine along the matching transition.
    ///
    /// Callbacks run in four phases: before the event, leaving the current
    /// state, entering the new state, after the event. A before or leave
    /// callback may cancel, which leaves the state unchanged and returns
    /// [`FsmError::Canceled`]. A leave callback may defer the transition, which
    /// returns [`FsmError::Async`] and keeps the state unchanged until
    /// [`Machine::transition`] is called.
    ///
    /// Firing an event whose destination is the current state runs only the
    /// after callbacks and returns [`FsmError::NoTransition`].
    ///
    /// An error a callback stored with `set_err` on an otherwise successful
    /// transition is returned as [`FsmError::Callback`].
    ///
    /// `ctx` bounds the call: callbacks see a context derived from it, which
    /// is canceled when this call returns. If it is canceled before the state
    /// is committed, the transition is dropped and
    /// [`FsmError::Context`] is returned.
    ///
    /// Callbacks must not call `event` or `transition` from the before or
    /// leave phases. A panicking callback unwinds through this call and leaves
    /// no transition pending.
    pub fn event(&self, ctx: &Context, event: E, args: Vec<Value>) -> Result<(), FsmError> {
        if self
            .slot
            .read()
            .pending
            .as_ref()
            .is_some_and(Pending::is_deferred)
        {
            return Err(FsmError::InTransition {
                event: event.to_string(),
            });
        }

        let dispatch = self.dispatch.lock();

        let src = {
            let slot = self.slot.read();
            if slot.pending.is_some() {
                return Err(FsmError::InTransition {
                    event: event.to_string(),
                });
            }
            slot.current.clone()
        };
        let dst = self.table.resolve(&event, &src)?.clone();

        let (attempt_ctx, cancel) = ctx.with_cancel();
        let _cancel_on_return = cancel.clone().drop_guard();
        let mut data = TransitionData::new(event, src, dst, args, attempt_ctx, cancel);

        if self.run_phase(Phase::Before, &mut data) == Flow::Canceled {
            tracing::debug!("Transition on '{}' canceled before event", data.event);
            return Err(FsmError::Canceled { err: data.err });
        }

        if data.src == data.dst {
            drop(dispatch);
            self.run_phase(Phase::After, &mut data);
            return Err(FsmError::NoTransition { err: data.err });
        }

        self.slot.write().pending = Some(Pending::Staged);
        let flow = {
            let _unstage = UnstageOnPanic { slot: &self.slot };
            self.run_phase(Phase::Leave, &mut data)
        };

        match flow {
            Flow::Canceled => {
                self.slot.write().pending = None;
                tracing::debug!(
                    "Transition on '{}' canceled leaving '{}'",
                    data.event,
                    data.src
                );
                Err(FsmError::Canceled { err: data.err })
            }
            Flow::Deferred => {
                let (async_ctx, async_cancel) = data.ctx.without_cancel().with_cancel();
                data.ctx = async_ctx.clone();
                data.cancel = async_cancel.clone();
                let err = data.err.clone();

                tracing::debug!(
                    "Transition on '{}' from '{}' to '{}' deferred",
                    data.event,
                    data.src,
                    data.dst
                );
                self.slot.write().pending = Some(Pending::Deferred(data));
                drop(dispatch);

                Err(FsmError::Async(AsyncTransition::new(
                    async_ctx,
                    async_cancel,
                    err,
                )))
            }
            Flow::Continue => self.commit_staged(data, dispatch),
        }
    }

    /// Completes a deferred transition.
    ///
    /// Commits the staged destination and runs the enter and after callbacks.
    /// The commit happens even if the deferred transition's context has been
    /// canceled. Fails with [`FsmError::NotInTransition`] if nothing is
    /// pending.
    pub fn transition(&self) -> Result<(), FsmError> {
        let dispatch = self.dispatch.lock();

        let mut data = {
            let mut slot = self.slot.write();
            match slot.pending.take() {
                Some(Pending::Deferred(data)) => {
                    slot.current = data.dst.clone();
                    data
                }
                other => {
                    slot.pending = other;
                    return Err(FsmError::NotInTransition);
                }
            }
        };
        tracing::debug!(
            "Transition on '{}' committed: '{}' -> '{}'",
            data.event,
            data.src,
            data.dst
        );
        drop(dispatch);

        self.finish(&mut data)
    }

    /// Commits a synchronous transition whose leave phase just passed.
    fn commit_staged(
        &self,
        mut data: TransitionData<E, S>,
        dispatch: MutexGuard<'_, ()>,
    ) -> Result<(), FsmError> {
        {
            let mut slot = self.slot.write();
            if !matches!(slot.pending, Some(Pending::Staged)) {
                return Err(FsmError::Internal);
            }
            slot.pending = None;

            if let Some(err) = data.ctx.err() {
                tracing::debug!(
                    "Transition on '{}' dropped: context canceled before commit",
                    data.event
                );
                return Err(match data.err {
                    Some(err) => FsmError::Callback(err),
                    None => FsmError::Context(err),
                });
            }
            slot.current = data.dst.clone();
        }
        tracing::debug!(
            "Transition on '{}' committed: '{}' -> '{}'",
            data.event,
            data.src,
            data.dst
        );
        drop(dispatch);

        self.finish(&mut data)
    }

    /// Runs the enter and after phases of a committed transition.
    fn finish(&self, data: &mut TransitionData<E, S>) -> Result<(), FsmError> {
        self.run_phase(Phase::Enter, data);
        self.run_phase(Phase::After, data);
        match data.err.take() {
            Some(err) => Err(FsmError::Callback(err)),
            None => Ok(()),
        }
    }

    fn run_phase(&self, phase: Phase, data: &mut TransitionData<E, S>) -> Flow {
        tracing::trace!("Running {} callbacks for '{}'", phase, data.event);
        let mut cb = CallbackContext::new(self, data);
        self.callbacks.run(phase, &mut cb)
    }

    /// Returns a copy of the metadata stored under `key`.
    pub fn metadata(&self, key: &str) -> Option<Value> {
        self.metadata.get(key).map(|v| v.value().clone())
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Removes and returns the metadata stored under `key`.
    pub fn delete_metadata(&self, key: &str) -> Option<Value> {
        self.metadata.remove(key).map(|(_, v)| v)
    }
}

impl<E: Label, S: Label> fmt::Debug for Machine<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.read();
        let pending = match &slot.pending {
            None => "none",
            Some(Pending::Staged) => "staged",
            Some(Pending::Deferred(_)) => "deferred",
        };
        f.debug_struct("Machine")
            .field("current", &slot.current)
            .field("pending", &pending)
            .field("transitions", &self.table.len())
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
