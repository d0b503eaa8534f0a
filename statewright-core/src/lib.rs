//! # statewright-core
//!
//! Embeddable finite state machine engine.
//!
//! This crate provides:
//! - Transition tables keyed by `(event, source state)`
//! - Ordered before/leave/enter/after callbacks
//! - Thread-safe dispatch that lets callbacks fire further events
//! - Deferred transitions with their own cancellation context
//! - Machine definitions loaded from JSON, YAML or templates
//!
//! ```
//! use statewright_core::{Context, Machine, Transition};
//!
//! let door = Machine::new(
//!     "closed",
//!     vec![
//!         Transition::new("open", ["closed"], "open"),
//!         Transition::new("close", ["open"], "closed"),
//!     ],
//!     Vec::new(),
//! )
//! .unwrap();
//!
//! door.fire(&Context::background(), "open").unwrap();
//! assert_eq!(door.current(), "open");
//! assert!(door.fire(&Context::background(), "open").is_err());
//! ```

pub mod callback;
pub mod context;
pub mod definition;
pub mod engine;
pub mod error;
pub mod table;
pub mod template;

pub use callback::{with_error_handling, Callback, CallbackContext, CallbackKind, Handler};
pub use context::{CancelHandle, Context, ContextError};
pub use definition::{MachineDefinition, Transition};
pub use engine::Machine;
pub use error::{AsyncTransition, CallbackError, FsmError};
pub use table::{Label, TransitionTable};
