// Copyright (c) 2026 Sighook developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

#![warn(missing_docs)]

//! Named, ordered lifecycle hooks for process signals and graceful shutdown.
//!
//! A [`Hook`] is a named bundle of callback [`Function`]s and channel-based
//! [`Notify`]s, executed in ascending [`order`](Function::order). The
//! [`Handler`] maps OS signals to hooks, dispatches them from a blocking
//! [`run`](Handler::run) loop, and drives a one-shot exit sequence — the
//! designated exit hook runs exactly once, no matter how many termination
//! signals or [`exit`](Handler::exit) calls race, before the process
//! terminates.
//!
//! Registering an exit hook intercepts `SIGINT`, `SIGTERM` and `SIGQUIT`;
//! mapping a hook to any other signal intercepts that signal too. All
//! interception is released when the exit sequence runs.
//!
//! # Example
//! ```no_run
//! use sighook::Function;
//!
//! fn main() -> Result<(), sighook::Error> {
//!     let handler = sighook::global()?;
//!
//!     let exit = handler.ensure_exit_hook()?;
//!     exit.add_function(Function::new("goodbye", |ctx| {
//!         println!("shutting down (code {})", ctx.exit_code);
//!     }))?;
//!
//!     println!("Waiting for Ctrl-C...");
//!     handler.run()
//! }
//! ```
//!
//! The handler claims the process-global signal pipe on construction, so a
//! process holds at most one; prefer constructing it with [`Handler::new`]
//! and threading it through the application, or use [`global()`] when a
//! shared instance is more convenient.

mod error;
mod handler;
mod hook;
mod platform;
mod registry;
mod signal;

pub use error::Error;
pub use handler::Handler;
pub use hook::{ExecHandle, Function, Hook, Notify};
pub use platform::Signal;
pub use signal::{ExitType, SignalContext, TERMINATION_SIGNALS};

use once_cell::sync::OnceCell;

static GLOBAL: OnceCell<Handler> = OnceCell::new();

/// Returns the shared process-wide [`Handler`], constructing it on first
/// call. Every later call returns the same instance.
///
/// # Errors
/// Forwards [`Handler::new`] errors; in particular
/// [`Error::MultipleHandlers`] when a handler was already constructed with
/// [`Handler::new`] directly.
pub fn global() -> Result<&'static Handler, Error> {
    GLOBAL.get_or_try_init(Handler::new)
}
