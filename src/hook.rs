// Copyright (c) 2026 Sighook developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::RwLock;

use crate::error::Error;
use crate::registry::{Entry, OrderedRegistry};
use crate::signal::SignalContext;

/// A named callback with an execution-order key and an inline or detached
/// dispatch mode.
///
/// Functions are built with [`Function::new`] and the chained configuration
/// methods, then registered on a [`Hook`]:
///
/// ```
/// use sighook::Function;
///
/// let f = Function::new("flush-cache", |_ctx| { /* ... */ })
///     .description("Flush the write-back cache")
///     .order(10)
///     .concurrent();
/// ```
pub struct Function {
    name: String,
    desc: String,
    order: u16,
    concurrent: bool,
    overwrite: bool,
    body: Box<dyn Fn(&SignalContext) + Send + Sync>,
}

impl Function {
    /// Creates a function named `name` wrapping `body`.
    pub fn new<N, F>(name: N, body: F) -> Function
    where
        N: Into<String>,
        F: Fn(&SignalContext) + Send + Sync + 'static,
    {
        Function {
            name: name.into(),
            desc: String::new(),
            order: 0,
            concurrent: false,
            overwrite: false,
            body: Box::new(body),
        }
    }

    /// Free-text description.
    pub fn description<S: Into<String>>(mut self, desc: S) -> Function {
        self.desc = desc.into();
        self
    }

    /// Execution priority within the hook; lower runs first. Defaults to 0.
    pub fn order(mut self, order: u16) -> Function {
        self.order = order;
        self
    }

    /// Launch the body on a detached thread instead of running it inline.
    /// Execution proceeds to the next entry without waiting for it.
    pub fn concurrent(mut self) -> Function {
        self.concurrent = true;
        self
    }

    /// Permit replacing a previously registered function of the same name.
    pub fn overwrite(mut self) -> Function {
        self.overwrite = true;
        self
    }

    /// The function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The free-text description.
    pub fn desc(&self) -> &str {
        &self.desc
    }

    /// Invokes the body with `ctx`.
    pub fn call(&self, ctx: &SignalContext) {
        (self.body)(ctx)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("concurrent", &self.concurrent)
            .finish_non_exhaustive()
    }
}

impl Entry for Function {
    fn name(&self) -> &str {
        &self.name
    }
    fn order(&self) -> u16 {
        self.order
    }
}

/// A named channel notification with an execution-order key, a drop-vs-block
/// send mode, and an optional handshake acknowledgement.
///
/// The hook only ever sends on `chan` and receives on `ack`; it creates and
/// closes neither.
#[derive(Debug)]
pub struct Notify {
    name: String,
    desc: String,
    order: u16,
    non_blocking: bool,
    overwrite: bool,
    chan: Sender<()>,
    ack: Option<Receiver<()>>,
}

impl Notify {
    /// Creates a notify named `name` that signals through `chan`.
    pub fn new<N: Into<String>>(name: N, chan: Sender<()>) -> Notify {
        Notify {
            name: name.into(),
            desc: String::new(),
            order: 0,
            non_blocking: false,
            overwrite: false,
            chan,
            ack: None,
        }
    }

    /// Free-text description.
    pub fn description<S: Into<String>>(mut self, desc: S) -> Notify {
        self.desc = desc.into();
        self
    }

    /// Execution priority within the hook; lower runs first. Defaults to 0.
    pub fn order(mut self, order: u16) -> Notify {
        self.order = order;
        self
    }

    /// Drop the notification when no receiver is ready instead of blocking
    /// until it is delivered.
    pub fn non_blocking(mut self) -> Notify {
        self.non_blocking = true;
        self
    }

    /// Permit replacing a previously registered notify of the same name.
    pub fn overwrite(mut self) -> Notify {
        self.overwrite = true;
        self
    }

    /// Require a handshake: after the notification is sent, execution blocks
    /// until a value arrives on `ack` before moving to the next entry.
    pub fn ack(mut self, ack: Receiver<()>) -> Notify {
        self.ack = Some(ack);
        self
    }

    /// The notify name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The free-text description.
    pub fn desc(&self) -> &str {
        &self.desc
    }
}

impl Entry for Notify {
    fn name(&self) -> &str {
        &self.name
    }
    fn order(&self) -> u16 {
        self.order
    }
}

/// Handles to the detached functions launched by one [`Hook::exec`] pass.
///
/// Dropping the handle detaches them, which matches the default
/// fire-and-forget contract; call [`join`](ExecHandle::join) to wait instead.
#[derive(Debug)]
pub struct ExecHandle {
    detached: Vec<JoinHandle<()>>,
}

impl ExecHandle {
    /// Waits for every detached function launched by this pass.
    pub fn join(self) {
        for handle in self.detached {
            if handle.join().is_err() {
                log::warn!("detached hook function panicked");
            }
        }
    }

    /// Number of detached functions launched.
    pub fn len(&self) -> usize {
        self.detached.len()
    }

    /// Whether the pass launched no detached functions.
    pub fn is_empty(&self) -> bool {
        self.detached.is_empty()
    }
}

struct Registries {
    functions: OrderedRegistry<Function>,
    notifies: OrderedRegistry<Notify>,
}

/// A named, ordered bundle of [`Function`]s and [`Notify`]s, executable as a
/// unit via [`exec`](Hook::exec).
///
/// Hooks are usually shared behind an [`Arc`] so the [`Handler`] and the
/// registering code can both hold them.
///
/// [`Handler`]: crate::Handler
pub struct Hook {
    name: String,
    desc: String,
    inner: RwLock<Registries>,
}

impl Hook {
    /// Creates an empty hook with a fixed name and description.
    pub fn new<N, D>(name: N, desc: D) -> Hook
    where
        N: Into<String>,
        D: Into<String>,
    {
        Hook {
            name: name.into(),
            desc: desc.into(),
            inner: RwLock::new(Registries {
                functions: OrderedRegistry::new(),
                notifies: OrderedRegistry::new(),
            }),
        }
    }

    /// The hook name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The hook description.
    pub fn description(&self) -> &str {
        &self.desc
    }

    /// Registers `function`.
    ///
    /// # Errors
    /// [`Error::EmptyFunctionName`] when the name is empty, and
    /// [`Error::FunctionExists`] when the name is taken and the function was
    /// not built with [`Function::overwrite`].
    pub fn add_function(&self, function: Function) -> Result<(), Error> {
        if function.name.is_empty() {
            return Err(Error::EmptyFunctionName);
        }

        let mut inner = self.inner.write();
        if inner.functions.contains(&function.name) && !function.overwrite {
            return Err(Error::FunctionExists(function.name));
        }
        log::trace!("hook {}: adding function {:?}", self.name, function.name);
        inner.functions.put(function);
        Ok(())
    }

    /// Registers `notify`.
    ///
    /// # Errors
    /// [`Error::EmptyNotifyName`] when the name is empty, and
    /// [`Error::NotifyExists`] when the name is taken and the notify was not
    /// built with [`Notify::overwrite`].
    pub fn add_notify(&self, notify: Notify) -> Result<(), Error> {
        if notify.name.is_empty() {
            return Err(Error::EmptyNotifyName);
        }

        let mut inner = self.inner.write();
        if inner.notifies.contains(&notify.name) && !notify.overwrite {
            return Err(Error::NotifyExists(notify.name));
        }
        log::trace!("hook {}: adding notify {:?}", self.name, notify.name);
        inner.notifies.put(notify);
        Ok(())
    }

    /// Returns the registered function named `name`, if any.
    pub fn get_function(&self, name: &str) -> Option<Arc<Function>> {
        self.inner.read().functions.get(name)
    }

    /// Returns the registered notify named `name`, if any.
    pub fn get_notify(&self, name: &str) -> Option<Arc<Notify>> {
        self.inner.read().notifies.get(name)
    }

    /// Executes the hook: all functions, then all notifies, each in ascending
    /// order (ties resolve by registration order).
    ///
    /// Inline functions run to completion before the next entry; functions
    /// built with [`Function::concurrent`] are launched on detached threads
    /// whose handles end up in the returned [`ExecHandle`]. A notify built
    /// with [`Notify::non_blocking`] is dropped silently when no receiver is
    /// ready; otherwise the send blocks until delivered. A configured ack
    /// channel is then awaited before the next entry.
    ///
    /// Failures inside callback bodies are the callback's own business; the
    /// pass itself does not fail.
    pub fn exec(&self, ctx: &SignalContext) -> ExecHandle {
        {
            let mut inner = self.inner.write();
            inner.functions.reorder();
            inner.notifies.reorder();
        }

        let inner = self.inner.read();
        let mut detached = Vec::new();

        for function in inner.functions.ordered() {
            if function.concurrent {
                let spawned = thread::Builder::new()
                    .name(format!("hook-{}", function.name))
                    .spawn({
                        let function = Arc::clone(function);
                        let ctx = ctx.clone();
                        move || function.call(&ctx)
                    });
                match spawned {
                    Ok(handle) => detached.push(handle),
                    Err(e) => log::error!(
                        "hook {}: could not spawn function {:?}: {}",
                        self.name,
                        function.name,
                        e
                    ),
                }
            } else {
                function.call(ctx);
            }
        }

        for notify in inner.notifies.ordered() {
            if notify.non_blocking {
                match notify.chan.try_send(()) {
                    Ok(()) | Err(TrySendError::Full(())) => {}
                    Err(TrySendError::Disconnected(())) => log::warn!(
                        "hook {}: notify {:?} has no live receiver",
                        self.name,
                        notify.name
                    ),
                }
            } else if notify.chan.send(()).is_err() {
                log::warn!(
                    "hook {}: notify {:?} disconnected, skipping",
                    self.name,
                    notify.name
                );
            }

            if let Some(ack) = &notify.ack {
                if ack.recv().is_err() {
                    log::warn!(
                        "hook {}: ack channel of notify {:?} disconnected",
                        self.name,
                        notify.name
                    );
                }
            }
        }

        ExecHandle { detached }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}
