// Copyright (c) 2026 Sighook developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use std::collections::HashMap;
use std::process;
use std::sync::Arc;

use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::Error;
use crate::hook::Hook;
use crate::platform::{self, Signal};
use crate::signal::{ExitType, SignalContext, TERMINATION_SIGNALS};

/// The OS facilities the handler drives. Production code uses `OsBackend`;
/// tests substitute a recording implementation.
pub(crate) trait Backend: Send + Sync {
    fn intercept(&self, sig: Signal) -> Result<(), Error>;
    fn release(&self, sigs: &[Signal]);
    fn terminate(&self, code: i32);
}

struct OsBackend;

impl Backend for OsBackend {
    fn intercept(&self, sig: Signal) -> Result<(), Error> {
        platform::intercept(sig)
    }

    fn release(&self, sigs: &[Signal]) {
        platform::release(sigs)
    }

    fn terminate(&self, code: i32) {
        process::exit(code)
    }
}

struct State {
    exit_hook: Option<Arc<Hook>>,
    hooks: HashMap<Signal, Arc<Hook>>,
    capturing: Vec<Signal>,
    loop_running: bool,
    exit_in_progress: bool,
}

/// The process-wide router mapping OS signals to [`Hook`]s and driving the
/// one-shot exit sequence.
///
/// A handler claims the process-global signal pipe on construction, so a
/// process holds at most one. Thread it through the application explicitly,
/// or use [`global()`](crate::global) for the guarded shared instance.
pub struct Handler {
    backend: Arc<dyn Backend>,
    sig_rx: Receiver<Signal>,
    exit_tx: Sender<()>,
    exit_rx: Receiver<()>,
    state: Mutex<State>,
}

impl Handler {
    /// Creates the handler and claims the process-global signal pipe.
    ///
    /// # Errors
    /// [`Error::MultipleHandlers`] when a handler already claimed the pipe,
    /// [`Error::System`] when setting up the pipe or its watcher thread
    /// failed.
    pub fn new() -> Result<Handler, Error> {
        let (sig_tx, sig_rx) = bounded(1);
        platform::claim(sig_tx)?;
        Ok(Handler::with_backend(Arc::new(OsBackend), sig_rx))
    }

    pub(crate) fn with_backend(backend: Arc<dyn Backend>, sig_rx: Receiver<Signal>) -> Handler {
        let (exit_tx, exit_rx) = bounded(1);
        Handler {
            backend,
            sig_rx,
            exit_tx,
            exit_rx,
            state: Mutex::new(State {
                exit_hook: None,
                hooks: HashMap::new(),
                capturing: Vec::new(),
                loop_running: false,
                exit_in_progress: false,
            }),
        }
    }

    /// Registers the designated exit hook and begins intercepting the
    /// termination signals (`SIGINT`, `SIGTERM`, `SIGQUIT`) that are not
    /// already intercepted.
    ///
    /// # Errors
    /// [`Error::ExitHookExists`] when an exit hook is already set,
    /// [`Error::System`] when signal interception failed.
    pub fn set_exit(&self, hook: Arc<Hook>) -> Result<(), Error> {
        let mut state = self.state.lock();
        self.set_exit_locked(&mut state, hook)
    }

    fn set_exit_locked(&self, state: &mut State, hook: Arc<Hook>) -> Result<(), Error> {
        if state.exit_hook.is_some() {
            return Err(Error::ExitHookExists);
        }
        for sig in TERMINATION_SIGNALS {
            self.capture_locked(state, sig)?;
        }
        state.exit_hook = Some(hook);
        Ok(())
    }

    fn capture_locked(&self, state: &mut State, sig: Signal) -> Result<(), Error> {
        if state.capturing.contains(&sig) {
            return Ok(());
        }
        self.backend.intercept(sig)?;
        log::debug!("intercepting {}", sig.as_str());
        state.capturing.push(sig);
        Ok(())
    }

    /// Returns the exit hook, if one was registered.
    pub fn exit_hook(&self) -> Option<Arc<Hook>> {
        self.state.lock().exit_hook.clone()
    }

    /// Returns the exit hook, registering a default `exit` hook first when
    /// none exists.
    ///
    /// # Errors
    /// [`Error::System`] when intercepting the termination signals failed.
    pub fn ensure_exit_hook(&self) -> Result<Arc<Hook>, Error> {
        let mut state = self.state.lock();
        match &state.exit_hook {
            Some(hook) => Ok(Arc::clone(hook)),
            None => {
                let hook = Arc::new(Hook::new("exit", "Handle program exit"));
                self.set_exit_locked(&mut state, Arc::clone(&hook))?;
                Ok(hook)
            }
        }
    }

    /// Maps `sig` to `hook` and begins intercepting it if it is not already
    /// intercepted.
    ///
    /// # Errors
    /// [`Error::SignalExists`] when `sig` already has a hook,
    /// [`Error::System`] when signal interception failed.
    pub fn set(&self, sig: Signal, hook: Arc<Hook>) -> Result<(), Error> {
        let mut state = self.state.lock();
        self.set_locked(&mut state, sig, hook)
    }

    fn set_locked(&self, state: &mut State, sig: Signal, hook: Arc<Hook>) -> Result<(), Error> {
        if state.hooks.contains_key(&sig) {
            return Err(Error::SignalExists(sig));
        }
        self.capture_locked(state, sig)?;
        state.hooks.insert(sig, hook);
        Ok(())
    }

    /// Returns the hook mapped to `sig`, if any.
    pub fn get(&self, sig: Signal) -> Option<Arc<Hook>> {
        self.state.lock().hooks.get(&sig).cloned()
    }

    /// Returns the hook mapped to `sig`, mapping a default `signal.<NAME>`
    /// hook first when none exists.
    ///
    /// # Errors
    /// [`Error::System`] when intercepting `sig` failed.
    pub fn ensure(&self, sig: Signal) -> Result<Arc<Hook>, Error> {
        let mut state = self.state.lock();
        if let Some(hook) = state.hooks.get(&sig) {
            return Ok(Arc::clone(hook));
        }
        let hook = Arc::new(Hook::new(
            format!("signal.{}", sig.as_str()),
            format!("Handle {} signal", sig.as_str()),
        ));
        self.set_locked(&mut state, sig, Arc::clone(&hook))?;
        Ok(hook)
    }

    /// Blocks dispatching signal events until an exit is requested.
    ///
    /// Each intercepted signal is routed to its hook; a termination signal
    /// additionally drives the exit sequence. The loop itself ends gracefully
    /// when an exit has been requested, returning control to the caller.
    ///
    /// # Errors
    /// [`Error::LoopRunning`] when the loop is already running on another
    /// thread, [`Error::ExitInProgress`] when the exit sequence is already
    /// underway.
    pub fn run(&self) -> Result<(), Error> {
        {
            let mut state = self.state.lock();
            if state.exit_in_progress {
                return Err(Error::ExitInProgress);
            }
            if state.loop_running {
                return Err(Error::LoopRunning);
            }
            state.loop_running = true;
        }
        log::debug!("signal dispatch loop started");

        loop {
            select! {
                recv(self.sig_rx) -> event => match event {
                    Ok(sig) => {
                        self.handle_signal(sig);
                        if self.state.lock().exit_in_progress {
                            break;
                        }
                    }
                    // The watcher is gone; nothing further will arrive.
                    Err(_) => break,
                },
                recv(self.exit_rx) -> _ => break,
            }
        }

        self.state.lock().loop_running = false;
        log::debug!("signal dispatch loop stopped");
        Ok(())
    }

    pub(crate) fn handle_signal(&self, sig: Signal) {
        let mut state = self.state.lock();
        if state.exit_in_progress {
            return;
        }

        let exit = TERMINATION_SIGNALS.contains(&sig);
        let ctx = SignalContext {
            signal: Some(sig),
            exit,
            exit_type: ExitType::Signal,
            exit_code: 0,
        };

        log::debug!("dispatching {}", sig.as_str());
        if let Some(hook) = state.hooks.get(&sig) {
            hook.exec(&ctx);
        }
        if exit {
            self.exit_locked(&mut state, 0, ExitType::Signal, Some(sig));
        }
    }

    /// Manually triggers the exit sequence with `code`.
    ///
    /// Runs the exit hook, releases every intercepted signal and terminates
    /// the process. At most one exit sequence runs per process; later calls
    /// are no-ops.
    pub fn exit(&self, code: i32) {
        let mut state = self.state.lock();
        self.exit_locked(&mut state, code, ExitType::Manual, None);
    }

    fn exit_locked(&self, state: &mut State, code: i32, exit_type: ExitType, sig: Option<Signal>) {
        if state.exit_in_progress {
            return;
        }
        state.exit_in_progress = true;
        // The loop may be busy dispatching, in which case the latch above
        // already covers it; the buffered token covers a parked loop.
        let _ = self.exit_tx.try_send(());
        state.loop_running = false;

        let ctx = SignalContext {
            signal: sig,
            exit: true,
            exit_type,
            exit_code: code,
        };
        if let Some(hook) = &state.exit_hook {
            log::debug!("running exit hook {:?}", hook.name());
            hook.exec(&ctx);
        }

        self.backend.release(&state.capturing);
        state.capturing.clear();
        log::info!("terminating with exit code {}", code);
        self.backend.terminate(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::Function;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingBackend {
        intercepted: Mutex<Vec<Signal>>,
        released: Mutex<Vec<Signal>>,
        exits: Mutex<Vec<i32>>,
    }

    impl Backend for Arc<RecordingBackend> {
        fn intercept(&self, sig: Signal) -> Result<(), Error> {
            self.intercepted.lock().push(sig);
            Ok(())
        }
        fn release(&self, sigs: &[Signal]) {
            self.released.lock().extend_from_slice(sigs);
        }
        fn terminate(&self, code: i32) {
            self.exits.lock().push(code);
        }
    }

    fn test_handler() -> (Arc<RecordingBackend>, Sender<Signal>, Handler) {
        let backend = Arc::new(RecordingBackend::default());
        let (sig_tx, sig_rx) = bounded(1);
        let handler = Handler::with_backend(Arc::new(Arc::clone(&backend)), sig_rx);
        (backend, sig_tx, handler)
    }

    fn last_context() -> (Arc<Mutex<Option<SignalContext>>>, Function) {
        let seen = Arc::new(Mutex::new(None));
        let function = Function::new("record", {
            let seen = Arc::clone(&seen);
            move |ctx: &SignalContext| *seen.lock() = Some(ctx.clone())
        });
        (seen, function)
    }

    #[test]
    fn set_exit_twice_fails() {
        let (backend, _tx, handler) = test_handler();
        handler.set_exit(Arc::new(Hook::new("exit", ""))).unwrap();
        assert!(matches!(
            handler.set_exit(Arc::new(Hook::new("exit", ""))),
            Err(Error::ExitHookExists)
        ));
        assert_eq!(*backend.intercepted.lock(), TERMINATION_SIGNALS);
    }

    #[test]
    fn set_same_signal_twice_fails() {
        let (_backend, _tx, handler) = test_handler();
        handler.set(Signal::SIGUSR1, Arc::new(Hook::new("u", ""))).unwrap();
        assert!(matches!(
            handler.set(Signal::SIGUSR1, Arc::new(Hook::new("u", ""))),
            Err(Error::SignalExists(Signal::SIGUSR1))
        ));
    }

    #[test]
    fn interception_is_not_duplicated() {
        let (backend, _tx, handler) = test_handler();
        handler.set(Signal::SIGINT, Arc::new(Hook::new("int", ""))).unwrap();
        handler.set_exit(Arc::new(Hook::new("exit", ""))).unwrap();
        assert_eq!(
            *backend.intercepted.lock(),
            [Signal::SIGINT, Signal::SIGTERM, Signal::SIGQUIT]
        );
    }

    #[test]
    fn ensure_creates_default_hook_once() {
        let (_backend, _tx, handler) = test_handler();
        assert!(handler.get(Signal::SIGUSR2).is_none());
        let first = handler.ensure(Signal::SIGUSR2).unwrap();
        assert_eq!(first.name(), "signal.SIGUSR2");
        let second = handler.ensure(Signal::SIGUSR2).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &handler.get(Signal::SIGUSR2).unwrap()));
    }

    #[test]
    fn ensure_exit_hook_creates_default_once() {
        let (_backend, _tx, handler) = test_handler();
        assert!(handler.exit_hook().is_none());
        let first = handler.ensure_exit_hook().unwrap();
        assert_eq!(first.name(), "exit");
        let second = handler.ensure_exit_hook().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn termination_signal_runs_hook_then_exit_sequence() {
        let (backend, _tx, handler) = test_handler();

        let (seen_hook, hook_fn) = last_context();
        let int_hook = Hook::new("int", "");
        int_hook.add_function(hook_fn).unwrap();
        handler.set(Signal::SIGINT, Arc::new(int_hook)).unwrap();

        let (seen_exit, exit_fn) = last_context();
        let exit_hook = Hook::new("exit", "");
        exit_hook.add_function(exit_fn).unwrap();
        handler.set_exit(Arc::new(exit_hook)).unwrap();

        handler.handle_signal(Signal::SIGINT);

        let hook_ctx = seen_hook.lock().clone().expect("signal hook did not run");
        assert_eq!(hook_ctx.signal, Some(Signal::SIGINT));
        assert!(hook_ctx.exit);
        assert_eq!(hook_ctx.exit_type, ExitType::Signal);
        assert_eq!(hook_ctx.exit_code, 0);

        let exit_ctx = seen_exit.lock().clone().expect("exit hook did not run");
        assert_eq!(exit_ctx.signal, Some(Signal::SIGINT));
        assert_eq!(exit_ctx.exit_type, ExitType::Signal);
        assert_eq!(exit_ctx.exit_code, 0);

        assert_eq!(*backend.exits.lock(), [0]);
        assert_eq!(*backend.released.lock(), TERMINATION_SIGNALS);
    }

    #[test]
    fn non_termination_signal_does_not_exit() {
        let (backend, _tx, handler) = test_handler();
        let (seen, function) = last_context();
        let hook = Hook::new("usr1", "");
        hook.add_function(function).unwrap();
        handler.set(Signal::SIGUSR1, Arc::new(hook)).unwrap();

        handler.handle_signal(Signal::SIGUSR1);

        let ctx = seen.lock().clone().expect("hook did not run");
        assert_eq!(ctx.signal, Some(Signal::SIGUSR1));
        assert!(!ctx.exit);
        assert!(backend.exits.lock().is_empty());
        assert!(backend.released.lock().is_empty());
    }

    #[test]
    fn exit_sequence_runs_at_most_once() {
        let (backend, _tx, handler) = test_handler();
        let runs = Arc::new(Mutex::new(0));
        let exit_hook = Hook::new("exit", "");
        exit_hook
            .add_function(Function::new("count", {
                let runs = Arc::clone(&runs);
                move |_| *runs.lock() += 1
            }))
            .unwrap();
        handler.set_exit(Arc::new(exit_hook)).unwrap();

        // A termination signal followed by a late signal and a manual exit.
        handler.handle_signal(Signal::SIGTERM);
        handler.handle_signal(Signal::SIGINT);
        handler.exit(1);

        assert_eq!(*runs.lock(), 1);
        assert_eq!(*backend.exits.lock(), [0]);
    }

    #[test]
    fn manual_exit_builds_manual_context() {
        let (backend, _tx, handler) = test_handler();
        let (seen, function) = last_context();
        let exit_hook = Hook::new("exit", "");
        exit_hook.add_function(function).unwrap();
        handler.set_exit(Arc::new(exit_hook)).unwrap();

        handler.exit(3);

        let ctx = seen.lock().clone().expect("exit hook did not run");
        assert_eq!(ctx.signal, None);
        assert!(ctx.exit);
        assert_eq!(ctx.exit_type, ExitType::Manual);
        assert_eq!(ctx.exit_code, 3);
        assert_eq!(*backend.exits.lock(), [3]);
    }

    #[test]
    fn run_dispatches_signals_until_exit() {
        let (backend, sig_tx, handler) = test_handler();
        let (seen, function) = last_context();
        let hook = Hook::new("usr1", "");
        hook.add_function(function).unwrap();
        handler.set(Signal::SIGUSR1, Arc::new(hook)).unwrap();
        handler.set_exit(Arc::new(Hook::new("exit", ""))).unwrap();

        std::thread::scope(|scope| {
            let loop_thread = scope.spawn(|| handler.run());

            sig_tx.send(Signal::SIGUSR1).unwrap();
            while seen.lock().is_none() {
                std::thread::sleep(Duration::from_millis(1));
            }

            // Loop running: a second call must refuse.
            assert!(matches!(handler.run(), Err(Error::LoopRunning)));

            // Termination signal ends the loop through the exit latch.
            sig_tx.send(Signal::SIGTERM).unwrap();
            loop_thread.join().unwrap().unwrap();
        });

        assert_eq!(*backend.exits.lock(), [0]);
        assert!(matches!(handler.run(), Err(Error::ExitInProgress)));
    }

    #[test]
    fn manual_exit_stops_the_loop() {
        let (backend, _sig_tx, handler) = test_handler();

        std::thread::scope(|scope| {
            let loop_thread = scope.spawn(|| handler.run());
            while !handler.state.lock().loop_running {
                std::thread::sleep(Duration::from_millis(1));
            }
            handler.exit(7);
            loop_thread.join().unwrap().unwrap();
        });

        assert_eq!(*backend.exits.lock(), [7]);
    }
}
