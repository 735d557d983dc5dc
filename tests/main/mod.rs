// Copyright (c) 2026 Sighook developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

// Real-signal tests. The default test harness runs tests on worker threads,
// which does not mix with process-wide signal dispositions, so this target
// runs with `harness = false` and drives everything from main.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;
use nix::sys::signal::raise;
use sighook::{Error, ExitType, Function, Handler, Notify, Signal};

macro_rules! run_tests {
    ( $($test_fn:ident),* ) => {
        $(
            print!("test main::{} ... ", stringify!($test_fn));
            $test_fn();
            println!("ok");
        )*
    }
}

fn test_single_global_handler() {
    let first = sighook::global().unwrap();
    let second = sighook::global().unwrap();
    assert!(std::ptr::eq(first, second));

    // The global instance holds the process-wide signal pipe.
    assert!(matches!(Handler::new(), Err(Error::MultipleHandlers)));
}

static USR1_CALLS: AtomicUsize = AtomicUsize::new(0);

fn test_signal_dispatch() {
    let handler = sighook::global().unwrap();

    let hook = handler.ensure(Signal::SIGUSR1).unwrap();
    hook.add_function(Function::new("count", |_| {
        USR1_CALLS.fetch_add(1, Ordering::SeqCst);
    }))
    .unwrap();
    let (tx, rx) = bounded(1);
    hook.add_notify(Notify::new("observer", tx).non_blocking())
        .unwrap();

    thread::spawn(|| {
        let _ = sighook::global().unwrap().run();
    });

    raise(Signal::SIGUSR1).unwrap();
    rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(USR1_CALLS.load(Ordering::SeqCst), 1);
}

// Raises SIGTERM and lets the dispatch loop drive the real exit sequence;
// the exit hook's final println doubles as this test's "ok". Does not return
// on success: the exit sequence terminates the process with code 0.
fn test_termination() {
    let handler = sighook::global().unwrap();

    let exit_hook = handler.ensure_exit_hook().unwrap();
    exit_hook
        .add_function(Function::new("verify", |ctx| {
            assert!(ctx.exit);
            assert_eq!(ctx.exit_type, ExitType::Signal);
            assert_eq!(ctx.exit_code, 0);
            assert_eq!(ctx.signal, Some(Signal::SIGTERM));
            println!("ok");
        }))
        .unwrap();

    print!("test main::test_termination ... ");
    raise(Signal::SIGTERM).unwrap();

    thread::sleep(Duration::from_secs(10));
    eprintln!("exit sequence did not terminate the process");
    std::process::exit(1);
}

fn main() {
    let _ = env_logger::try_init();

    run_tests!(test_single_global_handler, test_signal_dispatch);
    test_termination();
}
