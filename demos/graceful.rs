// Copyright (c) 2026 Sighook developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Graceful shutdown with a worker handshake: the exit hook announces the
//! shutdown, then signals the worker and waits for its acknowledgement
//! before the process terminates.

use std::thread;
use std::time::Duration;

use crossbeam_channel::bounded;
use sighook::{Function, Notify};

fn main() -> Result<(), sighook::Error> {
    env_logger::init();

    let handler = sighook::global()?;
    let exit = handler.ensure_exit_hook()?;

    let (stop_tx, stop_rx) = bounded(0);
    let (ack_tx, ack_rx) = bounded(0);
    thread::spawn(move || {
        stop_rx.recv().ok();
        println!("worker: flushing state");
        thread::sleep(Duration::from_millis(200));
        println!("worker: done");
        ack_tx.send(()).ok();
    });

    exit.add_function(
        Function::new("announce", |ctx| println!("shutting down: {:?}", ctx.signal)).order(1),
    )?;
    exit.add_notify(Notify::new("worker", stop_tx).order(2).ack(ack_rx))?;

    println!("Running; hit Ctrl-C to stop.");
    handler.run()
}
