// Copyright (c) 2026 Sighook developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Signal interception through `sigaction(2)` and a self-pipe.
//!
//! The installed OS handler writes the raw signal number into a non-blocking
//! pipe; a dedicated watcher thread drains the pipe and forwards decoded
//! signals into the handler's event queue. The pipe and the watcher are a
//! process-global resource claimed exactly once.

use std::fs::File;
use std::io::Read;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread;

use crossbeam_channel::Sender;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet};
use nix::unistd;
use parking_lot::Mutex;

use crate::error::Error;

/// Platform signal type.
pub type Signal = nix::sys::signal::Signal;

static CLAIMED: AtomicBool = AtomicBool::new(false);
static CLAIM_LOCK: Mutex<()> = Mutex::new(());
// Write end of the self-pipe; -1 until the pipe is claimed.
static PIPE_WRITE: AtomicI32 = AtomicI32::new(-1);

extern "C" fn os_handler(signum: nix::libc::c_int) {
    let fd = PIPE_WRITE.load(Ordering::Relaxed);
    if fd < 0 {
        return;
    }
    let buf = signum.to_le_bytes();
    // Assuming this always succeeds. Can't really handle errors in any
    // meaningful way.
    let fd = unsafe { BorrowedFd::borrow_raw(fd) };
    let _ = unistd::write(fd, &buf);
}

fn sys(e: nix::errno::Errno) -> Error {
    Error::System(e.into())
}

// pipe2(2) is missing on several unices; fcntl(2) sets the flags instead.
fn new_pipe() -> Result<(File, RawFd), Error> {
    let (read, write) = unistd::pipe().map_err(sys)?;
    set_pipe_flags(&read, &write)?;
    Ok((File::from(read), write.into_raw_fd()))
}

fn set_pipe_flags(read: &OwnedFd, write: &OwnedFd) -> Result<(), Error> {
    use nix::libc::{fcntl, FD_CLOEXEC, F_SETFD, F_SETFL, O_NONBLOCK};

    // The os handler must never block on a full pipe.
    unsafe {
        if fcntl(read.as_raw_fd(), F_SETFD, FD_CLOEXEC) < 0
            || fcntl(write.as_raw_fd(), F_SETFD, FD_CLOEXEC) < 0
            || fcntl(write.as_raw_fd(), F_SETFL, O_NONBLOCK) < 0
        {
            return Err(sys(nix::errno::Errno::last()));
        }
    }
    Ok(())
}

/// Claims the process-global self-pipe and starts the watcher thread that
/// forwards decoded signals into `tx`.
///
/// Only the first claim per process succeeds.
pub(crate) fn claim(tx: Sender<Signal>) -> Result<(), Error> {
    if CLAIMED.load(Ordering::Acquire) {
        return Err(Error::MultipleHandlers);
    }
    let _guard = CLAIM_LOCK.lock();
    if CLAIMED.load(Ordering::Relaxed) {
        return Err(Error::MultipleHandlers);
    }

    let (reader, write_fd) = new_pipe()?;
    PIPE_WRITE.store(write_fd, Ordering::SeqCst);

    let spawned = thread::Builder::new()
        .name("sighook-signals".into())
        .spawn(move || watch(reader, tx));
    if let Err(e) = spawned {
        PIPE_WRITE.store(-1, Ordering::SeqCst);
        drop(unsafe { OwnedFd::from_raw_fd(write_fd) });
        return Err(Error::System(e));
    }

    CLAIMED.store(true, Ordering::Release);
    Ok(())
}

fn watch(mut pipe: File, tx: Sender<Signal>) {
    let mut buf = [0u8; 4];
    loop {
        // read_exact retries interrupted reads on its own.
        if let Err(e) = pipe.read_exact(&mut buf) {
            log::error!("signal pipe read failed: {}", e);
            return;
        }
        let signum = i32::from_le_bytes(buf);
        match Signal::try_from(signum) {
            Ok(sig) => {
                // The event queue holds one pending signal, like the kernel's
                // own pending set for standard signals; drop the rest.
                if tx.try_send(sig).is_err() {
                    log::debug!("dropping {} event, queue is full or handler is gone", sig.as_str());
                }
            }
            Err(_) => log::warn!("ignoring unknown signal number {} on pipe", signum),
        }
    }
}

/// Installs the forwarding OS handler for `sig`.
pub(crate) fn intercept(sig: Signal) -> Result<(), Error> {
    let action = SigAction::new(
        SigHandler::Handler(os_handler),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe { signal::sigaction(sig, &action) }.map_err(sys)?;
    Ok(())
}

/// Restores the default disposition for every signal in `sigs`.
pub(crate) fn release(sigs: &[Signal]) {
    let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for sig in sigs {
        // There isn't much to do if this fails; the process is on its way out.
        let _ = unsafe { signal::sigaction(*sig, &action) };
    }
}
