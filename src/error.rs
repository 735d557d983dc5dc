// Copyright (c) 2026 Sighook developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use crate::platform::Signal;
use std::io;

/// Sighook error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A function with this name is already registered on the hook.
    #[error("function with this name is already added to hook: {0:?}")]
    FunctionExists(String),
    /// A notify with this name is already registered on the hook.
    #[error("notify with this name is already added to hook: {0:?}")]
    NotifyExists(String),
    /// The function name is empty.
    #[error("function name is empty")]
    EmptyFunctionName,
    /// The notify name is empty.
    #[error("notify name is empty")]
    EmptyNotifyName,
    /// A hook is already mapped to this signal.
    #[error("hook for signal {} is already added", .0.as_str())]
    SignalExists(Signal),
    /// An exit hook is already registered.
    #[error("hook for program exit is already added")]
    ExitHookExists,
    /// The dispatch loop is already running.
    #[error("signal dispatch loop is already running")]
    LoopRunning,
    /// The exit sequence is already underway.
    #[error("exit sequence is already running")]
    ExitInProgress,
    /// The process-wide signal pipe is already claimed by another handler.
    #[error("signal handler already registered for this process")]
    MultipleHandlers,
    /// Unexpected system error.
    #[error("unexpected system error: {0}")]
    System(#[from] io::Error),
}
