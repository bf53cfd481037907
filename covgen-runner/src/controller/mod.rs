// Copyright (c) The covgen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Spawning and supervising the worker process for a coverage run.
//!
//! One run owns one worker process and one connection. The controller binds a loopback endpoint
//! on a kernel-allocated port, spawns the worker with that port in its environment, accepts its
//! connection and sends it the filtered test list. Results are then pulled one at a time through
//! [`WorkerProcessHandle::next_result`], or through the blocking [`ResultStream`].
//!
//! Every path out of a run, successful or not, observes the worker's exit before returning. On
//! failure the worker is terminated first.

mod imp;
mod output;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        #[path = "unix.rs"]
        mod unix;
        use unix as os;
    } else if #[cfg(windows)] {
        #[path = "windows.rs"]
        mod windows;
        use windows as os;
    } else {
        compile_error!("unsupported target platform");
    }
}

pub use imp::*;
