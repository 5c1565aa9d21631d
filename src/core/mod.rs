//! Core building blocks shared by every layer.
//!
//! - [`event`]: synchronous publish/subscribe ([`Subject`], [`EventStream`])
//! - [`constants`]: wire tags, query parameters and default timings
//! - error: the top-level [`Error`]

pub mod constants;
mod error;
pub mod event;

pub use error::{Error, Result};
pub use event::{EventStream, Subject, Subscription};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock `mutex`, recovering the guard if a previous holder panicked.
///
/// No listener or async step ever runs under one of our locks, so the data
/// behind a poisoned mutex is still consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
