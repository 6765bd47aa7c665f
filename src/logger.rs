//! Leveled logging facade.
//!
//! The engine logs through a small eight-level interface rather than a
//! concrete backend, so embedding applications can route engine output
//! into whatever logging stack they already run. The default backend
//! forwards everything to `tracing` events tagged with the facade level.
//!
//! Levels in ascending severity: finest, fine, debug, trace, info, warn,
//! error, critical. The three highest return a `Result` so backends that
//! can fail (network sinks, files) have a way to report it.

use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use thiserror::Error;

/// Error surfaced by a logging backend.
#[derive(Debug, Error)]
#[error("logger backend failure: {0}")]
pub struct LogError(pub String);

/// Backend interface for the logging facade.
///
/// Implementations must be safe for concurrent calls; one instance is
/// shared by every task in the process.
pub trait Logger: Send + Sync {
    fn finest(&self, args: fmt::Arguments<'_>);
    fn fine(&self, args: fmt::Arguments<'_>);
    fn debug(&self, args: fmt::Arguments<'_>);
    fn trace(&self, args: fmt::Arguments<'_>);
    fn info(&self, args: fmt::Arguments<'_>);
    fn warn(&self, args: fmt::Arguments<'_>) -> Result<(), LogError>;
    fn error(&self, args: fmt::Arguments<'_>) -> Result<(), LogError>;
    fn critical(&self, args: fmt::Arguments<'_>) -> Result<(), LogError>;
}

/// Default backend: forwards facade records to `tracing`.
///
/// The eight facade levels are folded onto tracing's five; the original
/// level travels along as a four-letter `tag` field.
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn finest(&self, args: fmt::Arguments<'_>) {
        tracing::trace!(tag = "FNST", "{}", args);
    }

    fn fine(&self, args: fmt::Arguments<'_>) {
        tracing::trace!(tag = "FINE", "{}", args);
    }

    fn debug(&self, args: fmt::Arguments<'_>) {
        tracing::debug!(tag = "DEBG", "{}", args);
    }

    fn trace(&self, args: fmt::Arguments<'_>) {
        tracing::debug!(tag = "TRAC", "{}", args);
    }

    fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!(tag = "INFO", "{}", args);
    }

    fn warn(&self, args: fmt::Arguments<'_>) -> Result<(), LogError> {
        tracing::warn!(tag = "WARN", "{}", args);
        Ok(())
    }

    fn error(&self, args: fmt::Arguments<'_>) -> Result<(), LogError> {
        tracing::error!(tag = "EROR", "{}", args);
        Ok(())
    }

    fn critical(&self, args: fmt::Arguments<'_>) -> Result<(), LogError> {
        tracing::error!(tag = "CRIT", "{}", args);
        Ok(())
    }
}

static LOGGER: OnceLock<RwLock<Arc<dyn Logger>>> = OnceLock::new();

fn slot() -> &'static RwLock<Arc<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Arc::new(TracingLogger)))
}

fn current() -> Arc<dyn Logger> {
    match slot().read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Replaces the process-wide logging backend.
pub fn set_logger(logger: Arc<dyn Logger>) {
    match slot().write() {
        Ok(mut guard) => *guard = logger,
        Err(poisoned) => *poisoned.into_inner() = logger,
    }
}

pub fn finest(args: fmt::Arguments<'_>) {
    current().finest(args);
}

pub fn fine(args: fmt::Arguments<'_>) {
    current().fine(args);
}

pub fn debug(args: fmt::Arguments<'_>) {
    current().debug(args);
}

pub fn trace(args: fmt::Arguments<'_>) {
    current().trace(args);
}

pub fn info(args: fmt::Arguments<'_>) {
    current().info(args);
}

pub fn warn(args: fmt::Arguments<'_>) -> Result<(), LogError> {
    current().warn(args)
}

pub fn error(args: fmt::Arguments<'_>) -> Result<(), LogError> {
    current().error(args)
}

pub fn critical(args: fmt::Arguments<'_>) -> Result<(), LogError> {
    current().critical(args)
}

#[macro_export]
macro_rules! finest {
    ($($arg:tt)*) => { $crate::logger::finest(format_args!($($arg)*)) };
}

#[macro_export]
macro_rules! fine {
    ($($arg:tt)*) => { $crate::logger::fine(format_args!($($arg)*)) };
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::logger::debug(format_args!($($arg)*)) };
}

#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::logger::trace(format_args!($($arg)*)) };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::logger::info(format_args!($($arg)*)) };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { { let _ = $crate::logger::warn(format_args!($($arg)*)); } };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { { let _ = $crate::logger::error(format_args!($($arg)*)); } };
}

#[macro_export]
macro_rules! critical {
    ($($arg:tt)*) => { { let _ = $crate::logger::critical(format_args!($($arg)*)); } };
}
