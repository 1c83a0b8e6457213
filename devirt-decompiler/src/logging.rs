/*

Logging
=======

Copyright (c) 2020 Dannii Willis
MIT licenced
https://github.com/curiousdannii/ifvms.js

*/

use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

// Diagnostics sink handed to each analysis stage
// Messages are advisory only, nothing reads them back
pub trait Logger {
    fn log(&self, severity: Severity, message: fmt::Arguments<'_>);

    fn debug(&self, message: fmt::Arguments<'_>) {
        self.log(Severity::Debug, message);
    }

    fn info(&self, message: fmt::Arguments<'_>) {
        self.log(Severity::Info, message);
    }

    fn warning(&self, message: fmt::Arguments<'_>) {
        self.log(Severity::Warning, message);
    }

    fn error(&self, message: fmt::Arguments<'_>) {
        self.log(Severity::Error, message);
    }
}

// The default: drop everything
#[derive(Copy, Clone, Debug, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _severity: Severity, _message: fmt::Arguments<'_>) {}
}

// Forward to whatever tracing subscriber the embedder installed
#[derive(Copy, Clone, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, severity: Severity, message: fmt::Arguments<'_>) {
        match severity {
            Severity::Debug => tracing::debug!("{}", message),
            Severity::Info => tracing::info!("{}", message),
            Severity::Warning => tracing::warn!("{}", message),
            Severity::Error => tracing::error!("{}", message),
        }
    }
}
