//! Panic Handler
//!
//! HARDENING: Controlled panic handling for production safety.
//!
//! - Every panic is logged through `tracing` before anything else happens
//! - Optionally appended to a crash log file
//! - A slot accounting violation aborts the process: admission limits can no
//!   longer be trusted, and unwinding only the current task would hide that

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::panic::{self, PanicHookInfo};
use std::path::{Path, PathBuf};

use tracing::error;

use crate::throttle::ACCOUNTING_VIOLATION;

/// Install the process panic hook. The previous hook still runs afterwards.
pub fn init_panic_handler(crash_log: Option<PathBuf>) {
    let previous = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        let message = panic_message(info);
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "<unknown>".to_string());

        error!(%location, %message, "panic");

        if let Some(path) = crash_log.as_ref() {
            if let Err(e) = write_crash_log(path, &format_crash_entry(&location, &message)) {
                error!(path = %path.display(), error = %e, "failed to write crash log");
            }
        }

        previous(info);

        if is_accounting_violation(&message) {
            std::process::abort();
        }
    }));
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    if let Some(s) = info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "<unknown panic payload>".to_string()
    }
}

fn is_accounting_violation(message: &str) -> bool {
    message.starts_with(ACCOUNTING_VIOLATION)
}

fn format_crash_entry(location: &str, message: &str) -> String {
    let mut msg = String::new();
    msg.push_str(&format!("Location: {}\n", location));
    msg.push_str(&format!("Message: {}\n", message));

    let backtrace = std::backtrace::Backtrace::capture();
    match backtrace.status() {
        std::backtrace::BacktraceStatus::Captured => {
            msg.push_str(&format!("\nBacktrace:\n{}", backtrace));
        }
        _ => {
            msg.push_str("\nBacktrace: <not captured, set RUST_BACKTRACE=1>\n");
        }
    }

    msg
}

fn write_crash_log(path: &Path, message: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    writeln!(file, "\n{}", "=".repeat(80))?;
    writeln!(file, "{}", message)?;
    file.sync_all()?;

    Ok(())
}
