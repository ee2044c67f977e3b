//! Logging facilities.
//!
//! Messages logged via the macros of this module are prefixed with the current simulation time,
//! the colored log level and the name of the component. The component name is also used as the
//! log target, so the output can be filtered per component, e.g. `RUST_LOG=ap0-wifi=trace`.

use atty::Stream;
use colored::{Color, ColoredString, Colorize};
use log::error;
use serde_json::json;
use serde_type_name::type_name;

use crate::event::Event;

/// Applies the color to the string if stderr (log) goes to console.
pub fn get_colored(s: &str, color: Color) -> ColoredString {
    if atty::is(Stream::Stderr) {
        s.color(color)
    } else {
        s.normal()
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_with_ctx {
    ($level:ident, $label:expr, $color:ident, $ctx:expr, $($arg:tt)+) => (
        log::$level!(
            target: $ctx.name(),
            "[{:.6} {} {}] {}",
            $ctx.time(),
            $crate::log::get_colored($label, $crate::colored::Color::$color),
            $ctx.name(),
            format_args!($($arg)+)
        )
    );
}

/// Logs a message at the info level.
///
/// The first argument is anything with `name()` and `time()` methods, normally a
/// [`SimulationContext`](crate::SimulationContext). The rest follows the `format!` syntax.
///
/// # Examples
///
/// ```rust
/// use std::io::Write;
///
/// use env_logger::Builder;
/// use wnsim_core::{log_info, Simulation};
///
/// Builder::from_default_env()
///     .format(|buf, record| writeln!(buf, "{}", record.args()))
///     .init();
///
/// let mut sim = Simulation::new(7);
/// let ctx = sim.create_context("sta0");
/// log_info!(ctx, "associated with {}", "ap0");
/// ```
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_ctx!(info, " INFO", Green, $ctx, $($arg)+));
}

/// Logs a message at the debug level.
///
/// See [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_ctx!(debug, "DEBUG", Blue, $ctx, $($arg)+));
}

/// Logs a message at the trace level.
///
/// See [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_trace {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_ctx!(trace, "TRACE", Cyan, $ctx, $($arg)+));
}

/// Logs a message at the warn level.
///
/// See [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_ctx!(warn, " WARN", Yellow, $ctx, $($arg)+));
}

/// Logs a message at the error level.
///
/// See [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $($arg:tt)+) => ($crate::__log_with_ctx!(error, "ERROR", Red, $ctx, $($arg)+));
}

fn log_event_problem(event: &Event, problem: &str) {
    error!(
        target: "simulation",
        "[{:.6} {} simulation] {}: {}",
        event.time,
        get_colored("ERROR", Color::Red),
        problem,
        json!({
            "type": type_name(&event.data).unwrap_or("?"),
            "data": event.data,
            "src": event.src,
            "dst": event.dst,
        })
    );
}

/// Logs an event which was not matched by any arm of [`cast!`](crate::cast!).
pub fn log_unhandled_event(event: Event) {
    log_event_problem(&event, "Unhandled event");
}

/// Logs an event destined to a component without registered handler.
pub(crate) fn log_undelivered_event(event: Event) {
    log_event_problem(&event, "Undelivered event");
}

/// Logs an event rejected by the scheduler.
pub(crate) fn log_incorrect_event(event: &Event, reason: &str) {
    log_event_problem(event, &format!("Incorrect event ({})", reason));
}
