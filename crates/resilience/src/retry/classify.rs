//! Retryable error classification
//!
//! An error is described by a set of identifiers: the rendered message of the
//! error and of every error in its `source()` chain, the errno-style code of
//! any `std::io::Error` in that chain, and [`CircuitOpenError::CODE`] for
//! breaker rejections. A configured identifier matches when it appears in one
//! of them as a whole token, ignoring ASCII case.

use std::error::Error;
use std::io;

use crate::error::CircuitOpenError;
use crate::retry::constants::{DEFAULT_RETRYABLE_ERRORS, DEFAULT_RETRYABLE_PHRASES};

/// Decide whether `error` is worth another attempt
///
/// With an empty `retryable_errors` the default transient-network set
/// applies. A [`CircuitOpenError`] is only retryable when
/// [`CircuitOpenError::CODE`] is listed explicitly.
pub fn is_retryable_error(error: &(dyn Error + 'static), retryable_errors: &[String]) -> bool {
    if is_circuit_open(error) {
        return retryable_errors.iter().any(|id| id.eq_ignore_ascii_case(CircuitOpenError::CODE));
    }

    let identifiers = error_identifiers(error);

    if retryable_errors.is_empty() {
        DEFAULT_RETRYABLE_ERRORS
            .iter()
            .chain(DEFAULT_RETRYABLE_PHRASES)
            .any(|needle| matches_any(&identifiers, needle))
    } else {
        retryable_errors.iter().any(|needle| matches_any(&identifiers, needle))
    }
}

/// Errno-style code for an I/O error kind, where one exists
pub fn io_error_code(kind: io::ErrorKind) -> Option<&'static str> {
    let code = match kind {
        io::ErrorKind::ConnectionRefused => "ECONNREFUSED",
        io::ErrorKind::ConnectionReset => "ECONNRESET",
        io::ErrorKind::ConnectionAborted => "ECONNABORTED",
        io::ErrorKind::NotConnected => "ENOTCONN",
        io::ErrorKind::AddrInUse => "EADDRINUSE",
        io::ErrorKind::AddrNotAvailable => "EADDRNOTAVAIL",
        io::ErrorKind::BrokenPipe => "EPIPE",
        io::ErrorKind::TimedOut => "ETIMEDOUT",
        io::ErrorKind::WouldBlock => "EAGAIN",
        io::ErrorKind::Interrupted => "EINTR",
        io::ErrorKind::NotFound => "ENOENT",
        io::ErrorKind::PermissionDenied => "EACCES",
        _ => return None,
    };
    Some(code)
}

fn is_circuit_open(error: &(dyn Error + 'static)) -> bool {
    chain(error).any(|e| e.downcast_ref::<CircuitOpenError>().is_some())
}

fn chain<'a>(error: &'a (dyn Error + 'static)) -> impl Iterator<Item = &'a (dyn Error + 'static)> {
    std::iter::successors(Some(error), |&e| e.source())
}

fn error_identifiers(error: &(dyn Error + 'static)) -> Vec<String> {
    let mut identifiers = Vec::new();
    for e in chain(error) {
        identifiers.push(e.to_string().to_ascii_lowercase());
        if let Some(code) = e.downcast_ref::<io::Error>().and_then(|io| io_error_code(io.kind())) {
            identifiers.push(code.to_ascii_lowercase());
        }
    }
    identifiers
}

fn matches_any(identifiers: &[String], needle: &str) -> bool {
    let needle = needle.trim().to_ascii_lowercase();
    !needle.is_empty() && identifiers.iter().any(|haystack| contains_token(haystack, &needle))
}

/// Substring match that refuses to split a word or a number
fn contains_token(haystack: &str, needle: &str) -> bool {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';

    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = haystack[..start].chars().next_back().map_or(true, |c| !is_word(c));
        let after_ok = haystack[end..].chars().next().map_or(true, |c| !is_word(c));
        before_ok && after_ok
    })
}
