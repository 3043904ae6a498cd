//! FFI bindings for Locus
//!
//! This module provides C-compatible functions for calling the engine from other
//! languages. All functions use C strings (null-terminated) and return allocated
//! memory that must be freed by the caller using `locus_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::{DateTime, Utc};

use crate::config::AnalysisConfig;
use crate::normalizer::parse_timestamp;
use crate::pipeline::LocationAnalyzer;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Reference instant from an optional ISO-8601 string; NULL means "now"
unsafe fn reference_now(now: *const c_char) -> Result<DateTime<Utc>, String> {
    if now.is_null() {
        return Ok(Utc::now());
    }
    let text = cstr_to_string(now).ok_or_else(|| "Invalid reference time pointer".to_string())?;
    parse_timestamp(&text).ok_or_else(|| format!("Invalid reference time: {text}"))
}

unsafe fn run(analyzer: &LocationAnalyzer, json: *const c_char, now: *const c_char) -> *mut c_char {
    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let now = match reference_now(now) {
        Ok(now) => now,
        Err(msg) => {
            set_last_error(&msg);
            return ptr::null_mut();
        }
    };

    let outcome = match analyzer.analyze_json(&json_str, now) {
        Ok(outcome) => outcome,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match outcome.to_json() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Analyze a JSON array of events with the default parameters.
///
/// The returned JSON is either the analysis report or an `{"error": ...}` object
/// (empty batch, invalid records, internal failure).
///
/// # Safety
/// - `json` must be a valid null-terminated C string.
/// - `now` must be NULL (use the current time) or a valid null-terminated ISO-8601 string.
/// - Returns a newly allocated string that must be freed with `locus_free_string`.
/// - Returns NULL if the input is not a JSON array; call `locus_last_error` for details.
#[no_mangle]
pub unsafe extern "C" fn locus_analyze(json: *const c_char, now: *const c_char) -> *mut c_char {
    clear_last_error();
    run(&LocationAnalyzer::new(), json, now)
}

// ============================================================================
// Configured API
// ============================================================================

/// Create an analyzer from a JSON configuration (NULL for defaults).
///
/// # Safety
/// - `config_json` must be NULL or a valid null-terminated C string.
/// - Returns a pointer that must be freed with `locus_analyzer_free`.
/// - Returns NULL on error; call `locus_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn locus_analyzer_new(config_json: *const c_char) -> *mut LocationAnalyzer {
    clear_last_error();

    let config = if config_json.is_null() {
        AnalysisConfig::default()
    } else {
        let Some(text) = cstr_to_string(config_json) else {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        };
        match AnalysisConfig::from_json(&text) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    match LocationAnalyzer::with_config(config) {
        Ok(analyzer) => Box::into_raw(Box::new(analyzer)),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an analyzer.
///
/// # Safety
/// - `analyzer` must be a pointer returned by `locus_analyzer_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn locus_analyzer_free(analyzer: *mut LocationAnalyzer) {
    if !analyzer.is_null() {
        drop(Box::from_raw(analyzer));
    }
}

/// Analyze a JSON array of events with a configured analyzer.
///
/// # Safety
/// - `analyzer` must be a valid pointer returned by `locus_analyzer_new`.
/// - `json` and `now` follow the rules of `locus_analyze`.
/// - Returns a newly allocated string that must be freed with `locus_free_string`.
#[no_mangle]
pub unsafe extern "C" fn locus_analyzer_analyze(
    analyzer: *const LocationAnalyzer,
    json: *const c_char,
    now: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if analyzer.is_null() {
        set_last_error("Null analyzer pointer");
        return ptr::null_mut();
    }

    run(&*analyzer, json, now)
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by any Locus function.
///
/// # Safety
/// - `ptr` must be a pointer returned by a Locus function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn locus_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local string; do not free it.
/// - The pointer is valid until the next Locus call on the same thread.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn locus_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Locus version string.
///
/// # Safety
/// - Returns a pointer to a static string; do not free it.
#[no_mangle]
pub unsafe extern "C" fn locus_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
