//! FFI bindings for packdiag
//!
//! This module provides C-compatible functions so a host application (for
//! example a dashboard that handles the file upload) can run an analysis.
//! All functions use C strings (null-terminated) and return allocated memory
//! that must be freed by the caller using `packdiag_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::AnalysisConfig;
use crate::pipeline::PackAnalyzer;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
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

/// Analyse a pack log and return the JSON report.
///
/// # Safety
/// - `csv` must be a valid null-terminated C string.
/// - `config_toml` may be NULL (defaults) or a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `packdiag_free_string`.
/// - Returns NULL on error; call `packdiag_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn packdiag_analyze_csv(
    csv: *const c_char,
    config_toml: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let csv_str = match cstr_to_string(csv) {
        Some(s) => s,
        None => {
            set_last_error("Invalid CSV string pointer");
            return ptr::null_mut();
        }
    };

    let config = if config_toml.is_null() {
        AnalysisConfig::default()
    } else {
        let toml_str = match cstr_to_string(config_toml) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match AnalysisConfig::from_toml_str(&toml_str) {
            Ok(c) => c,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let analyzer = match PackAnalyzer::with_config(config) {
        Ok(a) => a,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match analyzer.analyze_to_json(&csv_str, "ffi") {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a string returned by packdiag.
///
/// # Safety
/// - `ptr` must be a pointer returned by a packdiag function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn packdiag_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local string, valid until the next packdiag call
///   on this thread. Do NOT free it.
/// - Returns NULL if there was no error.
#[no_mangle]
pub unsafe extern "C" fn packdiag_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match e.borrow().as_ref() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the packdiag version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free it.
#[no_mangle]
pub unsafe extern "C" fn packdiag_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
