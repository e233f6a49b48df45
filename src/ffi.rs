//! C ABI — lets host tools (MMD plugins, editors) drive [`LipSyncPipeline`].
//!
//! Functions are `#[no_mangle] extern "C"`; link `libkuchipaku.a` and declare
//! them in a header.
//!
//! ## Memory contract
//!
//! | Function                           | Caller frees with            |
//! |------------------------------------|------------------------------|
//! | [`kuchipaku_pipeline_new`]         | [`kuchipaku_pipeline_free`]  |
//! | [`kuchipaku_text_to_reading`]      | [`kuchipaku_free_string`]    |
//! | [`kuchipaku_write_motion_file`]    | [`kuchipaku_free_error`]     |

use std::ffi::{c_char, CStr, CString};
use std::path::Path;

use crate::{config::LipSyncConfig, pipeline::LipSyncPipeline};

// ─────────────────────────────────────────────────────────────────────────────

/// Opaque handle to a configured pipeline.
pub struct KuchipakuHandle {
    pipeline: LipSyncPipeline,
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Copy a C string into an owned `String` (lossy UTF-8).  `None` for null.
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Heap-allocate an owned C string.  Returns null on interior nul bytes.
fn to_c_str(s: &str) -> *const c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => std::ptr::null(),
    }
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Build a pipeline.
///
/// @param config_json_path  UTF-8 path to a JSON configuration file, or
///                          `NULL` for the defaults.
/// @return                  Opaque handle, or `NULL` on failure (logged).
///                          Free with [`kuchipaku_pipeline_free`].
#[no_mangle]
pub unsafe extern "C" fn kuchipaku_pipeline_new(
    config_json_path: *const c_char,
) -> *mut KuchipakuHandle {
    let config = match unsafe { cstr_to_string(config_json_path) } {
        None => Ok(LipSyncConfig::default()),
        Some(path) => LipSyncConfig::load(Path::new(&path)),
    };

    match config.and_then(|c| Ok(LipSyncPipeline::new(c)?)) {
        Ok(pipeline) => Box::into_raw(Box::new(KuchipakuHandle { pipeline })),
        Err(e) => {
            log::error!("kuchipaku_pipeline_new: {e:#}");
            std::ptr::null_mut()
        }
    }
}

/// Katakana reading of `text`.
///
/// @param handle  Handle from [`kuchipaku_pipeline_new`].
/// @param text    UTF-8 input text.
/// @return        Heap-allocated UTF-8 string, or `NULL` on a null argument.
///                Free with [`kuchipaku_free_string`].
#[no_mangle]
pub unsafe extern "C" fn kuchipaku_text_to_reading(
    handle: *const KuchipakuHandle,
    text: *const c_char,
) -> *const c_char {
    if handle.is_null() {
        return std::ptr::null();
    }
    let Some(text) = (unsafe { cstr_to_string(text) }) else {
        return std::ptr::null();
    };
    let h = unsafe { &*handle };
    to_c_str(&h.pipeline.reading(&text))
}

/// Convert `text` and write a motion file.
///
/// The format follows the extension of `output_path` (`.vmd` or `.mvd`).
/// An existing file is only replaced once the new one is complete.
///
/// @param handle       Handle from [`kuchipaku_pipeline_new`].
/// @param text         UTF-8 input text.
/// @param output_path  Writable path ending in `.vmd` or `.mvd`.
/// @return             `NULL` on success; on failure a heap-allocated UTF-8
///                     error message to release with [`kuchipaku_free_error`].
#[no_mangle]
pub unsafe extern "C" fn kuchipaku_write_motion_file(
    handle: *const KuchipakuHandle,
    text: *const c_char,
    output_path: *const c_char,
) -> *const c_char {
    if handle.is_null() {
        return to_c_str("null pipeline handle");
    }
    let (Some(text), Some(out)) =
        (unsafe { cstr_to_string(text) }, unsafe { cstr_to_string(output_path) })
    else {
        return to_c_str("null argument (text or output_path)");
    };

    let h = unsafe { &*handle };
    match h.pipeline.write_to_file(&text, Path::new(&out), None) {
        Ok(_) => std::ptr::null(),
        Err(e) => to_c_str(&format!("{e:#}")),
    }
}

/// Free a string returned by [`kuchipaku_text_to_reading`].
#[no_mangle]
pub unsafe extern "C" fn kuchipaku_free_string(s: *const c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s as *mut c_char) });
    }
}

/// Free an error string returned by [`kuchipaku_write_motion_file`].
#[no_mangle]
pub unsafe extern "C" fn kuchipaku_free_error(s: *const c_char) {
    unsafe { kuchipaku_free_string(s) };
}

/// Destroy a pipeline handle.
#[no_mangle]
pub unsafe extern "C" fn kuchipaku_pipeline_free(handle: *mut KuchipakuHandle) {
    if !handle.is_null() {
        drop(unsafe { Box::from_raw(handle) });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    #[test]
    fn test_reading_round_trip() {
        unsafe {
            let h = kuchipaku_pipeline_new(std::ptr::null());
            assert!(!h.is_null());

            let text = c("ひらがな");
            let reading = kuchipaku_text_to_reading(h, text.as_ptr());
            assert_eq!(CStr::from_ptr(reading).to_str().unwrap(), "ヒラガナ");
            kuchipaku_free_string(reading);

            assert!(kuchipaku_text_to_reading(h, std::ptr::null()).is_null());
            kuchipaku_pipeline_free(h);
        }
    }

    #[test]
    fn test_write_motion_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mvd");
        unsafe {
            let h = kuchipaku_pipeline_new(std::ptr::null());
            let text = c("あいうえお");
            let out = c(path.to_str().unwrap());
            let err = kuchipaku_write_motion_file(h, text.as_ptr(), out.as_ptr());
            assert!(err.is_null());

            let bad = c("/nonexistent-dir/out.vmd");
            let err = kuchipaku_write_motion_file(h, text.as_ptr(), bad.as_ptr());
            assert!(!err.is_null());
            kuchipaku_free_error(err);

            let err = kuchipaku_write_motion_file(std::ptr::null(), text.as_ptr(), out.as_ptr());
            assert_eq!(CStr::from_ptr(err).to_str().unwrap(), "null pipeline handle");
            kuchipaku_free_error(err);

            kuchipaku_pipeline_free(h);
        }
        assert!(crate::mvd::parse_morphs(&std::fs::read(&path).unwrap()).is_ok());
    }

    #[test]
    fn test_bad_config_path_returns_null() {
        let path = c("/nonexistent/kuchipaku.json");
        unsafe {
            assert!(kuchipaku_pipeline_new(path.as_ptr()).is_null());
            kuchipaku_pipeline_free(std::ptr::null_mut());
        }
    }
}
