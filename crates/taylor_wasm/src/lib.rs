//! Browser bindings for the Taylor engine.
//!
//! A Web Worker hands every `onmessage` payload to [`handle_message`] and posts
//! the returned object back, listing its `Float64Array` buffers as transferables.

mod protocol;

pub use protocol::{build_taylor, handle_message, request_key};

use std::sync::OnceLock;
use wasm_bindgen::prelude::*;

/// Installs the panic hook and the console logger. Safe to call repeatedly.
#[wasm_bindgen]
pub fn init_logging() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        #[cfg(target_arch = "wasm32")]
        {
            console_error_panic_hook::set_once();
            let _ = wasm_logger::init(wasm_logger::Config::default());
        }
        log::debug!("taylor_wasm logging initialised");
    });
}
