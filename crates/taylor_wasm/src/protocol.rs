use anyhow::anyhow;
use js_sys::{Float64Array, Object, Reflect};
use serde::de::DeserializeOwned;
use serde_wasm_bindgen::from_value;
use taylor_core::equation_engine::NativeEngine;
use taylor_core::worker::{
    self, run_build, BuildRequest, BuildResult, EngineSettings, InboundMessage, OutboundMessage,
};
use wasm_bindgen::prelude::*;

/// Handles one worker message. `build` messages yield a `result` or `error`
/// object; any other message yields `undefined`.
///
/// `settings` is an optional `{ simplify }` object.
#[wasm_bindgen]
pub fn handle_message(message: JsValue, settings: JsValue) -> JsValue {
    crate::init_logging();
    if message_type(&message).as_deref() != Some("build") {
        log::trace!("ignoring non-build message");
        return JsValue::UNDEFINED;
    }
    let outbound = match decode_build(message, settings) {
        Ok((inbound, settings)) => worker::handle_message(&NativeEngine, inbound, &settings),
        Err(err) => OutboundMessage::Error {
            message: err.to_string(),
        },
    };
    match outbound {
        OutboundMessage::Result(result) => {
            result_object(result).unwrap_or_else(|err| error_object(&js_error_text(err)))
        }
        OutboundMessage::Error { message } => error_object(&message),
    }
}

/// Runs a build directly, without the message envelope.
#[wasm_bindgen]
pub fn build_taylor(
    expression: String,
    x0: f64,
    n: u32,
    left: f64,
    right: f64,
    count: u32,
    settings: JsValue,
) -> Result<JsValue, JsValue> {
    crate::init_logging();
    let request = BuildRequest {
        expression,
        x0,
        n: n as usize,
        left,
        right,
        count: count as usize,
    };
    let settings = engine_settings(settings).map_err(|e| JsValue::from_str(&e.to_string()))?;
    let result = run_build(&NativeEngine, &request, &settings, None)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    result_object(result)
}

/// Dedup key of a request, for callers that debounce on the JavaScript side.
#[wasm_bindgen]
pub fn request_key(expression: String, x0: f64, n: u32, left: f64, right: f64, count: u32) -> String {
    BuildRequest {
        expression,
        x0,
        n: n as usize,
        left,
        right,
        count: count as usize,
    }
    .key()
}

fn message_type(message: &JsValue) -> Option<String> {
    if !message.is_object() {
        return None;
    }
    Reflect::get(message, &JsValue::from_str("type"))
        .ok()
        .and_then(|value| value.as_string())
}

fn decode_build(
    message: JsValue,
    settings: JsValue,
) -> anyhow::Result<(InboundMessage, EngineSettings)> {
    let inbound = decode(message, "build message")?;
    Ok((inbound, engine_settings(settings)?))
}

fn engine_settings(value: JsValue) -> anyhow::Result<EngineSettings> {
    if value.is_undefined() || value.is_null() {
        return Ok(EngineSettings::default());
    }
    decode(value, "settings")
}

fn decode<T: DeserializeOwned>(value: JsValue, what: &str) -> anyhow::Result<T> {
    from_value(value).map_err(|e| anyhow!("Invalid {what}: {e}"))
}

fn set(target: &Object, key: &str, value: &JsValue) -> Result<(), JsValue> {
    Reflect::set(target, &JsValue::from_str(key), value).map(|_| ())
}

/// `{ type: "result", coeffs, xs, yf, yt, latex }` with typed-array buffers.
fn result_object(result: BuildResult) -> Result<JsValue, JsValue> {
    let object = Object::new();
    set(&object, "type", &JsValue::from_str("result"))?;
    set(&object, "coeffs", &Float64Array::from(result.coeffs.as_slice()))?;
    set(&object, "xs", &Float64Array::from(result.xs.as_slice()))?;
    set(&object, "yf", &Float64Array::from(result.yf.as_slice()))?;
    set(&object, "yt", &Float64Array::from(result.yt.as_slice()))?;
    set(&object, "latex", &JsValue::from_str(&result.latex))?;
    Ok(object.into())
}

fn error_object(message: &str) -> JsValue {
    let object = Object::new();
    let filled = set(&object, "type", &JsValue::from_str("error"))
        .and_then(|_| set(&object, "message", &JsValue::from_str(message)));
    match filled {
        Ok(()) => object.into(),
        Err(_) => JsValue::from_str(message),
    }
}

fn js_error_text(value: JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}
