//! Panic containment.
//!
//! A panic anywhere below this stage becomes a 500 JSON error. The response
//! carries `Connection: close` so the transport drops the connection instead
//! of reusing it.

use std::any::Any;

use axum::{
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use tower_http::catch_panic::CatchPanicLayer;

use crate::http::error::ApiError;

pub type PanicHandler = fn(Box<dyn Any + Send + 'static>) -> Response;

pub fn recover_panic_layer() -> CatchPanicLayer<PanicHandler> {
    CatchPanicLayer::custom(panic_response as PanicHandler)
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else {
        "unknown panic payload".to_string()
    };

    let mut response = ApiError::Internal(format!("panic: {detail}")).into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
