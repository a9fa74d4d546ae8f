//! Handlers for the `Echo` service methods.
//!
//! These run on the worker pool, never on a completion driver thread.

use super::proto::{EchoReply, EchoRequest};
use crate::server::telemetry::{
    decrement_handlers_inflight, increment_handlers_inflight, record_admission_delay,
    record_handler_duration,
};
use callgate::CallHandle;
use std::time::Instant;

pub type EchoCall = CallHandle<EchoRequest, EchoReply>;

/// Replies with the request message unchanged.
pub fn echo(call: EchoCall) {
    respond_with(&call, |request| request.message.clone());
}

/// Replies with the request message reversed by `char`.
pub fn reverse(call: EchoCall) {
    respond_with(&call, |request| request.message.chars().rev().collect());
}

fn respond_with(call: &EchoCall, body: impl FnOnce(&EchoRequest) -> String) {
    let start = Instant::now();
    record_admission_delay(
        start
            .saturating_duration_since(call.context().received_at())
            .as_micros() as f64,
    );
    increment_handlers_inflight();

    let reply = EchoReply {
        message: body(call.request()),
        call_id: call.context().call_id(),
    };
    if let Err(_e) = call.respond(reply) {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            call_id = call.context().call_id(),
            method = call.context().method_name(),
            "Reply not delivered: {_e}"
        );
    }

    decrement_handlers_inflight();
    record_handler_duration(start.elapsed().as_micros() as f64);
}
