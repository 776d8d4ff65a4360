// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

//! The inbound dispatcher: demultiplexes a function call frame off the
//! input buffer, validates it against a registered definition, invokes the
//! handler, and pushes the reply (or a structured error) to the output
//! buffer.
//!
//! The source captures a `setjmp` target before every dispatch and
//! `longjmp`s back to it from `setError`, deep inside whatever call stack
//! the handler happens to be on. Here there is no saved execution context
//! to jump to: every fallible step returns a [`GuestResult`], `?` unwinds
//! the call stack the ordinary way, and [`dispatch`] is the single place
//! that turns an `Err` into an error-buffer write instead of a reply push.


#[cfg(any(test, feature = "std"))]
use std::rc::Rc;

#[cfg(not(any(test, feature = "std")))]
use alloc::rc::Rc;

use guestvm_abi::types::{ErrorCode, ParameterType};

use crate::entry::{CallContext, GuestContext};
use crate::error::{GuestError, GuestResult};
use crate::memory::SharedMemory;
use crate::outb::Outb;
use crate::protocol::{
    CallType, FunctionCallFrame, FunctionCallResult, GuestErrorRecord, Parameter, ReturnValue,
};
use crate::registry::FunctionDefinition;

/// Where the guest currently is in one request/reply cycle. Exposed for
/// introspection and tests; the dispatcher itself drives every transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatcherState {
    /// Waiting on the host to trigger the next entry.
    Idle,
    /// A handler is currently executing.
    Serving,
    /// A reply (or error) frame has been pushed; about to signal `HLT`.
    ReplyPending,
}

/// The uniform shape every registered guest function is adapted to,
/// regardless of its original arity or parameter types (see
/// [`crate::macros::guest_function`]).
///
/// `Rc`, not `Box`: invoking a handler needs `&mut CallContext`, which
/// borrows the same [`GuestContext`] the registry lives in. Cloning the
/// `Rc` out of the registry (a cheap refcount bump, never a real
/// allocation per call) releases that borrow before the handler runs,
/// without resorting to unsafe aliasing tricks or a registry that supports
/// removing and re-inserting entries mid-dispatch.
pub type Handler<M, O> =
    Rc<dyn Fn(&mut CallContext<'_, M, O>, &[Parameter]) -> GuestResult<ReturnValue>>;

/// Invoked on a registry miss instead of failing immediately with
/// `GuestFunctionNotFound`. Lets an embedding guest plug in a secondary
/// runtime (e.g. an interpreter) that resolves names outside the static
/// registry.
pub type FallbackHandler<M, O> =
    Rc<dyn Fn(&mut CallContext<'_, M, O>, &str, &[Parameter]) -> GuestResult<ReturnValue>>;

/// Runs one full dispatch cycle: pop a call frame, validate, invoke,
/// push the reply or error.
///
/// This is the function whose address the boot stub publishes at
/// `peb.guest_function_dispatch_ptr` (spec.md §6): the host triggers a
/// guest entry, the boot stub's trampoline calls this, and on return the
/// boot stub issues `HLT`.
pub fn dispatch<M: SharedMemory, O: Outb>(ctx: &mut GuestContext<M, O>) {
    log::trace!("dispatch: Idle -> Serving");
    ctx.state = DispatcherState::Serving;
    ctx.clear_guest_error();

    match run(ctx) {
        Ok(reply) => {
            log::debug!("dispatch: handler returned {:?}", reply.value.kind());
            let framed = reply.encode_framed();
            let mut call_ctx = ctx.call_context();
            let pushed = call_ctx.output.push(call_ctx.memory, &framed);
            if let Err(push_err) = pushed {
                log::debug!("dispatch: reply push failed: {push_err}");
                write_guest_error(ctx, &push_err);
            }
        }
        Err(err) => {
            log::debug!("dispatch: serving failed: {err}");
            write_guest_error(ctx, &err);
        }
    }

    log::trace!("dispatch: Serving -> ReplyPending");
    ctx.state = DispatcherState::ReplyPending;
}

/// Writes `err` to the guest-error buffer, truncating the *message* (not
/// the finished frame) so the whole record fits `region.len`. Truncating
/// post-encoding would leave the 4-byte body-length prefix describing more
/// bytes than were actually written, so a reader (the host, or our own
/// `GuestErrorRecord::decode_framed`) would read past the copied bytes into
/// whatever garbage follows. Best-effort: if the guest-error region itself
/// was never provisioned there is nothing further to recover to, matching
/// spec.md's framing of a write failure at this final stage as catastrophic
/// rather than structured.
fn write_guest_error<M: SharedMemory, O: Outb>(ctx: &mut GuestContext<M, O>, err: &GuestError) {
    let region = ctx.peb.guest_error;
    if region.is_empty() {
        return;
    }
    let mut record = GuestErrorRecord::from(err);
    // Framing overhead: 4-byte outer length + 1-byte code tag + 4-byte
    // message length prefix.
    let overhead = 9;
    let budget = (region.len as usize).saturating_sub(overhead);
    if record.message.len() > budget {
        let mut end = budget;
        while end > 0 && !record.message.is_char_boundary(end) {
            end -= 1;
        }
        record.message.truncate(end);
    }
    let bytes = record.encode_framed();
    ctx.memory
        .slice_mut(region.ptr, bytes.len())
        .copy_from_slice(&bytes);
}

/// Steps 2-8 of spec.md §4.3, as one fallible sequence.
fn run<M: SharedMemory, O: Outb>(ctx: &mut GuestContext<M, O>) -> GuestResult<FunctionCallResult> {
    let raw = {
        let mut call_ctx = ctx.call_context();
        call_ctx.input.pop(call_ctx.memory)?
    };
    let frame = FunctionCallFrame::decode_framed(&raw)
        .map_err(|_| GuestError::new(ErrorCode::GuestError, "malformed function call frame"))?;

    if frame.call_type != CallType::Guest {
        return Err(GuestError::new(
            ErrorCode::InvalidFunctionCallType,
            "Invalid Function Call Type",
        ));
    }

    if frame.name.is_empty() {
        return Err(GuestError::new(
            ErrorCode::GuestFunctionNameNotProvided,
            "Guest function name not provided",
        ));
    }

    let found = ctx
        .registry
        .lookup(&frame.name)
        .map(|(def, handler)| (def.clone(), Rc::clone(handler)));

    let value = if let Some((def, handler)) = found {
        log::trace!("dispatch: registry hit for {:?}", frame.name);
        validate_types(&def, &frame.parameters)?;
        let mut call_ctx = ctx.call_context();
        handler(&mut call_ctx, &frame.parameters)?
    } else if let Some(fallback) = ctx.fallback.clone() {
        log::trace!("dispatch: registry miss for {:?}, delegating to fallback", frame.name);
        let mut call_ctx = ctx.call_context();
        fallback(&mut call_ctx, &frame.name, &frame.parameters)?
    } else {
        log::debug!("dispatch: no such guest function {:?}", frame.name);
        return Err(GuestError::new(
            ErrorCode::GuestFunctionNotFound,
            frame.name.clone(),
        ));
    };

    Ok(FunctionCallResult { value })
}

fn validate_arity(def: &FunctionDefinition, params: &[Parameter]) -> GuestResult<()> {
    if params.len() != def.parameter_types.len() {
        return Err(GuestError::new(
            ErrorCode::GuestFunctionIncorrectNumberOfParameters,
            format_arity_message(&def.name, def.parameter_types.len(), params.len()),
        ));
    }
    Ok(())
}

/// Validates a call frame's parameters against a definition.
///
/// The array-length shape check runs first, against whatever the frame
/// actually supplied, before the plain argument-count check: the source
/// decodes a call's `vec_bytes`/`int32` pairing while building the
/// argument list, ahead of and independent from comparing the argument
/// count to the registered signature (`HyperlightGuest.c`'s
/// `DispatchFunction`) - a frame truncated right after its `vec_bytes`
/// argument is a missing-length-parameter error, not a bare arity
/// mismatch, even though both are true of it.
fn validate_types(def: &FunctionDefinition, params: &[Parameter]) -> GuestResult<()> {
    let types = &def.parameter_types;

    for (i, ty) in types.iter().enumerate() {
        if *ty != ParameterType::VecBytes || i >= params.len() {
            continue;
        }
        match params.get(i + 1) {
            None => {
                return Err(GuestError::new(
                    ErrorCode::ArrayLengthParameterMissing,
                    "Last parameter should be the length of the array",
                ));
            }
            Some(next) if next.kind() != ParameterType::Int32 => {
                return Err(GuestError::new(
                    ErrorCode::ArrayLengthParameterMissing,
                    format_positional_message(i + 1),
                ));
            }
            Some(_) => {}
        }
    }

    validate_arity(def, params)?;

    for (i, (expected, actual)) in types.iter().zip(params.iter()).enumerate() {
        if actual.kind() != *expected {
            return Err(GuestError::new(
                ErrorCode::GuestFunctionParameterTypeMismatch,
                format_mismatch_message(&def.name, i),
            ));
        }
    }
    Ok(())
}

#[cfg(any(test, feature = "std"))]
fn format_arity_message(name: &str, expected: usize, actual: usize) -> std::string::String {
    std::format!("Function {name} requires {expected} parameter(s), got {actual}.")
}

#[cfg(not(any(test, feature = "std")))]
fn format_arity_message(name: &str, expected: usize, actual: usize) -> alloc::string::String {
    alloc::format!("Function {name} requires {expected} parameter(s), got {actual}.")
}

#[cfg(any(test, feature = "std"))]
pub(crate) fn format_mismatch_message(name: &str, index: usize) -> std::string::String {
    std::format!("Function {name} parameter {index}.")
}

#[cfg(not(any(test, feature = "std")))]
pub(crate) fn format_mismatch_message(name: &str, index: usize) -> alloc::string::String {
    alloc::format!("Function {name} parameter {index}.")
}

#[cfg(any(test, feature = "std"))]
fn format_positional_message(index: usize) -> std::string::String {
    std::format!("Parameter {index}")
}

#[cfg(not(any(test, feature = "std")))]
fn format_positional_message(index: usize) -> alloc::string::String {
    alloc::format!("Parameter {index}")
}
