// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

//! The outbound host-call protocol: validating a call against the
//! host-advertised function catalog, encoding it, signalling the host, and
//! decoding the reply.
//!
//! The source accepts a variadic argument list (`va_list`) whose types are
//! only known by cross-referencing the host's function catalog at call
//! time. Per the REDESIGN FLAGS in spec.md §9 ("Variadic host-call
//! wrappers"), this is reimplemented as an explicit `&[Parameter]` built at
//! the call site - the compiler checks each element's shape, and the
//! catalog check in [`call_host_function`] is purely a *value*-level
//! agreement between what the guest sent and what the host declared, not a
//! stand-in for type safety the compiler already gives for free.

#[cfg(test)]
mod mod_test;

#[cfg(any(test, feature = "std"))]
use std::{string::String, vec::Vec};

#[cfg(not(any(test, feature = "std")))]
use alloc::{string::String, vec::Vec};

use guestvm_abi::types::ErrorCode;

use crate::entry::CallContext;
use crate::error::{GuestError, GuestResult};
use crate::memory::SharedMemory;
use crate::outb::{Outb, PORT_CALL_FUNCTION};
use crate::protocol::{
    CallType, FunctionCallFrame, FunctionCallResult, GuestErrorRecord, Parameter, ReturnValue,
};
use crate::registry::FunctionDefinition;

/// The host's advertised catalog of callable functions, parsed once at
/// entry-point time from `peb.host_function_definitions` and treated as
/// immutable for the sandbox's lifetime - the same build-once/read-many
/// lifecycle as the guest's own [`crate::registry::FunctionRegistry`].
pub struct HostFunctionCatalog {
    definitions: Vec<FunctionDefinition>,
}

impl HostFunctionCatalog {
    /// An empty catalog, used when the host never populated the region.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            definitions: Vec::new(),
        }
    }

    /// Parses the host's function catalog out of a length-prefixed buffer
    /// of back-to-back [`FunctionDefinition`] records.
    ///
    /// The wire shape matches a vector of function-call-frame-style
    /// records rather than a shared-buffer stack: the host writes this
    /// once before the guest's first entry and never pushes/pops it.
    pub fn parse(bytes: &[u8]) -> GuestResult<Self> {
        let mut definitions = Vec::new();
        let mut offset = 0usize;
        while offset < bytes.len() {
            let remaining = &bytes[offset..];
            if remaining.len() < 4 {
                return Err(GuestError::new(
                    ErrorCode::GuestError,
                    "truncated host function catalog",
                ));
            }
            let len = u32::from_le_bytes([remaining[0], remaining[1], remaining[2], remaining[3]])
                as usize;
            let total = len
                .checked_add(4)
                .ok_or_else(|| GuestError::new(ErrorCode::GuestError, "host catalog record overflow"))?;
            if total > remaining.len() {
                return Err(GuestError::new(
                    ErrorCode::GuestError,
                    "truncated host function catalog record",
                ));
            }
            definitions.push(decode_definition(&remaining[..total])?);
            offset += total;
        }
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { definitions })
    }

    /// Looks up a host function by exact, case-sensitive name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&FunctionDefinition> {
        self.definitions
            .binary_search_by(|def| def.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.definitions[idx])
    }

    /// Number of host functions advertised.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// True if the host advertised no functions.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Decodes one `{name, parameter_types, return_type, function_pointer}`
/// record, reusing the same length-prefixed framing as a call frame
/// without going through [`FunctionCallFrame`] (the wire shape is a plain
/// record, not a tagged call).
fn decode_definition(framed: &[u8]) -> GuestResult<FunctionDefinition> {
    let body = &framed[4..];
    let mut pos = 0usize;
    let name_len = take_u32(body, &mut pos)? as usize;
    let name_bytes = take_bytes(body, &mut pos, name_len)?;
    let name = core::str::from_utf8(name_bytes)
        .map_err(|_| GuestError::new(ErrorCode::GuestError, "host catalog name is not utf-8"))?
        .into();

    let param_count = take_u32(body, &mut pos)? as usize;
    let mut parameter_types = Vec::with_capacity(param_count);
    for _ in 0..param_count {
        let tag = take_u8(body, &mut pos)?;
        let kind = guestvm_abi::types::ParameterType::from_tag(tag).ok_or_else(|| {
            GuestError::new(ErrorCode::UnsupportedParameterType, "unknown parameter tag in host catalog")
        })?;
        parameter_types.push(kind);
    }

    let return_tag = take_u8(body, &mut pos)?;
    let return_type = guestvm_abi::types::ReturnType::from_tag(return_tag).ok_or_else(|| {
        GuestError::new(ErrorCode::UnsupportedParameterType, "unknown return tag in host catalog")
    })?;

    let function_pointer = take_u64(body, &mut pos)?;

    Ok(FunctionDefinition::new(
        name,
        parameter_types,
        return_type,
        function_pointer,
    ))
}

fn take_u8(bytes: &[u8], pos: &mut usize) -> GuestResult<u8> {
    let b = *bytes
        .get(*pos)
        .ok_or_else(|| GuestError::new(ErrorCode::GuestError, "truncated host catalog record"))?;
    *pos += 1;
    Ok(b)
}

fn take_u32(bytes: &[u8], pos: &mut usize) -> GuestResult<u32> {
    let slice = take_bytes(bytes, pos, 4)?;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn take_u64(bytes: &[u8], pos: &mut usize) -> GuestResult<u64> {
    let slice = take_bytes(bytes, pos, 8)?;
    Ok(u64::from_le_bytes(slice.try_into().unwrap()))
}

fn take_bytes<'a>(bytes: &'a [u8], pos: &mut usize, len: usize) -> GuestResult<&'a [u8]> {
    let end = pos
        .checked_add(len)
        .ok_or_else(|| GuestError::new(ErrorCode::GuestError, "host catalog record overflow"))?;
    let slice = bytes
        .get(*pos..end)
        .ok_or_else(|| GuestError::new(ErrorCode::GuestError, "truncated host catalog record"))?;
    *pos = end;
    Ok(slice)
}

/// Invokes a host function by name with the given parameters, validating
/// against the host's catalog first (spec.md §4.4).
///
/// Performs the full round trip: encode, push, signal `OUTB`, check for a
/// host-surfaced exception (the "implicit host-error check"), then pop and
/// decode the reply. Strict LIFO nesting (spec.md §5) means this call must
/// fully complete - its reply popped - before the calling handler makes
/// another outbound call or returns; the shared-buffer stack's own `sp`
/// invariants catch a violation structurally rather than through a
/// separate re-entrancy guard.
pub fn call_host_function<M: SharedMemory, O: Outb>(
    ctx: &mut CallContext<'_, M, O>,
    name: &str,
    parameters: &[Parameter],
) -> GuestResult<ReturnValue> {
    let def = ctx.host_catalog.lookup(name).ok_or_else(|| {
        GuestError::new(ErrorCode::HostFunctionNotFound, name)
    })?;

    if def.parameter_types.len() != parameters.len() {
        return Err(GuestError::new(
            ErrorCode::HostFunctionIncorrectNumberOfParameters,
            format_arity_message(name, def.parameter_types.len(), parameters.len()),
        ));
    }
    for (i, (expected, actual)) in def.parameter_types.iter().zip(parameters.iter()).enumerate() {
        if actual.kind() != *expected {
            return Err(GuestError::new(
                ErrorCode::HostFunctionParameterTypeMismatch,
                format_mismatch_message(name, i),
            ));
        }
    }

    let frame = FunctionCallFrame {
        name: String::from(name),
        call_type: CallType::Host,
        expected_return_type: def.return_type,
        parameters: parameters.to_vec(),
    };
    ctx.output.push(ctx.memory, &frame.encode_framed())?;

    log::trace!("call_host_function: signalling OUTB for {name:?}");
    ctx.outb.signal(PORT_CALL_FUNCTION, 0);

    check_host_error(ctx)?;

    let raw = ctx.input.pop(ctx.memory)?;
    let result = FunctionCallResult::decode_framed(&raw)
        .map_err(|_| GuestError::new(ErrorCode::GuestError, "malformed host function reply"))?;
    log::trace!("call_host_function: {name:?} returned {:?}", result.value.kind());
    Ok(result.value)
}

/// After every `OUTB`, inspects the guest-error buffer (mirrored by the
/// host on an exception raised while servicing the call) and, if it holds
/// a non-`NoError` record, raises it - letting a host-side exception
/// unwind the guest the same way any other structured error does.
fn check_host_error<M: SharedMemory, O: Outb>(ctx: &mut CallContext<'_, M, O>) -> GuestResult<()> {
    let region = ctx.peb.guest_error;
    if region.is_empty() {
        return Ok(());
    }
    let len: u32 = ctx.memory.read(region.ptr);
    if len == 0 {
        return Ok(());
    }
    let bytes = ctx.memory.slice(region.ptr, (len as usize) + 4).to_vec();
    let record = GuestErrorRecord::decode_framed(&bytes)
        .map_err(|_| GuestError::new(ErrorCode::GuestError, "malformed host exception record"))?;
    if record.code.is_ok() {
        return Ok(());
    }
    Err(GuestError::new(record.code, record.message))
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
fn format_mismatch_message(name: &str, index: usize) -> std::string::String {
    std::format!("Function {name} parameter {index}.")
}

#[cfg(not(any(test, feature = "std")))]
fn format_mismatch_message(name: &str, index: usize) -> alloc::string::String {
    alloc::format!("Function {name} parameter {index}.")
}

/// Convenience wrapper expecting an `int32` reply. Mirrors the source's
/// `native_symbol_thunk_returning_int`, minus the C varargs machinery.
pub fn call_host_function_i32<M: SharedMemory, O: Outb>(
    ctx: &mut CallContext<'_, M, O>,
    name: &str,
    parameters: &[Parameter],
) -> GuestResult<i32> {
    match call_host_function(ctx, name, parameters)? {
        ReturnValue::Int32(v) => Ok(v),
        other => Err(wrong_return_type(name, &other)),
    }
}

/// Convenience wrapper expecting an `int64` reply.
pub fn call_host_function_i64<M: SharedMemory, O: Outb>(
    ctx: &mut CallContext<'_, M, O>,
    name: &str,
    parameters: &[Parameter],
) -> GuestResult<i64> {
    match call_host_function(ctx, name, parameters)? {
        ReturnValue::Int64(v) => Ok(v),
        other => Err(wrong_return_type(name, &other)),
    }
}

/// Convenience wrapper expecting a `uint32` reply.
///
/// The source returns unsigned values through a signed-typed thunk; a
/// negative apparent value is the caller misreading an unsigned reply as
/// signed, not a protocol error. This wrapper keeps the on-the-wire tag
/// (`UInt32`) distinct and decodes straight into `u32`, preserving the
/// existing contract that a caller asking for the wrong convention sees
/// "host returned wrong type" rather than silent reinterpretation.
pub fn call_host_function_u32<M: SharedMemory, O: Outb>(
    ctx: &mut CallContext<'_, M, O>,
    name: &str,
    parameters: &[Parameter],
) -> GuestResult<u32> {
    match call_host_function(ctx, name, parameters)? {
        ReturnValue::UInt32(v) => Ok(v),
        other => Err(wrong_return_type(name, &other)),
    }
}

/// Convenience wrapper expecting a `uint64` reply.
pub fn call_host_function_u64<M: SharedMemory, O: Outb>(
    ctx: &mut CallContext<'_, M, O>,
    name: &str,
    parameters: &[Parameter],
) -> GuestResult<u64> {
    match call_host_function(ctx, name, parameters)? {
        ReturnValue::UInt64(v) => Ok(v),
        other => Err(wrong_return_type(name, &other)),
    }
}

/// Convenience wrapper expecting a `string` reply.
pub fn call_host_function_string<M: SharedMemory, O: Outb>(
    ctx: &mut CallContext<'_, M, O>,
    name: &str,
    parameters: &[Parameter],
) -> GuestResult<String> {
    match call_host_function(ctx, name, parameters)? {
        ReturnValue::String(v) => Ok(v),
        other => Err(wrong_return_type(name, &other)),
    }
}

/// Convenience wrapper expecting a `bool` reply.
pub fn call_host_function_bool<M: SharedMemory, O: Outb>(
    ctx: &mut CallContext<'_, M, O>,
    name: &str,
    parameters: &[Parameter],
) -> GuestResult<bool> {
    match call_host_function(ctx, name, parameters)? {
        ReturnValue::Bool(v) => Ok(v),
        other => Err(wrong_return_type(name, &other)),
    }
}

/// Convenience wrapper for a `void` reply; discards the (empty) value.
pub fn call_host_function_void<M: SharedMemory, O: Outb>(
    ctx: &mut CallContext<'_, M, O>,
    name: &str,
    parameters: &[Parameter],
) -> GuestResult<()> {
    match call_host_function(ctx, name, parameters)? {
        ReturnValue::Void => Ok(()),
        other => Err(wrong_return_type(name, &other)),
    }
}

fn wrong_return_type(name: &str, got: &ReturnValue) -> GuestError {
    GuestError::new(ErrorCode::GuestError, format_wrong_return(name, got.kind().name_for_error()))
}

#[cfg(any(test, feature = "std"))]
fn format_wrong_return(name: &str, kind: &str) -> std::string::String {
    std::format!("host function {name} returned wrong type: {kind}")
}

#[cfg(not(any(test, feature = "std")))]
fn format_wrong_return(name: &str, kind: &str) -> alloc::string::String {
    alloc::format!("host function {name} returned wrong type: {kind}")
}

/// Prints a message to the host's console via the `HostPrint` host
/// function (spec.md §6: "current contract routes print through port 101
/// via a 'HostPrint' host function").
pub fn print_to_host<M: SharedMemory, O: Outb>(
    ctx: &mut CallContext<'_, M, O>,
    message: &str,
) -> GuestResult<()> {
    call_host_function_void(ctx, "HostPrint", &[Parameter::String(message.into())])
}

trait ReturnTypeNameExt {
    fn name_for_error(self) -> &'static str;
}

impl ReturnTypeNameExt for guestvm_abi::types::ReturnType {
    fn name_for_error(self) -> &'static str {
        match self {
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::String => "string",
            Self::Bool => "bool",
            Self::VecBytes => "vec_bytes",
            Self::Void => "void",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::SizePrefixedBuffer => "size_prefixed_buffer",
        }
    }
}
