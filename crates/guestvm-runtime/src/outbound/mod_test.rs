// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

use guestvm_abi::types::{ErrorCode, ParameterType, ReturnType};

use super::{call_host_function, call_host_function_i32, call_host_function_void, HostFunctionCatalog};
use crate::memory::SharedMemory;
use crate::protocol::{FunctionCallResult, GuestErrorRecord, Parameter, ReturnValue};
use crate::testutil::{build_ctx, empty_peb};

/// Encodes one catalog record in the same framing
/// [`HostFunctionCatalog::parse`] expects: a 4-byte length prefix around
/// `{name, parameter_types, return_type, function_pointer}`.
fn encode_catalog_entry(
    name: &str,
    parameter_types: &[ParameterType],
    return_type: ReturnType,
    function_pointer: u64,
) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&(name.len() as u32).to_le_bytes());
    body.extend_from_slice(name.as_bytes());
    body.extend_from_slice(&(parameter_types.len() as u32).to_le_bytes());
    for pt in parameter_types {
        body.push(pt.tag());
    }
    body.push(return_type.tag());
    body.extend_from_slice(&function_pointer.to_le_bytes());

    let mut framed = Vec::with_capacity(body.len() + 4);
    framed.extend_from_slice(&(body.len() as u32).to_le_bytes());
    framed.extend_from_slice(&body);
    framed
}

#[test]
fn catalog_parse_sorts_and_looks_up_by_name() {
    let bytes = [
        encode_catalog_entry("Zeta", &[], ReturnType::Void, 0),
        encode_catalog_entry("GetTwo", &[], ReturnType::Int32, 0),
        encode_catalog_entry("HostPrint", &[ParameterType::String], ReturnType::Void, 0),
    ]
    .concat();

    let catalog = HostFunctionCatalog::parse(&bytes).unwrap();
    assert_eq!(catalog.len(), 3);
    assert!(catalog.lookup("GetTwo").is_some());
    assert!(catalog.lookup("Zeta").is_some());
    assert!(catalog.lookup("Missing").is_none());
    assert_eq!(
        catalog.lookup("HostPrint").unwrap().parameter_types,
        vec![ParameterType::String]
    );
}

/// Seed case: the guest calls `GetTwo` and the host's reply frame (already
/// sitting in the input buffer, as a real host would have deposited it
/// before returning control) decodes to `2`.
#[test]
fn call_host_function_round_trips_int32() {
    let catalog = encode_catalog_entry("GetTwo", &[], ReturnType::Int32, 0);
    let mut ctx = build_ctx(empty_peb(), &catalog, |_ctx| Ok(()));

    let reply = FunctionCallResult {
        value: ReturnValue::Int32(2),
    };
    ctx.input.push(&mut ctx.memory, &reply.encode_framed()).unwrap();

    let mut call_ctx = ctx.call_context();
    let value = call_host_function_i32(&mut call_ctx, "GetTwo", &[]).unwrap();
    assert_eq!(value, 2);

    assert_eq!(ctx.outb.calls, vec![(crate::outb::PORT_CALL_FUNCTION, 0)]);
    assert!(!ctx.output.is_empty(&ctx.memory).unwrap());
}

#[test]
fn call_host_function_rejects_unknown_name() {
    let mut ctx = build_ctx(empty_peb(), &[], |_ctx| Ok(()));
    let mut call_ctx = ctx.call_context();
    let err = call_host_function(&mut call_ctx, "Missing", &[]).unwrap_err();
    assert_eq!(err.code, ErrorCode::HostFunctionNotFound);
    assert!(ctx.outb.calls.is_empty());
}

#[test]
fn call_host_function_rejects_wrong_arity() {
    let catalog = encode_catalog_entry("GetTwo", &[], ReturnType::Int32, 0);
    let mut ctx = build_ctx(empty_peb(), &catalog, |_ctx| Ok(()));
    let mut call_ctx = ctx.call_context();
    let err = call_host_function(&mut call_ctx, "GetTwo", &[Parameter::Int32(1)]).unwrap_err();
    assert_eq!(err.code, ErrorCode::HostFunctionIncorrectNumberOfParameters);
}

#[test]
fn call_host_function_rejects_parameter_type_mismatch() {
    let catalog = encode_catalog_entry("HostPrint", &[ParameterType::String], ReturnType::Void, 0);
    let mut ctx = build_ctx(empty_peb(), &catalog, |_ctx| Ok(()));
    let mut call_ctx = ctx.call_context();
    let err = call_host_function(&mut call_ctx, "HostPrint", &[Parameter::Int32(1)]).unwrap_err();
    assert_eq!(err.code, ErrorCode::HostFunctionParameterTypeMismatch);
}

/// The implicit host-error check: if the host raised an exception while
/// servicing the call, it is surfaced through the guest-error buffer
/// (mirrored by the host), not through the reply frame.
#[test]
fn call_host_function_surfaces_host_exception() {
    let catalog = encode_catalog_entry("HostPrint", &[ParameterType::String], ReturnType::Void, 0);
    let mut ctx = build_ctx(empty_peb(), &catalog, |_ctx| Ok(()));

    let error = GuestErrorRecord {
        code: ErrorCode::UnknownError,
        message: "host blew up".into(),
    };
    let region = ctx.peb.guest_error;
    let bytes = error.encode_framed();
    ctx.memory.slice_mut(region.ptr, bytes.len()).copy_from_slice(&bytes);

    let mut call_ctx = ctx.call_context();
    let err = call_host_function_void(
        &mut call_ctx,
        "HostPrint",
        &[Parameter::String("hi".into())],
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownError);
    assert_eq!(err.message, "host blew up");
}

#[test]
fn empty_catalog_rejects_every_call() {
    let mut ctx = build_ctx(empty_peb(), &[], |_ctx| Ok(()));
    assert!(ctx.host_catalog.is_empty());
    let mut call_ctx = ctx.call_context();
    let err = call_host_function(&mut call_ctx, "Anything", &[]).unwrap_err();
    assert_eq!(err.code, ErrorCode::HostFunctionNotFound);
}
