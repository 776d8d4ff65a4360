// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

use guestvm_abi::types::ReturnType;

use super::{CallType, FunctionCallFrame, FunctionCallResult, GuestErrorRecord, Parameter, ReturnValue};
use crate::error::{ErrorCode, GuestError};

#[test]
fn call_frame_round_trips() {
    let frame = FunctionCallFrame {
        name: "Echo".into(),
        call_type: CallType::Guest,
        expected_return_type: ReturnType::String,
        parameters: vec![Parameter::String("hello".into())],
    };
    let bytes = frame.encode_framed();
    let decoded = FunctionCallFrame::decode_framed(&bytes).unwrap();
    assert_eq!(decoded, frame);
}

#[test]
fn every_parameter_kind_round_trips() {
    for param in [
        Parameter::Int32(-7),
        Parameter::Int64(i64::MIN),
        Parameter::String("s".into()),
        Parameter::Bool(true),
        Parameter::VecBytes(vec![1, 2, 3]),
    ] {
        let frame = FunctionCallFrame {
            name: "F".into(),
            call_type: CallType::Host,
            expected_return_type: ReturnType::Void,
            parameters: vec![param.clone()],
        };
        let bytes = frame.encode_framed();
        let decoded = FunctionCallFrame::decode_framed(&bytes).unwrap();
        assert_eq!(decoded.parameters[0], param);
    }
}

#[test]
fn call_result_round_trips_every_return_kind() {
    for value in [
        ReturnValue::Int32(42),
        ReturnValue::Int64(-1),
        ReturnValue::UInt32(9),
        ReturnValue::UInt64(9),
        ReturnValue::Bool(false),
        ReturnValue::Void,
        ReturnValue::String("reply".into()),
        ReturnValue::VecBytes(vec![9, 8, 7]),
        ReturnValue::SizePrefixedBuffer(vec![1]),
    ] {
        let result = FunctionCallResult { value: value.clone() };
        let bytes = result.encode_framed();
        let decoded = FunctionCallResult::decode_framed(&bytes).unwrap();
        assert_eq!(decoded.value, value);
    }
}

#[test]
fn guest_error_record_round_trips() {
    let err = GuestError::new(ErrorCode::GuestFunctionNotFound, "Missing");
    let record = GuestErrorRecord::from(&err);
    let bytes = record.encode_framed();
    let decoded = GuestErrorRecord::decode_framed(&bytes).unwrap();
    assert_eq!(decoded, record);
}

#[test]
fn truncated_frame_fails_to_decode() {
    let frame = FunctionCallFrame {
        name: "Echo".into(),
        call_type: CallType::Guest,
        expected_return_type: ReturnType::String,
        parameters: vec![],
    };
    let mut bytes = frame.encode_framed();
    bytes.truncate(bytes.len() - 2);
    assert!(FunctionCallFrame::decode_framed(&bytes).is_err());
}
