// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

//! Wire encode/decode for call frames, results, and guest error records.
//!
//! The serialization library itself is an external collaborator (out of
//! scope): this module only needs records, tagged unions, vectors and
//! inline scalars, so it implements that minimal subset directly rather
//! than pulling in a general-purpose format. Every frame is self-describing
//! and length-prefixed with a 4-byte little-endian size.

#[cfg(test)]
mod mod_test;

#[cfg(any(test, feature = "std"))]
use std::{string::String, vec::Vec};

#[cfg(not(any(test, feature = "std")))]
use alloc::{string::String, vec::Vec};

use guestvm_abi::types::{ErrorCode, ParameterType, ReturnType};

use crate::error::GuestError;

/// Which side originated a function call frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CallType {
    Guest = 0,
    Host = 1,
}

impl CallType {
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Guest),
            1 => Some(Self::Host),
            _ => None,
        }
    }
}

/// One call parameter's value, tagged by kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Parameter {
    Int32(i32),
    Int64(i64),
    String(String),
    Bool(bool),
    VecBytes(Vec<u8>),
}

impl Parameter {
    /// The [`ParameterType`] this value carries.
    #[must_use]
    pub const fn kind(&self) -> ParameterType {
        match self {
            Self::Int32(_) => ParameterType::Int32,
            Self::Int64(_) => ParameterType::Int64,
            Self::String(_) => ParameterType::String,
            Self::Bool(_) => ParameterType::Bool,
            Self::VecBytes(_) => ParameterType::VecBytes,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.kind().tag());
        match self {
            Self::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Bool(v) => out.push(u8::from(*v)),
            Self::String(s) => {
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            Self::VecBytes(bytes) => {
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
            }
        }
    }

    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, DecodeError> {
        let tag = cursor.take_u8()?;
        match ParameterType::from_tag(tag) {
            Some(ParameterType::Int32) => Ok(Self::Int32(cursor.take_i32()?)),
            Some(ParameterType::Int64) => Ok(Self::Int64(cursor.take_i64()?)),
            Some(ParameterType::Bool) => Ok(Self::Bool(cursor.take_u8()? != 0)),
            Some(ParameterType::String) => {
                let bytes = cursor.take_len_prefixed()?;
                let s = core::str::from_utf8(bytes)
                    .map_err(|_| DecodeError::Malformed)?
                    .into();
                Ok(Self::String(s))
            }
            Some(ParameterType::VecBytes) => {
                Ok(Self::VecBytes(cursor.take_len_prefixed()?.to_vec()))
            }
            None => Err(DecodeError::UnsupportedParameterType),
        }
    }
}

/// A return value, tagged by its [`ReturnType`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReturnValue {
    Int32(i32),
    Int64(i64),
    String(String),
    Bool(bool),
    VecBytes(Vec<u8>),
    Void,
    UInt32(u32),
    UInt64(u64),
    SizePrefixedBuffer(Vec<u8>),
}

impl ReturnValue {
    #[must_use]
    pub const fn kind(&self) -> ReturnType {
        match self {
            Self::Int32(_) => ReturnType::Int32,
            Self::Int64(_) => ReturnType::Int64,
            Self::String(_) => ReturnType::String,
            Self::Bool(_) => ReturnType::Bool,
            Self::VecBytes(_) => ReturnType::VecBytes,
            Self::Void => ReturnType::Void,
            Self::UInt32(_) => ReturnType::UInt32,
            Self::UInt64(_) => ReturnType::UInt64,
            Self::SizePrefixedBuffer(_) => ReturnType::SizePrefixedBuffer,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.kind().tag());
        match self {
            Self::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::UInt32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::UInt64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Bool(v) => out.push(u8::from(*v)),
            Self::Void => {}
            Self::String(s) => {
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            Self::VecBytes(bytes) | Self::SizePrefixedBuffer(bytes) => {
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
            }
        }
    }

    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, DecodeError> {
        let tag = cursor.take_u8()?;
        match ReturnType::from_tag(tag) {
            Some(ReturnType::Int32) => Ok(Self::Int32(cursor.take_i32()?)),
            Some(ReturnType::Int64) => Ok(Self::Int64(cursor.take_i64()?)),
            Some(ReturnType::UInt32) => Ok(Self::UInt32(cursor.take_u32()?)),
            Some(ReturnType::UInt64) => Ok(Self::UInt64(cursor.take_u64()?)),
            Some(ReturnType::Bool) => Ok(Self::Bool(cursor.take_u8()? != 0)),
            Some(ReturnType::Void) => Ok(Self::Void),
            Some(ReturnType::String) => {
                let bytes = cursor.take_len_prefixed()?;
                let s = core::str::from_utf8(bytes)
                    .map_err(|_| DecodeError::Malformed)?
                    .into();
                Ok(Self::String(s))
            }
            Some(ReturnType::VecBytes) => Ok(Self::VecBytes(cursor.take_len_prefixed()?.to_vec())),
            Some(ReturnType::SizePrefixedBuffer) => {
                Ok(Self::SizePrefixedBuffer(cursor.take_len_prefixed()?.to_vec()))
            }
            None => Err(DecodeError::UnsupportedParameterType),
        }
    }
}

/// An inbound or outbound function call, before its 4-byte size prefix is
/// applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionCallFrame {
    pub name: String,
    pub call_type: CallType,
    pub expected_return_type: ReturnType,
    pub parameters: Vec<Parameter>,
}

impl FunctionCallFrame {
    /// Encodes this frame with its 4-byte little-endian size prefix.
    #[must_use]
    pub fn encode_framed(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&(self.name.len() as u32).to_le_bytes());
        body.extend_from_slice(self.name.as_bytes());
        body.push(self.call_type as u8);
        body.push(self.expected_return_type.tag());
        body.extend_from_slice(&(self.parameters.len() as u32).to_le_bytes());
        for p in &self.parameters {
            p.encode(&mut body);
        }
        let mut framed = Vec::with_capacity(body.len() + 4);
        framed.extend_from_slice(&(body.len() as u32).to_le_bytes());
        framed.extend_from_slice(&body);
        framed
    }

    /// Decodes a frame previously produced by `pop` off a shared buffer
    /// stack (size prefix included).
    pub fn decode_framed(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = Cursor::new(bytes);
        let declared_len = cursor.take_u32()? as usize;
        if declared_len != bytes.len().saturating_sub(4) {
            return Err(DecodeError::Malformed);
        }

        let name_bytes = cursor.take_len_prefixed()?;
        let name = core::str::from_utf8(name_bytes)
            .map_err(|_| DecodeError::Malformed)?
            .into();

        let call_type =
            CallType::from_tag(cursor.take_u8()?).ok_or(DecodeError::InvalidCallType)?;
        let expected_return_type = ReturnType::from_tag(cursor.take_u8()?)
            .ok_or(DecodeError::UnsupportedParameterType)?;

        let param_count = cursor.take_u32()? as usize;
        let mut parameters = Vec::with_capacity(param_count);
        for _ in 0..param_count {
            parameters.push(Parameter::decode(&mut cursor)?);
        }

        Ok(Self {
            name,
            call_type,
            expected_return_type,
            parameters,
        })
    }
}

/// The reply to a function call: a size-prefixed, tagged return value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionCallResult {
    pub value: ReturnValue,
}

impl FunctionCallResult {
    #[must_use]
    pub fn encode_framed(&self) -> Vec<u8> {
        let mut body = Vec::new();
        self.value.encode(&mut body);
        let mut framed = Vec::with_capacity(body.len() + 4);
        framed.extend_from_slice(&(body.len() as u32).to_le_bytes());
        framed.extend_from_slice(&body);
        framed
    }

    pub fn decode_framed(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = Cursor::new(bytes);
        let declared_len = cursor.take_u32()? as usize;
        if declared_len != bytes.len().saturating_sub(4) {
            return Err(DecodeError::Malformed);
        }
        let value = ReturnValue::decode(&mut cursor)?;
        Ok(Self { value })
    }
}

/// `{code, message}`, written to the guest-error buffer on a structured
/// exit. Not a shared-buffer-stack frame: the guest-error region holds
/// exactly one record, overwritten by every dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuestErrorRecord {
    pub code: ErrorCode,
    pub message: String,
}

impl GuestErrorRecord {
    #[must_use]
    pub fn encode_framed(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.push(self.code.tag());
        body.extend_from_slice(&(self.message.len() as u32).to_le_bytes());
        body.extend_from_slice(self.message.as_bytes());
        let mut framed = Vec::with_capacity(body.len() + 4);
        framed.extend_from_slice(&(body.len() as u32).to_le_bytes());
        framed.extend_from_slice(&body);
        framed
    }

    pub fn decode_framed(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = Cursor::new(bytes);
        let declared_len = cursor.take_u32()? as usize;
        if declared_len != bytes.len().saturating_sub(4) {
            return Err(DecodeError::Malformed);
        }
        let code = ErrorCode::from_tag(cursor.take_u8()?).ok_or(DecodeError::Malformed)?;
        let message_bytes = cursor.take_len_prefixed()?;
        let message = core::str::from_utf8(message_bytes)
            .map_err(|_| DecodeError::Malformed)?
            .into();
        Ok(Self { code, message })
    }
}

impl From<&GuestError> for GuestErrorRecord {
    fn from(err: &GuestError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
        }
    }
}

/// A decode-time failure: the bytes did not describe a valid record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    Truncated,
    Malformed,
    InvalidCallType,
    UnsupportedParameterType,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn take_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().map_err(|_| DecodeError::Truncated)?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn take_u64(&mut self) -> Result<u64, DecodeError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().map_err(|_| DecodeError::Truncated)?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn take_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.take_u32()? as i32)
    }

    fn take_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(self.take_u64()? as i64)
    }

    fn take_len_prefixed(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.take_u32()? as usize;
        self.take(len)
    }
}
