// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

//! Per-arity adapters for registering a strongly-typed guest function.
//!
//! The source hand-writes one `native_symbol_thunk_returning_*` stub per
//! registered function, each decoding its own fixed argument list out of
//! the call frame by hand. [`guest_function!`] generates that glue instead:
//! given a user function of some native Rust signature and its registered
//! name, it produces the uniform [`crate::dispatcher::Handler`] closure the
//! dispatcher expects, decoding positional arguments with the same
//! `GuestFunctionParameterTypeMismatch` wording the dispatcher itself uses
//! (see [`crate::dispatcher`]'s `format_mismatch_message`) and converting
//! the user function's native return value into a [`crate::protocol::ReturnValue`].
//!
//! [`GuestParam`] and [`GuestReturn`] are the calling-convention traits each
//! native type plugs into - one `KIND` constant plus a conversion method
//! each, the same shape as `abi::GuestArg`/`abi::GuestRet` in a dynamic
//! binary translator, just trading registers for a tagged-union wire value.

#[cfg(any(test, feature = "std"))]
pub use std::{rc::Rc, string::String, vec::Vec};

#[cfg(not(any(test, feature = "std")))]
pub use alloc::{rc::Rc, string::String, vec::Vec};

use guestvm_abi::types::{ParameterType, ReturnType};

use crate::error::{ErrorCode, GuestError, GuestResult};
use crate::protocol::{Parameter, ReturnValue};

/// Calling-convention translation for one native argument type.
pub trait GuestParam: Sized {
    /// The wire [`ParameterType`] this native type decodes from.
    const KIND: ParameterType;

    /// Extracts this type from a tagged [`Parameter`], or `None` on a kind
    /// mismatch.
    fn from_parameter(value: &Parameter) -> Option<Self>;
}

impl GuestParam for i32 {
    const KIND: ParameterType = ParameterType::Int32;
    fn from_parameter(value: &Parameter) -> Option<Self> {
        match value {
            Parameter::Int32(v) => Some(*v),
            _ => None,
        }
    }
}

impl GuestParam for i64 {
    const KIND: ParameterType = ParameterType::Int64;
    fn from_parameter(value: &Parameter) -> Option<Self> {
        match value {
            Parameter::Int64(v) => Some(*v),
            _ => None,
        }
    }
}

impl GuestParam for bool {
    const KIND: ParameterType = ParameterType::Bool;
    fn from_parameter(value: &Parameter) -> Option<Self> {
        match value {
            Parameter::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl GuestParam for String {
    const KIND: ParameterType = ParameterType::String;
    fn from_parameter(value: &Parameter) -> Option<Self> {
        match value {
            Parameter::String(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl GuestParam for Vec<u8> {
    const KIND: ParameterType = ParameterType::VecBytes;
    fn from_parameter(value: &Parameter) -> Option<Self> {
        match value {
            Parameter::VecBytes(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// Calling-convention translation for one native return type.
pub trait GuestReturn {
    /// The wire [`ReturnType`] this native type encodes as.
    const KIND: ReturnType;

    fn into_return_value(self) -> ReturnValue;
}

impl GuestReturn for () {
    const KIND: ReturnType = ReturnType::Void;
    fn into_return_value(self) -> ReturnValue {
        ReturnValue::Void
    }
}

impl GuestReturn for i32 {
    const KIND: ReturnType = ReturnType::Int32;
    fn into_return_value(self) -> ReturnValue {
        ReturnValue::Int32(self)
    }
}

impl GuestReturn for i64 {
    const KIND: ReturnType = ReturnType::Int64;
    fn into_return_value(self) -> ReturnValue {
        ReturnValue::Int64(self)
    }
}

impl GuestReturn for u32 {
    const KIND: ReturnType = ReturnType::UInt32;
    fn into_return_value(self) -> ReturnValue {
        ReturnValue::UInt32(self)
    }
}

impl GuestReturn for u64 {
    const KIND: ReturnType = ReturnType::UInt64;
    fn into_return_value(self) -> ReturnValue {
        ReturnValue::UInt64(self)
    }
}

impl GuestReturn for bool {
    const KIND: ReturnType = ReturnType::Bool;
    fn into_return_value(self) -> ReturnValue {
        ReturnValue::Bool(self)
    }
}

impl GuestReturn for String {
    const KIND: ReturnType = ReturnType::String;
    fn into_return_value(self) -> ReturnValue {
        ReturnValue::String(self)
    }
}

impl GuestReturn for Vec<u8> {
    const KIND: ReturnType = ReturnType::VecBytes;
    fn into_return_value(self) -> ReturnValue {
        ReturnValue::VecBytes(self)
    }
}

/// A return value the dispatcher pushes verbatim rather than re-tagging -
/// distinct from `Vec<u8>` (`ReturnType::VecBytes`) because the two wire
/// kinds are not interchangeable on the host side.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SizePrefixedBuffer(pub Vec<u8>);

impl GuestReturn for SizePrefixedBuffer {
    const KIND: ReturnType = ReturnType::SizePrefixedBuffer;
    fn into_return_value(self) -> ReturnValue {
        ReturnValue::SizePrefixedBuffer(self.0)
    }
}

/// Decodes the parameter at `index`, or fails with the same message shape
/// `dispatcher::validate_types` uses for a type mismatch - a caller going
/// through `dispatcher::dispatch` never observes a `None` here (arity and
/// element types are validated before a handler ever runs); this exists for
/// [`guest_function!`] expansions and any direct handler invocation that
/// bypasses that validation.
pub fn extract_param<P: GuestParam>(params: &[Parameter], index: usize, name: &str) -> GuestResult<P> {
    match params.get(index) {
        Some(value) => P::from_parameter(value).ok_or_else(|| {
            GuestError::new(ErrorCode::GuestFunctionParameterTypeMismatch, mismatch_message(name, index))
        }),
        None => Err(GuestError::new(
            ErrorCode::GuestFunctionIncorrectNumberOfParameters,
            arity_message(name, index),
        )),
    }
}

#[cfg(any(test, feature = "std"))]
pub fn mismatch_message(name: &str, index: usize) -> std::string::String {
    std::format!("Function {name} parameter {index}.")
}

#[cfg(not(any(test, feature = "std")))]
pub fn mismatch_message(name: &str, index: usize) -> alloc::string::String {
    alloc::format!("Function {name} parameter {index}.")
}

#[cfg(any(test, feature = "std"))]
fn arity_message(name: &str, index: usize) -> std::string::String {
    std::format!("Function {name} requires a parameter at position {index}")
}

#[cfg(not(any(test, feature = "std")))]
fn arity_message(name: &str, index: usize) -> alloc::string::String {
    alloc::format!("Function {name} requires a parameter at position {index}")
}

/// Builds a [`crate::dispatcher::Handler`] for one arity and registers it
/// under `$ctx`. Not part of the public macro surface - [`guest_function!`]
/// picks the right bracketed `(index, type)` list for its arity and
/// delegates here; the list is what lets one expansion serve every arity
/// without a handwritten closure per parameter count.
#[doc(hidden)]
#[macro_export]
macro_rules! __guest_function_build {
    ($ctx:expr, $name:expr, [$(($idx:tt, $ty:ty)),*] -> $ret:ty, $body:expr) => {{
        let __gf_name: $crate::macros::String = ($name).into();
        let __gf_def_name = __gf_name.clone();
        let __gf_handler: $crate::dispatcher::Handler<_, _> = $crate::macros::Rc::new(
            move |call_ctx: &mut $crate::entry::CallContext<'_, _, _>,
                  params: &[$crate::protocol::Parameter]|
                  -> $crate::error::GuestResult<$crate::protocol::ReturnValue> {
                let __gf_result: $crate::error::GuestResult<$ret> = ($body)(
                    call_ctx,
                    $($crate::macros::extract_param::<$ty>(params, $idx, &__gf_name)?,)*
                );
                __gf_result.map(|v| <$ret as $crate::macros::GuestReturn>::into_return_value(v))
            },
        );
        $ctx.registry.register(
            $crate::registry::FunctionDefinition::new(
                __gf_def_name,
                $crate::macros::Vec::from([$(<$ty as $crate::macros::GuestParam>::KIND),*]),
                <$ret as $crate::macros::GuestReturn>::KIND,
                0,
            ),
            __gf_handler,
        )
    }};
}

/// Registers a guest function of arity 0 through 10 under `$ctx`.
///
/// ```ignore
/// guest_function!(ctx, "Add", (i32, i32) -> i32, |_ctx, a, b| Ok(a + b))?;
/// ```
///
/// `$body` is a closure `Fn(&mut CallContext<_, _>, ...) -> GuestResult<R>`
/// for the declared parameter types `...` and return type `R`; its first
/// parameter is the [`crate::entry::CallContext`] the handler runs with
/// (needed to make outbound calls or touch the heap), the rest are the
/// decoded native arguments in declared order.
#[macro_export]
macro_rules! guest_function {
    ($ctx:expr, $name:expr, () -> $ret:ty, $body:expr $(,)?) => {
        $crate::__guest_function_build!($ctx, $name, [] -> $ret, $body)
    };
    ($ctx:expr, $name:expr, ($t0:ty $(,)?) -> $ret:ty, $body:expr $(,)?) => {
        $crate::__guest_function_build!($ctx, $name, [(0, $t0)] -> $ret, $body)
    };
    ($ctx:expr, $name:expr, ($t0:ty, $t1:ty $(,)?) -> $ret:ty, $body:expr $(,)?) => {
        $crate::__guest_function_build!($ctx, $name, [(0, $t0), (1, $t1)] -> $ret, $body)
    };
    ($ctx:expr, $name:expr, ($t0:ty, $t1:ty, $t2:ty $(,)?) -> $ret:ty, $body:expr $(,)?) => {
        $crate::__guest_function_build!($ctx, $name, [(0, $t0), (1, $t1), (2, $t2)] -> $ret, $body)
    };
    ($ctx:expr, $name:expr, ($t0:ty, $t1:ty, $t2:ty, $t3:ty $(,)?) -> $ret:ty, $body:expr $(,)?) => {
        $crate::__guest_function_build!(
            $ctx, $name, [(0, $t0), (1, $t1), (2, $t2), (3, $t3)] -> $ret, $body
        )
    };
    ($ctx:expr, $name:expr, ($t0:ty, $t1:ty, $t2:ty, $t3:ty, $t4:ty $(,)?) -> $ret:ty, $body:expr $(,)?) => {
        $crate::__guest_function_build!(
            $ctx, $name, [(0, $t0), (1, $t1), (2, $t2), (3, $t3), (4, $t4)] -> $ret, $body
        )
    };
    (
        $ctx:expr, $name:expr,
        ($t0:ty, $t1:ty, $t2:ty, $t3:ty, $t4:ty, $t5:ty $(,)?) -> $ret:ty, $body:expr $(,)?
    ) => {
        $crate::__guest_function_build!(
            $ctx, $name,
            [(0, $t0), (1, $t1), (2, $t2), (3, $t3), (4, $t4), (5, $t5)] -> $ret, $body
        )
    };
    (
        $ctx:expr, $name:expr,
        ($t0:ty, $t1:ty, $t2:ty, $t3:ty, $t4:ty, $t5:ty, $t6:ty $(,)?) -> $ret:ty, $body:expr $(,)?
    ) => {
        $crate::__guest_function_build!(
            $ctx, $name,
            [(0, $t0), (1, $t1), (2, $t2), (3, $t3), (4, $t4), (5, $t5), (6, $t6)] -> $ret, $body
        )
    };
    (
        $ctx:expr, $name:expr,
        ($t0:ty, $t1:ty, $t2:ty, $t3:ty, $t4:ty, $t5:ty, $t6:ty, $t7:ty $(,)?) -> $ret:ty,
        $body:expr $(,)?
    ) => {
        $crate::__guest_function_build!(
            $ctx, $name,
            [(0, $t0), (1, $t1), (2, $t2), (3, $t3), (4, $t4), (5, $t5), (6, $t6), (7, $t7)]
                -> $ret, $body
        )
    };
    (
        $ctx:expr, $name:expr,
        ($t0:ty, $t1:ty, $t2:ty, $t3:ty, $t4:ty, $t5:ty, $t6:ty, $t7:ty, $t8:ty $(,)?) -> $ret:ty,
        $body:expr $(,)?
    ) => {
        $crate::__guest_function_build!(
            $ctx, $name,
            [(0, $t0), (1, $t1), (2, $t2), (3, $t3), (4, $t4), (5, $t5), (6, $t6), (7, $t7), (8, $t8)]
                -> $ret, $body
        )
    };
    (
        $ctx:expr, $name:expr,
        ($t0:ty, $t1:ty, $t2:ty, $t3:ty, $t4:ty, $t5:ty, $t6:ty, $t7:ty, $t8:ty, $t9:ty $(,)?)
            -> $ret:ty,
        $body:expr $(,)?
    ) => {
        $crate::__guest_function_build!(
            $ctx, $name,
            [
                (0, $t0), (1, $t1), (2, $t2), (3, $t3), (4, $t4),
                (5, $t5), (6, $t6), (7, $t7), (8, $t8), (9, $t9)
            ] -> $ret, $body
        )
    };
    (
        $ctx:expr, $name:expr,
        ($t0:ty, $t1:ty, $t2:ty, $t3:ty, $t4:ty, $t5:ty, $t6:ty, $t7:ty, $t8:ty, $t9:ty, $t10:ty $(,)?)
            -> $ret:ty,
        $body:expr $(,)?
    ) => {
        $crate::__guest_function_build!(
            $ctx, $name,
            [
                (0, $t0), (1, $t1), (2, $t2), (3, $t3), (4, $t4),
                (5, $t5), (6, $t6), (7, $t7), (8, $t8), (9, $t9), (10, $t10)
            ] -> $ret, $body
        )
    };
}

#[cfg(test)]
mod macros_test;
