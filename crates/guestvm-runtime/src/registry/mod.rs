// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

//! The function registry: a sorted vector of guest function definitions,
//! searched by binary search on every dispatch.
//!
//! Registration order is arbitrary - user code may register in any order -
//! so the registry is built as an unsorted vector and only sorted once, at
//! [`FunctionRegistry::finalize`]. A hash table would avoid the sort but
//! costs an allocation strategy of its own for no benefit at the expected
//! scale of 10-100 registered functions.
//!
//! Generic over a handler type `H`: the wire-level [`FunctionDefinition`]
//! travels to the host (and is reused verbatim to parse the host's own
//! catalog), but the thing actually invoked on a match lives entirely in
//! this process, so it is carried alongside as ordinary Rust data rather
//! than as a callable raw pointer.

#[cfg(test)]
mod mod_test;

#[cfg(any(test, feature = "std"))]
use std::{string::String, vec::Vec};

#[cfg(not(any(test, feature = "std")))]
use alloc::{string::String, vec::Vec};

use guestvm_abi::types::{ParameterType, ReturnType};

use crate::error::{ErrorCode, GuestError, GuestResult};

/// One function's signature, in the wire shape shared with the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionDefinition {
    pub name: String,
    pub parameter_types: Vec<ParameterType>,
    pub return_type: ReturnType,
    /// Opaque identifier surfaced to the host catalog. Not a callable
    /// address on the guest side - see module docs.
    pub function_pointer: u64,
}

impl FunctionDefinition {
    #[must_use]
    pub const fn new(
        name: String,
        parameter_types: Vec<ParameterType>,
        return_type: ReturnType,
        function_pointer: u64,
    ) -> Self {
        Self {
            name,
            parameter_types,
            return_type,
            function_pointer,
        }
    }
}

/// Sorted-vector registry pairing a [`FunctionDefinition`] with its
/// in-process handler of type `H`.
///
/// Mutable only before [`Self::finalize`]; immutable (and searchable) after.
pub struct FunctionRegistry<H> {
    entries: Vec<(FunctionDefinition, H)>,
    finalized: bool,
}

impl<H> FunctionRegistry<H> {
    /// Creates an empty, unfinalized registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            finalized: false,
        }
    }

    /// Appends a definition and its handler. Fails if the registry has
    /// already been finalized.
    pub fn register(&mut self, definition: FunctionDefinition, handler: H) -> GuestResult<()> {
        if self.finalized {
            return Err(GuestError::new(
                ErrorCode::UnknownError,
                "cannot register a guest function after the registry has been finalized",
            ));
        }
        self.entries.push((definition, handler));
        Ok(())
    }

    /// Sorts the registry by name and seals it against further mutation.
    ///
    /// Rejects duplicate names: the source leaves this case's behavior
    /// undefined, so this implementation treats the duplicate as a
    /// programming error rather than silently picking one via sort
    /// stability.
    pub fn finalize(&mut self) -> GuestResult<()> {
        self.entries.sort_by(|a, b| a.0.name.cmp(&b.0.name));
        if self.entries.windows(2).any(|w| w[0].0.name == w[1].0.name) {
            return Err(GuestError::new(
                ErrorCode::UnknownError,
                "duplicate guest function registration",
            ));
        }
        self.finalized = true;
        Ok(())
    }

    /// Returns true once [`Self::finalize`] has run.
    #[inline]
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Looks up a function by exact, case-sensitive name. Requires the
    /// registry to be finalized.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<(&FunctionDefinition, &H)> {
        debug_assert!(self.finalized, "lookup before finalize");
        self.entries
            .binary_search_by(|(def, _)| def.name.as_str().cmp(name))
            .ok()
            .map(|idx| {
                let (def, handler) = &self.entries[idx];
                (def, handler)
            })
    }

    /// Number of registered functions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no functions are registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<H> Default for FunctionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}
