// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

//! Shared ABI definitions between the guest runtime and its host.
//!
//! This crate defines the contract between the two halves of a sandboxed
//! micro-VM: the host process that creates the partition and the guest
//! runtime that loads into it. Both sides are built against the exact same
//! copy of this crate, so the layouts here are the only thing standing
//! between "the host reads garbage" and a working sandbox.
//!
//! # Design principles
//!
//! - **No dependencies**: pure data types, 100% host-testable without a
//!   hypervisor.
//! - **Stable layout**: every shared-memory type uses `#[repr(C)]` (or
//!   `#[repr(u8)]` / `#[repr(transparent)]` for enums and newtypes) so the
//!   layout is bit-identical on both sides of the boundary.
//! - **64-bit only**: guests target 64-bit platforms exclusively.
//!
//! # Modules
//!
//! - [`peb`]: the Process Environment Block, the single fixed-address record
//!   through which the host and guest agree on every other shared region.
//! - [`types`]: wire-level tags for call parameters, return values and error
//!   codes.
//! - [`ports`]: the port-I/O contract (`OUTB`) used for guest-to-host
//!   signalling.

#![no_std]

pub mod peb;
pub mod ports;
pub mod types;

pub use peb::{BufferRegion, ProcessEnvironmentBlock};
pub use types::{ErrorCode, ParameterType, ReturnType};
