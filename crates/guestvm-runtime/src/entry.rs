// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

//! The guest's owned state and its initialization sequence.
//!
//! The source keeps this as global mutable state (`pPeb`, the registry, the
//! saved exit target, the allocator cursor) because it is a single-threaded
//! C program. Here it is an explicitly-owned [`GuestContext`], created once
//! in [`entry_point`] and threaded through every subsequent operation -
//! there is nothing implicit about what state an operation can touch.

#[cfg(any(test, feature = "std"))]
use std::string::String;

#[cfg(not(any(test, feature = "std")))]
use alloc::string::String;

use guestvm_abi::peb::{GuestPtr, ProcessEnvironmentBlock};

use crate::buffer::SharedBufferStack;
use crate::dispatcher::{DispatcherState, FallbackHandler, Handler};
use crate::error::{ErrorCode, GuestError, GuestResult};
use crate::heap::BumpAllocator;
use crate::memory::SharedMemory;
use crate::outb::Outb;
use crate::outbound::HostFunctionCatalog;
use crate::registry::FunctionRegistry;

/// Everything the guest owns for the lifetime of the sandbox: the PEB
/// snapshot, memory/signalling handles, the function registry, the bump
/// allocator, and the two shared-buffer stacks.
pub struct GuestContext<M: SharedMemory, O: Outb> {
    pub peb: ProcessEnvironmentBlock,
    pub memory: M,
    pub outb: O,
    pub registry: FunctionRegistry<Handler<M, O>>,
    pub heap: BumpAllocator,
    pub input: SharedBufferStack,
    pub output: SharedBufferStack,
    pub host_catalog: HostFunctionCatalog,
    pub fallback: Option<FallbackHandler<M, O>>,
    pub max_log_level: u8,
    pub(crate) state: DispatcherState,
}

impl<M: SharedMemory, O: Outb> GuestContext<M, O> {
    /// The dispatcher's current state, exposed for introspection and tests.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> DispatcherState {
        self.state
    }

    /// Clears the guest-error buffer back to "no record written."
    ///
    /// The region holds a single length-prefixed record, not a
    /// shared-buffer stack; "clear" means writing a zero length.
    pub fn clear_guest_error(&mut self) {
        if self.peb.guest_error.is_empty() {
            return;
        }
        self.memory.write(self.peb.guest_error.ptr, 0u32);
    }

    /// Splits off the fields a handler needs into a [`CallContext`],
    /// leaving `registry` and `fallback` behind.
    ///
    /// A handler stored *inside* `self.registry` cannot also receive `&mut
    /// self` - that would borrow the field it lives in and the whole
    /// struct at once. Destructuring the fields a handler actually needs
    /// into their own borrows (ordinary disjoint-field borrowing, no
    /// `unsafe`) resolves this the same way the rest of the crate avoids
    /// the source's global mutable state: name exactly what each operation
    /// touches.
    pub(crate) fn call_context(&mut self) -> CallContext<'_, M, O> {
        CallContext {
            peb: self.peb,
            memory: &mut self.memory,
            outb: &mut self.outb,
            heap: &mut self.heap,
            input: &self.input,
            output: &self.output,
            host_catalog: &self.host_catalog,
        }
    }
}

/// The subset of [`GuestContext`] a handler or an outbound call needs:
/// everything except the function registry and the fallback dispatcher
/// (which only `dispatcher::dispatch` consults, never a handler itself).
pub struct CallContext<'a, M: SharedMemory, O: Outb> {
    pub peb: ProcessEnvironmentBlock,
    pub memory: &'a mut M,
    pub outb: &'a mut O,
    pub heap: &'a mut BumpAllocator,
    pub input: &'a SharedBufferStack,
    pub output: &'a SharedBufferStack,
    pub host_catalog: &'a HostFunctionCatalog,
}

/// Registers guest functions. Implemented by the embedding guest image;
/// called once from [`entry_point`] before the registry is sealed.
pub trait GuestMain<M: SharedMemory, O: Outb> {
    fn register_functions(&self, ctx: &mut GuestContext<M, O>) -> GuestResult<()>;
}

impl<M: SharedMemory, O: Outb, F> GuestMain<M, O> for F
where
    F: Fn(&mut GuestContext<M, O>) -> GuestResult<()>,
{
    fn register_functions(&self, ctx: &mut GuestContext<M, O>) -> GuestResult<()> {
        self(ctx)
    }
}

/// The guest's entry point, called by the host after loading the image.
///
/// Mirrors the source's `entry_point(pPeb, pseed, os_page_size,
/// max_log_level)`, minus the parts that are genuinely architecture
/// startup code (installing the stack-protector cookie, switching onto the
/// guest's own stack) rather than runtime logic - those live in the
/// platform-specific boot stub that calls into this function, not here.
///
/// Returns `Ok(ctx)` with a fully initialized, finalized context, or an
/// error if initialization itself failed (in which case the caller is
/// expected to abort rather than attempt a dispatch).
pub fn entry_point<M: SharedMemory, O: Outb>(
    peb_address: GuestPtr,
    memory: M,
    outb: O,
    os_page_size: u32,
    max_log_level: u8,
    guest_main: impl GuestMain<M, O>,
) -> GuestResult<GuestContext<M, O>> {
    if peb_address.is_null() {
        return Err(GuestError::new(
            ErrorCode::UnknownError,
            "entry_point called with a null PEB address",
        ));
    }
    log::debug!("entry_point: peb at {peb_address:?}, os_page_size={os_page_size}, max_log_level={max_log_level}");

    let peb: ProcessEnvironmentBlock = memory.read(peb_address);
    let _ = os_page_size; // recorded by the boot stub; not consulted here.

    let heap = BumpAllocator::new(
        peb.guest_heap.ptr,
        peb.guest_heap.len,
        peb.security_cookie_seed,
    );
    log::trace!("entry_point: heap arena {} bytes at {:?}", peb.guest_heap.len, peb.guest_heap.ptr);

    let input = SharedBufferStack::new(peb.input_data);
    let output = SharedBufferStack::new(peb.output_data);

    let host_catalog = if peb.host_function_definitions.is_empty() {
        HostFunctionCatalog::empty()
    } else {
        let bytes = memory.slice(
            peb.host_function_definitions.ptr,
            peb.host_function_definitions.len as usize,
        );
        HostFunctionCatalog::parse(bytes)?
    };
    log::debug!("entry_point: host catalog has {} function(s)", host_catalog.len());

    let mut ctx = GuestContext {
        peb,
        memory,
        outb,
        registry: FunctionRegistry::new(),
        heap,
        input,
        output,
        host_catalog,
        fallback: None,
        max_log_level,
        state: DispatcherState::Idle,
    };

    ctx.clear_guest_error();
    guest_main.register_functions(&mut ctx)?;
    ctx.registry.finalize()?;
    log::debug!("entry_point: registry finalized with {} function(s)", ctx.registry.len());

    // peb.guest_function_dispatch_ptr would be set here in a real
    // partition, to the address of an extern "C" trampoline the host's VM
    // exit handler jumps back into; publishing a real callable address
    // from safe Rust requires an architecture-specific trampoline outside
    // this crate's scope (see dispatcher::dispatch, called by that
    // trampoline on every host-triggered entry).

    Ok(ctx)
}
