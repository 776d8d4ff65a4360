// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

//! In-process demo host.
//!
//! There is no hypervisor here: this binary plays both sides of the
//! boundary in a single process, the way `tests/common/test_vm.rs` drives a
//! VM directly in the teacher's own integration tests. It wires up a
//! [`MockMemory`]-backed PEB, registers a small handful of guest functions,
//! pushes one call frame onto the input buffer, runs [`dispatch`] and prints
//! whatever lands on the output buffer (or the guest-error buffer, on a
//! structured failure).
//!
//! This is a demonstration harness, not a loader: it has no business
//! mapping an ELF guest image or talking to a real hypervisor, so
//! `--guest-image` is accepted and logged but otherwise unused.

#![allow(clippy::print_stdout, reason = "this binary's entire purpose is reporting the call result on stdout")]

use clap::{Parser, Subcommand};
use guestvm_abi::peb::{BufferRegion, GuestPtr, ProcessEnvironmentBlock};
use guestvm_runtime::dispatcher::dispatch;
use guestvm_runtime::error::GuestError;
use guestvm_runtime::memory::{MockMemory, SharedMemory};
use guestvm_runtime::outb::MockOutb;
use guestvm_runtime::protocol::{CallType, FunctionCallFrame, FunctionCallResult, Parameter};
use guestvm_runtime::{abort_with_code, entry_point, guest_function, GuestContext};
use guestvm_abi::types::ReturnType;

const PEB_ADDR: u64 = 0;
const INPUT_ADDR: u64 = 0x1_0000;
const OUTPUT_ADDR: u64 = 0x2_0000;
const HEAP_ADDR: u64 = 0x3_0000;
const GUEST_ERROR_ADDR: u64 = 0x4_0000;
const PANIC_ADDR: u64 = 0x4_1000;
const TOTAL_SIZE: usize = 0x6_0000;

/// Sandbox parameters and the function to invoke, mirroring the shape of
/// the teacher's own binaries (`lona-vm`) in spirit: arguments describe the
/// partition, not the language-level request, which is its own subcommand.
#[derive(Parser, Debug)]
#[command(version, about = "Drives a guest registry through one dispatch cycle in-process", long_about = None)]
struct Args {
    /// Size, in bytes, of the guest's bump-allocator arena.
    #[arg(long, default_value_t = 4096)]
    heap_size: u64,

    /// Size, in bytes, of each shared-buffer stack (input and output).
    #[arg(long, default_value_t = 4096)]
    buffer_size: u64,

    /// Path to a guest image. Accepted for symmetry with a real host's
    /// configuration surface; this demo only ever runs its own built-in
    /// registry, so the path is logged and otherwise ignored.
    #[arg(long)]
    guest_image: Option<std::path::PathBuf>,

    #[command(subcommand)]
    call: Call,
}

#[derive(Subcommand, Debug)]
enum Call {
    /// Calls the built-in `Add` function.
    Add { a: i32, b: i32 },
    /// Calls the built-in `Echo` function.
    Echo { text: String },
    /// Calls the built-in `Crash` function, which aborts unconditionally.
    Crash,
}

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("failed to initialize guest context: {0}")]
    Init(#[from] GuestError),
}

fn main() -> Result<(), DemoError> {
    env_logger::init();
    let args = Args::parse();

    if let Some(path) = &args.guest_image {
        log::info!("--guest-image {} given; this demo ignores it and runs its built-in registry", path.display());
    }

    let mut memory = MockMemory::new(TOTAL_SIZE, GuestPtr::new(0));

    let mut peb = ProcessEnvironmentBlock::default();
    peb.security_cookie_seed = 0xD15E_A5E5_C0FF_EE00;
    peb.input_data = BufferRegion::new(GuestPtr::new(INPUT_ADDR), args.buffer_size);
    peb.output_data = BufferRegion::new(GuestPtr::new(OUTPUT_ADDR), args.buffer_size);
    peb.guest_heap = BufferRegion::new(GuestPtr::new(HEAP_ADDR), args.heap_size);
    peb.guest_error = BufferRegion::new(GuestPtr::new(GUEST_ERROR_ADDR), 256);
    peb.guest_panic_context = BufferRegion::new(GuestPtr::new(PANIC_ADDR), 256);

    memory.write(GuestPtr::new(PEB_ADDR), peb);
    memory.write(peb.input_data.ptr, 8u64);
    memory.write(peb.output_data.ptr, 8u64);

    let mut ctx = entry_point(
        GuestPtr::new(PEB_ADDR),
        memory,
        MockOutb::default(),
        4096,
        0,
        register_demo_functions,
    )?;

    log::debug!("registry holds {} function(s)", ctx.registry.len());

    let frame = build_call_frame(&args.call);
    push_call_frame(&mut ctx, &frame);

    dispatch(&mut ctx);

    report_outcome(&mut ctx);

    Ok(())
}

/// Registers the demo guest functions. Shaped as a [`GuestMain`] so it
/// plugs into [`entry_point`] exactly like a real guest image's own
/// registration callback would.
///
/// [`GuestMain`]: guestvm_runtime::entry::GuestMain
fn register_demo_functions(ctx: &mut GuestContext<MockMemory, MockOutb>) -> guestvm_runtime::GuestResult<()> {
    guest_function!(ctx, "Add", (i32, i32) -> i32, |_ctx, a: i32, b: i32| Ok(a + b))?;
    guest_function!(ctx, "Echo", (String) -> String, |_ctx, text: String| Ok(text))?;
    guest_function!(ctx, "Crash", () -> (), |call_ctx| -> guestvm_runtime::GuestResult<()> {
        abort_with_code(call_ctx, 7, "boom");
        Ok(())
    })?;
    Ok(())
}

fn build_call_frame(call: &Call) -> FunctionCallFrame {
    match call {
        Call::Add { a, b } => FunctionCallFrame {
            name: "Add".into(),
            call_type: CallType::Guest,
            expected_return_type: ReturnType::Int32,
            parameters: vec![Parameter::Int32(*a), Parameter::Int32(*b)],
        },
        Call::Echo { text } => FunctionCallFrame {
            name: "Echo".into(),
            call_type: CallType::Guest,
            expected_return_type: ReturnType::String,
            parameters: vec![Parameter::String(text.clone())],
        },
        Call::Crash => FunctionCallFrame {
            name: "Crash".into(),
            call_type: CallType::Guest,
            expected_return_type: ReturnType::Void,
            parameters: Vec::new(),
        },
    }
}

fn push_call_frame(ctx: &mut GuestContext<MockMemory, MockOutb>, frame: &FunctionCallFrame) {
    let framed = frame.encode_framed();
    ctx.input
        .push(&mut ctx.memory, &framed)
        .expect("demo call frame exceeds the configured input buffer size");
}

/// Reads back whatever `dispatch` left behind: a reply on the output
/// buffer, or a structured error on the guest-error buffer.
fn report_outcome(ctx: &mut GuestContext<MockMemory, MockOutb>) {
    log::debug!("OUTB signals observed: {:?}", ctx.outb.calls);

    if let Some((_, code)) = ctx.outb.calls.iter().find(|(port, _)| *port == guestvm_runtime::outb::PORT_ABORT) {
        println!("guest aborted with code {code}");
        let region = ctx.peb.guest_panic_context;
        let len: u32 = ctx.memory.read(region.ptr);
        let message = ctx.memory.slice(region.ptr.offset(4), len as usize);
        println!("panic message: {}", String::from_utf8_lossy(message));
        return;
    }

    let region = ctx.peb.guest_error;
    let error_len: u32 = ctx.memory.read(region.ptr);
    if error_len > 0 {
        let bytes = ctx.memory.slice(region.ptr, error_len as usize + 4).to_vec();
        match guestvm_runtime::protocol::GuestErrorRecord::decode_framed(&bytes) {
            Ok(record) => println!("guest error: {:?}: {}", record.code, record.message),
            Err(err) => println!("guest error buffer was set but malformed: {err:?}"),
        }
        return;
    }

    match ctx.output.pop(&mut ctx.memory) {
        Ok(bytes) => match FunctionCallResult::decode_framed(&bytes) {
            Ok(result) => println!("reply: {:?}", result.value),
            Err(err) => println!("reply frame was malformed: {err:?}"),
        },
        Err(err) => println!("no reply on the output buffer: {err}"),
    }
}
