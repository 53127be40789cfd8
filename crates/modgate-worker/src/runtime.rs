//! Sandbox runtime.
//!
//! [`SandboxRuntime`] is the main entry point inside a worker process. It owns
//! the wasmtime [`Engine`] and the [`SandboxConfig`] limits, and implements the
//! two worker behaviours:
//!
//! - [`SandboxRuntime::execute`] instantiates the module against WASI
//!   preview 1 with the process's stdout and stderr inherited, and calls its
//!   `_start` entry point.
//! - [`SandboxRuntime::disassemble`] compiles every function of the module
//!   without running anything and prints the machine code of each prepared
//!   member.

use std::io::Write;

use wasmtime::{Engine, Linker, Module, Store, StoreLimits, StoreLimitsBuilder, Trap};
use wasmtime_wasi::preview1::{self, WasiP1Ctx};
use wasmtime_wasi::{I32Exit, WasiCtxBuilder};

use modgate_core::OperationKind;

use crate::config::SandboxConfig;
use crate::disasm::{CompiledImage, Disassembler};
use crate::error::{Result, SandboxError};
use crate::prepare::{ModuleMetadata, prepare_members};

/// Name the guest sees as `argv[0]`.
const GUEST_PROGRAM_NAME: &str = "module";

/// Per-execution state stored in the wasmtime [`Store`].
struct HostState {
    wasi: WasiP1Ctx,
    limits: StoreLimits,
}

/// What a disassembly pass produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepareSummary {
    /// Members whose code was written to the output.
    pub emitted: usize,
    /// Members that were prepared but could not be located or disassembled.
    pub skipped: usize,
}

/// The WebAssembly sandbox runtime for one worker process.
pub struct SandboxRuntime {
    engine: Engine,
    config: SandboxConfig,
}

impl SandboxRuntime {
    /// Create a runtime for the given operation kind.
    ///
    /// Fuel metering is only compiled in for [`OperationKind::Execute`]; a
    /// disassembly should show the module's own code, not the metering
    /// instrumentation.
    pub fn new(kind: OperationKind, config: SandboxConfig) -> Result<Self> {
        let mut wasm_config = wasmtime::Config::new();
        wasm_config.consume_fuel(kind == OperationKind::Execute);
        wasm_config.wasm_memory64(false);

        let engine = Engine::new(&wasm_config)
            .map_err(|e| SandboxError::Compilation(format!("failed to create wasm engine: {e}")))?;

        tracing::debug!(%kind, "sandbox runtime initialized");

        Ok(Self { engine, config })
    }

    /// Return the current [`SandboxConfig`].
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Compile a module. Failure here means the module cannot be loaded at
    /// all, which is the only fatal condition of a disassembly pass.
    pub fn load(&self, wasm_bytes: &[u8]) -> Result<Module> {
        if wasm_bytes.len() > self.config.max_module_size {
            return Err(SandboxError::Compilation(format!(
                "module is {} bytes, limit is {}",
                wasm_bytes.len(),
                self.config.max_module_size
            )));
        }

        let module = Module::new(&self.engine, wasm_bytes)
            .map_err(|e| SandboxError::Compilation(e.to_string()))?;

        tracing::debug!(size = wasm_bytes.len(), "compiled wasm module");
        Ok(module)
    }

    /// Run the module's `_start` entry point and return the guest exit code.
    ///
    /// Anything the guest writes to stdout goes straight to the worker
    /// process's stdout. A trap is returned as an error; the caller is
    /// expected to end the process with a failure status.
    pub fn execute(&self, wasm_bytes: &[u8]) -> Result<i32> {
        let module = self.load(wasm_bytes)?;

        let wasi = WasiCtxBuilder::new()
            .inherit_stdout()
            .inherit_stderr()
            .args(&[GUEST_PROGRAM_NAME])
            .build_p1();
        let limits = StoreLimitsBuilder::new()
            .memory_size(self.config.max_memory)
            .build();

        let mut store = Store::new(&self.engine, HostState { wasi, limits });
        store.limiter(|state| &mut state.limits);
        store
            .set_fuel(self.config.max_fuel)
            .map_err(|e| SandboxError::Instantiation(e.to_string()))?;

        let mut linker: Linker<HostState> = Linker::new(&self.engine);
        preview1::add_to_linker_sync(&mut linker, |state: &mut HostState| &mut state.wasi)
            .map_err(|e| SandboxError::Instantiation(e.to_string()))?;

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| SandboxError::Instantiation(e.to_string()))?;

        let start = instance
            .get_typed_func::<(), ()>(&mut store, "_start")
            .map_err(|_| SandboxError::MissingEntryPoint)?;

        let outcome = start.call(&mut store, ());
        std::io::stdout().flush()?;

        match outcome {
            Ok(()) => Ok(0),
            Err(e) => {
                if let Some(exit) = e.downcast_ref::<I32Exit>() {
                    return Ok(exit.0);
                }
                if e.downcast_ref::<Trap>() == Some(&Trap::OutOfFuel) {
                    return Err(SandboxError::FuelExhausted {
                        limit: self.config.max_fuel,
                    });
                }
                Err(SandboxError::Trap(format!("{e:#}")))
            }
        }
    }

    /// Compile every member of the module and write its disassembly to `out`.
    ///
    /// Individual members that cannot be located in the compiled image or
    /// disassembled are skipped; only a module that fails to compile is an
    /// error.
    pub fn disassemble<W: Write>(&self, wasm_bytes: &[u8], out: &mut W) -> Result<PrepareSummary> {
        let module = self.load(wasm_bytes)?;
        let image = module
            .serialize()
            .map_err(|e| SandboxError::Disassembly(e.to_string()))?;

        let metadata = ModuleMetadata::read(wasm_bytes, &module)?;
        let compiled = CompiledImage::parse(&image)?;
        let disassembler = Disassembler::for_host()?;
        tracing::debug!(
            platform = %disassembler.platform(),
            functions = compiled.len(),
            members = metadata.members.len(),
            "compiled image parsed"
        );

        let mut summary = PrepareSummary::default();
        for member in prepare_members(&metadata.members) {
            let Some(code) = compiled.function(member.index) else {
                tracing::debug!(member = %member.name, "no compiled code for member, skipping");
                summary.skipped += 1;
                continue;
            };

            let listing = match disassembler.render(code.bytes, code.address) {
                Ok(listing) => listing,
                Err(e) => {
                    tracing::debug!(member = %member.name, error = %e, "disassembly failed, skipping");
                    summary.skipped += 1;
                    continue;
                }
            };

            for header in member.headers() {
                writeln!(out, "; {header}")?;
            }
            out.write_all(listing.as_bytes())?;
            writeln!(out)?;
            summary.emitted += 1;
        }

        out.flush()?;
        tracing::debug!(emitted = summary.emitted, skipped = summary.skipped, "prepare pass finished");
        Ok(summary)
    }
}
