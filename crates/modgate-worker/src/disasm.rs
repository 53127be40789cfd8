//! Machine code extraction and disassembly.
//!
//! A compiled module serializes to an ELF image whose `.text` section holds
//! the code of every function, each covered by a symbol named
//! `wasm[M]::function[N]` (optionally followed by `::<name>`). [`CompiledImage`]
//! indexes those symbols by function index and [`Disassembler`] turns the
//! bytes into one instruction per line with capstone.

use std::collections::HashMap;
use std::fmt::Write as _;

use capstone::prelude::*;
use object::{Object, ObjectSection, ObjectSymbol, SymbolKind};

use modgate_core::Platform;

use crate::error::{Result, SandboxError};

/// Machine code of one compiled function.
#[derive(Debug, Clone, Copy)]
pub struct FunctionCode<'a> {
    /// Raw instruction bytes.
    pub bytes: &'a [u8],
    /// Offset of the function inside the image's text section.
    pub address: u64,
}

/// Function bodies of a serialized module, keyed by function index.
pub struct CompiledImage<'a> {
    functions: HashMap<u32, FunctionCode<'a>>,
}

impl<'a> CompiledImage<'a> {
    /// Index the function symbols of a serialized module image.
    pub fn parse(image: &'a [u8]) -> Result<Self> {
        let file = object::File::parse(image)
            .map_err(|e| SandboxError::Disassembly(format!("unreadable compiled image: {e}")))?;
        let text = file
            .section_by_name(".text")
            .ok_or_else(|| SandboxError::Disassembly("compiled image has no .text section".into()))?;
        let text_address = text.address();
        let text_data = text
            .data()
            .map_err(|e| SandboxError::Disassembly(e.to_string()))?;

        let mut functions = HashMap::new();
        for symbol in file.symbols() {
            if symbol.kind() != SymbolKind::Text || symbol.section_index() != Some(text.index()) {
                continue;
            }
            let Some(index) = symbol.name().ok().and_then(function_index) else {
                continue;
            };

            let start = symbol.address().saturating_sub(text_address);
            let end = start.saturating_add(symbol.size());
            let (Ok(start_idx), Ok(end_idx)) = (usize::try_from(start), usize::try_from(end)) else {
                continue;
            };
            let Some(bytes) = text_data.get(start_idx..end_idx) else {
                tracing::debug!(index, start, end, "function symbol outside .text, ignoring");
                continue;
            };

            functions.insert(index, FunctionCode { bytes, address: start });
        }

        Ok(Self { functions })
    }

    /// Code for the function with the given index, if it was compiled.
    pub fn function(&self, index: u32) -> Option<FunctionCode<'a>> {
        self.functions.get(&index).copied()
    }

    /// Number of functions found in the image.
    pub(crate) fn len(&self) -> usize {
        self.functions.len()
    }
}

/// Extract `N` from a `wasm[M]::function[N]...` symbol name.
fn function_index(name: &str) -> Option<u32> {
    let rest = name.strip_prefix("wasm[")?;
    let (_, rest) = rest.split_once("]::function[")?;
    let (index, _) = rest.split_once(']')?;
    index.parse().ok()
}

/// Instruction printer for one target platform.
pub struct Disassembler {
    capstone: Capstone,
    platform: Platform,
}

impl Disassembler {
    /// Disassembler for the platform this worker runs on.
    pub fn for_host() -> Result<Self> {
        let platform = Platform::host()
            .ok_or_else(|| SandboxError::UnsupportedHost(std::env::consts::ARCH.to_owned()))?;
        Self::for_platform(platform)
    }

    /// Disassembler for an explicit platform.
    pub fn for_platform(platform: Platform) -> Result<Self> {
        let capstone = match platform {
            Platform::X86 => Capstone::new()
                .x86()
                .mode(arch::x86::ArchMode::Mode32)
                .syntax(arch::x86::ArchSyntax::Intel)
                .build(),
            Platform::X64 => Capstone::new()
                .x86()
                .mode(arch::x86::ArchMode::Mode64)
                .syntax(arch::x86::ArchSyntax::Intel)
                .build(),
            Platform::Arm32 => Capstone::new().arm().mode(arch::arm::ArchMode::Arm).build(),
            Platform::Arm64 => Capstone::new()
                .arm64()
                .mode(arch::arm64::ArchMode::Arm)
                .build(),
        }
        .map_err(|e| SandboxError::Disassembly(e.to_string()))?;

        Ok(Self { capstone, platform })
    }

    /// The platform this disassembler decodes.
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Render `code` as `address: mnemonic operands` lines.
    pub fn render(&self, code: &[u8], address: u64) -> Result<String> {
        let instructions = self
            .capstone
            .disasm_all(code, address)
            .map_err(|e| SandboxError::Disassembly(e.to_string()))?;

        let mut listing = String::new();
        for insn in instructions.iter() {
            let mnemonic = insn.mnemonic().unwrap_or("??");
            match insn.op_str() {
                Some(ops) if !ops.is_empty() => {
                    let _ = writeln!(listing, "  {:08x}: {mnemonic} {ops}", insn.address());
                }
                _ => {
                    let _ = writeln!(listing, "  {:08x}: {mnemonic}", insn.address());
                }
            }
        }
        Ok(listing)
    }
}
