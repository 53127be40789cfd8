//! One-shot worker process entry point.
//!
//! A worker process serves exactly one request: it reads one framed module
//! from standard input, runs the operation it was started for and writes the
//! output to standard output. A guest that exits through `proc_exit` has
//! finished normally whatever its code, so its output is kept. Only an error
//! (a bad frame, a module that cannot be loaded, a trap or running out of
//! fuel) must end the process with a failure status, which makes the worker
//! host reset the connection.

use std::io::{BufWriter, Read, Write};

use modgate_core::{OperationKind, read_frame};

use crate::config::SandboxConfig;
use crate::error::Result;
use crate::runtime::SandboxRuntime;

/// Serve one request read from stdin, writing output to stdout.
pub fn run_worker(kind: OperationKind, config: &SandboxConfig) -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve_one(kind, config, &mut stdin.lock(), &mut stdout.lock())
}

/// Serve one request from `input`.
///
/// In execute mode the guest writes to the real stdout through WASI, so
/// `output` is only used for disassembly listings.
pub fn serve_one<R: Read, W: Write>(
    kind: OperationKind,
    config: &SandboxConfig,
    input: &mut R,
    output: &mut W,
) -> Result<()> {
    let module = read_frame(input, config.max_module_size)?;
    tracing::debug!(%kind, size = module.len(), "received module");

    let runtime = SandboxRuntime::new(kind, config.clone())?;
    match kind {
        OperationKind::Execute => {
            let code = runtime.execute(&module)?;
            tracing::debug!(code, "module exited");
            Ok(())
        }
        OperationKind::Disassemble => {
            let mut writer = BufWriter::new(output);
            runtime.disassemble(&module, &mut writer)?;
            writer.flush()?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SandboxError;
    use modgate_core::{FrameError, encode_frame};

    #[test]
    fn disassemble_request_writes_listing() {
        let wasm = wat::parse_str(r#"(module (func (export "answer") (result i32) i32.const 42))"#).unwrap();
        let frame = encode_frame(&wasm);
        let mut output = Vec::new();

        serve_one(
            OperationKind::Disassemble,
            &SandboxConfig::default(),
            &mut frame.as_bytes(),
            &mut output,
        )
        .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with("; answer\n"), "{text}");
    }

    fn execute(wat: &str) -> Result<()> {
        let frame = encode_frame(&wat::parse_str(wat).unwrap());
        serve_one(
            OperationKind::Execute,
            &SandboxConfig::default(),
            &mut frame.as_bytes(),
            &mut Vec::new(),
        )
    }

    #[test]
    fn execute_request_succeeds() {
        execute(r#"(module (func (export "_start")))"#).unwrap();
    }

    #[test]
    fn guest_exit_code_is_not_a_failure() {
        execute(
            r#"(module
                (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
                (memory (export "memory") 1)
                (func (export "_start") (call $exit (i32.const 1))))"#,
        )
        .unwrap();
    }

    #[test]
    fn guest_trap_is_a_failure() {
        let err = execute(r#"(module (func (export "_start") unreachable))"#).unwrap_err();
        assert!(matches!(err, SandboxError::Trap(_)));
    }

    #[test]
    fn unterminated_frame_is_rejected() {
        let mut output = Vec::new();
        let err = serve_one(
            OperationKind::Execute,
            &SandboxConfig::default(),
            &mut &b"AGFzbQEAAAA="[..],
            &mut output,
        )
        .unwrap_err();
        assert!(matches!(err, SandboxError::Frame(FrameError::Truncated)));
    }

    #[test]
    fn frame_over_module_limit_is_rejected() {
        let frame = encode_frame(&[0u8; 64]);
        let config = SandboxConfig::new().with_max_module_size(16);
        let mut output = Vec::new();
        let err = serve_one(OperationKind::Disassemble, &config, &mut frame.as_bytes(), &mut output).unwrap_err();
        assert!(matches!(err, SandboxError::Frame(FrameError::TooLarge { .. })));
    }
}
