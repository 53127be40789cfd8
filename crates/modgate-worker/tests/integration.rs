//! Integration tests for the worker crate.
//!
//! These drive the public API the way a worker process does: a framed module
//! in, disassembly text out.

use modgate_core::{OperationKind, encode_frame};
use modgate_worker::exec::serve_one;
use modgate_worker::{SandboxConfig, SandboxRuntime};

const HINTED_MODULE: &str = r#"
(module
    (func (export "sum") (param i64 i64) (result i64)
        local.get 0
        local.get 1
        i64.add)
    (func (export "scale") (param f32) (result f32)
        local.get 0
        f32.const 2
        f32.mul)
    (func (export "plain") (result i32)
        i32.const 1)
    (@custom "modgate.instantiate"
        "[{\"member\":\"sum\",\"types\":[\"i64\",\"i64\"]},{\"member\":\"sum\",\"types\":[\"i32\"]},{\"member\":\"scale\",\"types\":[\"i32\"]}]"))
"#;

fn disassemble(wat_text: &str) -> String {
    let wasm = wat::parse_str(wat_text).expect("valid wat");
    let frame = encode_frame(&wasm);
    let mut output = Vec::new();
    serve_one(
        OperationKind::Disassemble,
        &SandboxConfig::default(),
        &mut frame.as_bytes(),
        &mut output,
    )
    .expect("disassembly succeeds");
    String::from_utf8(output).expect("utf-8 listing")
}

#[test]
fn hints_select_instantiations() {
    let listing = disassemble(HINTED_MODULE);

    assert!(listing.contains("; sum<i64, i64>\n"), "{listing}");
    assert!(!listing.contains("sum<i32>"), "{listing}");
    assert!(listing.contains("; plain\n"), "{listing}");
    // `scale` is hinted, but no hint fits its signature.
    assert!(!listing.contains("scale"), "{listing}");
}

#[test]
fn members_are_emitted_in_index_order() {
    let listing = disassemble(HINTED_MODULE);
    let sum = listing.find("; sum").expect("sum emitted");
    let plain = listing.find("; plain").expect("plain emitted");
    assert!(sum < plain);
}

#[test]
fn each_member_has_instructions() {
    let listing = disassemble(r#"(module (func (export "one") (result i32) i32.const 1))"#);
    let body: Vec<&str> = listing
        .lines()
        .skip_while(|line| line.starts_with(';'))
        .take_while(|line| !line.is_empty())
        .collect();
    assert!(!body.is_empty(), "{listing}");
    assert!(body.iter().all(|line| line.starts_with("  ")), "{listing}");
}

#[test]
fn module_with_only_imports_produces_no_output() {
    let wasm = wat::parse_str(r#"(module (import "env" "f" (func)))"#).expect("valid wat");
    let runtime = SandboxRuntime::new(OperationKind::Disassemble, SandboxConfig::default()).expect("runtime");
    let mut output = Vec::new();
    let summary = runtime.disassemble(&wasm, &mut output).expect("disassembly succeeds");
    assert_eq!(summary.emitted, 0);
    assert!(output.is_empty());
}
