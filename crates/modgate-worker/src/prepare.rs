//! Member descriptors and the preparation pass.
//!
//! Before disassembly the worker walks every function defined by the module
//! (imports have no code and are not members). Each member carries the
//! instantiation hints declared for it in the `modgate.instantiate` custom
//! section, a JSON array of records:
//!
//! ```json
//! [{ "member": "sum", "types": ["i64", "i64"] }]
//! ```
//!
//! A member without hints is prepared once. A hinted member is prepared once
//! per hint whose type list matches its parameter types; hints that do not
//! match are skipped, and a hinted member left with no valid instantiation is
//! not prepared at all.

use std::collections::HashMap;

use serde::Deserialize;
use wasmparser::{ExternalKind, Parser, Payload, TypeRef};
use wasmtime::{ExternType, Module, ValType};

use crate::error::{Result, SandboxError};

/// Custom section holding instantiation hints.
pub const HINT_SECTION: &str = "modgate.instantiate";

/// One "instantiate with these types" record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstantiationHint {
    /// Export name of the member the hint is attached to.
    pub member: String,
    /// Parameter types of the requested instantiation.
    pub types: Vec<String>,
}

/// A function defined by the module, with the hints attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDescriptor {
    /// Index in the module's function index space (imports first).
    pub index: u32,
    /// Export name, or `function[N]` for internal functions.
    pub name: String,
    /// Parameter types, known for exported functions.
    pub params: Option<Vec<String>>,
    /// Type lists from every hint naming this member.
    pub hints: Vec<Vec<String>>,
}

/// A member that passed preparation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedMember {
    pub index: u32,
    pub name: String,
    /// Accepted instantiations; empty for a member without hints.
    pub instantiations: Vec<Vec<String>>,
}

impl PreparedMember {
    /// Header lines for the disassembly: one per instantiation, or the bare
    /// name for a member without hints.
    pub fn headers(&self) -> Vec<String> {
        if self.instantiations.is_empty() {
            return vec![self.name.clone()];
        }
        self.instantiations
            .iter()
            .map(|types| format!("{}<{}>", self.name, types.join(", ")))
            .collect()
    }
}

/// Members of a module in index order.
#[derive(Debug, Clone, Default)]
pub struct ModuleMetadata {
    pub members: Vec<MemberDescriptor>,
}

impl ModuleMetadata {
    /// Build member descriptors from the raw module bytes. `module` is the
    /// already compiled module, used to look up export signatures.
    pub fn read(wasm_bytes: &[u8], module: &Module) -> Result<Self> {
        let mut imported_functions = 0u32;
        let mut defined_functions = 0u32;
        let mut export_names: HashMap<u32, String> = HashMap::new();
        let mut hints: Vec<InstantiationHint> = Vec::new();

        for payload in Parser::new(0).parse_all(wasm_bytes) {
            let payload = payload.map_err(|e| SandboxError::Compilation(e.to_string()))?;
            match payload {
                Payload::ImportSection(reader) => {
                    for import in reader {
                        let import = import.map_err(|e| SandboxError::Compilation(e.to_string()))?;
                        if matches!(import.ty, TypeRef::Func(_)) {
                            imported_functions += 1;
                        }
                    }
                }
                Payload::FunctionSection(reader) => {
                    defined_functions = reader.count();
                }
                Payload::ExportSection(reader) => {
                    for export in reader {
                        let export = export.map_err(|e| SandboxError::Compilation(e.to_string()))?;
                        if export.kind == ExternalKind::Func {
                            export_names
                                .entry(export.index)
                                .or_insert_with(|| export.name.to_owned());
                        }
                    }
                }
                Payload::CustomSection(reader) if reader.name() == HINT_SECTION => {
                    hints.extend(parse_hints(reader.data()));
                }
                _ => {}
            }
        }

        let members = (imported_functions..imported_functions + defined_functions)
            .map(|index| {
                let export = export_names.get(&index);
                let name = export.cloned().unwrap_or_else(|| format!("function[{index}]"));
                let params = export.and_then(|name| export_params(module, name));
                let member_hints = match export {
                    Some(export) => hints
                        .iter()
                        .filter(|hint| &hint.member == export)
                        .map(|hint| normalize(&hint.types))
                        .collect(),
                    None => Vec::new(),
                };
                MemberDescriptor {
                    index,
                    name,
                    params,
                    hints: member_hints,
                }
            })
            .collect();

        Ok(Self { members })
    }
}

/// Parse the hint section. A malformed section is ignored as a whole.
fn parse_hints(data: &[u8]) -> Vec<InstantiationHint> {
    match serde_json::from_slice(data) {
        Ok(hints) => hints,
        Err(e) => {
            tracing::debug!(error = %e, "malformed {HINT_SECTION} section, ignoring hints");
            Vec::new()
        }
    }
}

fn normalize(types: &[String]) -> Vec<String> {
    types.iter().map(|t| t.trim().to_ascii_lowercase()).collect()
}

fn export_params(module: &Module, name: &str) -> Option<Vec<String>> {
    match module.get_export(name)? {
        ExternType::Func(func) => Some(func.params().map(|ty| val_type_name(&ty).to_owned()).collect()),
        _ => None,
    }
}

fn val_type_name(ty: &ValType) -> &'static str {
    match ty {
        ValType::I32 => "i32",
        ValType::I64 => "i64",
        ValType::F32 => "f32",
        ValType::F64 => "f64",
        ValType::V128 => "v128",
        ValType::Ref(_) => "ref",
    }
}

/// Run the preparation pass over `members`.
///
/// Failures are per member: a hint that does not fit the member's signature
/// is logged and skipped, never propagated.
pub fn prepare_members(members: &[MemberDescriptor]) -> Vec<PreparedMember> {
    let mut prepared = Vec::with_capacity(members.len());

    for member in members {
        if member.hints.is_empty() {
            prepared.push(PreparedMember {
                index: member.index,
                name: member.name.clone(),
                instantiations: Vec::new(),
            });
            continue;
        }

        let mut instantiations: Vec<Vec<String>> = Vec::new();
        for types in &member.hints {
            match &member.params {
                Some(params) if params == types => {
                    if !instantiations.contains(types) {
                        instantiations.push(types.clone());
                    }
                }
                _ => {
                    tracing::debug!(
                        member = %member.name,
                        types = ?types,
                        params = ?member.params,
                        "instantiation hint does not match member signature, skipping"
                    );
                }
            }
        }

        if instantiations.is_empty() {
            tracing::debug!(member = %member.name, "no valid instantiation, member not prepared");
            continue;
        }

        prepared.push(PreparedMember {
            index: member.index,
            name: member.name.clone(),
            instantiations,
        });
    }

    prepared
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(index: u32, name: &str, params: Option<&[&str]>, hints: &[&[&str]]) -> MemberDescriptor {
        let to_vec = |types: &[&str]| types.iter().map(|t| t.to_string()).collect::<Vec<_>>();
        MemberDescriptor {
            index,
            name: name.into(),
            params: params.map(to_vec),
            hints: hints.iter().map(|h| to_vec(*h)).collect(),
        }
    }

    #[test]
    fn unhinted_members_are_prepared_once() {
        let prepared = prepare_members(&[member(0, "main", Some(&[]), &[])]);
        assert_eq!(prepared.len(), 1);
        assert!(prepared[0].instantiations.is_empty());
        assert_eq!(prepared[0].headers(), vec!["main".to_string()]);
    }

    #[test]
    fn matching_hints_become_instantiations() {
        let prepared = prepare_members(&[member(
            2,
            "sum",
            Some(&["i64", "i64"]),
            &[&["i64", "i64"], &["i32"], &["i64", "i64"]],
        )]);
        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared[0].instantiations.len(), 1);
        assert_eq!(prepared[0].headers(), vec!["sum<i64, i64>".to_string()]);
    }

    #[test]
    fn hinted_member_without_valid_hint_is_skipped() {
        let members = [
            member(0, "bad", Some(&["f32"]), &[&["i32"]]),
            member(1, "good", Some(&[]), &[]),
        ];
        let prepared = prepare_members(&members);
        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared[0].name, "good");
    }

    #[test]
    fn malformed_hint_section_is_ignored() {
        assert!(parse_hints(b"{not json").is_empty());
        let hints = parse_hints(br#"[{"member":"f","types":["I32"]}]"#);
        assert_eq!(hints.len(), 1);
        assert_eq!(normalize(&hints[0].types), vec!["i32".to_string()]);
    }

    #[test]
    fn read_metadata_from_module() {
        let wasm = wat::parse_str(
            r#"(module
                (import "env" "log" (func $log (param i32)))
                (func (export "sum") (param i64 i64) (result i64)
                    local.get 0
                    local.get 1
                    i64.add)
                (func $internal)
                (@custom "modgate.instantiate" "[{\"member\":\"sum\",\"types\":[\"i64\",\"i64\"]},{\"member\":\"sum\",\"types\":[\"f32\"]}]"))"#,
        )
        .unwrap();
        let engine = wasmtime::Engine::default();
        let module = Module::new(&engine, &wasm).unwrap();

        let metadata = ModuleMetadata::read(&wasm, &module).unwrap();
        assert_eq!(metadata.members.len(), 2);

        let sum = &metadata.members[0];
        assert_eq!(sum.index, 1);
        assert_eq!(sum.name, "sum");
        assert_eq!(sum.params, Some(vec!["i64".to_string(), "i64".to_string()]));
        assert_eq!(sum.hints.len(), 2);

        let internal = &metadata.members[1];
        assert_eq!(internal.index, 2);
        assert_eq!(internal.name, "function[2]");
        assert!(internal.params.is_none());

        let prepared = prepare_members(&metadata.members);
        assert_eq!(prepared.len(), 2);
        assert_eq!(prepared[0].headers(), vec!["sum<i64, i64>".to_string()]);
    }
}
