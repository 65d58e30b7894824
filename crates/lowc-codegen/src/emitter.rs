//! Module emitter.
//!
//! Walks a resolved declaration table in emission order and builds the
//! [`Module`] tree:
//! 1. function imports
//! 2. memory and the module table with one element segment per `table`
//! 3. globals
//! 4. type definitions used by indirect calls
//! 5. data segments
//! 6. function bodies (lowered by the function builder)
//! 7. function exports
//!
//! Error codes emitted:
//! - W103: unknown identifier
//! - W106: constant does not fit its target type
//! - W130: type mismatch
//! - W132: unknown struct field
//! - W133: invalid operand or unaddressable place
//! - W134: struct or array value in a scalar slot
//! - W135: functions of one table disagree on their signature
//! - W136: wrong argument count
//! - W137: unknown function or table
//! - W140: unused function (warning)

use std::collections::{HashMap, HashSet};

use lowc_resolver::{Ty, Types};
use lowc_types::ast::{
    ConstValue, DeclKind, Declaration, DeclarationTable, Ident, Intrinsic, Signature,
};
use lowc_types::{CompileErrors, Diagnostic, ErrorCode, Span};

use crate::builder::FunctionBuilder;
use crate::error::{CodegenError, CodegenResult};
use crate::module::{
    FuncType, Field, Memory, Module, ValType, Value, DEFAULT_MEMORY_PAGES, MAX_MEMORY_PAGES,
};

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// Options that shape the emitted module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitOptions {
    /// Initial memory size in 64 KiB pages.
    pub memory_pages: u32,
    /// Export name of the memory, if exported.
    pub memory_export: Option<String>,
    /// Precede every function with a `;; func name (line L)` comment.
    pub emit_comments: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            memory_pages: DEFAULT_MEMORY_PAGES,
            memory_export: Some("memory".to_string()),
            emit_comments: false,
        }
    }
}

/// The emitted module plus everything reported while building it.
#[derive(Debug, Clone)]
pub struct Emitted {
    pub module: Module,
    pub errors: CompileErrors,
    pub traces: Vec<String>,
}

/// Emit a module for a resolved declaration table.
///
/// Problems in the program are returned as diagnostics in
/// [`Emitted::errors`]; a [`CodegenError`] means the input was not fit for
/// emission at all.
pub fn emit(table: &DeclarationTable, options: &EmitOptions) -> CodegenResult<Emitted> {
    if options.memory_pages > MAX_MEMORY_PAGES {
        return Err(CodegenError::LimitExceeded(format!(
            "memory of {} pages exceeds the maximum of {MAX_MEMORY_PAGES}",
            options.memory_pages
        )));
    }
    let mut emitter = Emitter::new(table, options);
    let module = emitter.emit_module()?;
    Ok(Emitted {
        module,
        errors: emitter.errors,
        traces: emitter.traces,
    })
}

// ══════════════════════════════════════════════════════════════════════════════
// Emitter
// ══════════════════════════════════════════════════════════════════════════════

/// Parameter and result types of a callable, at the source level.
#[derive(Debug, Clone)]
pub(crate) struct CallSignature {
    pub params: Vec<Ty>,
    /// `Ty::Void` for functions without a result.
    pub result: Ty,
}

/// Where a `table` declaration landed in the module table.
#[derive(Debug, Clone)]
pub(crate) struct TableSlot {
    pub base: u32,
    /// Type definition used by `call_indirect`.
    pub type_name: String,
    pub signature: CallSignature,
}

pub(crate) struct Emitter<'a> {
    pub(crate) table: &'a DeclarationTable,
    pub(crate) types: Types<'a>,
    options: &'a EmitOptions,
    pub(crate) errors: CompileErrors,
    pub(crate) traces: Vec<String>,
    /// Deduplicated function types, in order of first use.
    type_defs: Vec<(String, FuncType)>,
    pub(crate) tables: HashMap<String, TableSlot>,
}

impl<'a> Emitter<'a> {
    fn new(table: &'a DeclarationTable, options: &'a EmitOptions) -> Self {
        Self {
            table,
            types: Types::new(table),
            options,
            errors: CompileErrors::empty(),
            traces: Vec::new(),
            type_defs: Vec::new(),
            tables: HashMap::new(),
        }
    }

    fn emit_module(&mut self) -> CodegenResult<Module> {
        let _span = tracing::debug_span!("emit", declarations = self.table.len()).entered();
        let table = self.table;
        let decls = table.in_order();
        if let Some(decl) = decls.iter().find(|d| !d.resolved) {
            return Err(CodegenError::Unresolved(decl.name.name.clone()));
        }

        let mut module = Module {
            memory: Some(Memory {
                pages: self.options.memory_pages,
                export: self.options.memory_export.clone(),
            }),
            table: None,
            fields: Vec::new(),
        };

        // ── Imports ──────────────────────────────────────────────────────
        for decl in &decls {
            if let DeclKind::ImportedFunction {
                module: import_module,
                field,
                signature,
            } = &decl.kind
            {
                let ty = self.func_type(signature);
                module.fields.push(Field::FuncImport {
                    module: import_module.clone(),
                    field: field.clone(),
                    name: decl.name.name.clone(),
                    ty,
                });
            }
        }

        // ── Tables ───────────────────────────────────────────────────────
        let mut table_size = 0u32;
        let mut in_table: HashSet<&str> = HashSet::new();
        for decl in &decls {
            let DeclKind::Table { functions } = &decl.kind else {
                continue;
            };
            self.register_table(decl, functions, table_size);
            module.fields.push(Field::Element {
                offset: table_size,
                functions: functions.iter().map(|f| f.name.clone()).collect(),
            });
            in_table.extend(functions.iter().map(|f| f.name.as_str()));
            table_size = u32::try_from(functions.len())
                .ok()
                .and_then(|n| table_size.checked_add(n))
                .ok_or_else(|| {
                    CodegenError::LimitExceeded("module table has too many entries".to_string())
                })?;
        }
        if table_size > 0 {
            module.table = Some(table_size);
        }

        // ── Globals ──────────────────────────────────────────────────────
        for decl in &decls {
            let DeclKind::Global { ty: spec, init } = &decl.kind else {
                continue;
            };
            let ty = Ty::from_spec(spec);
            let Some(slot) = self.slot(&ty, "global", spec.span) else {
                continue;
            };
            let init = match init.as_ref().and_then(|e| e.value) {
                Some(value) => value_of(value, self.types.intrinsic(&ty).unwrap_or(Intrinsic::U32)),
                None => zero(slot),
            };
            module.fields.push(Field::Global {
                name: decl.name.name.clone(),
                ty: slot,
                mutable: true,
                init,
            });
        }

        // ── Types ────────────────────────────────────────────────────────
        for (name, ty) in &self.type_defs {
            module.fields.push(Field::TypeDef {
                name: name.clone(),
                ty: ty.clone(),
            });
        }

        // ── Data ─────────────────────────────────────────────────────────
        for decl in &decls {
            let DeclKind::Data { offset, bytes, .. } = &decl.kind else {
                continue;
            };
            let Some(offset) = offset
                .value
                .and_then(|v| v.as_int())
                .and_then(|v| u32::try_from(v).ok())
            else {
                continue;
            };
            module.fields.push(Field::Data {
                offset,
                bytes: bytes.clone(),
            });
        }

        // ── Functions ────────────────────────────────────────────────────
        for decl in &decls {
            let DeclKind::Function(function) = &decl.kind else {
                continue;
            };
            let name = decl.name.name.as_str();
            if !function.exported
                && function.flags.invocation_count == 0
                && !in_table.contains(name)
            {
                self.warning(
                    ErrorCode::UNUSED_FUNCTION,
                    format!("function '{name}' is never used"),
                    decl.name.span,
                );
                self.trace(format!("skipped unused function '{name}'"));
                continue;
            }
            if self.options.emit_comments {
                module.fields.push(Field::Comment(format!(
                    "func {name} (line {})",
                    decl.span.start_line
                )));
            }
            let func = FunctionBuilder::new(self, decl, function).build(function)?;
            tracing::trace!(function = name, instructions = func.body.len(), "emitted function");
            module.fields.push(Field::Func(func));
        }

        // ── Exports ──────────────────────────────────────────────────────
        for (decl, function) in table.functions() {
            if function.exported {
                module.fields.push(Field::FuncExport {
                    export: decl.name.name.clone(),
                    name: decl.name.name.clone(),
                });
            }
        }

        tracing::debug!(
            fields = module.fields.len(),
            errors = self.errors.total_errors,
            "emitted module"
        );
        Ok(module)
    }

    // ── Tables and signatures ─────────────────────────────────────────────

    /// Check that every function of a table shares one signature and
    /// record where the table starts.
    fn register_table(&mut self, decl: &Declaration, functions: &[Ident], base: u32) {
        let table = self.table;
        let mut expected: Option<CallSignature> = None;
        for function in functions {
            let Some(signature) = table.get(&function.name).and_then(|d| d.signature()) else {
                continue;
            };
            let signature = call_signature(signature);
            match &expected {
                None => expected = Some(signature),
                Some(first) if !self.same_signature(first, &signature) => self.error(
                    ErrorCode::TABLE_SIGNATURE_MISMATCH,
                    format!(
                        "function '{}' has signature {} but table '{}' expects {}",
                        function.name,
                        display_signature(&signature),
                        decl.name,
                        display_signature(first)
                    ),
                    function.span,
                ),
                Some(_) => {}
            }
        }
        let Some(signature) = expected else {
            return;
        };
        let params = signature
            .params
            .iter()
            .map(|ty| self.value_type(ty))
            .collect::<Option<Vec<_>>>();
        let result = match &signature.result {
            Ty::Void => Some(None),
            ty => self.value_type(ty).map(Some),
        };
        // Aggregate parameters are reported on the function itself.
        let (Some(params), Some(result)) = (params, result) else {
            return;
        };
        let type_name = self.type_def(FuncType { params, result });
        self.tables.insert(
            decl.name.name.clone(),
            TableSlot {
                base,
                type_name,
                signature,
            },
        );
    }

    fn same_signature(&self, a: &CallSignature, b: &CallSignature) -> bool {
        a.params.len() == b.params.len()
            && a.params.iter().zip(&b.params).all(|(x, y)| self.types.same(x, y))
            && self.types.same(&a.result, &b.result)
    }

    /// Name of the type definition for `ty`, adding it on first use.
    fn type_def(&mut self, ty: FuncType) -> String {
        if let Some((name, _)) = self.type_defs.iter().find(|(_, t)| *t == ty) {
            return name.clone();
        }
        let name = format!("t{}", self.type_defs.len());
        self.type_defs.push((name.clone(), ty));
        name
    }

    /// Slot types of a signature, reporting aggregate parameters.
    pub(crate) fn func_type(&mut self, signature: &Signature) -> FuncType {
        let params = signature
            .params
            .iter()
            .filter_map(|param| {
                let ty = param.ty.as_ref().map(Ty::from_spec).unwrap_or(Ty::Void);
                self.slot(&ty, "parameter", param.span)
            })
            .collect();
        let result = signature.result.as_ref().and_then(|spec| {
            let ty = Ty::from_spec(spec);
            self.slot(&ty, "result", spec.span)
        });
        FuncType { params, result }
    }

    // ── Slots ─────────────────────────────────────────────────────────────

    /// The value type a scalar or pointer lives in.
    pub(crate) fn value_type(&self, ty: &Ty) -> Option<ValType> {
        match self.types.expand(ty) {
            Ty::Scalar(intrinsic) => Some(ValType::of(intrinsic)),
            Ty::Pointer(_) => Some(ValType::I32),
            _ => None,
        }
    }

    /// Like [`Emitter::value_type`], reporting W134 for anything else.
    pub(crate) fn slot(&mut self, ty: &Ty, what: &str, span: Span) -> Option<ValType> {
        let slot = self.value_type(ty);
        if slot.is_none() {
            self.error(
                ErrorCode::AGGREGATE_IN_SLOT,
                format!("{what} of type {ty} cannot be held in a slot; use a pointer"),
                span,
            );
        }
        slot
    }

    // ── Diagnostics ───────────────────────────────────────────────────────

    pub(crate) fn error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        self.errors.push(Diagnostic::new(code, message, span));
    }

    fn warning(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        self.errors.push(Diagnostic::warning(code, message, span));
    }

    pub(crate) fn trace(&mut self, message: String) {
        tracing::trace!("{message}");
        self.traces.push(message);
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

pub(crate) fn call_signature(signature: &Signature) -> CallSignature {
    CallSignature {
        params: signature
            .params
            .iter()
            .map(|p| p.ty.as_ref().map(Ty::from_spec).unwrap_or(Ty::Void))
            .collect(),
        result: signature
            .result
            .as_ref()
            .map(Ty::from_spec)
            .unwrap_or(Ty::Void),
    }
}

fn display_signature(signature: &CallSignature) -> String {
    let params: Vec<String> = signature.params.iter().map(|p| p.to_string()).collect();
    format!("({}): {}", params.join(", "), signature.result)
}

/// A folded constant as an operand of `target`'s slot type. The value is
/// expected to fit already; integers are reinterpreted at slot width.
pub(crate) fn value_of(value: ConstValue, target: Intrinsic) -> Value {
    let bits = match value {
        ConstValue::Int(v) => v,
        ConstValue::Float(v) => v as i128,
    };
    match ValType::of(target) {
        ValType::I32 => Value::I32(bits as i32),
        ValType::I64 => Value::I64(bits as i64),
        ValType::F32 => Value::F32(value.as_f64() as f32),
        ValType::F64 => Value::F64(value.as_f64()),
    }
}

pub(crate) fn zero(ty: ValType) -> Value {
    match ty {
        ValType::I32 => Value::I32(0),
        ValType::I64 => Value::I64(0),
        ValType::F32 => Value::F32(0.0),
        ValType::F64 => Value::F64(0.0),
    }
}
