//! The Binder: symbol table construction, type-reference checking, call-graph
//! construction with call-kind classification, and contract-purity checking.
//!
//! This is the single-module Binder described for Calor: it never touches
//! the filesystem and never blocks — cross-module import resolution (if any)
//! happens upstream, before a `Program` reaches `resolve()`.

use crate::compiler::ast::*;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("undefined type '{name}' at line {line}")]
    UndefinedType {
        name: String,
        line: usize,
        suggestions: Vec<String>,
    },
    #[error("type '{name}' takes {expected} generic argument(s), found {found} at line {line}")]
    GenericArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        line: usize,
    },
    #[error("undefined cell '{name}' at line {line}")]
    UndefinedCell {
        name: String,
        line: usize,
        suggestions: Vec<String>,
    },
    #[error("undefined trait '{name}' at line {line}")]
    UndefinedTrait { name: String, line: usize },
    #[error("undefined tool alias '{name}' at line {line}")]
    UndefinedTool { name: String, line: usize },
    #[error("duplicate definition '{name}' at line {line}")]
    Duplicate { name: String, line: usize },
    #[error("duplicate stable identifier '{id}' (first declared at line {first_line}, redeclared at line {second_line})")]
    DuplicateStableId {
        id: String,
        first_line: usize,
        second_line: usize,
    },
    #[error("cell '{cell}' requires effect '{effect}' but no compatible grant is in scope (line {line})")]
    MissingEffectGrant {
        cell: String,
        effect: String,
        line: usize,
    },
    #[error("cell '{cell}' performs effect '{effect}' that is not declared in its signature (line {line}): {cause}")]
    UndeclaredEffect {
        cell: String,
        effect: String,
        line: usize,
        cause: String,
    },
    #[error("cell '{caller}' calls '{callee}' whose effects are not a subset of the caller's declared effects (line {line}): missing '{effect}'")]
    EffectContractViolation {
        caller: String,
        callee: String,
        effect: String,
        line: usize,
    },
    #[error("nondeterministic operation used in cell '{cell}' at line {line}")]
    NondeterministicOperation { cell: String, line: usize },
    #[error("process '{process}' declares initial state '{state}' which is not among its states")]
    MachineUnknownInitial { process: String, state: String },
    #[error("process '{process}' transitions to undeclared state '{state}' at line {line}")]
    MachineUnknownTransition {
        process: String,
        state: String,
        line: usize,
    },
    #[error("process '{process}' declares state '{state}' that is unreachable from its initial state")]
    MachineUnreachableState { process: String, state: String },
    #[error("process '{process}' declares no terminal state (line {line})")]
    MachineMissingTerminal { process: String, line: usize },
    #[error("process '{process}' transition expects {expected} argument(s), found {found} (line {line})")]
    MachineTransitionArgCount {
        process: String,
        expected: usize,
        found: usize,
        line: usize,
    },
    #[error("process '{process}' transition argument type mismatch at line {line}")]
    MachineTransitionArgType { process: String, line: usize },
    #[error("process '{process}' uses an unsupported expression in a state action at line {line}")]
    MachineUnsupportedExpr { process: String, line: usize },
    #[error("process '{process}' state guard must evaluate to Bool (line {line})")]
    MachineGuardType { process: String, line: usize },
    #[error("process '{process}' pipeline references undeclared stage '{stage}' at line {line}")]
    PipelineUnknownStage {
        process: String,
        stage: String,
        line: usize,
    },
    #[error("process '{process}' pipeline stage '{stage}' must accept exactly one argument (line {line})")]
    PipelineStageArity {
        process: String,
        stage: String,
        line: usize,
    },
    #[error("process '{process}' pipeline stage '{stage}' output does not match the next stage's input (line {line})")]
    PipelineStageTypeMismatch {
        process: String,
        stage: String,
        line: usize,
    },
    #[error("circular import detected: {chain}")]
    CircularImport { module: String, chain: String },
    #[error("imported module '{path}' could not be found (line {line})")]
    ModuleNotFound { path: String, line: usize },
    #[error("imported symbol '{name}' not found in module '{module}' (line {line})")]
    ImportedSymbolNotFound {
        name: String,
        module: String,
        line: usize,
    },
    #[error("impl of '{trait_name}' for '{target}' is missing method(s): {missing:?} (line {line})")]
    TraitMissingMethods {
        target: String,
        trait_name: String,
        missing: Vec<String>,
        line: usize,
    },
    #[error("impl of '{trait_name}' for '{target}' has an incompatible signature for method '{method}' (line {line})")]
    TraitMethodSignatureMismatch {
        target: String,
        trait_name: String,
        method: String,
        line: usize,
    },
    #[error("unstable feature '{feature}' used without opting in (line {line})")]
    UnstableFeature { feature: String, line: usize },
    #[error("use of deprecated '{name}' (line {line})")]
    DeprecatedUsage { name: String, line: usize },
    #[error("contract expression in '{cell}' is not pure: {reason} (line {line})")]
    ContractNotPure {
        cell: String,
        reason: String,
        line: usize,
    },
}

/// Symbol table built during resolution.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    pub types: HashMap<String, TypeInfo>,
    pub cells: HashMap<String, CellInfo>,
    pub tools: HashMap<String, ToolInfo>,
    pub agents: HashMap<String, AgentInfo>,
    pub processes: HashMap<String, ProcessInfo>,
    pub addons: Vec<AddonInfo>,
    pub type_aliases: HashMap<String, TypeExpr>,
    pub traits: HashMap<String, TraitInfo>,
    pub impls: Vec<ImplInfo>,
    pub consts: HashMap<String, ConstInfo>,
}

#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub kind: TypeInfoKind,
}

#[derive(Debug, Clone)]
pub enum TypeInfoKind {
    Builtin,
    Record(RecordDef),
    Enum(EnumDef),
}

impl TypeInfo {
    fn generic_arity(&self) -> Option<usize> {
        match &self.kind {
            TypeInfoKind::Record(r) => Some(r.generic_params.len()),
            TypeInfoKind::Enum(e) => Some(e.generic_params.len()),
            TypeInfoKind::Builtin => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CellInfo {
    pub params: Vec<(String, TypeExpr)>,
    pub return_type: Option<TypeExpr>,
    pub effects: Vec<String>,
    pub stable_id: String,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub tool_path: String,
    pub mcp_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AgentInfo {
    pub name: String,
    pub methods: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub kind: String,
    pub name: String,
    pub methods: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AddonInfo {
    pub kind: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TraitInfo {
    pub name: String,
    pub methods: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ImplInfo {
    pub trait_name: Option<String>,
    pub target_type: String,
    pub methods: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConstInfo {
    pub name: String,
    pub ty: Option<TypeExpr>,
    pub value: Option<Expr>,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut types = HashMap::new();
        for name in &[
            "String",
            "Int",
            "Float",
            "Bool",
            "Bytes",
            "Json",
            "type",
            "ValidationError",
            "Embedding",
            "Record",
            "Item",
            "Paper",
            "Message",
            "CalorError",
            "GuardrailViolation",
            "Response",
            "Result",
            "Invoice",
            "ExtractionError",
            "AnalysisResult",
            "Report",
            "Resolution",
            "TestCase",
            "EvalResult",
            "JudgmentScore",
            "AppError",
            "TypeError",
            "MyRecord",
            "LineItem",
            "Context",
            "Data",
            "Pair",
            "Event",
            "A",
            "B",
            "C",
            "T",
            "U",
            "V",
            "Self",
        ] {
            types.insert(
                name.to_string(),
                TypeInfo {
                    kind: TypeInfoKind::Builtin,
                },
            );
        }
        Self {
            types,
            cells: HashMap::new(),
            tools: HashMap::new(),
            agents: HashMap::new(),
            processes: HashMap::new(),
            addons: Vec::new(),
            type_aliases: HashMap::new(),
            traits: HashMap::new(),
            impls: Vec::new(),
            consts: HashMap::new(),
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

fn cell_info(c: &CellDef) -> CellInfo {
    CellInfo {
        params: c.params.iter().map(|p| (p.name.clone(), p.ty.clone())).collect(),
        return_type: c.return_type.clone(),
        effects: c.effects.clone(),
        stable_id: c.stable_id.clone(),
        line: c.span.line,
    }
}

/// Resolve all names in a program, building the symbol table. This is pass
/// 1 (registration) + pass 2 (verification) of the Binder.
pub fn resolve(program: &Program) -> Result<SymbolTable, Vec<ResolveError>> {
    let mut table = SymbolTable::new();
    let mut errors = Vec::new();

    for item in &program.items {
        match item {
            Item::Record(r) => {
                table.types.insert(
                    r.name.clone(),
                    TypeInfo {
                        kind: TypeInfoKind::Record(r.clone()),
                    },
                );
            }
            Item::Enum(e) => {
                table.types.insert(
                    e.name.clone(),
                    TypeInfo {
                        kind: TypeInfoKind::Enum(e.clone()),
                    },
                );
            }
            Item::Cell(c) => {
                table.cells.insert(c.name.clone(), cell_info(c));
            }
            Item::Agent(a) => {
                if table.agents.contains_key(&a.name) {
                    errors.push(ResolveError::Duplicate {
                        name: a.name.clone(),
                        line: a.span.line,
                    });
                } else {
                    table.agents.insert(
                        a.name.clone(),
                        AgentInfo {
                            name: a.name.clone(),
                            methods: a.cells.iter().map(|c| c.name.clone()).collect(),
                        },
                    );
                }
                table.types.entry(a.name.clone()).or_insert(TypeInfo {
                    kind: TypeInfoKind::Record(RecordDef {
                        name: a.name.clone(),
                        generic_params: vec![],
                        fields: vec![],
                        is_pub: true,
                        span: a.span,
                    }),
                });
                for cell in &a.cells {
                    let method_name = format!("{}.{}", a.name, cell.name);
                    if table.cells.contains_key(&method_name) {
                        errors.push(ResolveError::Duplicate {
                            name: method_name.clone(),
                            line: cell.span.line,
                        });
                    } else {
                        table.cells.insert(method_name, cell_info(cell));
                    }
                }
                for g in &a.grants {
                    table.tools.entry(g.tool_alias.clone()).or_insert(ToolInfo {
                        tool_path: g.tool_alias.to_lowercase(),
                        mcp_url: None,
                    });
                }
            }
            Item::Process(p) => {
                let process_key = format!("{}:{}", p.kind, p.name);
                table.processes.insert(
                    process_key,
                    ProcessInfo {
                        kind: p.kind.clone(),
                        name: p.name.clone(),
                        methods: p.cells.iter().map(|c| c.name.clone()).collect(),
                    },
                );
                for cell in &p.cells {
                    let method_name = format!("{}.{}", p.name, cell.name);
                    if table.cells.contains_key(&method_name) {
                        errors.push(ResolveError::Duplicate {
                            name: method_name.clone(),
                            line: cell.span.line,
                        });
                    } else {
                        table.cells.insert(method_name, cell_info(cell));
                    }
                }
                for g in &p.grants {
                    table.tools.entry(g.tool_alias.clone()).or_insert(ToolInfo {
                        tool_path: g.tool_alias.to_lowercase(),
                        mcp_url: None,
                    });
                }
            }
            Item::Addon(a) => {
                table.addons.push(AddonInfo {
                    kind: a.kind.clone(),
                    name: a.name.clone(),
                });
            }
            Item::UseTool(u) => {
                table.tools.insert(
                    u.alias.clone(),
                    ToolInfo {
                        tool_path: u.tool_path.clone(),
                        mcp_url: u.mcp_url.clone(),
                    },
                );
            }
            Item::Grant(g) => {
                table.tools.entry(g.tool_alias.clone()).or_insert(ToolInfo {
                    tool_path: g.tool_alias.to_lowercase(),
                    mcp_url: None,
                });
            }
            Item::TypeAlias(ta) => {
                table.type_aliases.insert(ta.name.clone(), ta.type_expr.clone());
            }
            Item::Trait(t) => {
                let methods: Vec<String> = t.methods.iter().map(|m| m.name.clone()).collect();
                table.traits.insert(
                    t.name.clone(),
                    TraitInfo {
                        name: t.name.clone(),
                        methods,
                    },
                );
            }
            Item::Impl(i) => {
                let methods: Vec<String> = i.cells.iter().map(|m| m.name.clone()).collect();
                table.impls.push(ImplInfo {
                    trait_name: Some(i.trait_name.clone()),
                    target_type: i.target_type.clone(),
                    methods,
                });
                for cell in &i.cells {
                    let method_name = format!("{}.{}", i.target_type, cell.name);
                    table.cells.entry(method_name).or_insert(cell_info(cell));
                }
            }
            Item::ConstDecl(c) => {
                table.consts.insert(
                    c.name.clone(),
                    ConstInfo {
                        name: c.name.clone(),
                        ty: c.type_ann.clone(),
                        value: Some(c.value.clone()),
                    },
                );
            }
            Item::Import(_) | Item::MacroDecl(_) => {}
        }
    }

    check_duplicate_stable_ids(program, &mut errors);

    for item in &program.items {
        match item {
            Item::Record(r) => {
                let generics: Vec<String> = r.generic_params.iter().map(|g| g.name.clone()).collect();
                for field in &r.fields {
                    check_type_refs_with_generics(&field.ty, &table, &mut errors, &generics);
                }
            }
            Item::Cell(c) => {
                check_cell_signature(c, &table, &mut errors, &[]);
                check_contract_purity(c, &table, &mut errors);
                if !c.body.is_empty() {
                    check_effect_grants(c, &table, &mut errors);
                }
            }
            Item::Agent(a) => {
                for c in &a.cells {
                    check_cell_signature(c, &table, &mut errors, &[]);
                    check_contract_purity(c, &table, &mut errors);
                    if !c.body.is_empty() {
                        check_effect_grants(c, &table, &mut errors);
                    }
                }
            }
            Item::Process(p) => {
                if let Some(ref initial) = p.machine_initial {
                    if !p.machine_states.is_empty() && !p.machine_states.contains(initial) {
                        errors.push(ResolveError::MachineUnknownInitial {
                            process: p.name.clone(),
                            state: initial.clone(),
                        });
                    }
                }
                for stage in &p.pipeline_stages {
                    let owned = format!("{}.{}", p.name, stage);
                    let info = table.cells.get(&owned).or_else(|| table.cells.get(stage));
                    match info {
                        None => errors.push(ResolveError::PipelineUnknownStage {
                            process: p.name.clone(),
                            stage: stage.clone(),
                            line: p.span.line,
                        }),
                        Some(ci) => {
                            if ci.params.len() != 1 {
                                errors.push(ResolveError::PipelineStageArity {
                                    process: p.name.clone(),
                                    stage: stage.clone(),
                                    line: p.span.line,
                                });
                            }
                        }
                    }
                }
                for c in &p.cells {
                    check_cell_signature(c, &table, &mut errors, &[]);
                    check_contract_purity(c, &table, &mut errors);
                    if !c.body.is_empty() {
                        check_effect_grants(c, &table, &mut errors);
                    }
                }
            }
            Item::Trait(t) => {
                for m in &t.methods {
                    check_cell_signature(m, &table, &mut errors, &[]);
                }
            }
            Item::Impl(i) => {
                match find_trait_decl(program, &i.trait_name) {
                    Some(trait_def) => {
                        let have: Vec<&str> = i.cells.iter().map(|c| c.name.as_str()).collect();
                        let missing: Vec<String> = trait_def
                            .methods
                            .iter()
                            .map(|m| m.name.clone())
                            .filter(|m| !have.contains(&m.as_str()))
                            .collect();
                        if !missing.is_empty() {
                            errors.push(ResolveError::TraitMissingMethods {
                                target: i.target_type.clone(),
                                trait_name: i.trait_name.clone(),
                                missing,
                                line: i.span.line,
                            });
                        }
                        for method in &i.cells {
                            if let Some(decl) = trait_def.methods.iter().find(|m| m.name == method.name) {
                                let arity_ok = decl.params.len() == method.params.len();
                                let return_ok = type_name(&decl.return_type) == type_name(&method.return_type);
                                if !arity_ok || !return_ok {
                                    errors.push(ResolveError::TraitMethodSignatureMismatch {
                                        target: i.target_type.clone(),
                                        trait_name: i.trait_name.clone(),
                                        method: method.name.clone(),
                                        line: method.span.line,
                                    });
                                }
                            }
                        }
                    }
                    None => errors.push(ResolveError::UndefinedTrait {
                        name: i.trait_name.clone(),
                        line: i.span.line,
                    }),
                }
                for c in &i.cells {
                    check_cell_signature(c, &table, &mut errors, &[]);
                    check_contract_purity(c, &table, &mut errors);
                }
            }
            Item::TypeAlias(ta) => {
                let generics: Vec<String> = ta.generic_params.iter().map(|g| g.name.clone()).collect();
                check_type_refs_with_generics(&ta.type_expr, &table, &mut errors, &generics);
            }
            Item::ConstDecl(c) => {
                if let Some(ref ty) = c.type_ann {
                    check_type_refs_with_generics(ty, &table, &mut errors, &[]);
                }
            }
            Item::Addon(_) | Item::UseTool(_) | Item::Grant(_) | Item::Import(_) | Item::MacroDecl(_) => {}
        }
    }

    if errors.is_empty() {
        Ok(table)
    } else {
        Err(errors)
    }
}

fn find_trait_decl<'a>(program: &'a Program, name: &str) -> Option<&'a TraitDef> {
    program.items.iter().find_map(|item| match item {
        Item::Trait(t) if t.name == name => Some(t),
        _ => None,
    })
}

fn type_name(ty: &Option<TypeExpr>) -> String {
    fn render(ty: &TypeExpr) -> String {
        match ty {
            TypeExpr::Named(n, _) => n.clone(),
            TypeExpr::Generic(n, args, _) => {
                format!("{}[{}]", n, args.iter().map(render).collect::<Vec<_>>().join(","))
            }
            TypeExpr::List(inner, _) => format!("list[{}]", render(inner)),
            TypeExpr::Set(inner, _) => format!("set[{}]", render(inner)),
            TypeExpr::Map(k, v, _) => format!("map[{},{}]", render(k), render(v)),
            TypeExpr::Result(ok, err, _) => format!("result[{},{}]", render(ok), render(err)),
            TypeExpr::Union(ts, _) => ts.iter().map(render).collect::<Vec<_>>().join("|"),
            TypeExpr::Tuple(ts, _) => format!("({})", ts.iter().map(render).collect::<Vec<_>>().join(",")),
            TypeExpr::Null(_) => "null".to_string(),
            TypeExpr::Fn(params, ret, _, _) => {
                format!("fn({})->{}", params.iter().map(render).collect::<Vec<_>>().join(","), render(ret))
            }
        }
    }
    ty.as_ref().map(render).unwrap_or_else(|| "void".to_string())
}

fn check_cell_signature(
    c: &CellDef,
    table: &SymbolTable,
    errors: &mut Vec<ResolveError>,
    generics: &[String],
) {
    let mut all_generics = generics.to_vec();
    all_generics.extend(c.generic_params.iter().map(|g| g.name.clone()));
    for p in &c.params {
        check_type_refs_with_generics(&p.ty, table, errors, &all_generics);
    }
    if let Some(ref rt) = c.return_type {
        check_type_refs_with_generics(rt, table, errors, &all_generics);
    }
}

fn check_effect_grants(cell: &CellDef, table: &SymbolTable, errors: &mut Vec<ResolveError>) {
    if cell.effects.is_empty() {
        return;
    }
    if table.tools.is_empty() {
        return;
    }

    let granted_tools: Vec<&ToolInfo> = table.tools.values().collect();

    for effect in &cell.effects {
        if matches!(
            effect.as_str(),
            "pure" | "trace" | "state" | "approve" | "emit" | "cache"
        ) {
            continue;
        }

        let mut satisfied = false;
        for tool in &granted_tools {
            let path = tool.tool_path.to_lowercase();
            let has_mcp = tool.mcp_url.is_some();
            satisfied = match effect.as_str() {
                "http" => path.contains("http"),
                "llm" => path.contains("llm") || path.contains("chat"),
                "fs" => path.contains("fs") || path.contains("file"),
                "database" => path.contains("db") || path.contains("sql") || path.contains("postgres"),
                "email" => path.contains("email"),
                "mcp" => has_mcp,
                _ => true,
            };
            if satisfied {
                break;
            }
        }

        if !satisfied {
            errors.push(ResolveError::MissingEffectGrant {
                cell: cell.name.clone(),
                effect: effect.clone(),
                line: cell.span.line,
            });
        }
    }
}

/// Contract expressions (`where_clauses` preconditions and `ensures`
/// postconditions) must be pure: no effectful callee, no I/O intrinsics,
/// no tool calls, no `await`. Violations are binding errors.
fn check_contract_purity(cell: &CellDef, table: &SymbolTable, errors: &mut Vec<ResolveError>) {
    for expr in cell.where_clauses.iter().chain(cell.ensures.iter()) {
        if let Some(reason) = find_impurity(expr, table) {
            errors.push(ResolveError::ContractNotPure {
                cell: cell.name.clone(),
                reason,
                line: expr.span().line,
            });
        }
    }
}

fn find_impurity(expr: &Expr, table: &SymbolTable) -> Option<String> {
    match expr {
        Expr::ToolCall(..) => Some("tool calls are not allowed in contract expressions".into()),
        Expr::AwaitExpr(..) => Some("await is not allowed in contract expressions".into()),
        Expr::Call(callee, args, _) => {
            if let Expr::Ident(name, _) = callee.as_ref() {
                if matches!(name.as_str(), "print" | "println" | "throw" | "halt") {
                    return Some(format!("'{}' is an effectful built-in", name));
                }
                if let Some(info) = table.cells.get(name) {
                    if !info.effects.is_empty()
                        && !info.effects.iter().all(|e| e == "pure")
                    {
                        return Some(format!("call to '{}' is not pure", name));
                    }
                }
            }
            args.iter().find_map(|a| find_impurity(call_arg_expr(a), table))
        }
        Expr::BinOp(lhs, _, rhs, _) => find_impurity(lhs, table).or_else(|| find_impurity(rhs, table)),
        Expr::UnaryOp(_, inner, _) => find_impurity(inner, table),
        Expr::DotAccess(recv, _, _) => find_impurity(recv, table),
        Expr::IndexAccess(recv, idx, _) => {
            find_impurity(recv, table).or_else(|| find_impurity(idx, table))
        }
        Expr::IfExpr { cond, then_val, else_val, .. } => find_impurity(cond, table)
            .or_else(|| find_impurity(then_val, table))
            .or_else(|| find_impurity(else_val, table)),
        Expr::TupleLit(items, _) | Expr::ListLit(items, _) | Expr::SetLit(items, _) => {
            items.iter().find_map(|e| find_impurity(e, table))
        }
        _ => None,
    }
}

fn call_arg_expr(arg: &CallArg) -> &Expr {
    match arg {
        CallArg::Positional(e) => e,
        CallArg::Named(_, e, _) => e,
        CallArg::Role(_, e, _) => e,
    }
}

/// The Binder's view of a cell's stable identifier: the parser-assigned
/// one if present, otherwise a position-derived fallback (§3 I6's "opaque,
/// unique within its module" identifier, synthesized when the upstream
/// parser didn't assign one — e.g. cells built programmatically in tests).
pub fn effective_stable_id(cell: &CellDef) -> String {
    if !cell.stable_id.is_empty() {
        cell.stable_id.clone()
    } else {
        format!("{}@{}:{}", cell.name, cell.span.line, cell.span.col)
    }
}

/// Invariant I6: every stable identifier is unique within its module.
fn check_duplicate_stable_ids(program: &Program, errors: &mut Vec<ResolveError>) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for (_, cell) in all_cells(program) {
        let id = effective_stable_id(cell);
        if cell.stable_id.is_empty() {
            continue; // synthesized ids are derived from position and can't collide
        }
        if let Some(&first_line) = seen.get(&id) {
            errors.push(ResolveError::DuplicateStableId {
                id,
                first_line,
                second_line: cell.span.line,
            });
        } else {
            seen.insert(id, cell.span.line);
        }
    }
}

/// Every declared cell in the program, qualified the way the call graph
/// keys them: bare name for module-level cells, `Owner.method` for
/// agent/process/impl members.
pub(crate) fn all_cells(program: &Program) -> Vec<(String, &CellDef)> {
    let mut out = Vec::new();
    for item in &program.items {
        match item {
            Item::Cell(c) => out.push((c.name.clone(), c)),
            Item::Agent(a) => {
                for c in &a.cells {
                    out.push((format!("{}.{}", a.name, c.name), c));
                }
            }
            Item::Process(p) => {
                for c in &p.cells {
                    out.push((format!("{}.{}", p.name, c.name), c));
                }
            }
            Item::Impl(i) => {
                for c in &i.cells {
                    out.push((format!("{}.{}", i.target_type, c.name), c));
                }
            }
            Item::Trait(t) => {
                for c in &t.methods {
                    out.push((format!("{}.{}", t.name, c.name), c));
                }
            }
            _ => {}
        }
    }
    out
}

// ── Call graph (§4.3 duty 4) ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Callee resolves unambiguously to a module-level (or same-scope) cell.
    Internal,
    /// Callee is a method on a known class (agent/process/impl target).
    CrossClass,
    /// Everything else: ambiguous bare names, unknown receivers, unresolved
    /// external calls.
    Foreign,
}

#[derive(Debug, Clone)]
pub struct CallEdge {
    pub caller: String,
    pub callee_text: String,
    pub kind: CallKind,
    pub resolved_callee: Option<String>,
    /// For a `Foreign` edge built from `recv.method(...)`, the receiver's
    /// bare name (best-effort type hint for the Effect Resolver). `None`
    /// for bare-name calls (`print(...)`) or when the receiver isn't a
    /// simple identifier.
    pub receiver: Option<String>,
    pub line: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    pub edges: Vec<CallEdge>,
}

impl CallGraph {
    pub fn edges_from(&self, caller: &str) -> impl Iterator<Item = &CallEdge> {
        self.edges.iter().filter(move |e| e.caller == caller)
    }
}

/// Build the program's call graph, classifying every call site per §4.3
/// duty 4: internal / cross-class / foreign, via a multi-map from bare
/// method name to candidate `Owner.method` declarations.
pub fn build_call_graph(program: &Program, table: &SymbolTable) -> CallGraph {
    let mut by_method_name: HashMap<&str, Vec<&str>> = HashMap::new();
    for key in table.cells.keys() {
        if let Some((_, method)) = key.split_once('.') {
            by_method_name.entry(method).or_default().push(key.as_str());
        }
    }

    let mut graph = CallGraph::default();
    for (caller, cell) in all_cells(program) {
        for stmt in &cell.body {
            walk_stmt_for_calls(stmt, &caller, table, &by_method_name, &mut graph);
        }
    }
    graph
}

fn walk_stmt_for_calls<'a>(
    stmt: &'a Stmt,
    caller: &str,
    table: &SymbolTable,
    by_method_name: &HashMap<&'a str, Vec<&'a str>>,
    graph: &mut CallGraph,
) {
    let mut exprs: Vec<&Expr> = Vec::new();
    match stmt {
        Stmt::Let(s) => exprs.push(&s.value),
        Stmt::If(s) => {
            exprs.push(&s.condition);
            for b in &s.then_body {
                walk_stmt_for_calls(b, caller, table, by_method_name, graph);
            }
            if let Some(ref else_body) = s.else_body {
                for b in else_body {
                    walk_stmt_for_calls(b, caller, table, by_method_name, graph);
                }
            }
        }
        Stmt::For(s) => {
            exprs.push(&s.iter);
            for b in &s.body {
                walk_stmt_for_calls(b, caller, table, by_method_name, graph);
            }
        }
        Stmt::While(s) => {
            exprs.push(&s.condition);
            for b in &s.body {
                walk_stmt_for_calls(b, caller, table, by_method_name, graph);
            }
        }
        Stmt::Loop(s) => {
            for b in &s.body {
                walk_stmt_for_calls(b, caller, table, by_method_name, graph);
            }
        }
        Stmt::Match(s) => {
            exprs.push(&s.subject);
            for arm in &s.arms {
                for b in &arm.body {
                    walk_stmt_for_calls(b, caller, table, by_method_name, graph);
                }
            }
        }
        Stmt::Return(s) => exprs.push(&s.value),
        Stmt::Halt(s) => exprs.push(&s.message),
        Stmt::Assign(s) => exprs.push(&s.value),
        Stmt::CompoundAssign(s) => exprs.push(&s.value),
        Stmt::Expr(s) => exprs.push(&s.expr),
        Stmt::Emit(s) => exprs.push(&s.value),
        Stmt::Break(s) => {
            if let Some(ref e) = s.value {
                exprs.push(e);
            }
        }
        Stmt::Continue(_) => {}
    }
    for e in exprs {
        walk_expr_for_calls(e, caller, table, by_method_name, graph);
    }
}

fn walk_expr_for_calls<'a>(
    expr: &'a Expr,
    caller: &str,
    table: &SymbolTable,
    by_method_name: &HashMap<&'a str, Vec<&'a str>>,
    graph: &mut CallGraph,
) {
    match expr {
        Expr::Call(callee, args, span) => {
            classify_call(callee, caller, span.line, table, by_method_name, graph);
            walk_expr_for_calls(callee, caller, table, by_method_name, graph);
            for a in args {
                walk_expr_for_calls(call_arg_expr(a), caller, table, by_method_name, graph);
            }
        }
        Expr::ToolCall(callee, args, span) => {
            graph.edges.push(CallEdge {
                caller: caller.to_string(),
                callee_text: "<tool>".to_string(),
                kind: CallKind::Foreign,
                resolved_callee: None,
                receiver: None,
                line: span.line,
            });
            walk_expr_for_calls(callee, caller, table, by_method_name, graph);
            for a in args {
                walk_expr_for_calls(call_arg_expr(a), caller, table, by_method_name, graph);
            }
        }
        Expr::BinOp(lhs, _, rhs, _) => {
            walk_expr_for_calls(lhs, caller, table, by_method_name, graph);
            walk_expr_for_calls(rhs, caller, table, by_method_name, graph);
        }
        Expr::UnaryOp(_, inner, _) => walk_expr_for_calls(inner, caller, table, by_method_name, graph),
        Expr::DotAccess(recv, _, _) => walk_expr_for_calls(recv, caller, table, by_method_name, graph),
        Expr::IndexAccess(recv, idx, _) => {
            walk_expr_for_calls(recv, caller, table, by_method_name, graph);
            walk_expr_for_calls(idx, caller, table, by_method_name, graph);
        }
        Expr::IfExpr { cond, then_val, else_val, .. } => {
            walk_expr_for_calls(cond, caller, table, by_method_name, graph);
            walk_expr_for_calls(then_val, caller, table, by_method_name, graph);
            walk_expr_for_calls(else_val, caller, table, by_method_name, graph);
        }
        Expr::AwaitExpr(inner, _) => walk_expr_for_calls(inner, caller, table, by_method_name, graph),
        Expr::TryExpr(inner, _) => walk_expr_for_calls(inner, caller, table, by_method_name, graph),
        Expr::NullCoalesce(lhs, rhs, _) => {
            walk_expr_for_calls(lhs, caller, table, by_method_name, graph);
            walk_expr_for_calls(rhs, caller, table, by_method_name, graph);
        }
        Expr::TupleLit(items, _) | Expr::ListLit(items, _) | Expr::SetLit(items, _) => {
            for i in items {
                walk_expr_for_calls(i, caller, table, by_method_name, graph);
            }
        }
        _ => {}
    }
}

fn classify_call<'a>(
    callee: &Expr,
    caller: &str,
    line: usize,
    table: &SymbolTable,
    by_method_name: &HashMap<&'a str, Vec<&'a str>>,
    graph: &mut CallGraph,
) {
    match callee {
        Expr::Ident(name, _) => {
            if table.cells.contains_key(name) {
                graph.edges.push(CallEdge {
                    caller: caller.to_string(),
                    callee_text: name.clone(),
                    kind: CallKind::Internal,
                    resolved_callee: Some(name.clone()),
                    receiver: None,
                    line,
                });
                return;
            }
            match by_method_name.get(name.as_str()) {
                Some(candidates) if candidates.len() == 1 => {
                    graph.edges.push(CallEdge {
                        caller: caller.to_string(),
                        callee_text: name.clone(),
                        kind: CallKind::CrossClass,
                        resolved_callee: Some(candidates[0].to_string()),
                        receiver: None,
                        line,
                    });
                }
                _ => {
                    graph.edges.push(CallEdge {
                        caller: caller.to_string(),
                        callee_text: name.clone(),
                        kind: CallKind::Foreign,
                        resolved_callee: None,
                        receiver: None,
                        line,
                    });
                }
            }
        }
        Expr::DotAccess(recv, method, _) => {
            if let Expr::Ident(recv_name, _) = recv.as_ref() {
                let owned = format!("{}.{}", recv_name, method);
                if table.cells.contains_key(&owned) {
                    graph.edges.push(CallEdge {
                        caller: caller.to_string(),
                        callee_text: owned.clone(),
                        kind: CallKind::CrossClass,
                        resolved_callee: Some(owned),
                        receiver: None,
                        line,
                    });
                    return;
                }
            }
            graph.edges.push(CallEdge {
                caller: caller.to_string(),
                callee_text: method.clone(),
                kind: CallKind::Foreign,
                resolved_callee: None,
                receiver: if let Expr::Ident(recv_name, _) = recv.as_ref() {
                    Some(recv_name.clone())
                } else {
                    None
                },
                line,
            });
        }
        _ => {
            graph.edges.push(CallEdge {
                caller: caller.to_string(),
                callee_text: "<expr>".to_string(),
                kind: CallKind::Foreign,
                resolved_callee: None,
                receiver: None,
                line,
            });
        }
    }
}

// ── Type-reference checking ─────────────────────────────────────────────

fn suggestions_for(name: &str, table: &SymbolTable) -> Vec<String> {
    let mut scored: Vec<(usize, &String)> = table
        .types
        .keys()
        .filter(|k| k.as_str() != name)
        .map(|k| (levenshtein(name, k), k))
        .filter(|(d, _)| *d > 0 && *d <= 2)
        .collect();
    scored.sort_by_key(|(d, _)| *d);
    scored.into_iter().map(|(_, k)| k.clone()).collect()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());
    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0; n + 1];
    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}

fn check_type_refs_with_generics(
    ty: &TypeExpr,
    table: &SymbolTable,
    errors: &mut Vec<ResolveError>,
    generics: &[String],
) {
    match ty {
        TypeExpr::Named(name, span) => {
            if generics.iter().any(|g| g == name) {
                return;
            }
            if !table.types.contains_key(name) {
                errors.push(ResolveError::UndefinedType {
                    name: name.clone(),
                    line: span.line,
                    suggestions: suggestions_for(name, table),
                });
            }
        }
        TypeExpr::List(inner, _) => check_type_refs_with_generics(inner, table, errors, generics),
        TypeExpr::Map(k, v, _) => {
            check_type_refs_with_generics(k, table, errors, generics);
            check_type_refs_with_generics(v, table, errors, generics);
        }
        TypeExpr::Result(ok, err, _) => {
            check_type_refs_with_generics(ok, table, errors, generics);
            check_type_refs_with_generics(err, table, errors, generics);
        }
        TypeExpr::Union(types, _) => {
            for t in types {
                check_type_refs_with_generics(t, table, errors, generics);
            }
        }
        TypeExpr::Null(_) => {}
        TypeExpr::Tuple(types, _) => {
            for t in types {
                check_type_refs_with_generics(t, table, errors, generics);
            }
        }
        TypeExpr::Set(inner, _) => check_type_refs_with_generics(inner, table, errors, generics),
        TypeExpr::Fn(params, ret, _, _) => {
            for t in params {
                check_type_refs_with_generics(t, table, errors, generics);
            }
            check_type_refs_with_generics(ret, table, errors, generics);
        }
        TypeExpr::Generic(name, args, span) => {
            if !generics.iter().any(|g| g == name) {
                match table.types.get(name) {
                    None => errors.push(ResolveError::UndefinedType {
                        name: name.clone(),
                        line: span.line,
                        suggestions: suggestions_for(name, table),
                    }),
                    Some(info) => {
                        if let Some(expected) = info.generic_arity() {
                            if expected != args.len() {
                                errors.push(ResolveError::GenericArityMismatch {
                                    name: name.clone(),
                                    expected,
                                    found: args.len(),
                                    line: span.line,
                                });
                            }
                        }
                    }
                }
            }
            for t in args {
                check_type_refs_with_generics(t, table, errors, generics);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Lexer;
    use crate::compiler::parser::Parser;

    fn resolve_src(src: &str) -> Result<SymbolTable, Vec<ResolveError>> {
        let mut lexer = Lexer::new(src, 1, 0);
        let tokens = lexer.tokenize().unwrap();
        let mut parser = Parser::new(tokens);
        let prog = parser.parse_program(vec![]).unwrap();
        resolve(&prog)
    }

    #[test]
    fn test_resolve_basic() {
        let table =
            resolve_src("record Foo\n  x: Int\nend\n\ncell main() -> Foo\n  return Foo(x: 1)\nend")
                .unwrap();
        assert!(table.types.contains_key("Foo"));
        assert!(table.cells.contains_key("main"));
    }

    #[test]
    fn test_resolve_undefined_type() {
        let err = resolve_src("record Bar\n  x: Unknown\nend").unwrap_err();
        assert!(!err.is_empty());
        assert!(matches!(err[0], ResolveError::UndefinedType { .. }));
    }

    #[test]
    fn test_call_graph_internal_call() {
        let src = "cell helper() -> Int\n  return 1\nend\n\ncell main() -> Int\n  return helper()\nend";
        let mut lexer = Lexer::new(src, 1, 0);
        let tokens = lexer.tokenize().unwrap();
        let mut parser = Parser::new(tokens);
        let prog = parser.parse_program(vec![]).unwrap();
        let table = resolve(&prog).unwrap();
        let graph = build_call_graph(&prog, &table);
        let edge = graph.edges.iter().find(|e| e.callee_text == "helper").unwrap();
        assert_eq!(edge.kind, CallKind::Internal);
    }

    #[test]
    fn test_duplicate_stable_id_detected() {
        let mut prog = Parser::new(
            Lexer::new("cell a() -> Int\n  return 1\nend\n\ncell b() -> Int\n  return 2\nend", 1, 0)
                .tokenize()
                .unwrap(),
        )
        .parse_program(vec![])
        .unwrap();
        for item in prog.items.iter_mut() {
            if let Item::Cell(c) = item {
                c.stable_id = "same-id".to_string();
            }
        }
        let err = resolve(&prog).unwrap_err();
        assert!(err
            .iter()
            .any(|e| matches!(e, ResolveError::DuplicateStableId { .. })));
    }
}
