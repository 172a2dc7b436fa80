//! Effect Engine (E, §4.4): per-cell inferred-effect fixpoint and
//! declared-vs-inferred enforcement.

use super::model::{Effect, EffectSet};
use super::resolver::EffectResolver;
use crate::compiler::ast::{CallArg, Expr, MatchArm, Pattern, Program, Stmt};
use crate::compiler::resolve::{all_cells, build_call_graph, CallKind, SymbolTable};
use std::collections::HashMap;

/// A single `ForbiddenEffect` diagnostic: one forbidden effect, attached to
/// the offending cell, with a short call-chain explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForbiddenEffect {
    pub cell: String,
    pub effect: Effect,
    pub call_chain: String,
    /// Downgraded to a warning when enforcement is off.
    pub is_warning: bool,
}

/// `cell name -> { inferred effects, declared effects, diagnostics }` after
/// a full engine run.
#[derive(Debug, Clone)]
pub struct CellEffectReport {
    pub inferred: EffectSet,
    pub declared: EffectSet,
}

#[derive(Debug, Clone, Default)]
pub struct EffectEngineOptions {
    /// Enforcement on/off (§4.4 Policy surface). Off still computes
    /// diagnostics but downgrades them to warnings.
    pub enforce: bool,
    pub resolver_policy: super::resolver::ResolverPolicy,
}

#[derive(Debug, Clone)]
pub struct EffectEngineResult {
    pub reports: HashMap<String, CellEffectReport>,
    pub diagnostics: Vec<ForbiddenEffect>,
}

/// Run the fixpoint over every declared cell in `program` and enforce
/// declared-vs-inferred per cell.
pub fn run(
    program: &Program,
    symbols: &SymbolTable,
    resolver: &EffectResolver,
    options: &EffectEngineOptions,
) -> EffectEngineResult {
    let graph = build_call_graph(program, symbols);
    let cells = all_cells(program);

    // Seed each cell's inferred set with its body's intrinsic effects and
    // the resolved effects of its foreign call edges (§4.4 algorithm,
    // first sentence).
    let mut inferred: HashMap<String, EffectSet> = HashMap::new();
    for (name, cell) in &cells {
        let mut set = intrinsic_effects_of_body(&cell.body);
        for edge in graph.edges_from(name) {
            if edge.kind == CallKind::Foreign {
                if let Some(effects) = foreign_edge_effects(edge, resolver) {
                    set.union_in_place(&effects);
                }
            }
        }
        inferred.insert(name.clone(), set);
    }

    // Fixpoint: caller.inferred |= callee.inferred along every Internal /
    // CrossClass edge, until no variable changes. Finite lattice + monotone
    // update guarantees termination (P2): at most |functions| x |lattice|
    // iterations.
    let max_iterations = cells.len().max(1) * (Effect::Unknown as usize + 1).max(1);
    for _ in 0..max_iterations {
        let mut changed = false;
        for (name, _) in &cells {
            let mut additions = EffectSet::new();
            for edge in graph.edges_from(name) {
                match edge.kind {
                    CallKind::Internal | CallKind::CrossClass => {
                        if let Some(callee) = &edge.resolved_callee {
                            if let Some(callee_set) = inferred.get(callee) {
                                additions.union_in_place(callee_set);
                            }
                        } else {
                            // Ambiguous cross-class target: top, per §4.4.
                            additions.insert(Effect::Unknown);
                        }
                    }
                    CallKind::Foreign => {}
                }
            }
            if let Some(set) = inferred.get_mut(name) {
                if set.union_in_place(&additions) {
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    let mut reports = HashMap::new();
    let mut diagnostics = Vec::new();
    for (name, cell) in &cells {
        let declared = EffectSet::from_codes(&cell.effects);
        let cell_inferred = inferred.remove(name).unwrap_or_default();
        let forbidden = cell_inferred.difference(&declared);
        for effect in forbidden.iter() {
            diagnostics.push(ForbiddenEffect {
                cell: name.clone(),
                effect: *effect,
                call_chain: shortest_offending_chain(&graph, name, *effect, resolver),
                is_warning: !options.enforce,
            });
        }
        reports.insert(
            name.clone(),
            CellEffectReport {
                inferred: cell_inferred,
                declared,
            },
        );
    }

    EffectEngineResult { reports, diagnostics }
}

/// Shortest path in the call graph from `cell` to a leaf edge that
/// introduces `effect`, rendered as `a -> b -> c`. Falls back to just the
/// cell name when no explanatory path is found (e.g. the effect came from
/// an intrinsic in the cell's own body).
fn shortest_offending_chain(
    graph: &crate::compiler::resolve::CallGraph,
    cell: &str,
    effect: Effect,
    resolver: &EffectResolver,
) -> String {
    use std::collections::{HashSet, VecDeque};

    let mut queue: VecDeque<Vec<String>> = VecDeque::new();
    queue.push_back(vec![cell.to_string()]);
    let mut visited = HashSet::new();
    visited.insert(cell.to_string());

    while let Some(path) = queue.pop_front() {
        if path.len() > 6 {
            continue; // bound the search; chains longer than this aren't useful in a diagnostic
        }
        let last = path.last().unwrap().clone();
        for edge in graph.edges_from(&last) {
            match edge.kind {
                CallKind::Foreign => {
                    if let Some(effects) = foreign_edge_effects(edge, resolver) {
                        if effects.contains(effect) {
                            let mut extended = path.clone();
                            extended.push(format!(
                                "{}.{}",
                                edge.receiver.as_deref().unwrap_or("<free>"),
                                edge.callee_text
                            ));
                            return extended.join(" -> ");
                        }
                    }
                }
                CallKind::Internal | CallKind::CrossClass => {
                    let next = match &edge.resolved_callee {
                        Some(callee) => callee.clone(),
                        None => continue,
                    };
                    if visited.insert(next.clone()) {
                        let mut extended = path.clone();
                        extended.push(next);
                        queue.push_back(extended);
                    }
                }
            }
        }
    }
    format!("{cell} (introduced in its own body)")
}

fn foreign_edge_effects(
    edge: &crate::compiler::resolve::CallEdge,
    resolver: &EffectResolver,
) -> Option<EffectSet> {
    let receiver_type = edge.receiver.clone().unwrap_or_else(|| "<free>".to_string());
    let resolved = resolver.resolve(&receiver_type, &edge.callee_text);
    Some(resolved.effects)
}

/// Binder duty 3: assign each built-in operation's intrinsic effect.
/// Arithmetic, comparisons, and plain control flow contribute nothing.
fn intrinsic_effects_of_body(body: &[Stmt]) -> EffectSet {
    let mut set = EffectSet::new();
    for stmt in body {
        intrinsic_effects_of_stmt(stmt, &mut set);
    }
    set
}

fn intrinsic_effects_of_stmt(stmt: &Stmt, set: &mut EffectSet) {
    match stmt {
        Stmt::Let(s) => intrinsic_effects_of_expr(&s.value, set),
        Stmt::If(s) => {
            intrinsic_effects_of_expr(&s.condition, set);
            for b in &s.then_body {
                intrinsic_effects_of_stmt(b, set);
            }
            if let Some(else_body) = &s.else_body {
                for b in else_body {
                    intrinsic_effects_of_stmt(b, set);
                }
            }
        }
        Stmt::For(s) => {
            intrinsic_effects_of_expr(&s.iter, set);
            for b in &s.body {
                intrinsic_effects_of_stmt(b, set);
            }
        }
        Stmt::While(s) => {
            intrinsic_effects_of_expr(&s.condition, set);
            for b in &s.body {
                intrinsic_effects_of_stmt(b, set);
            }
        }
        Stmt::Loop(s) => {
            for b in &s.body {
                intrinsic_effects_of_stmt(b, set);
            }
        }
        Stmt::Match(s) => {
            intrinsic_effects_of_expr(&s.subject, set);
            for arm in &s.arms {
                intrinsic_effects_of_arm(arm, set);
            }
        }
        Stmt::Return(s) => intrinsic_effects_of_expr(&s.value, set),
        Stmt::Halt(s) => {
            intrinsic_effects_of_expr(&s.message, set);
            set.insert(Effect::Exception);
        }
        Stmt::Assign(s) => intrinsic_effects_of_expr(&s.value, set),
        Stmt::CompoundAssign(s) => intrinsic_effects_of_expr(&s.value, set),
        Stmt::Expr(s) => intrinsic_effects_of_expr(&s.expr, set),
        Stmt::Break(s) => {
            if let Some(v) = &s.value {
                intrinsic_effects_of_expr(v, set);
            }
        }
        Stmt::Continue(_) => {}
        Stmt::Emit(s) => intrinsic_effects_of_expr(&s.value, set),
    }
}

fn intrinsic_effects_of_arm(arm: &MatchArm, set: &mut EffectSet) {
    if let Pattern::Guard { condition, .. } = &arm.pattern {
        intrinsic_effects_of_expr(condition, set);
    }
    for b in &arm.body {
        intrinsic_effects_of_stmt(b, set);
    }
}

fn intrinsic_effects_of_expr(expr: &Expr, set: &mut EffectSet) {
    match expr {
        Expr::Call(callee, args, _) => {
            intrinsic_effects_of_expr(callee, set);
            for a in args {
                intrinsic_effects_of_expr(call_arg_expr(a), set);
            }
        }
        Expr::ToolCall(callee, args, _) => {
            intrinsic_effects_of_expr(callee, set);
            for a in args {
                intrinsic_effects_of_expr(call_arg_expr(a), set);
            }
        }
        Expr::ListLit(items, _) | Expr::SetLit(items, _) | Expr::TupleLit(items, _) => {
            if !items.is_empty() {
                set.insert(Effect::Allocation);
            }
            for i in items {
                intrinsic_effects_of_expr(i, set);
            }
        }
        Expr::MapLit(items, _) => {
            if !items.is_empty() {
                set.insert(Effect::Allocation);
            }
            for (k, v) in items {
                intrinsic_effects_of_expr(k, set);
                intrinsic_effects_of_expr(v, set);
            }
        }
        Expr::RecordLit(_, fields, _) => {
            set.insert(Effect::Allocation);
            for (_, v) in fields {
                intrinsic_effects_of_expr(v, set);
            }
        }
        Expr::BinOp(lhs, _, rhs, _) => {
            intrinsic_effects_of_expr(lhs, set);
            intrinsic_effects_of_expr(rhs, set);
        }
        Expr::UnaryOp(_, inner, _) => intrinsic_effects_of_expr(inner, set),
        Expr::DotAccess(recv, _, _) => intrinsic_effects_of_expr(recv, set),
        Expr::IndexAccess(recv, idx, _) => {
            intrinsic_effects_of_expr(recv, set);
            intrinsic_effects_of_expr(idx, set);
        }
        Expr::IfExpr { cond, then_val, else_val, .. } => {
            intrinsic_effects_of_expr(cond, set);
            intrinsic_effects_of_expr(then_val, set);
            intrinsic_effects_of_expr(else_val, set);
        }
        // Await contributes no intrinsic effect of its own; its effects
        // come entirely from the wrapped call.
        Expr::AwaitExpr(inner, _) => intrinsic_effects_of_expr(inner, set),
        Expr::TryExpr(inner, _) => intrinsic_effects_of_expr(inner, set),
        // `!` can panic at runtime on a null value: modeled as `exception`.
        Expr::NullAssert(inner, _) => {
            set.insert(Effect::Exception);
            intrinsic_effects_of_expr(inner, set);
        }
        Expr::NullCoalesce(lhs, rhs, _) => {
            intrinsic_effects_of_expr(lhs, set);
            intrinsic_effects_of_expr(rhs, set);
        }
        Expr::NullSafeAccess(recv, _, _) => intrinsic_effects_of_expr(recv, set),
        Expr::SpreadExpr(inner, _) => intrinsic_effects_of_expr(inner, set),
        Expr::BlockExpr(stmts, _) => {
            for s in stmts {
                intrinsic_effects_of_stmt(s, set);
            }
        }
        Expr::Comprehension { body, iter, condition, .. } => {
            intrinsic_effects_of_expr(body, set);
            intrinsic_effects_of_expr(iter, set);
            if let Some(c) = condition {
                intrinsic_effects_of_expr(c, set);
            }
        }
        Expr::StringInterp(segments, _) => {
            for seg in segments {
                if let crate::compiler::ast::StringSegment::Interpolation(e)
                | crate::compiler::ast::StringSegment::FormattedInterpolation(e, _) = seg
                {
                    intrinsic_effects_of_expr(e, set);
                }
            }
        }
        Expr::RangeExpr { start, end, step, .. } => {
            if let Some(e) = start {
                intrinsic_effects_of_expr(e, set);
            }
            if let Some(e) = end {
                intrinsic_effects_of_expr(e, set);
            }
            if let Some(e) = step {
                intrinsic_effects_of_expr(e, set);
            }
        }
        Expr::IsType { expr, .. } | Expr::TypeCast { expr, .. } => {
            intrinsic_effects_of_expr(expr, set);
        }
        _ => {}
    }
}

fn call_arg_expr(arg: &CallArg) -> &Expr {
    match arg {
        CallArg::Positional(e) => e,
        CallArg::Named(_, e, _) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::effects::manifest::ManifestStore;
    use crate::compiler::effects::resolver::ResolverPolicy;
    use crate::compiler::parser::Parser;
    use crate::compiler::lexer::Lexer;
    use crate::compiler::resolve::resolve;

    fn compile_to_program(src: &str) -> Program {
        let tokens = Lexer::new(src, 1, 0).tokenize().expect("lex");
        Parser::new(tokens)
            .parse_program(Vec::new())
            .expect("parse")
    }

    #[test]
    fn console_write_without_declared_effect_is_forbidden() {
        // S1 (adapted to Calor's call-based console surface): a cell that
        // writes to the console and declares no effect.
        let src = "cell TestPrint()\n    Console.log(\"test\")\nend\n";
        let program = compile_to_program(src);
        let symbols = resolve(&program).expect("resolve");
        let store = ManifestStore::with_builtin_catalog();
        let resolver = EffectResolver::new(&store, ResolverPolicy::Strict);
        let result = run(&program, &symbols, &resolver, &EffectEngineOptions {
            enforce: true,
            resolver_policy: ResolverPolicy::Strict,
        });
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.cell == "TestPrint" && d.effect == Effect::ConsoleWrite));
    }

    #[test]
    fn declared_effect_covers_inferred_console_write() {
        let src = "cell TestPrint() / {cw}\n    Console.log(\"test\")\nend\n";
        let program = compile_to_program(src);
        let symbols = resolve(&program).expect("resolve");
        let store = ManifestStore::with_builtin_catalog();
        let resolver = EffectResolver::new(&store, ResolverPolicy::Strict);
        let result = run(&program, &symbols, &resolver, &EffectEngineOptions {
            enforce: true,
            resolver_policy: ResolverPolicy::Strict,
        });
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn pure_arithmetic_cell_has_no_inferred_effects() {
        let src = "cell Square(x: Int) -> Int\n    return x * x\nend\n";
        let program = compile_to_program(src);
        let symbols = resolve(&program).expect("resolve");
        let store = ManifestStore::with_builtin_catalog();
        let resolver = EffectResolver::new(&store, ResolverPolicy::Strict);
        let result = run(&program, &symbols, &resolver, &EffectEngineOptions::default());
        let report = &result.reports["Square"];
        assert!(report.inferred.is_empty());
    }
}
