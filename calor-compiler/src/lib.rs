//! Calor Compiler
//!
//! Runs Calor source through the semantic analysis and verification
//! pipeline: lex -> parse -> Binder -> typecheck -> constraints ->
//! Effect Engine -> Verifier. The surface lexer and parser are treated
//! as external collaborators by the specification but live in this
//! crate as their upstream producers; code generation to the host
//! object language is out of scope and lives outside this crate.

pub mod compiler;
pub mod diagnostics;

use compiler::ast::Program;
use compiler::effects::manifest::ManifestStore;
use compiler::effects::{EffectEngineResult, EffectPolicy};
use compiler::resolve::SymbolTable;
use compiler::verification::{
    skipped_cell_contract_results, skipped_results, verify, verify_cell_contracts,
    VerificationResult,
};

use thiserror::Error;

// ── Compile options ─────────────────────────────────────────────────

/// Options controlling the compile pipeline: effect enforcement policy,
/// the manifest store consulted by the Effect Resolver, and whether
/// contract verification runs at all.
///
/// All fields have sensible defaults: effect enforcement is strict and
/// on, the manifest store carries only the built-in catalog, and
/// verification is enabled (it is always non-fatal regardless).
#[derive(Clone)]
pub struct CompileOptions {
    /// Effect Engine enforcement policy. Default: strict, enforced.
    pub effect_policy: EffectPolicy,
    /// Manifest store consulted by the Effect Resolver. Default: the
    /// built-in catalog with no user/solution/project layers loaded.
    pub manifests: ManifestStore,
    /// Run the Verifier (per-contract discharge plus cell-contract
    /// call-site checking). Default: `true`. Verification never blocks
    /// compilation; this only controls whether it runs at all.
    pub verify: bool,
    /// Allow unstable features without errors. Default: `false`.
    pub allow_unstable: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            effect_policy: EffectPolicy::default(),
            manifests: ManifestStore::with_builtin_catalog(),
            verify: true,
            allow_unstable: false,
        }
    }
}

impl std::fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileOptions")
            .field("effect_policy", &self.effect_policy)
            .field("verify", &self.verify)
            .field("allow_unstable", &self.allow_unstable)
            .finish()
    }
}

// ── Compile errors ───────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("lex error: {0}")]
    Lex(#[from] compiler::lexer::LexError),
    #[error("parse errors: {0:?}")]
    Parse(Vec<compiler::parser::ParseError>),
    #[error("resolve errors: {0:?}")]
    Resolve(Vec<compiler::resolve::ResolveError>),
    #[error("type errors: {0:?}")]
    Type(Vec<compiler::typecheck::TypeError>),
    #[error("constraint errors: {0:?}")]
    Constraint(Vec<compiler::constraints::ConstraintError>),
    #[error("forbidden effects: {0:?}")]
    Effect(Vec<compiler::effects::ForbiddenEffect>),
    #[error("multiple errors: {0:?}")]
    Multiple(Vec<CompileError>),
}

impl CompileError {
    /// Construct a `CompileError` from a list of errors.
    /// Returns `None` if the list is empty, unwraps single-element lists,
    /// and flattens nested `Multiple` variants.
    pub fn from_multiple(errors: Vec<CompileError>) -> Option<CompileError> {
        let flattened: Vec<CompileError> = errors
            .into_iter()
            .flat_map(|e| match e {
                CompileError::Multiple(inner) => inner,
                other => vec![other],
            })
            .collect();
        match flattened.len() {
            0 => None,
            1 => Some(flattened.into_iter().next().unwrap()),
            _ => Some(CompileError::Multiple(flattened)),
        }
    }
}

impl From<compiler::parser::ParseError> for CompileError {
    fn from(err: compiler::parser::ParseError) -> Self {
        CompileError::Parse(vec![err])
    }
}

// ── Compile output ───────────────────────────────────────────────────

/// Everything produced by a successful compile: the bound program and
/// symbol table, the Effect Engine's per-cell inference report, and the
/// Verifier's findings. Verification results are always present (when
/// `CompileOptions::verify` is set) because unproven or disproven
/// contracts never block compilation — only resolve/type/constraint/
/// effect violations do.
#[derive(Debug)]
pub struct CompileOutput {
    pub program: Program,
    pub symbols: SymbolTable,
    pub effects: EffectEngineResult,
    pub contract_results: Vec<VerificationResult>,
    pub cell_contract_results: Vec<VerificationResult>,
}

/// Compile Calor source through the full semantic analysis and
/// verification pipeline using default options.
pub fn compile(source: &str) -> Result<CompileOutput, CompileError> {
    compile_with_options(source, &CompileOptions::default())
}

/// Compile Calor source through the full semantic analysis and
/// verification pipeline.
///
/// Order: lex -> parse -> Binder (name resolution, call graph) ->
/// typecheck -> constraints -> Effect Engine -> Verifier. The first
/// four stages' errors are collected and reported together if any
/// stage fails; the Effect Engine's violations are hard errors only
/// when `options.effect_policy.enforce` is set. The Verifier always
/// runs last and never turns its findings into a `CompileError` — they
/// are returned alongside the rest of the output for the caller (an
/// emitter, a CLI, a test) to act on.
pub fn compile_with_options(
    source: &str,
    options: &CompileOptions,
) -> Result<CompileOutput, CompileError> {
    // 1. Lex
    let mut lexer = compiler::lexer::Lexer::new(source, 1, 0);
    let tokens = lexer.tokenize()?;

    // 2. Parse (with recovery, so a file with several independent syntax
    // errors reports all of them instead of stopping at the first).
    let mut parser = compiler::parser::Parser::new(tokens);
    let (program, parse_errors) = parser.parse_program_with_recovery(vec![]);
    if !parse_errors.is_empty() {
        return Err(CompileError::Parse(parse_errors));
    }

    // 3. Resolve (the Binder)
    let symbols = match compiler::resolve::resolve(&program) {
        Ok(symbols) => symbols,
        Err(resolve_errors) => return Err(CompileError::Resolve(resolve_errors)),
    };

    let mut all_errors: Vec<CompileError> = Vec::new();

    // 4. Typecheck
    if let Err(type_errors) = compiler::typecheck::typecheck(&program, &symbols) {
        all_errors.push(CompileError::Type(type_errors));
    }

    // 5. Validate constraints
    if let Err(constraint_errors) = compiler::constraints::validate_constraints(&program) {
        all_errors.push(CompileError::Constraint(constraint_errors));
    }

    if let Some(combined) = CompileError::from_multiple(all_errors) {
        return Err(combined);
    }

    // 6. Effect Engine: fixpoint inference plus declared-vs-inferred
    // enforcement, through the Effect Resolver backed by the manifest
    // store.
    let effects = compiler::effects::check(&program, &symbols, &options.manifests, &options.effect_policy);
    if options.effect_policy.enforce && !effects.diagnostics.is_empty() {
        return Err(CompileError::Effect(effects.diagnostics.clone()));
    }

    // 7. Verifier: per-contract discharge plus cell-contract call-site
    // checking. Non-fatal by design (I5 is enforced earlier, at bind
    // time, so contract purity violations surface as resolve errors,
    // not here). When disabled, every contract still gets a `Skipped`
    // result rather than being silently dropped (§4.5 Modes).
    let (contract_results, cell_contract_results) = if options.verify {
        (verify(&program, &symbols), verify_cell_contracts(&program))
    } else {
        (
            skipped_results(&program),
            skipped_cell_contract_results(&program),
        )
    };

    Ok(CompileOutput {
        program,
        symbols,
        effects,
        contract_results,
        cell_contract_results,
    })
}

/// Format a compile error with rich diagnostics (colors, source snippets, suggestions).
///
/// This is a convenience function that wraps `diagnostics::format_compile_error`
/// and renders all diagnostics with ANSI colors for terminal display.
pub fn format_error(error: &CompileError, source: &str, filename: &str) -> String {
    diagnostics::format_compile_error(error, source, filename)
        .iter()
        .map(|d| d.render_ansi())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_simple() {
        let src = r#"cell main() -> Int
  return 42
end
"#;
        let output = compile(src).unwrap();
        assert_eq!(output.symbols.cells.len(), 1);
        assert!(output.symbols.cells.contains_key("main"));
    }

    #[test]
    fn test_compile_with_record() {
        let src = r#"record Point
  x: Int
  y: Int
end

cell origin() -> Point
  return Point(x: 0, y: 0)
end
"#;
        let output = compile(src).unwrap();
        assert_eq!(output.symbols.types.len(), 1);
        assert_eq!(output.symbols.cells.len(), 1);
    }

    #[test]
    fn test_compile_collects_multiple_parse_errors() {
        let src = r#"
cell bad1() -> Int
  let x =
  return 1
end

cell bad2(param Int) -> Int
  return param
end

record Broken
  x:
end

cell bad3() -> Int
  return
end
"#;

        let err = compile(src).expect_err("expected parse errors");
        match err {
            CompileError::Parse(errors) => {
                assert!(
                    errors.len() >= 3,
                    "expected at least 3 parse errors, got {}",
                    errors.len()
                );
            }
            other => panic!("expected parse errors, got {:?}", other),
        }
    }

    #[test]
    fn test_compile_undefined_cell_is_resolve_error() {
        let src = r#"cell main() -> Int
  return helper()
end
"#;
        let err = compile(src).expect_err("expected a resolve error");
        match err {
            CompileError::Resolve(errors) => assert!(!errors.is_empty()),
            other => panic!("expected resolve errors, got {:?}", other),
        }
    }

    #[test]
    fn test_compile_runs_verifier_without_blocking() {
        let src = r#"cell half(n: Int) -> Int
  where n >= 0
  return n / 2
end
"#;
        // Verification always runs (or is explicitly disabled) but never
        // turns a finding into a CompileError — a successful compile means
        // the Lex/Parse/Resolve/Type/Constraint/Effect stages all passed,
        // independent of what the Verifier reports.
        let output = compile(src).unwrap();
        let _ = output.contract_results;
        let _ = output.cell_contract_results;
    }

    #[test]
    fn test_compile_with_verification_disabled() {
        let src = r#"cell half(n: Int) -> Int
  where n >= 0
  ensures result <= n
  return n / 2
end
"#;
        let options = CompileOptions {
            verify: false,
            ..CompileOptions::default()
        };
        let output = compile_with_options(src, &options).unwrap();
        assert!(!output.contract_results.is_empty());
        assert!(output
            .contract_results
            .iter()
            .all(|r| matches!(r, VerificationResult::Skipped { .. })));
    }
}
