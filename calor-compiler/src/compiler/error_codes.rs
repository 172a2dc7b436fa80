//! Stable error codes for all `CompileError` variants.
//!
//! Code ranges:
//!   E0001–E0009  Lex errors
//!   E0010–E0099  Parse errors
//!   E0100–E0199  Resolve errors (the Binder)
//!   E0200–E0299  Type errors
//!   E0300–E0399  Constraint errors
//!   E0600–E0699  Effect Engine enforcement errors

use crate::compiler::constraints::ConstraintError;
use crate::compiler::effects::ForbiddenEffect;
use crate::compiler::lexer::LexError;
use crate::compiler::parser::ParseError;
use crate::compiler::resolve::ResolveError;
use crate::compiler::typecheck::TypeError;
use crate::CompileError;

// ── Lex error codes (E0001–E0009) ──────────────────────────────────

fn lex_error_code(e: &LexError) -> &'static str {
    match e {
        LexError::UnexpectedChar { .. } => "E0001",
        LexError::UnterminatedString { .. } => "E0002",
        LexError::InconsistentIndent { .. } => "E0003",
        LexError::InvalidNumber { .. } => "E0004",
        LexError::InvalidBytesLiteral { .. } => "E0005",
        LexError::InvalidUnicodeEscape { .. } => "E0006",
    }
}

// ── Parse error codes (E0010–E0099) ────────────────────────────────

fn parse_error_code(e: &ParseError) -> &'static str {
    match e {
        ParseError::Unexpected { .. } => "E0010",
        ParseError::UnexpectedEof => "E0011",
        ParseError::UnclosedBracket { .. } => "E0012",
        ParseError::MissingEnd { .. } => "E0013",
        ParseError::MissingType { .. } => "E0014",
        ParseError::IncompleteExpression { .. } => "E0015",
        ParseError::MalformedConstruct { .. } => "E0016",
    }
}

// ── Resolve error codes (E0100–E0199) ──────────────────────────────

fn resolve_error_code(e: &ResolveError) -> &'static str {
    match e {
        ResolveError::UndefinedType { .. } => "E0100",
        ResolveError::GenericArityMismatch { .. } => "E0101",
        ResolveError::UndefinedCell { .. } => "E0102",
        ResolveError::UndefinedTrait { .. } => "E0103",
        ResolveError::UndefinedTool { .. } => "E0104",
        ResolveError::Duplicate { .. } => "E0105",
        ResolveError::MissingEffectGrant { .. } => "E0106",
        ResolveError::UndeclaredEffect { .. } => "E0107",
        ResolveError::EffectContractViolation { .. } => "E0108",
        ResolveError::NondeterministicOperation { .. } => "E0109",
        ResolveError::MachineUnknownInitial { .. } => "E0110",
        ResolveError::MachineUnknownTransition { .. } => "E0111",
        ResolveError::MachineUnreachableState { .. } => "E0112",
        ResolveError::MachineMissingTerminal { .. } => "E0113",
        ResolveError::MachineTransitionArgCount { .. } => "E0114",
        ResolveError::MachineTransitionArgType { .. } => "E0115",
        ResolveError::MachineUnsupportedExpr { .. } => "E0116",
        ResolveError::MachineGuardType { .. } => "E0117",
        ResolveError::PipelineUnknownStage { .. } => "E0118",
        ResolveError::PipelineStageArity { .. } => "E0119",
        ResolveError::PipelineStageTypeMismatch { .. } => "E0120",
        ResolveError::CircularImport { .. } => "E0121",
        ResolveError::ModuleNotFound { .. } => "E0122",
        ResolveError::ImportedSymbolNotFound { .. } => "E0123",
        ResolveError::TraitMissingMethods { .. } => "E0124",
        ResolveError::TraitMethodSignatureMismatch { .. } => "E0125",
        ResolveError::UnstableFeature { .. } => "E0126",
        ResolveError::DeprecatedUsage { .. } => "E0127",
        ResolveError::DuplicateStableId { .. } => "E0128",
        ResolveError::ContractNotPure { .. } => "E0129",
    }
}

// ── Type error codes (E0200–E0299) ─────────────────────────────────

fn type_error_code(e: &TypeError) -> &'static str {
    match e {
        TypeError::Mismatch { .. } => "E0200",
        TypeError::UndefinedVar { .. } => "E0201",
        TypeError::NotCallable { .. } => "E0202",
        TypeError::ArgCount { .. } => "E0203",
        TypeError::UnknownField { .. } => "E0204",
        TypeError::UndefinedType { .. } => "E0205",
        TypeError::MissingReturn { .. } => "E0206",
        TypeError::ImmutableAssign { .. } => "E0207",
    }
}

// ── Constraint error codes (E0300–E0399) ───────────────────────────

fn constraint_error_code(e: &ConstraintError) -> &'static str {
    match e {
        ConstraintError::Invalid { .. } => "E0300",
    }
}

// ── Effect Engine error codes (E0600–E0699) ────────────────────────

fn effect_error_code(_e: &ForbiddenEffect) -> &'static str {
    "E0600"
}

// ── Public API ─────────────────────────────────────────────────────

/// Return the stable error code for the *first* sub-error inside a
/// `CompileError`.  Compound errors (`Multiple`, `Parse(Vec<..>)`, etc.)
/// return the code of the first element so callers always get a valid
/// string.
pub fn error_code(error: &CompileError) -> &'static str {
    match error {
        CompileError::Lex(e) => lex_error_code(e),
        CompileError::Parse(errors) => errors.first().map_or("E0010", parse_error_code),
        CompileError::Resolve(errors) => errors.first().map_or("E0100", resolve_error_code),
        CompileError::Type(errors) => errors.first().map_or("E0200", type_error_code),
        CompileError::Constraint(errors) => errors.first().map_or("E0300", constraint_error_code),
        CompileError::Effect(diagnostics) => diagnostics.first().map_or("E0600", effect_error_code),
        CompileError::Multiple(errors) => errors.first().map_or("E0010", error_code),
    }
}

/// Return the stable error code for a single `LexError`.
pub fn lex_code(e: &LexError) -> &'static str {
    lex_error_code(e)
}

/// Return the stable error code for a single `ParseError`.
pub fn parse_code(e: &ParseError) -> &'static str {
    parse_error_code(e)
}

/// Return the stable error code for a single `ResolveError`.
pub fn resolve_code(e: &ResolveError) -> &'static str {
    resolve_error_code(e)
}

/// Return the stable error code for a single `TypeError`.
pub fn type_code(e: &TypeError) -> &'static str {
    type_error_code(e)
}

/// Return the stable error code for a single `ConstraintError`.
pub fn constraint_code(e: &ConstraintError) -> &'static str {
    constraint_error_code(e)
}

/// Return the stable error code for a single `ForbiddenEffect` diagnostic.
pub fn effect_code(e: &ForbiddenEffect) -> &'static str {
    effect_error_code(e)
}

/// Return a short (2–3 sentence) documentation string for the given
/// error code.
pub fn error_doc(code: &str) -> &'static str {
    match code {
        // Lex
        "E0001" => "An unexpected character was found in the source. Check for misplaced punctuation or non-ASCII characters outside string literals.",
        "E0002" => "A string literal was opened but never closed. Add the missing closing quote on the same line or use a multi-line string.",
        "E0003" => "Indentation is inconsistent with the rest of the file. Ensure every line uses the same number of spaces per indent level.",
        "E0004" => "A numeric literal could not be parsed. Verify the number format (e.g., no double dots, valid hex prefix).",
        "E0005" => "A bytes literal is malformed. Bytes literals must contain an even number of hex digits: b\"48656c6c6f\".",
        "E0006" => "A unicode escape sequence is invalid. Use the format \\u{XXXX} with valid hex codepoints.",

        // Parse
        "E0010" => "The parser encountered a token it did not expect at this position. Check for typos, missing operators, or incorrect syntax.",
        "E0011" => "The input ended unexpectedly. This usually means a block (cell, record, if, match, etc.) is missing its closing 'end' keyword.",
        "E0012" => "A bracket ('(', '[', or '{') was opened but never closed. Add the matching closing bracket.",
        "E0013" => "A block-level construct (cell, record, if, for, etc.) is missing its closing 'end' keyword.",
        "E0014" => "A type annotation was expected after ':' but was not found. Provide a type such as Int, String, or a custom record name.",
        "E0015" => "An expression was started but is incomplete. Make sure the right-hand side of an assignment or argument is a valid expression.",
        "E0016" => "A language construct (record, enum, cell, etc.) is syntactically malformed. Review the construct's required syntax.",

        // Resolve
        "E0100" => "A type name was used that has not been defined. Ensure the record, enum, or type alias is declared before use, or check for typos.",
        "E0101" => "A generic type was instantiated with the wrong number of type arguments. For example, result[Int] is missing the error type.",
        "E0102" => "A cell (function) name was referenced that has not been defined. Check the spelling or ensure the cell is declared in the current scope.",
        "E0103" => "A trait name was referenced that has not been defined. Declare the trait before implementing or referencing it.",
        "E0104" => "A tool alias was used that has not been declared with 'use tool'. Ensure the tool is imported before granting or calling it.",
        "E0105" => "A name was defined more than once in the same scope. Rename one of the duplicate definitions to resolve the conflict.",
        "E0106" => "A cell requires an effect but no compatible grant is in scope. Add a grant block that covers the required effect.",
        "E0107" => "A cell performs an effect that is not declared in its effect row. Add the effect to the cell's signature: `/ {effect_name}`.",
        "E0108" => "A cell calls another cell whose effects are not a subset of the caller's declared effects. Propagate or handle the missing effect.",
        "E0109" => "A nondeterministic operation was used inside a @deterministic cell. Remove the operation or drop the @deterministic directive.",
        "E0110" => "A machine's initial state name does not match any declared state. Check the state name spelling in the machine definition.",
        "E0111" => "A machine state transitions to a state name that does not exist. Verify the target state name in the transition.",
        "E0112" => "A machine state is unreachable from the initial state. Remove the orphan state or add a transition path to it.",
        "E0113" => "A machine declares no terminal states. At least one state must be marked terminal for the machine to halt.",
        "E0114" => "A machine transition provides the wrong number of arguments to the target state. Match the target state's parameter count.",
        "E0115" => "A machine transition argument type does not match the target state's parameter type. Fix the argument type.",
        "E0116" => "A machine state contains an unsupported expression in a guard or action. Simplify the expression.",
        "E0117" => "A machine state guard must evaluate to Bool. The guard expression returns a different type.",
        "E0118" => "A pipeline references a stage cell that has not been defined. Check the cell name in the stage declaration.",
        "E0119" => "A pipeline stage must accept exactly one data argument. Adjust the cell's signature to take a single parameter.",
        "E0120" => "The output type of one pipeline stage does not match the input type of the next. Align the stage interfaces.",
        "E0121" => "A circular import was detected. Module A imports B which imports A (possibly through intermediaries). Break the cycle.",
        "E0122" => "An imported module could not be found on disk. Check the module path and file extensions.",
        "E0123" => "A named symbol imported from a module does not exist in that module. Verify the symbol name or use a wildcard import.",
        "E0124" => "A trait implementation is missing one or more required methods. Implement all methods declared in the trait.",
        "E0125" => "A trait implementation method has an incompatible signature. The parameter types and return type must match the trait declaration.",
        "E0126" => "An unstable feature was used without opting in. Pass `--allow-unstable` or set `allow_unstable = true` in the compile options.",
        "E0127" => "A deprecated cell, record, or enum was used. The declaration is marked `@deprecated` and may be removed in a future edition.",
        "E0128" => "Two declarations share the same stable identifier. Stable IDs must be unique within a compilation unit; rename one of the declarations.",
        "E0129" => "A contract expression (where-clause or ensures-clause) is not pure. Contract expressions may not perform effects or call impure cells.",

        // Type
        "E0200" => "An expression's type does not match the expected type. For example, a cell returning String where Int is declared.",
        "E0201" => "A variable name was used that has not been defined in the current scope. Check for typos or missing let bindings.",
        "E0202" => "An expression was used in call position but is not callable. Only cells (functions) and closures can be called.",
        "E0203" => "A cell was called with the wrong number of arguments. Check the cell's signature for the expected parameter count.",
        "E0204" => "A field was accessed on a record that does not have that field. Check the field name or the record definition.",
        "E0205" => "A type name used in a type annotation is not defined. Ensure the type is declared or imported before use.",
        "E0206" => "A cell with a return type does not have a return statement on every code path. Add a return or ensure all branches return.",
        "E0207" => "An assignment was made to an immutable variable. Declare the variable with 'let mut' to allow reassignment.",

        // Constraint
        "E0300" => "A field constraint (where clause) is invalid. Ensure the constraint expression is well-formed and uses supported operations.",

        // Effect Engine
        "E0600" => "A cell's inferred effect set is not a subset of its declared effect row. The call chain in the diagnostic points to the offending call; either declare the effect or remove the call.",

        _ => "Unknown error code.",
    }
}

/// Return all registered error codes with their short description.
pub fn all_error_codes() -> Vec<(&'static str, &'static str)> {
    let codes = [
        "E0001", "E0002", "E0003", "E0004", "E0005", "E0006", "E0010", "E0011", "E0012",
        "E0013", "E0014", "E0015", "E0016", "E0100", "E0101", "E0102", "E0103", "E0104", "E0105",
        "E0106", "E0107", "E0108", "E0109", "E0110", "E0111", "E0112", "E0113", "E0114", "E0115",
        "E0116", "E0117", "E0118", "E0119", "E0120", "E0121", "E0122", "E0123", "E0124", "E0125",
        "E0126", "E0127", "E0128", "E0129", "E0200", "E0201", "E0202", "E0203", "E0204", "E0205",
        "E0206", "E0207", "E0300", "E0600",
    ];
    codes.iter().map(|&c| (c, error_doc(c))).collect()
}
