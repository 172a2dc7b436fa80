//! Calor compiler internals.
//!
//! Pipeline order: [`lexer`] -> [`parser`] -> [`resolve`] (the Binder) ->
//! [`typecheck`] -> [`constraints`] -> [`effects`] (the Effect Resolver and
//! Effect Engine) -> [`verification`] (the Verifier). [`migration`] is an
//! independent analyzer over external C# sources and does not sit on the
//! compile pipeline.

pub mod ast;
pub mod constraints;
pub mod effects;
pub mod error_codes;
pub mod fixit;
pub mod lexer;
pub mod migration;
pub mod parser;
pub mod resolve;
pub mod tokens;
pub mod typecheck;
pub mod verification;
