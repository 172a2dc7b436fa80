//! Effect system: Manifest Store (M, §4.1), Effect Resolver (R, §4.2), and
//! Effect Engine (E, §4.4). Sits between the Binder and the Verifier in the
//! compile pipeline.

pub mod engine;
pub mod manifest;
pub mod model;
pub mod resolver;

use crate::compiler::ast::Program;
use crate::compiler::resolve::SymbolTable;
use manifest::ManifestStore;
use resolver::{EffectResolver, ResolverPolicy};

pub use engine::{EffectEngineOptions, EffectEngineResult, ForbiddenEffect};
pub use model::{Effect, EffectCategory, EffectSet};

/// Everything the effect system needs to run once per compilation unit:
/// which manifests are loaded and how unresolved externals are treated.
#[derive(Debug, Clone)]
pub struct EffectPolicy {
    pub resolver_policy: ResolverPolicy,
    /// `ForbiddenEffect` is a hard error when true; otherwise a warning.
    pub enforce: bool,
}

impl Default for EffectPolicy {
    fn default() -> Self {
        Self {
            resolver_policy: ResolverPolicy::Strict,
            enforce: true,
        }
    }
}

/// Run the Effect Resolver + Effect Engine over an already-bound program.
/// `store` is typically built once per compilation via
/// [`manifest::ManifestStore::load_all`] and reused across files in a
/// project run.
pub fn check(
    program: &Program,
    symbols: &SymbolTable,
    store: &ManifestStore,
    policy: &EffectPolicy,
) -> EffectEngineResult {
    let resolver = EffectResolver::new(store, policy.resolver_policy);
    engine::run(
        program,
        symbols,
        &resolver,
        &EffectEngineOptions {
            enforce: policy.enforce,
            resolver_policy: policy.resolver_policy,
        },
    )
}
