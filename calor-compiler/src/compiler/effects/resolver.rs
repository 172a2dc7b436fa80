//! Effect Resolver (R, §4.2): normalizes call-site lookups to effect sets,
//! with identity-stable caching and a lenient/strict policy for unknowns.

use super::manifest::{ManifestStore, MemberKind, Resolution, ResolutionStep};
use super::model::EffectSet;
use std::cell::RefCell;
use std::collections::HashMap;

/// How an unresolved (no manifest coverage) external call is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolverPolicy {
    /// Unknown resolutions are empty, with a warning.
    Lenient,
    /// Unknown resolutions are top (`unknown`), which propagates and fails
    /// enforcement.
    #[default]
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LookupKey {
    type_fqn: String,
    member_name: String,
    kind: u8,
    signature_key: Option<String>,
}

fn kind_tag(kind: MemberKind) -> u8 {
    match kind {
        MemberKind::Method => 0,
        MemberKind::Getter => 1,
        MemberKind::Setter => 2,
        MemberKind::Constructor => 3,
    }
}

/// A single resolved lookup, recording whether it fell through to the
/// "no manifest coverage" case (for `UnknownExternalCall` diagnostics).
#[derive(Debug, Clone)]
pub struct ResolvedCall {
    pub effects: EffectSet,
    pub covered: bool,
}

pub struct EffectResolver<'a> {
    store: &'a ManifestStore,
    policy: ResolverPolicy,
    cache: RefCell<HashMap<LookupKey, Resolution>>,
}

impl<'a> EffectResolver<'a> {
    pub fn new(store: &'a ManifestStore, policy: ResolverPolicy) -> Self {
        Self {
            store,
            policy,
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn cached_lookup(
        &self,
        type_fqn: &str,
        member_name: &str,
        kind: MemberKind,
        signature_key: Option<&str>,
    ) -> Resolution {
        let key = LookupKey {
            type_fqn: type_fqn.to_string(),
            member_name: member_name.to_string(),
            kind: kind_tag(kind),
            signature_key: signature_key.map(str::to_string),
        };
        if let Some(hit) = self.cache.borrow().get(&key) {
            return hit.clone();
        }
        let resolution = self
            .store
            .lookup(type_fqn, member_name, kind, signature_key);
        self.cache.borrow_mut().insert(key, resolution.clone());
        resolution
    }

    fn apply_policy(&self, resolution: Resolution) -> ResolvedCall {
        if resolution.step == ResolutionStep::Unknown {
            let effects = match self.policy {
                ResolverPolicy::Lenient => EffectSet::new(),
                ResolverPolicy::Strict => EffectSet::unknown(),
            };
            return ResolvedCall {
                effects,
                covered: false,
            };
        }
        ResolvedCall {
            effects: resolution.effects,
            covered: true,
        }
    }

    pub fn resolve(&self, type_fqn: &str, member_name: &str) -> ResolvedCall {
        let resolution = self.cached_lookup(type_fqn, member_name, MemberKind::Method, None);
        self.apply_policy(resolution)
    }

    pub fn resolve_getter(&self, type_fqn: &str, member_name: &str) -> ResolvedCall {
        let resolution = self.cached_lookup(type_fqn, member_name, MemberKind::Getter, None);
        self.apply_policy(resolution)
    }

    pub fn resolve_setter(&self, type_fqn: &str, member_name: &str) -> ResolvedCall {
        let resolution = self.cached_lookup(type_fqn, member_name, MemberKind::Setter, None);
        self.apply_policy(resolution)
    }

    pub fn resolve_constructor(&self, type_fqn: &str, signature_key: &str) -> ResolvedCall {
        let resolution = self.cached_lookup(
            type_fqn,
            "<ctor>",
            MemberKind::Constructor,
            Some(signature_key),
        );
        self.apply_policy(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::effects::model::Effect;

    #[test]
    fn repeated_lookups_are_referentially_stable() {
        // P3: identical keys return identical effect sets.
        let store = ManifestStore::with_builtin_catalog();
        let resolver = EffectResolver::new(&store, ResolverPolicy::Strict);
        let a = resolver.resolve("Console", "log");
        let b = resolver.resolve("Console", "log");
        assert_eq!(a.effects, b.effects);
        assert!(a.effects.contains(Effect::ConsoleWrite));
    }

    #[test]
    fn strict_policy_makes_unknown_top() {
        let store = ManifestStore::with_builtin_catalog();
        let resolver = EffectResolver::new(&store, ResolverPolicy::Strict);
        let result = resolver.resolve("ThirdParty", "Mystery");
        assert!(!result.covered);
        assert!(result.effects.contains(Effect::Unknown));
    }

    #[test]
    fn lenient_policy_makes_unknown_empty() {
        let store = ManifestStore::with_builtin_catalog();
        let resolver = EffectResolver::new(&store, ResolverPolicy::Lenient);
        let result = resolver.resolve("ThirdParty", "Mystery");
        assert!(!result.covered);
        assert!(result.effects.is_empty());
    }
}
