//! Manifest Store (M, §4.1): layered effect declarations for external
//! types the compiler does not own.

use super::model::{Effect, EffectSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Which kind of member a lookup is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Method,
    Getter,
    Setter,
    Constructor,
}

/// Search-path layer a manifest was loaded from. Ordering matches the
/// glossary's priority order: `BuiltIn < UserLevel < SolutionLevel <
/// ProjectLocal`; a later (higher) layer overrides an earlier one for the
/// same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ManifestLevel {
    BuiltIn,
    UserLevel,
    SolutionLevel,
    ProjectLocal,
}

/// One `mappings[]` entry: effects for a single external type.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TypeMapping {
    #[serde(rename = "type")]
    pub type_fqn: String,
    #[serde(rename = "defaultEffects", default)]
    pub default_effects: Vec<String>,
    #[serde(default)]
    pub methods: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub getters: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub setters: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub constructors: HashMap<String, Vec<String>>,
}

/// One parsed manifest file (the JSON-equivalent format of §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mappings: Vec<TypeMapping>,
    #[serde(rename = "namespaceDefaults", default)]
    pub namespace_defaults: HashMap<String, Vec<String>>,
}

impl Manifest {
    pub fn empty() -> Self {
        Self {
            version: "1.0".to_string(),
            description: None,
            mappings: Vec::new(),
            namespace_defaults: HashMap::new(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(text).map_err(|e| ManifestError::Parse {
            message: e.to_string(),
        })
    }

    pub fn serialize(&self) -> Result<String, ManifestError> {
        serde_json::to_string_pretty(self).map_err(|e| ManifestError::Parse {
            message: e.to_string(),
        })
    }

    /// Structural errors: empty type name, unknown version, unknown effect
    /// code. Does not abort on the first error; all are collected.
    pub fn validate(&self) -> Vec<ManifestError> {
        let mut errors = Vec::new();
        if self.version != "1.0" {
            errors.push(ManifestError::UnknownVersion {
                version: self.version.clone(),
            });
        }
        for mapping in &self.mappings {
            if mapping.type_fqn.trim().is_empty() {
                errors.push(ManifestError::EmptyTypeName);
            }
            let all_codes = mapping
                .default_effects
                .iter()
                .chain(mapping.methods.values().flatten())
                .chain(mapping.getters.values().flatten())
                .chain(mapping.setters.values().flatten())
                .chain(mapping.constructors.values().flatten());
            for code in all_codes {
                if Effect::from_surface_code(code).is_none() {
                    errors.push(ManifestError::UnknownEffectCode { code: code.clone() });
                }
            }
        }
        for codes in self.namespace_defaults.values() {
            for code in codes {
                if Effect::from_surface_code(code).is_none() {
                    errors.push(ManifestError::UnknownEffectCode { code: code.clone() });
                }
            }
        }
        errors
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    Parse { message: String },
    EmptyTypeName,
    UnknownVersion { version: String },
    UnknownEffectCode { code: String },
    Io { path: PathBuf, message: String },
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestError::Parse { message } => write!(f, "manifest parse error: {message}"),
            ManifestError::EmptyTypeName => write!(f, "mapping has an empty type name"),
            ManifestError::UnknownVersion { version } => {
                write!(f, "unknown manifest version: {version}")
            }
            ManifestError::UnknownEffectCode { code } => {
                write!(f, "unknown effect surface code: {code}")
            }
            ManifestError::Io { path, message } => {
                write!(f, "could not read manifest {}: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for ManifestError {}

/// Result of a manifest lookup: which resolution step matched and the
/// resulting effect set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub effects: EffectSetWire,
    pub step: ResolutionStep,
}

/// A thin newtype so `Resolution` can derive `PartialEq`/`Eq` without
/// requiring `EffectSet` (whose `BTreeSet<Effect>` already supports it,
/// but we keep the wire type explicit at the manifest boundary).
pub type EffectSetWire = EffectSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStep {
    BuiltinCatalog,
    SpecificMember,
    Wildcard,
    TypeDefault,
    NamespaceDefault,
    Unknown,
}

/// Merged, layered view over all loaded manifests, queried by
/// [`super::resolver::EffectResolver`].
#[derive(Debug, Clone, Default)]
pub struct ManifestStore {
    /// Layer -> loaded manifest. Later layers shadow earlier ones at the
    /// per-key level during lookup, not by wholesale replacement.
    layers: Vec<(ManifestLevel, Manifest)>,
}

impl ManifestStore {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn with_builtin_catalog() -> Self {
        let mut store = Self::new();
        store.add(ManifestLevel::BuiltIn, builtin_catalog());
        store
    }

    pub fn add(&mut self, level: ManifestLevel, manifest: Manifest) {
        self.layers.push((level, manifest));
        self.layers.sort_by_key(|(level, _)| *level);
    }

    /// Discover and parse manifests from the given layered search paths.
    /// A malformed manifest does not abort loading of the others; its
    /// parse error is returned alongside whatever did load.
    pub fn load_all(paths: &[(ManifestLevel, PathBuf)]) -> (Self, Vec<ManifestError>) {
        let mut store = Self::with_builtin_catalog();
        let mut errors = Vec::new();
        for (level, path) in paths {
            match std::fs::read_to_string(path) {
                Ok(text) => match Manifest::parse(&text) {
                    Ok(manifest) => {
                        errors.extend(manifest.validate());
                        store.add(*level, manifest);
                    }
                    Err(e) => errors.push(e),
                },
                Err(e) => errors.push(ManifestError::Io {
                    path: path.clone(),
                    message: e.to_string(),
                }),
            }
        }
        (store, errors)
    }

    fn find_mapping(&self, level_idx_from_end: usize, type_fqn: &str) -> Option<&TypeMapping> {
        let (_, manifest) = self.layers.iter().rev().nth(level_idx_from_end)?;
        manifest.mappings.iter().find(|m| m.type_fqn == type_fqn)
    }

    /// `lookup(type, member_name, member_kind, signature_key?)`: six-step
    /// resolution order (§4.1, P7).
    pub fn lookup(
        &self,
        type_fqn: &str,
        member_name: &str,
        kind: MemberKind,
        signature_key: Option<&str>,
    ) -> Resolution {
        // Walk layers from most to least specific (ProjectLocal first),
        // applying the same priority order within each layer in turn so
        // a higher layer's wildcard still beats a lower layer's specific
        // hit per the project's "override" semantics (S6).
        for (_, manifest) in self.layers.iter().rev() {
            for mapping in manifest.mappings.iter().filter(|m| m.type_fqn == type_fqn) {
                if let Some(codes) = lookup_member(mapping, member_name, kind, signature_key) {
                    return Resolution {
                        effects: EffectSet::from_codes(codes),
                        step: ResolutionStep::SpecificMember,
                    };
                }
                if let Some(codes) = member_map(mapping, kind).get("*") {
                    return Resolution {
                        effects: EffectSet::from_codes(codes),
                        step: ResolutionStep::Wildcard,
                    };
                }
                if !mapping.default_effects.is_empty() {
                    return Resolution {
                        effects: EffectSet::from_codes(&mapping.default_effects),
                        step: ResolutionStep::TypeDefault,
                    };
                }
            }
        }
        // Longest-prefix namespace default across all layers.
        let mut best: Option<(&str, &Vec<String>)> = None;
        for (_, manifest) in &self.layers {
            for (prefix, codes) in &manifest.namespace_defaults {
                if type_fqn.starts_with(prefix.as_str()) {
                    if best.map_or(true, |(p, _)| prefix.len() > p.len()) {
                        best = Some((prefix.as_str(), codes));
                    }
                }
            }
        }
        if let Some((_, codes)) = best {
            return Resolution {
                effects: EffectSet::from_codes(codes),
                step: ResolutionStep::NamespaceDefault,
            };
        }
        Resolution {
            effects: EffectSet::unknown(),
            step: ResolutionStep::Unknown,
        }
    }

    pub fn validate(&self) -> Vec<ManifestError> {
        self.layers.iter().flat_map(|(_, m)| m.validate()).collect()
    }
}

fn member_map<'a>(mapping: &'a TypeMapping, kind: MemberKind) -> &'a HashMap<String, Vec<String>> {
    match kind {
        MemberKind::Method => &mapping.methods,
        MemberKind::Getter => &mapping.getters,
        MemberKind::Setter => &mapping.setters,
        MemberKind::Constructor => &mapping.constructors,
    }
}

fn lookup_member<'a>(
    mapping: &'a TypeMapping,
    member_name: &str,
    kind: MemberKind,
    signature_key: Option<&str>,
) -> Option<&'a Vec<String>> {
    let map = member_map(mapping, kind);
    if kind == MemberKind::Constructor {
        if let Some(sig) = signature_key {
            if let Some(codes) = map.get(sig) {
                return Some(codes);
            }
        }
        return None;
    }
    map.get(member_name)
}

/// A small built-in catalog covering the most common standard-library
/// surfaces, consulted before any user/solution/project manifest.
fn builtin_catalog() -> Manifest {
    let mut mappings = Vec::new();
    let mut console = TypeMapping {
        type_fqn: "Console".into(),
        ..Default::default()
    };
    console.methods.insert("log".into(), vec!["cw".into()]);
    console.methods.insert("write".into(), vec!["cw".into()]);
    console.methods.insert("read_line".into(), vec!["cr".into()]);
    mappings.push(console);

    let mut file = TypeMapping {
        type_fqn: "File".into(),
        ..Default::default()
    };
    file.methods.insert("read".into(), vec!["fr".into()]);
    file.methods.insert("write".into(), vec!["fw".into()]);
    file.methods.insert("delete".into(), vec!["fd".into()]);
    mappings.push(file);

    let mut http = TypeMapping {
        type_fqn: "Http".into(),
        ..Default::default()
    };
    http.default_effects = vec!["http".into()];
    mappings.push(http);

    let mut time = TypeMapping {
        type_fqn: "Time".into(),
        ..Default::default()
    };
    time.methods.insert("now".into(), vec!["time".into()]);
    mappings.push(time);

    let mut random = TypeMapping {
        type_fqn: "Random".into(),
        ..Default::default()
    };
    random.default_effects = vec!["rand".into()];
    mappings.push(random);

    Manifest {
        version: "1.0".into(),
        description: Some("built-in catalog".into()),
        mappings,
        namespace_defaults: HashMap::new(),
    }
}

#[allow(dead_code)]
fn default_search_paths(project_root: &Path) -> Vec<(ManifestLevel, PathBuf)> {
    vec![(
        ManifestLevel::ProjectLocal,
        project_root.join("calor.manifest.json"),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_flags_empty_type_and_unknown_code() {
        let manifest = Manifest {
            version: "1.0".into(),
            description: None,
            mappings: vec![TypeMapping {
                type_fqn: "".into(),
                default_effects: vec!["nope".into()],
                ..Default::default()
            }],
            namespace_defaults: HashMap::new(),
        };
        let errors = manifest.validate();
        assert!(errors.contains(&ManifestError::EmptyTypeName));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ManifestError::UnknownEffectCode { code } if code == "nope")));
    }

    #[test]
    fn validate_rejects_unknown_version() {
        let mut manifest = Manifest::empty();
        manifest.version = "2.0".into();
        assert!(manifest
            .validate()
            .iter()
            .any(|e| matches!(e, ManifestError::UnknownVersion { .. })));
    }

    #[test]
    fn project_local_overrides_user_level() {
        // S6: project-local manifest sets {cw}; user-level sets {net:w}.
        let mut user = TypeMapping {
            type_fqn: "MyApp.Service".into(),
            ..Default::default()
        };
        user.methods.insert("Process".into(), vec!["net:w".into()]);
        let user_manifest = Manifest {
            version: "1.0".into(),
            description: None,
            mappings: vec![user],
            namespace_defaults: HashMap::new(),
        };

        let mut project = TypeMapping {
            type_fqn: "MyApp.Service".into(),
            ..Default::default()
        };
        project.methods.insert("Process".into(), vec!["cw".into()]);
        let project_manifest = Manifest {
            version: "1.0".into(),
            description: None,
            mappings: vec![project],
            namespace_defaults: HashMap::new(),
        };

        let mut store = ManifestStore::new();
        store.add(ManifestLevel::UserLevel, user_manifest);
        store.add(ManifestLevel::ProjectLocal, project_manifest);

        let resolution = store.lookup("MyApp.Service", "Process", MemberKind::Method, None);
        assert_eq!(resolution.effects, EffectSet::from_codes(&["cw".into()]));
    }

    #[test]
    fn namespace_default_picks_longest_prefix() {
        let mut manifest = Manifest::empty();
        manifest
            .namespace_defaults
            .insert("System".into(), vec!["unknown".into()]);
        manifest
            .namespace_defaults
            .insert("System.IO".into(), vec!["fr".into()]);
        let mut store = ManifestStore::new();
        store.add(ManifestLevel::UserLevel, manifest);

        let resolution = store.lookup("System.IO.StreamReader", "Read", MemberKind::Method, None);
        assert_eq!(resolution.step, ResolutionStep::NamespaceDefault);
        assert!(resolution.effects.contains(Effect::FilesystemRead));
    }

    #[test]
    fn unmapped_type_resolves_to_unknown() {
        let store = ManifestStore::with_builtin_catalog();
        let resolution = store.lookup("ThirdParty", "Mystery", MemberKind::Method, None);
        assert_eq!(resolution.step, ResolutionStep::Unknown);
        assert!(resolution.effects.contains(Effect::Unknown));
    }

    #[test]
    fn builtin_console_log_resolves_console_write() {
        let store = ManifestStore::with_builtin_catalog();
        let resolution = store.lookup("Console", "log", MemberKind::Method, None);
        assert!(resolution.effects.contains(Effect::ConsoleWrite));
    }

    #[test]
    fn round_trip_serialize_parse() {
        let manifest = builtin_catalog();
        let text = manifest.serialize().unwrap();
        let parsed = Manifest::parse(&text).unwrap();
        assert_eq!(parsed.mappings.len(), manifest.mappings.len());
    }
}
