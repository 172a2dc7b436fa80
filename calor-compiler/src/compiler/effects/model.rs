//! The effect lattice: categories, canonical effects, surface codes, and
//! effect sets with lattice-aware subtyping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The four effect categories from the manifest table, plus `Exception`
/// which the table also treats as its own category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EffectCategory {
    Io,
    Memory,
    Nondeterminism,
    Mutation,
    Exception,
}

/// Canonical effect values. `Unknown` is the lattice top: it absorbs every
/// other effect under subtyping and is produced by ambiguous cross-class
/// call edges and unresolved foreign calls in strict mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Effect {
    ConsoleWrite,
    ConsoleRead,
    FilesystemRead,
    FilesystemWrite,
    FilesystemReadWrite,
    FileDelete,
    NetworkRead,
    NetworkWrite,
    NetworkReadWrite,
    DatabaseRead,
    DatabaseWrite,
    DatabaseReadWrite,
    EnvironmentRead,
    EnvironmentWrite,
    EnvironmentReadWrite,
    Http,
    Process,
    Allocation,
    Unsafe,
    Time,
    Random,
    Mutation,
    Exception,
    Unknown,
}

impl Effect {
    pub fn category(self) -> Option<EffectCategory> {
        use Effect::*;
        match self {
            ConsoleWrite | ConsoleRead | FilesystemRead | FilesystemWrite
            | FilesystemReadWrite | FileDelete | NetworkRead | NetworkWrite
            | NetworkReadWrite | DatabaseRead | DatabaseWrite | DatabaseReadWrite
            | EnvironmentRead | EnvironmentWrite | EnvironmentReadWrite | Http | Process => {
                Some(EffectCategory::Io)
            }
            Allocation | Unsafe => Some(EffectCategory::Memory),
            Time | Random => Some(EffectCategory::Nondeterminism),
            Mutation => Some(EffectCategory::Mutation),
            Exception => Some(EffectCategory::Exception),
            Unknown => None,
        }
    }

    /// Parse a surface manifest code (§4.1 table) into its canonical effect.
    /// Several surface spellings map onto the same canonical value.
    pub fn from_surface_code(code: &str) -> Option<Effect> {
        use Effect::*;
        Some(match code {
            "cw" => ConsoleWrite,
            "cr" => ConsoleRead,
            "fr" | "fs:r" => FilesystemRead,
            "fw" | "fs:w" => FilesystemWrite,
            "fd" => FileDelete,
            "fs:rw" => FilesystemReadWrite,
            "net:r" => NetworkRead,
            "net:w" => NetworkWrite,
            "net:rw" | "net" => NetworkReadWrite,
            "db:r" | "dbr" => DatabaseRead,
            "db:w" | "dbw" => DatabaseWrite,
            "db:rw" | "db" => DatabaseReadWrite,
            "env:r" => EnvironmentRead,
            "env:w" => EnvironmentWrite,
            "env" | "env:rw" => EnvironmentReadWrite,
            "http" => Http,
            "proc" => Process,
            "alloc" => Allocation,
            "unsafe" => Unsafe,
            "time" => Time,
            "rand" | "rng" => Random,
            "mut" => Mutation,
            "throw" => Exception,
            "unknown" => Unknown,
            _ => return None,
        })
    }

    /// The canonical surface code used when re-emitting this effect in a
    /// diagnostic or a generated manifest.
    pub fn surface_code(self) -> &'static str {
        use Effect::*;
        match self {
            ConsoleWrite => "cw",
            ConsoleRead => "cr",
            FilesystemRead => "fr",
            FilesystemWrite => "fw",
            FileDelete => "fd",
            FilesystemReadWrite => "fs:rw",
            NetworkRead => "net:r",
            NetworkWrite => "net:w",
            NetworkReadWrite => "net:rw",
            DatabaseRead => "db:r",
            DatabaseWrite => "db:w",
            DatabaseReadWrite => "db:rw",
            EnvironmentRead => "env:r",
            EnvironmentWrite => "env:w",
            EnvironmentReadWrite => "env:rw",
            Http => "http",
            Process => "proc",
            Allocation => "alloc",
            Unsafe => "unsafe",
            Time => "time",
            Random => "rand",
            Mutation => "mut",
            Exception => "throw",
            Unknown => "unknown",
        }
    }

    pub fn canonical_name(self) -> &'static str {
        use Effect::*;
        match self {
            ConsoleWrite => "console_write",
            ConsoleRead => "console_read",
            FilesystemRead => "filesystem_read",
            FilesystemWrite => "filesystem_write",
            FileDelete => "file_delete",
            FilesystemReadWrite => "filesystem_readwrite",
            NetworkRead => "network_read",
            NetworkWrite => "network_write",
            NetworkReadWrite => "network_readwrite",
            DatabaseRead => "database_read",
            DatabaseWrite => "database_write",
            DatabaseReadWrite => "database_readwrite",
            EnvironmentRead => "environment_read",
            EnvironmentWrite => "environment_write",
            EnvironmentReadWrite => "environment_readwrite",
            Http => "http",
            Process => "process",
            Allocation => "allocation",
            Unsafe => "unsafe",
            Time => "time",
            Random => "random",
            Mutation => "mutation",
            Exception => "exception",
            Unknown => "unknown",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_name())
    }
}

impl Effect {
    /// Whether `self`, appearing in a declared/covering set, subsumes
    /// `other` under the §3 effect lattice: a read-write effect
    /// encompasses its read and write halves, and `file_write`
    /// additionally encompasses `file_delete`. Every effect encompasses
    /// itself; `Unknown` encompasses everything.
    pub fn encompasses(self, other: Effect) -> bool {
        if self == other {
            return true;
        }
        use Effect::*;
        match self {
            Unknown => true,
            FilesystemReadWrite => matches!(other, FilesystemRead | FilesystemWrite | FileDelete),
            FilesystemWrite => matches!(other, FileDelete),
            NetworkReadWrite => matches!(other, NetworkRead | NetworkWrite),
            DatabaseReadWrite => matches!(other, DatabaseRead | DatabaseWrite),
            EnvironmentReadWrite => matches!(other, EnvironmentRead | EnvironmentWrite),
            _ => false,
        }
    }
}

/// A set of effects, ordered for stable diagnostic output. `Unknown` is
/// absorbing: a set containing it is the lattice top and is a superset of
/// every other set under [`EffectSet::is_subset_of`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectSet(BTreeSet<Effect>);

impl EffectSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn single(e: Effect) -> Self {
        let mut s = BTreeSet::new();
        s.insert(e);
        Self(s)
    }

    pub fn unknown() -> Self {
        Self::single(Effect::Unknown)
    }

    pub fn from_codes(codes: &[String]) -> Self {
        let mut set = BTreeSet::new();
        for code in codes {
            if let Some(e) = Effect::from_surface_code(code) {
                set.insert(e);
            }
        }
        Self(set)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, e: Effect) -> bool {
        self.0.contains(&e)
    }

    pub fn insert(&mut self, e: Effect) -> bool {
        self.0.insert(e)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.0.iter()
    }

    pub fn union(&self, other: &EffectSet) -> EffectSet {
        Self(self.0.union(&other.0).copied().collect())
    }

    pub fn union_in_place(&mut self, other: &EffectSet) -> bool {
        let before = self.0.len();
        self.0.extend(other.0.iter().copied());
        self.0.len() != before
    }

    /// `self \ other` under the subtyping lattice: effects present in
    /// `self` that are not covered by `other`. `Unknown` in `other` covers
    /// everything; `Unknown` in `self` is only covered by `Unknown` in
    /// `other`. A read-write effect in `other` covers its read and write
    /// halves in `self` (and `file_write` additionally covers
    /// `file_delete`) per [`Effect::encompasses`].
    pub fn difference(&self, other: &EffectSet) -> EffectSet {
        if other.0.contains(&Effect::Unknown) {
            return EffectSet::new();
        }
        Self(
            self.0
                .iter()
                .copied()
                .filter(|&e| !other.0.iter().any(|&o| o.encompasses(e)))
                .collect(),
        )
    }

    /// `self ⊆ other` under the lattice (§8 P1: `declared ⊇ inferred`).
    pub fn is_subset_of(&self, other: &EffectSet) -> bool {
        self.difference(other).is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for EffectSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.0.iter().map(|e| e.surface_code()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

impl FromIterator<Effect> for EffectSet {
    fn from_iter<I: IntoIterator<Item = Effect>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
