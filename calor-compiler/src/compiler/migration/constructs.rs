//! Detection of the hard-coded C# constructs the Migration Analyzer cannot
//! translate (§4.6). Each detector is intentionally textual/regex-based: the
//! analyzer works over arbitrary C# sources, not a full C# parser.

use regex::Regex;
use std::sync::OnceLock;

/// One named unsupported construct, matched by a single regex over raw
/// source text. Order matters only for readability of `all()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnsupportedConstruct {
    SwitchExpression,
    RelationalPattern,
    CompoundPattern,
    TargetTypedNew,
    NullConditionalMethodCall,
    NamedArgument,
    PrimaryConstructor,
    OutRefParameter,
    DeclarationPattern,
    ThrowExpression,
    RangeOrIndexFromEnd,
    ListPattern,
    RawStringLiteral,
    SpreadInCollectionExpression,
}

impl UnsupportedConstruct {
    pub fn feature_tag(self) -> &'static str {
        match self {
            Self::SwitchExpression => "switch-expression",
            Self::RelationalPattern => "relational-pattern",
            Self::CompoundPattern => "compound-pattern",
            Self::TargetTypedNew => "target-typed-new",
            Self::NullConditionalMethodCall => "null-conditional-method-call",
            Self::NamedArgument => "named-argument",
            Self::PrimaryConstructor => "primary-constructor",
            Self::OutRefParameter => "out-ref-parameter",
            Self::DeclarationPattern => "declaration-pattern",
            Self::ThrowExpression => "throw-expression",
            Self::RangeOrIndexFromEnd => "range-index-from-end",
            Self::ListPattern => "list-pattern",
            Self::RawStringLiteral => "raw-string-literal",
            Self::SpreadInCollectionExpression => "spread-in-collection-expression",
        }
    }

    pub fn suggestion(self) -> &'static str {
        match self {
            Self::SwitchExpression => "rewrite as an if/else chain or a match statement with explicit arms",
            Self::RelationalPattern => "rewrite the pattern as an explicit comparison expression",
            Self::CompoundPattern => "split the combined pattern into nested if conditions",
            Self::TargetTypedNew => "spell out the constructed type explicitly",
            Self::NullConditionalMethodCall => "rewrite as an explicit null check followed by the call",
            Self::NamedArgument => "reorder arguments positionally",
            Self::PrimaryConstructor => "expand into an explicit constructor body",
            Self::OutRefParameter => "return a tuple or record instead of an out/ref parameter",
            Self::DeclarationPattern => "replace with an explicit type check and cast",
            Self::ThrowExpression => "hoist the throw into a preceding statement",
            Self::RangeOrIndexFromEnd => "rewrite using explicit length-based indexing",
            Self::ListPattern => "destructure elements with explicit index access",
            Self::RawStringLiteral => "rewrite as an escaped string literal",
            Self::SpreadInCollectionExpression => "rewrite as an explicit concatenation or append loop",
        }
    }
}

fn detectors() -> &'static [(UnsupportedConstruct, Regex)] {
    static DETECTORS: OnceLock<Vec<(UnsupportedConstruct, Regex)>> = OnceLock::new();
    DETECTORS.get_or_init(|| {
        vec![
            (
                UnsupportedConstruct::SwitchExpression,
                Regex::new(r"\w+\s*switch\s*\{").unwrap(),
            ),
            (
                UnsupportedConstruct::RelationalPattern,
                Regex::new(r"\bis\s*(>=|<=|>|<)\s*-?\d").unwrap(),
            ),
            (
                UnsupportedConstruct::CompoundPattern,
                Regex::new(r"\bis\s+\w+\s+(and|or)\s+\w+").unwrap(),
            ),
            (
                UnsupportedConstruct::TargetTypedNew,
                Regex::new(r"[:=(,]\s*new\s*\(").unwrap(),
            ),
            (
                UnsupportedConstruct::NullConditionalMethodCall,
                Regex::new(r"\?\.\w+\s*\(").unwrap(),
            ),
            (
                UnsupportedConstruct::NamedArgument,
                Regex::new(r"\(\s*\w+\s*:\s*[^:)]").unwrap(),
            ),
            (
                UnsupportedConstruct::PrimaryConstructor,
                Regex::new(r"\bclass\s+\w+\s*\([^)]*\)\s*[:{]").unwrap(),
            ),
            (
                UnsupportedConstruct::OutRefParameter,
                Regex::new(r"\((?:[^()]*,\s*)?(?:out|ref)\s+\w").unwrap(),
            ),
            (
                UnsupportedConstruct::DeclarationPattern,
                Regex::new(r"\bis\s+[A-Z]\w*\s+\w+\b").unwrap(),
            ),
            (
                UnsupportedConstruct::ThrowExpression,
                Regex::new(r"\?\?\s*throw\b|\?\s*throw\b").unwrap(),
            ),
            (
                UnsupportedConstruct::RangeOrIndexFromEnd,
                Regex::new(r"\[\s*\^|\.\.\^|\[\s*\d*\s*\.\.\s*\d*\s*\]").unwrap(),
            ),
            (
                UnsupportedConstruct::ListPattern,
                Regex::new(r"\bis\s*\[").unwrap(),
            ),
            (
                UnsupportedConstruct::RawStringLiteral,
                Regex::new(r#""""+"#).unwrap(),
            ),
            (
                UnsupportedConstruct::SpreadInCollectionExpression,
                Regex::new(r"\[\s*\.\.\.?\w").unwrap(),
            ),
        ]
    })
}

/// One occurrence of an unsupported construct in a source file.
#[derive(Debug, Clone)]
pub struct ConstructHit {
    pub construct: UnsupportedConstruct,
    pub line: usize,
    pub column: usize,
}

/// Scan `text` for every hard-coded-unsupported construct, line by line so
/// each hit carries a usable source span.
pub fn scan(text: &str) -> Vec<ConstructHit> {
    let mut hits = Vec::new();
    for (line_idx, line) in text.lines().enumerate() {
        for (construct, re) in detectors() {
            if let Some(m) = re.find(line) {
                hits.push(ConstructHit {
                    construct: *construct,
                    line: line_idx + 1,
                    column: m.start() + 1,
                });
            }
        }
    }
    hits
}
