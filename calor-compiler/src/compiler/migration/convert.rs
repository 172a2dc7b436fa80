//! Per-file conversion contract (§4.6): convert one C# source file's text
//! into a best-effort Calor rendering, plus a structured issue list and
//! size stats used for the before/after advantage ratio.

use super::constructs::{self, ConstructHit, UnsupportedConstruct};
use super::scoring::{self, DimensionScores, Priority};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone)]
pub struct ConversionIssue {
    pub severity: IssueSeverity,
    pub feature_tag: String,
    pub span: Span,
    pub suggestion: String,
    pub message: String,
}

impl ConversionIssue {
    fn from_construct(hit: &ConstructHit) -> Self {
        Self {
            severity: IssueSeverity::Error,
            feature_tag: hit.construct.feature_tag().to_string(),
            span: Span {
                line: hit.line,
                column: hit.column,
            },
            suggestion: hit.construct.suggestion().to_string(),
            message: format!("unsupported construct: {}", hit.construct.feature_tag()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversionStats {
    pub source_lines: usize,
    pub source_chars: usize,
    pub output_lines: usize,
    pub output_chars: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionOutcome {
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone)]
pub struct FileConversion {
    pub outcome: ConversionOutcome,
    pub output: Option<String>,
    pub issues: Vec<ConversionIssue>,
    pub stats: ConversionStats,
    pub dimensions: DimensionScores,
    pub score: u8,
    pub priority: Priority,
}

fn rewrite_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            (Regex::new(r"\bpublic\s+|\bprivate\s+|\bprotected\s+|\binternal\s+").unwrap(), ""),
            (Regex::new(r"\bstatic\s+").unwrap(), ""),
            (Regex::new(r"\bvar\s+").unwrap(), "let "),
            (Regex::new(r"\bnew\s+(\w+)\s*\(").unwrap(), "$1("),
            (Regex::new(r"\bnull\b").unwrap(), "none"),
            (Regex::new(r"\btrue\b").unwrap(), "true"),
            (Regex::new(r"\bfalse\b").unwrap(), "false"),
            (Regex::new(r"\bforeach\s*\(\s*\w+\s+(\w+)\s+in\s+(.+?)\)").unwrap(), "for $1 in $2"),
            (Regex::new(r"\bthrow\s+new\s+\w*Exception\s*\((.*)\)\s*;").unwrap(), "halt $1;"),
            (Regex::new(r"\.ToString\s*\(\s*\)").unwrap(), ".to_string()"),
            (Regex::new(r"\bConsole\.WriteLine").unwrap(), "Console.log"),
            (Regex::new(r"\bConsole\.Write\b").unwrap(), "Console.log"),
        ]
    })
}

/// Apply textual best-effort rewrites that don't depend on construct
/// detection, used on lines with no flagged unsupported construct.
fn rewrite_line(line: &str) -> String {
    let mut out = line.to_string();
    for (re, replacement) in rewrite_rules() {
        out = re.replace_all(&out, *replacement).into_owned();
    }
    out
}

/// Convert one file's C# source text. Never panics; unsupported constructs
/// become issues rather than aborting the whole conversion, so a file with
/// a handful of unsupported constructs still yields a partial rendering.
pub fn convert_file(text: &str) -> FileConversion {
    let construct_hits = constructs::scan(text);
    let flagged_lines: std::collections::HashSet<usize> =
        construct_hits.iter().map(|h| h.line).collect();

    let mut issues: Vec<ConversionIssue> = construct_hits.iter().map(ConversionIssue::from_construct).collect();

    let mut output_lines = Vec::with_capacity(text.lines().count());
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if flagged_lines.contains(&line_no) {
            output_lines.push(format!("// MIGRATION-TODO (line {line_no}): {}", line.trim()));
        } else {
            output_lines.push(rewrite_line(line));
        }
    }
    let output = output_lines.join("\n");

    let dimensions = scoring::score_dimensions(text);
    let score = scoring::final_score(&dimensions, construct_hits.len());
    let priority = Priority::from_score(score);

    let outcome = if construct_hits.is_empty() {
        ConversionOutcome::Success
    } else if construct_hits.len() as f64 / text.lines().count().max(1) as f64 > 0.5 {
        ConversionOutcome::Failed
    } else {
        ConversionOutcome::Partial
    };

    if outcome == ConversionOutcome::Failed {
        issues.push(ConversionIssue {
            severity: IssueSeverity::Error,
            feature_tag: "ambiguous-rewrite".to_string(),
            span: Span { line: 1, column: 1 },
            suggestion: "migrate this file by hand; too dense with unsupported constructs".to_string(),
            message: "more than half of this file's lines use unsupported constructs".to_string(),
        });
    }

    let stats = ConversionStats {
        source_lines: text.lines().count(),
        source_chars: text.chars().count(),
        output_lines: output.lines().count(),
        output_chars: output.chars().count(),
    };

    let rendered_output = if outcome == ConversionOutcome::Failed {
        None
    } else {
        Some(output)
    };

    FileConversion {
        outcome,
        output: rendered_output,
        issues,
        stats,
        dimensions,
        score,
        priority,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_file_converts_successfully() {
        let src = "public class Calc {\n  public int Add(int a, int b) { return a + b; }\n}\n";
        let result = convert_file(src);
        assert_eq!(result.outcome, ConversionOutcome::Success);
        assert!(result.issues.is_empty());
        assert!(result.output.unwrap().contains("class Calc"));
    }

    #[test]
    fn file_with_one_unsupported_construct_is_partial() {
        let src = "class Calc {\n  bool TryAdd(int a, int b, out int result) {\n    result = a + b;\n    return true;\n  }\n}\n";
        let result = convert_file(src);
        assert_eq!(result.outcome, ConversionOutcome::Partial);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].feature_tag, "out-ref-parameter");
    }

    #[test]
    fn dense_unsupported_file_fails() {
        let src = "var a switch { 1 => 1, _ => 0 };\nvar b switch { 1 => 1, _ => 0 };\n";
        let result = convert_file(src);
        assert_eq!(result.outcome, ConversionOutcome::Failed);
        assert!(result.output.is_none());
    }

    #[test]
    fn foreach_is_rewritten_to_for_in() {
        let src = "foreach (var item in items) { Console.WriteLine(item); }\n";
        let result = convert_file(src);
        let output = result.output.unwrap();
        assert!(output.contains("for item in items"));
    }
}
