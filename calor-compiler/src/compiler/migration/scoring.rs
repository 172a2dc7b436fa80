//! Migration scoring (§4.6 D1–D5): per-file dimension scores and the
//! Critical/High/Medium/Low priority bucket.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Bucket an integer score in [0, 100] (P6: monotone in score).
    pub fn from_score(score: u8) -> Self {
        match score {
            76..=100 => Priority::Critical,
            51..=75 => Priority::High,
            26..=50 => Priority::Medium,
            _ => Priority::Low,
        }
    }
}

/// Normalized [0, 100] dimension scores for one source file.
#[derive(Debug, Clone, Copy, Default)]
pub struct DimensionScores {
    /// D1: validation density (argument checks, throw-on-invalid-argument).
    pub validation_density: f64,
    /// D2: null-handling density (`?.`, `??`, null checks).
    pub null_handling_density: f64,
    /// D3: error-handling density (try/catch, custom exceptions).
    pub error_handling_density: f64,
    /// D4: side-effect density (I/O, network, DB, filesystem calls).
    pub side_effect_density: f64,
    /// D5: simplicity, inverse of branching/complexity.
    pub simplicity: f64,
}

fn regexes() -> &'static ScoringRegexes {
    static REGEXES: OnceLock<ScoringRegexes> = OnceLock::new();
    REGEXES.get_or_init(ScoringRegexes::compile)
}

struct ScoringRegexes {
    arg_check: Regex,
    throw_invalid: Regex,
    null_conditional: Regex,
    null_coalesce: Regex,
    null_check: Regex,
    try_catch: Regex,
    custom_exception: Regex,
    io_call: Regex,
    branch: Regex,
}

impl ScoringRegexes {
    fn compile() -> Self {
        Self {
            arg_check: Regex::new(r"if\s*\(\s*\w+\s*==\s*null\s*\)|ArgumentNullException|ArgumentException").unwrap(),
            throw_invalid: Regex::new(r"throw\s+new\s+Argument\w*Exception").unwrap(),
            null_conditional: Regex::new(r"\?\.").unwrap(),
            null_coalesce: Regex::new(r"\?\?").unwrap(),
            null_check: Regex::new(r"==\s*null|!=\s*null|is\s+null|is\s+not\s+null").unwrap(),
            try_catch: Regex::new(r"\btry\b|\bcatch\s*\(").unwrap(),
            custom_exception: Regex::new(r"class\s+\w*Exception\b").unwrap(),
            io_call: Regex::new(r"File\.|Directory\.|HttpClient|Socket|SqlConnection|DbContext|Console\.(Write|Read)").unwrap(),
            branch: Regex::new(r"\bif\s*\(|\belse\b|\bswitch\s*\(|\bfor\s*\(|\bforeach\s*\(|\bwhile\s*\(|&&|\|\|").unwrap(),
        }
    }
}

fn count_per_100_lines(re: &Regex, text: &str, line_count: usize) -> f64 {
    let hits = re.find_iter(text).count() as f64;
    let lines = line_count.max(1) as f64;
    (hits * 100.0 / lines).min(100.0)
}

/// Compute D1–D5 for a single C# source file's text.
pub fn score_dimensions(text: &str) -> DimensionScores {
    let re = regexes();
    let line_count = text.lines().count();

    let validation_density = (count_per_100_lines(&re.arg_check, text, line_count)
        + count_per_100_lines(&re.throw_invalid, text, line_count))
        / 2.0;
    let null_handling_density = (count_per_100_lines(&re.null_conditional, text, line_count)
        + count_per_100_lines(&re.null_coalesce, text, line_count)
        + count_per_100_lines(&re.null_check, text, line_count))
        / 3.0;
    let error_handling_density = (count_per_100_lines(&re.try_catch, text, line_count)
        + count_per_100_lines(&re.custom_exception, text, line_count))
        / 2.0;
    let side_effect_density = count_per_100_lines(&re.io_call, text, line_count);
    let branching = count_per_100_lines(&re.branch, text, line_count);
    let simplicity = (100.0 - branching).max(0.0);

    DimensionScores {
        validation_density,
        null_handling_density,
        error_handling_density,
        side_effect_density,
        simplicity,
    }
}

/// Weights applied to D1–D5 before the unsupported-construct penalty.
/// Validation/error-handling/null-handling raise migratability (a
/// well-guarded file converts cleanly); side effects and low simplicity
/// lower it (more surface to get wrong).
const WEIGHTS: [f64; 5] = [0.2, 0.15, 0.2, -0.2, 0.25];

/// Final integer score in [0, 100]: weighted sum of D1..D5 minus a penalty
/// proportional to the count of detected unsupported constructs (P6: files
/// with any hard-coded-unsupported construct get a non-zero penalty).
pub fn final_score(dims: &DimensionScores, unsupported_count: usize) -> u8 {
    let weighted = dims.validation_density * WEIGHTS[0]
        + dims.null_handling_density * WEIGHTS[1]
        + dims.error_handling_density * WEIGHTS[2]
        + dims.side_effect_density * WEIGHTS[3]
        + dims.simplicity * WEIGHTS[4];
    let base = weighted.clamp(0.0, 100.0);
    let penalty = (unsupported_count as f64 * 8.0).min(base);
    (base - penalty).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_bucket_is_monotone_in_score() {
        // P6: priority bucket is monotone in score.
        let scores = [0u8, 25, 26, 50, 51, 75, 76, 100];
        let priorities: Vec<Priority> = scores.iter().map(|&s| Priority::from_score(s)).collect();
        for window in priorities.windows(2) {
            assert!(window[0] <= window[1]);
        }
    }

    #[test]
    fn unsupported_constructs_always_penalize() {
        let dims = DimensionScores {
            validation_density: 0.0,
            null_handling_density: 0.0,
            error_handling_density: 0.0,
            side_effect_density: 0.0,
            simplicity: 100.0,
        };
        let clean = final_score(&dims, 0);
        let penalized = final_score(&dims, 3);
        assert!(penalized < clean);
    }

    #[test]
    fn simple_file_scores_low_side_effects() {
        let text = "class Calc {\n  int Add(int a, int b) { return a + b; }\n}\n";
        let dims = score_dimensions(text);
        assert_eq!(dims.side_effect_density, 0.0);
    }
}
