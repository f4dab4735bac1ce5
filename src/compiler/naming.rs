//! Naming-convention Heuristics
//!
//! Tie-break scoring for inference when several outputs are type-compatible
//! with one input. Names are split into lowercase tokens (on `_`, `-`, `.`,
//! whitespace and camelCase boundaries); generic words such as `input` or
//! `out` carry no signal and are dropped.

use std::collections::HashSet;

use once_cell::sync::Lazy;

static STOP_WORDS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["input", "output", "in", "out"].into_iter().collect());

/// Weight of a token shared with the candidate's port name.
const PORT_WEIGHT: u32 = 2;
/// Weight of a token shared with the candidate's step or tool name.
const STEP_WEIGHT: u32 = 1;
/// Bonus when the candidate port has exactly the input's name.
const EXACT_NAME_BONUS: u32 = 3;

/// Splits an identifier into normalized tokens.
pub fn tokenize(name: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in name.chars() {
        if !c.is_alphanumeric() {
            push_token(&mut tokens, &mut current);
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower {
            push_token(&mut tokens, &mut current);
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    push_token(&mut tokens, &mut current);
    tokens
}

fn push_token(tokens: &mut Vec<String>, current: &mut String) {
    if current.is_empty() {
        return;
    }
    let token = std::mem::take(current);
    if !STOP_WORDS.contains(token.as_str()) && !tokens.contains(&token) {
        tokens.push(token);
    }
}

/// Tokens of a port: its name plus any declared naming metadata.
pub fn port_tokens(name: &str, naming: &[String]) -> Vec<String> {
    let mut tokens = tokenize(name);
    for extra in naming {
        for token in tokenize(extra) {
            if !tokens.contains(&token) {
                tokens.push(token);
            }
        }
    }
    tokens
}

fn overlap(a: &[String], b: &[String]) -> u32 {
    a.iter().filter(|t| b.contains(t)).count() as u32
}

/// Scores how well a candidate output matches an input by name.
///
/// A score of zero means the names share nothing.
pub fn score(
    target_name: &str,
    target_tokens: &[String],
    candidate_name: &str,
    candidate_tokens: &[String],
    step_tokens: &[String],
) -> u32 {
    let mut score = PORT_WEIGHT * overlap(target_tokens, candidate_tokens)
        + STEP_WEIGHT * overlap(target_tokens, step_tokens);
    if target_name.eq_ignore_ascii_case(candidate_name) {
        score += EXACT_NAME_BONUS;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_separators() {
        assert_eq!(tokenize("input_pdb_path"), vec!["pdb", "path"]);
        assert_eq!(tokenize("output-gro.file"), vec!["gro", "file"]);
        assert_eq!(tokenize("  "), Vec::<String>::new());
    }

    #[test]
    fn test_tokenize_camel_case() {
        assert_eq!(tokenize("sortedBamFile"), vec!["sorted", "bam", "file"]);
        assert_eq!(tokenize("outputTPR"), vec!["tpr"]);
        assert_eq!(tokenize("step2Out"), vec!["step2"]);
    }

    #[test]
    fn test_port_tokens_include_naming() {
        let tokens = port_tokens("ref", &["genome_fasta".to_string(), "ref".to_string()]);
        assert_eq!(tokens, vec!["ref", "genome", "fasta"]);
    }

    #[test]
    fn test_score_prefers_port_overlap() {
        let target = tokenize("input_bam");
        let port_match = score("input_bam", &target, "bam", &tokenize("bam"), &[]);
        let step_match = score("input_bam", &target, "result", &tokenize("result"), &tokenize("bam_sort"));
        assert!(port_match > step_match);
        assert!(step_match > 0);
    }

    #[test]
    fn test_score_exact_name() {
        let target = tokenize("input");
        assert_eq!(score("input", &target, "input", &tokenize("input"), &[]), EXACT_NAME_BONUS);
        assert_eq!(score("reads", &tokenize("reads"), "log", &tokenize("log"), &[]), 0);
    }
}
