//! Signal Detector (L2): a two-tier lexical ruleset that flags
//! decision-shaped exchanges for later batch extraction (spec §4.2).
#![allow(clippy::expect_used)]

use crate::models::Module;
use crate::queue::Signal;
use regex::Regex;
use std::sync::LazyLock;

/// Maximum input size accepted before truncation (64 KiB, spec §4.2).
pub const MAX_INPUT_BYTES: usize = 64 * 1024;

/// Weight contributed by each high-weight pattern match.
const HIGH_WEIGHT: f32 = 1.0;
/// Weight contributed by each medium-weight pattern match.
const MEDIUM_WEIGHT: f32 = 0.4;
/// A candidate is emitted once the summed weight strictly exceeds this.
const EMIT_THRESHOLD: f32 = 1.0;

struct LexicalPattern {
    regex: Regex,
    weight: f32,
    name: &'static str,
}

static LEXICAL_PATTERNS: LazyLock<Vec<LexicalPattern>> = LazyLock::new(|| {
    vec![
        LexicalPattern {
            regex: Regex::new(r"(?i)\bI recommend (using|going with|choosing)\b")
                .expect("static regex: I recommend"),
            weight: HIGH_WEIGHT,
            name: "i_recommend",
        },
        LexicalPattern {
            regex: Regex::new(r"(?i)\b(better|best) (choice|option|approach) (is|would be)\b")
                .expect("static regex: better choice is"),
            weight: HIGH_WEIGHT,
            name: "better_choice_is",
        },
        LexicalPattern {
            regex: Regex::new(
                r"(?i)\b(chose|selected|picked|went with)\b.*\b(over|instead of|rather than)\b",
            )
            .expect("static regex: chose over"),
            weight: HIGH_WEIGHT,
            name: "chose_over",
        },
        LexicalPattern {
            regex: Regex::new(r"(?i)\blet's (go with|use|implement|choose)\b")
                .expect("static regex: let's go with"),
            weight: HIGH_WEIGHT,
            name: "lets_go_with",
        },
        LexicalPattern {
            regex: Regex::new(r"(?i)\b(comparing|comparison of|versus|vs\.?)\b")
                .expect("static regex: comparing"),
            weight: MEDIUM_WEIGHT,
            name: "comparing",
        },
        LexicalPattern {
            regex: Regex::new(r"(?i)\b(pros and cons|trade-?offs?|advantages)\b")
                .expect("static regex: pros and cons"),
            weight: MEDIUM_WEIGHT,
            name: "pros_and_cons",
        },
        LexicalPattern {
            regex: Regex::new(r"(?i)\b(alternatives?|options?) (include|are|would be)\b")
                .expect("static regex: alternatives include"),
            weight: MEDIUM_WEIGHT,
            name: "alternatives_include",
        },
    ]
});

/// Module keyword buckets, checked in this order; the first bucket with a
/// hit wins (spec §4.2: "ties broken by first-hit order").
static MODULE_BUCKETS: LazyLock<Vec<(Module, Regex)>> = LazyLock::new(|| {
    vec![
        (
            Module::Auth,
            Regex::new(r"(?i)\b(auth|login|jwt|oauth|session|password|token)\b")
                .expect("static regex: auth bucket"),
        ),
        (
            Module::Database,
            Regex::new(r"(?i)\b(database|postgres|mongo|redis|sql|orm|migration)\b")
                .expect("static regex: database bucket"),
        ),
        (
            Module::Api,
            Regex::new(r"(?i)\b(rest|graphql|grpc|endpoint|route|middleware)\b")
                .expect("static regex: api bucket"),
        ),
        (
            Module::Infra,
            Regex::new(r"(?i)\b(docker|kubernetes|deploy|ci|cd|terraform)\b")
                .expect("static regex: infra bucket"),
        ),
        (
            Module::Frontend,
            Regex::new(r"(?i)\b(frontend|react|vue|css|component|ui)\b")
                .expect("static regex: frontend bucket"),
        ),
        (
            Module::Backend,
            Regex::new(r"(?i)\b(backend|server|service|handler|controller)\b")
                .expect("static regex: backend bucket"),
        ),
    ]
});

/// Infers a module tag from keyword buckets; unmatched text is tagged
/// `Other`.
fn infer_module(text: &str) -> Module {
    for (module, regex) in MODULE_BUCKETS.iter() {
        if regex.is_match(text) {
            return *module;
        }
    }
    Module::Other
}

/// Truncates `text` to at most `MAX_INPUT_BYTES`, cutting at the last
/// sentence boundary (`.`, `!`, `?`) at or before the limit rather than
/// mid-sentence.
#[must_use]
pub fn truncate_to_sentence_boundary(text: &str) -> &str {
    if text.len() <= MAX_INPUT_BYTES {
        return text;
    }
    // Find the limit at a char boundary so slicing never panics.
    let mut cut = MAX_INPUT_BYTES;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let window = &text[..cut];
    match window.rfind(['.', '!', '?']) {
        Some(idx) => &window[..=idx],
        None => window,
    }
}

/// Scans a `{prompt, response}` pair and, if the matched lexical weight
/// exceeds 1.0, returns a new pending [`Signal`] ready for enqueueing.
/// Over-size response text is truncated per [`truncate_to_sentence_boundary`]
/// before matching.
#[must_use]
pub fn detect(prompt: &str, response: &str, now: i64) -> Option<Signal> {
    let response = truncate_to_sentence_boundary(response);

    let mut total_weight = 0.0_f32;
    let mut matched_names = Vec::new();
    for pattern in LEXICAL_PATTERNS.iter() {
        if pattern.regex.is_match(response) {
            total_weight += pattern.weight;
            matched_names.push(pattern.name.to_string());
        }
    }

    if total_weight <= EMIT_THRESHOLD {
        return None;
    }

    let response_module = infer_module(response);
    let module = if matches!(response_module, Module::Other) {
        infer_module(prompt)
    } else {
        response_module
    };
    Some(Signal::new(prompt, response, matched_names, module, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::SignalStatus;

    #[test]
    fn single_high_weight_match_does_not_emit() {
        let signal = detect("what should we do", "I recommend using Postgres.", 0);
        assert!(signal.is_none(), "weight 1.0 must strictly exceed threshold, not equal it");
    }

    #[test]
    fn high_plus_medium_weight_emits_signal() {
        let signal = detect(
            "what should we do",
            "I recommend using Postgres. Comparing it to Mongo, it wins on consistency.",
            1_000,
        )
        .expect("combined weight 1.4 should emit");
        assert_eq!(signal.status, SignalStatus::Pending);
        assert_eq!(signal.module, Module::Database);
        assert!(signal.patterns.contains(&"i_recommend".to_string()));
        assert!(signal.patterns.contains(&"comparing".to_string()));
    }

    #[test]
    fn unmatched_text_emits_nothing() {
        assert!(detect("hi", "sure, sounds good", 0).is_none());
    }

    #[test]
    fn module_inference_falls_back_to_other() {
        let signal = detect(
            "what should we do",
            "Let's go with the faster approach. Comparing both options, it's clearly better.",
            0,
        )
        .expect("should emit");
        assert_eq!(signal.module, Module::Other);
    }

    #[test]
    fn oversize_response_is_truncated_at_sentence_boundary() {
        let sentence = "Let's go with option A. ";
        let long_response = sentence.repeat(5000);
        assert!(long_response.len() > MAX_INPUT_BYTES);
        let truncated = truncate_to_sentence_boundary(&long_response);
        assert!(truncated.len() <= MAX_INPUT_BYTES);
        assert!(truncated.ends_with('.'));
    }

    #[test]
    fn detection_completes_well_under_budget_for_max_size_input() {
        let response = "I recommend using Postgres. ".repeat(2000);
        let start = std::time::Instant::now();
        let _ = detect("prompt", &response, 0);
        assert!(start.elapsed().as_millis() < 50, "L2 detection should be fast even with a generous margin");
    }
}
