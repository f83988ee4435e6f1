//! Heuristic check for direct answers too weak to show as-is.
//!
//! No model call. The phrase list errs on the side of flagging: a false
//! positive costs one extra web lookup, never a wrong answer.

/// Answers shorter than this (in characters, after trimming) are flagged.
pub const MIN_ANSWER_CHARS: usize = 50;

/// Hedging phrases, matched case-insensitively as plain substrings.
pub const HEDGE_PHRASES: &[&str] = &[
    "I have information about",
    "I can provide more details",
    "I can search",
    "not sure",
    "I cannot verify",
    "if you want, I can",
    "depends",
    "hard to say",
    "I currently do not have",
    "Would you like me",
    "I don't have",
    "i do not",
    "there is no specific",
    "Based on available information",
    "There isn't specific public information",
    "Not enough information",
    "I don't have information",
    "No data available",
    "Cannot find details",
    "Insufficient data",
    "Insufficient context",
];

pub fn is_insufficient(answer: &str) -> bool {
    let trimmed = answer.trim();
    if trimmed.chars().count() < MIN_ANSWER_CHARS {
        return true;
    }

    let lowered = trimmed.to_lowercase();
    HEDGE_PHRASES
        .iter()
        .any(|phrase| lowered.contains(&phrase.to_lowercase()))
}

/// The first hedge phrase found, for logging.
pub fn matched_phrase(answer: &str) -> Option<&'static str> {
    let lowered = answer.to_lowercase();
    HEDGE_PHRASES
        .iter()
        .copied()
        .find(|phrase| lowered.contains(&phrase.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOLID: &str = "The Senate race was decided by a narrow margin after a recount in three counties.";

    #[test]
    fn short_answers_flagged() {
        assert!(is_insufficient("I'm not sure about that."));
        assert!(is_insufficient("Yes."));
        assert!(is_insufficient(""));
    }

    #[test]
    fn length_is_measured_after_trimming() {
        let padded = format!("{}{}", "x".repeat(49), " ".repeat(20));
        assert!(is_insufficient(&padded));
        assert!(!is_insufficient(&"x".repeat(50)));
    }

    #[test]
    fn hedge_phrase_flags_long_answer() {
        let answer = format!("{SOLID} Would you like me to look for more recent coverage?");
        assert!(is_insufficient(&answer));
        assert_eq!(matched_phrase(&answer), Some("Would you like me"));
    }

    #[test]
    fn matching_ignores_case() {
        let answer = format!("{SOLID} INSUFFICIENT DATA on the final count.");
        assert!(is_insufficient(&answer));
    }

    #[test]
    fn substring_match_is_over_inclusive() {
        // "i do not" inside "Hawaii do nothing" still counts.
        let answer = format!("{SOLID} Voters in Hawaii do nothing unusual in midterms.");
        assert!(is_insufficient(&answer));
    }

    #[test]
    fn confident_answer_passes() {
        assert!(!is_insufficient(SOLID));
        assert_eq!(matched_phrase(SOLID), None);
    }
}
