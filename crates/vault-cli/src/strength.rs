//! Length and character-class password strength heuristic

use vault_core::{PasswordScorer, StrengthScore};

const LABELS: [&str; 5] = ["Very Weak", "Weak", "Fair", "Good", "Strong"];

/// Scores 0-4 from length and the number of character classes used
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicScorer;

impl PasswordScorer for HeuristicScorer {
    fn score(&self, candidate: &str) -> StrengthScore {
        let length = candidate.chars().count();
        let classes = [
            candidate.chars().any(|c| c.is_ascii_lowercase()),
            candidate.chars().any(|c| c.is_ascii_uppercase()),
            candidate.chars().any(|c| c.is_ascii_digit()),
            candidate.chars().any(|c| !c.is_ascii_alphanumeric()),
        ]
        .iter()
        .filter(|present| **present)
        .count();

        let mut points = 0u8;
        if length >= 8 {
            points += 1;
        }
        if length >= 12 {
            points += 1;
        }
        if length >= 16 {
            points += 1;
        }
        if classes >= 3 {
            points += 1;
        }
        if classes == 4 {
            points += 1;
        }
        if length < 8 {
            points = points.min(1);
        }

        let score = points.min(4);
        StrengthScore {
            score,
            label: LABELS[score as usize].to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(candidate: &str) -> u8 {
        HeuristicScorer.score(candidate).score
    }

    #[test]
    fn test_short_passwords_stay_weak() {
        assert_eq!(score(""), 0);
        assert_eq!(score("abc"), 0);
        assert!(score("aB3$xy") <= 1);
    }

    #[test]
    fn test_longer_and_more_varied_scores_higher() {
        assert!(score("abcdefgh") < score("abcdefghijkl"));
        assert!(score("abcdefghijkl") < score("abcDEF123!@#"));
        assert_eq!(score("Tr0ub4dor&3-horse-staple"), 4);
    }

    #[test]
    fn test_label_matches_score() {
        let result = HeuristicScorer.score("Tr0ub4dor&3-horse-staple");
        assert_eq!(result.label, "Strong");

        let result = HeuristicScorer.score("abc");
        assert_eq!(result.label, "Very Weak");
    }
}
