//! Password strength scoring seam
//!
//! The engine does not judge passwords itself. A scorer is injected by the
//! application and its verdict is passed through untouched.

use serde::{Deserialize, Serialize};

use crate::crypto::SecretString;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrengthScore {
    pub score: u8,
    pub label: String,
}

pub trait PasswordScorer: Send + Sync {
    fn score(&self, candidate: &str) -> StrengthScore;
}

impl<F> PasswordScorer for F
where
    F: Fn(&str) -> StrengthScore + Send + Sync,
{
    fn score(&self, candidate: &str) -> StrengthScore {
        self(candidate)
    }
}

/// Ask `scorer` about `candidate` and return its answer unmodified
pub fn evaluate(scorer: &dyn PasswordScorer, candidate: &SecretString) -> StrengthScore {
    scorer.score(candidate.expose())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scorer_result_is_forwarded_unmodified() {
        let scorer = |candidate: &str| StrengthScore {
            score: 42,
            label: format!("len {}", candidate.len()),
        };

        let result = evaluate(&scorer, &SecretString::from("abc"));

        assert_eq!(
            result,
            StrengthScore {
                score: 42,
                label: "len 3".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_controller_forwards_to_scorer() {
        use crate::session::SessionController;
        use crate::testing::{test_config, MockApi};

        struct Fixed;
        impl PasswordScorer for Fixed {
            fn score(&self, _candidate: &str) -> StrengthScore {
                StrengthScore {
                    score: 7,
                    label: "Whatever the scorer says".to_string(),
                }
            }
        }

        let controller = SessionController::new(MockApi::new(), test_config());
        let result = controller.score_password(&Fixed, &SecretString::from("pw"));

        assert_eq!(result.score, 7);
        assert_eq!(result.label, "Whatever the scorer says");
    }
}
