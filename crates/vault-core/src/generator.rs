//! Random password generation

use rand::rngs::OsRng;
use rand::seq::SliceRandom;

use crate::crypto::SecretString;
use crate::error::{Result, VaultError};

pub const MIN_LENGTH: usize = 8;
pub const MAX_LENGTH: usize = 64;
pub const DEFAULT_LENGTH: usize = 16;

const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const DIGITS: &str = "0123456789";
const SYMBOLS: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Characters easily confused with one another
const SIMILAR: &str = "IOilo01";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorOptions {
    pub length: usize,
    pub uppercase: bool,
    pub lowercase: bool,
    pub digits: bool,
    pub symbols: bool,
    pub exclude_similar: bool,
    /// Extra characters that must never appear
    pub exclude: String,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            length: DEFAULT_LENGTH,
            uppercase: true,
            lowercase: true,
            digits: true,
            symbols: true,
            exclude_similar: false,
            exclude: String::new(),
        }
    }
}

impl GeneratorOptions {
    fn charsets(&self) -> Vec<Vec<char>> {
        let enabled = [
            (self.uppercase, UPPERCASE),
            (self.lowercase, LOWERCASE),
            (self.digits, DIGITS),
            (self.symbols, SYMBOLS),
        ];

        let mut sets: Vec<Vec<char>> = enabled
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, chars)| self.filtered(chars))
            .filter(|set| !set.is_empty())
            .collect();

        if sets.is_empty() {
            let fallback = self.filtered(LOWERCASE);
            if !fallback.is_empty() {
                sets.push(fallback);
            }
        }
        sets
    }

    fn filtered(&self, chars: &str) -> Vec<char> {
        chars
            .chars()
            .filter(|c| !(self.exclude_similar && SIMILAR.contains(*c)))
            .filter(|c| !self.exclude.contains(*c))
            .collect()
    }
}

/// Generate a password with at least one character from every enabled set
pub fn generate_password(options: &GeneratorOptions) -> Result<SecretString> {
    if !(MIN_LENGTH..=MAX_LENGTH).contains(&options.length) {
        return Err(VaultError::Validation(format!(
            "password length must be between {} and {}",
            MIN_LENGTH, MAX_LENGTH
        )));
    }

    let sets = options.charsets();
    if sets.is_empty() {
        return Err(VaultError::Validation(
            "every candidate character is excluded".to_string(),
        ));
    }

    let mut rng = OsRng;
    let mut password: Vec<char> = sets
        .iter()
        .filter_map(|set| set.choose(&mut rng).copied())
        .collect();

    let pool: Vec<char> = sets.concat();
    while password.len() < options.length {
        if let Some(c) = pool.choose(&mut rng) {
            password.push(*c);
        }
    }
    password.shuffle(&mut rng);

    Ok(SecretString::new(password.into_iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_in(password: &str, set: &str) -> usize {
        password.chars().filter(|c| set.contains(*c)).count()
    }

    #[test]
    fn test_default_options() {
        let password = generate_password(&GeneratorOptions::default()).unwrap();
        let password = password.expose();

        assert_eq!(password.chars().count(), DEFAULT_LENGTH);
        assert!(count_in(password, UPPERCASE) >= 1);
        assert!(count_in(password, LOWERCASE) >= 1);
        assert!(count_in(password, DIGITS) >= 1);
        assert!(count_in(password, SYMBOLS) >= 1);
    }

    #[test]
    fn test_length_bounds() {
        for length in [MIN_LENGTH, MAX_LENGTH] {
            let options = GeneratorOptions {
                length,
                ..GeneratorOptions::default()
            };
            assert_eq!(generate_password(&options).unwrap().expose().len(), length);
        }

        for length in [0, MIN_LENGTH - 1, MAX_LENGTH + 1] {
            let options = GeneratorOptions {
                length,
                ..GeneratorOptions::default()
            };
            assert!(matches!(
                generate_password(&options),
                Err(VaultError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_exclusions_are_honoured() {
        let options = GeneratorOptions {
            length: MAX_LENGTH,
            exclude_similar: true,
            exclude: "abc#".to_string(),
            ..GeneratorOptions::default()
        };

        for _ in 0..20 {
            let password = generate_password(&options).unwrap();
            assert_eq!(count_in(password.expose(), SIMILAR), 0);
            assert_eq!(count_in(password.expose(), "abc#"), 0);
        }
    }

    #[test]
    fn test_all_sets_disabled_falls_back_to_lowercase() {
        let options = GeneratorOptions {
            uppercase: false,
            lowercase: false,
            digits: false,
            symbols: false,
            ..GeneratorOptions::default()
        };

        let password = generate_password(&options).unwrap();
        assert!(password.expose().chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_digits_only() {
        let options = GeneratorOptions {
            length: 12,
            uppercase: false,
            lowercase: false,
            symbols: false,
            ..GeneratorOptions::default()
        };

        let password = generate_password(&options).unwrap();
        assert!(password.expose().chars().all(|c| c.is_ascii_digit()));
    }
}
