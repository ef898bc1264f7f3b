use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

const INDICATORS: &[&str] = &["multiple", "several", "various", "refactor", "migrate", "integrate"];

pub fn classify(description: &str) -> Complexity {
    let word_count = description.split_whitespace().count();
    let lower = description.to_lowercase();
    let indicator_hits = INDICATORS.iter().filter(|w| lower.contains(*w)).count();

    if word_count < 10 && indicator_hits == 0 {
        Complexity::Simple
    } else if word_count < 25 && indicator_hits <= 1 {
        Complexity::Moderate
    } else {
        Complexity::Complex
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_plain_description_is_simple() {
        assert_eq!(classify("create a file"), Complexity::Simple);
    }

    #[test]
    fn short_description_with_indicator_is_moderate() {
        assert_eq!(classify("refactor this module"), Complexity::Moderate);
    }

    #[test]
    fn long_description_is_complex() {
        let desc = "migrate and refactor several modules across the whole codebase \
            to integrate the new authentication system with various downstream services";
        assert_eq!(classify(desc), Complexity::Complex);
    }
}
