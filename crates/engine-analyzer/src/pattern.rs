/// A registered description→tool-chain mapping (§4.6 pass 1).
pub struct Pattern {
    pub keywords: &'static [&'static str],
    pub tool_chain: &'static [&'static str],
    pub description: &'static str,
}

/// Tools whose steps chain to the previous tool in a pattern's chain.
pub const DEPENDENCY_REQUIRING: &[&str] = &["edit_file", "git_diff", "git_commit"];

pub fn registered_patterns() -> &'static [Pattern] {
    &[
        Pattern {
            keywords: &["refactor", "code", "rename"],
            tool_chain: &["read_file", "edit_file"],
            description: "refactor existing code",
        },
        Pattern {
            keywords: &["run", "tests", "test"],
            tool_chain: &["bash"],
            description: "run the test suite",
        },
        Pattern {
            keywords: &["commit", "changes", "git"],
            tool_chain: &["git_diff", "git_commit"],
            description: "review and commit changes",
        },
        Pattern {
            keywords: &["search", "find", "codebase"],
            tool_chain: &["search"],
            description: "search the codebase",
        },
        Pattern {
            keywords: &["create", "new", "file"],
            tool_chain: &["write_file"],
            description: "create a new file",
        },
    ]
}

fn keyword_hits(description: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| description.contains(*k)).count()
}

/// Match `description` (already lowercased) against the first registered
/// pattern whose keyword hit count reaches the majority threshold.
pub fn match_pattern(description_lower: &str) -> Option<&'static Pattern> {
    registered_patterns().iter().find(|pattern| {
        let threshold = pattern.keywords.len().div_ceil(2);
        keyword_hits(description_lower, pattern.keywords) >= threshold
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_pattern_when_majority_of_keywords_hit() {
        let pattern = match_pattern("please refactor this code module").unwrap();
        assert_eq!(pattern.tool_chain, &["read_file", "edit_file"]);
    }

    #[test]
    fn no_match_below_threshold() {
        assert!(match_pattern("say hello").is_none());
    }

    #[test]
    fn commit_pattern_matches_git_changes() {
        let pattern = match_pattern("commit the changes to git").unwrap();
        assert_eq!(pattern.tool_chain, &["git_diff", "git_commit"]);
    }
}
