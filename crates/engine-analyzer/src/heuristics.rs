use engine_core::EngineError;

/// Second-pass fallback when no registered pattern matches (§4.6 pass 2).
pub fn heuristic_tool_chain(description_lower: &str) -> Result<Vec<&'static str>, EngineError> {
    let has_create = description_lower.contains("create");
    let has_file = description_lower.contains("file");
    let has_edit = description_lower.contains("edit") || description_lower.contains("modify");
    let has_search = description_lower.contains("search") || description_lower.contains("find");
    let has_test = description_lower.contains("test");
    let has_commit = description_lower.contains("commit") || description_lower.contains("git");

    if has_create && has_file {
        return Ok(vec!["write_file"]);
    }
    if has_edit {
        return Ok(vec!["edit_file"]);
    }
    if has_search {
        return Ok(vec!["search"]);
    }
    if has_test {
        return Ok(vec!["bash"]);
    }
    if has_commit {
        let mut chain = vec!["git_status"];
        if description_lower.contains("diff") {
            chain.push("git_diff");
        }
        return Ok(chain);
    }

    Err(EngineError::UnrecognizedTask(description_lower.to_string()))
}
