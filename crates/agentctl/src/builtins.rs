//! The handful of tools a plan actually has available to call. Kept
//! deliberately small: the orchestrator's job is scheduling and rollback,
//! not a full filesystem/shell tool suite.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use engine_core::{PropertyType, Tool, ToolOutput, ToolRegistry, ToolSchema};
use serde_json::Value;

fn param_str<'a>(input: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

fn resolve(root: &Path, relative: &str) -> PathBuf {
    root.join(relative)
}

pub struct WriteFile {
    root: PathBuf,
}

impl Tool for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    fn schema(&self) -> Option<&ToolSchema> {
        static SCHEMA: std::sync::OnceLock<ToolSchema> = std::sync::OnceLock::new();
        Some(SCHEMA.get_or_init(|| ToolSchema {
            required: vec!["path".into(), "content".into()],
            properties: HashMap::from([
                ("path".to_string(), PropertyType::String),
                ("content".to_string(), PropertyType::String),
            ]),
        }))
    }

    fn execute(&self, input: &HashMap<String, Value>) -> ToolOutput {
        let (Some(path), Some(content)) = (param_str(input, "path"), param_str(input, "content"))
        else {
            return ToolOutput::err("write_file requires path and content");
        };
        let target = resolve(&self.root, path);
        if let Some(parent) = target.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ToolOutput::err(format!("Error: {e}"));
            }
        }
        match std::fs::write(&target, content) {
            Ok(()) => ToolOutput::ok(Value::String(format!("wrote {}", path))),
            Err(e) => ToolOutput::err(format!("Error: {e}")),
        }
    }
}

pub struct ReadFile {
    root: PathBuf,
}

impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn schema(&self) -> Option<&ToolSchema> {
        static SCHEMA: std::sync::OnceLock<ToolSchema> = std::sync::OnceLock::new();
        Some(SCHEMA.get_or_init(|| ToolSchema {
            required: vec!["path".into()],
            properties: HashMap::from([("path".to_string(), PropertyType::String)]),
        }))
    }

    fn execute(&self, input: &HashMap<String, Value>) -> ToolOutput {
        let Some(path) = param_str(input, "path") else {
            return ToolOutput::err("read_file requires path");
        };
        match std::fs::read_to_string(resolve(&self.root, path)) {
            Ok(content) => ToolOutput::ok(Value::String(content)),
            Err(e) => ToolOutput::err(format!("Error: {e}")),
        }
    }
}

pub struct EditFile {
    root: PathBuf,
}

impl Tool for EditFile {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn schema(&self) -> Option<&ToolSchema> {
        static SCHEMA: std::sync::OnceLock<ToolSchema> = std::sync::OnceLock::new();
        Some(SCHEMA.get_or_init(|| ToolSchema {
            required: vec!["path".into(), "find".into(), "replace".into()],
            properties: HashMap::from([
                ("path".to_string(), PropertyType::String),
                ("find".to_string(), PropertyType::String),
                ("replace".to_string(), PropertyType::String),
            ]),
        }))
    }

    fn execute(&self, input: &HashMap<String, Value>) -> ToolOutput {
        let (Some(path), Some(find), Some(replace)) = (
            param_str(input, "path"),
            param_str(input, "find"),
            param_str(input, "replace"),
        ) else {
            return ToolOutput::err("edit_file requires path, find and replace");
        };
        let target = resolve(&self.root, path);
        let current = match std::fs::read_to_string(&target) {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(format!("Error: {e}")),
        };
        if !current.contains(find) {
            return ToolOutput::err(format!("Error: pattern not found in {path}"));
        }
        let updated = current.replacen(find, replace, 1);
        match std::fs::write(&target, updated) {
            Ok(()) => ToolOutput::ok(Value::String(format!("edited {}", path))),
            Err(e) => ToolOutput::err(format!("Error: {e}")),
        }
    }
}

pub struct Bash {
    root: PathBuf,
}

impl Tool for Bash {
    fn name(&self) -> &str {
        "bash"
    }

    fn schema(&self) -> Option<&ToolSchema> {
        static SCHEMA: std::sync::OnceLock<ToolSchema> = std::sync::OnceLock::new();
        Some(SCHEMA.get_or_init(|| ToolSchema {
            required: vec!["command".into()],
            properties: HashMap::from([("command".to_string(), PropertyType::String)]),
        }))
    }

    fn execute(&self, input: &HashMap<String, Value>) -> ToolOutput {
        let Some(command) = param_str(input, "command") else {
            return ToolOutput::err("bash requires command");
        };
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .output();
        match output {
            Ok(out) if out.status.success() => {
                ToolOutput::ok(Value::String(String::from_utf8_lossy(&out.stdout).into_owned()))
            }
            Ok(out) => ToolOutput::err(format!(
                "Error: {}",
                String::from_utf8_lossy(&out.stderr)
            )),
            Err(e) => ToolOutput::err(format!("Error: {e}")),
        }
    }
}

pub struct Search {
    root: PathBuf,
}

impl Tool for Search {
    fn name(&self) -> &str {
        "search"
    }

    fn schema(&self) -> Option<&ToolSchema> {
        static SCHEMA: std::sync::OnceLock<ToolSchema> = std::sync::OnceLock::new();
        Some(SCHEMA.get_or_init(|| ToolSchema {
            required: vec!["pattern".into()],
            properties: HashMap::from([("pattern".to_string(), PropertyType::String)]),
        }))
    }

    fn execute(&self, input: &HashMap<String, Value>) -> ToolOutput {
        let Some(pattern) = param_str(input, "pattern") else {
            return ToolOutput::err("search requires pattern");
        };
        let regex = match regex::Regex::new(pattern) {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(format!("Error: {e}")),
        };
        let mut matches = Vec::new();
        for entry in walkdir(&self.root) {
            if let Ok(content) = std::fs::read_to_string(&entry) {
                for (line_no, line) in content.lines().enumerate() {
                    if regex.is_match(line) {
                        matches.push(format!("{}:{}:{}", entry.display(), line_no + 1, line));
                    }
                }
            }
        }
        ToolOutput::ok(Value::Array(matches.into_iter().map(Value::String).collect()))
    }
}

fn walkdir(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.file_name().and_then(|n| n.to_str()) == Some(".git") {
                continue;
            }
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out
}

pub struct GitStatus {
    shell: engine_git::GitShell,
}

impl Tool for GitStatus {
    fn name(&self) -> &str {
        "git_status"
    }

    fn execute(&self, _input: &HashMap<String, Value>) -> ToolOutput {
        match self.shell.run(&["status", "--porcelain"]) {
            Ok(out) => ToolOutput::ok(Value::String(out)),
            Err(e) => ToolOutput::err(format!("Error: {e}")),
        }
    }
}

pub struct GitCommit {
    shell: engine_git::GitShell,
}

impl Tool for GitCommit {
    fn name(&self) -> &str {
        "git_commit"
    }

    fn schema(&self) -> Option<&ToolSchema> {
        static SCHEMA: std::sync::OnceLock<ToolSchema> = std::sync::OnceLock::new();
        Some(SCHEMA.get_or_init(|| ToolSchema {
            required: vec!["message".into()],
            properties: HashMap::from([("message".to_string(), PropertyType::String)]),
        }))
    }

    fn execute(&self, input: &HashMap<String, Value>) -> ToolOutput {
        let Some(message) = param_str(input, "message") else {
            return ToolOutput::err("git_commit requires message");
        };
        if let Err(e) = self.shell.run(&["add", "-A"]) {
            return ToolOutput::err(format!("Error: {e}"));
        }
        match self.shell.run(&["commit", "-m", message]) {
            Ok(out) => ToolOutput::ok(Value::String(out)),
            Err(e) => ToolOutput::err(format!("Error: {e}")),
        }
    }
}

/// Populate a registry with the built-in tool set, rooted at `working_directory`.
pub fn registry_for(working_directory: &Path) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(WriteFile {
        root: working_directory.to_path_buf(),
    }));
    registry.register(Box::new(ReadFile {
        root: working_directory.to_path_buf(),
    }));
    registry.register(Box::new(EditFile {
        root: working_directory.to_path_buf(),
    }));
    registry.register(Box::new(Bash {
        root: working_directory.to_path_buf(),
    }));
    registry.register(Box::new(Search {
        root: working_directory.to_path_buf(),
    }));
    registry.register(Box::new(GitStatus {
        shell: engine_git::GitShell::new(working_directory),
    }));
    registry.register(Box::new(GitCommit {
        shell: engine_git::GitShell::new(working_directory),
    }));
    registry
}
