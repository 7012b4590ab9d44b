//! Repository snapshot injected into the system prompt: a shallow directory
//! tree followed by the contents of the code files.

use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{CodeGptError, CoreResult, PreconditionError};
use crate::notify::Notifier;

/// Name of the per-workspace override file.
pub const OVERRIDE_FILE: &str = ".repoinfo.json";

const PREAMBLE: &str = "You are a helpful assistant.";
const ANSWER_RULES: &str = "Always answer in a markdown format.\n\
When writing code, please keep in mind to properly set the markdown for the appropriate syntax highlight.";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RepoInfoConfig {
    /// Extensions (with leading dot) whose files are inlined.
    #[serde(default = "default_code_file_extensions", alias = "codeFileExtensions")]
    pub code_file_extensions: Vec<String>,
    /// Workspace-relative directories that are never walked.
    #[serde(default, alias = "ignoredDirectories")]
    pub ignored_directories: Vec<String>,
    /// Workspace-relative files that are inlined regardless of extension.
    #[serde(default, alias = "includeSpecificFiles")]
    pub include_specific_files: Vec<String>,
    #[serde(default = "default_tree_depth", alias = "treeDepth")]
    pub tree_depth: usize,
    /// `|`-separated glob alternatives matched against entry names.
    #[serde(default = "default_tree_exclude", alias = "treeExclude")]
    pub tree_exclude: String,
}

impl Default for RepoInfoConfig {
    fn default() -> Self {
        Self {
            code_file_extensions: default_code_file_extensions(),
            ignored_directories: Vec::new(),
            include_specific_files: Vec::new(),
            tree_depth: default_tree_depth(),
            tree_exclude: default_tree_exclude(),
        }
    }
}

fn default_code_file_extensions() -> Vec<String> {
    [
        ".cpp", ".hpp", ".c", ".h", ".js", ".ts", ".tsx", ".csj", ".mjs", ".fs", ".vs", ".glsl",
        ".html", ".css", ".scss", ".py", ".sh",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_tree_depth() -> usize {
    3
}
fn default_tree_exclude() -> String {
    "*.json|*.md|deps|build".into()
}

/// Keys accepted in `.repoinfo.json`; anything absent keeps the configured value.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepoInfoOverrides {
    pub code_file_extensions: Option<Vec<String>>,
    pub ignored_directories: Option<Vec<String>>,
    pub include_specific_files: Option<Vec<String>>,
}

impl RepoInfoConfig {
    /// Returns a copy with the overrides applied.
    pub fn with_overrides(&self, o: RepoInfoOverrides) -> Self {
        let mut out = self.clone();
        if let Some(v) = o.code_file_extensions {
            out.code_file_extensions = v;
        }
        if let Some(v) = o.ignored_directories {
            out.ignored_directories = v;
        }
        if let Some(v) = o.include_specific_files {
            out.include_specific_files = v;
        }
        out
    }

    /// Compile `tree_exclude` into an anchored regex over entry names.
    pub fn exclude_regex(&self) -> CoreResult<Option<Regex>> {
        let alts: Vec<String> = self
            .tree_exclude
            .split('|')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(glob_to_regex)
            .collect();
        if alts.is_empty() {
            return Ok(None);
        }
        let re = Regex::new(&format!("^(?:{})$", alts.join("|")))
            .map_err(|e| CodeGptError::Config(format!("invalid repo_info.tree_exclude: {e}")))?;
        Ok(Some(re))
    }

    fn includes_file(&self, rel: &str, name: &str) -> bool {
        let ext_match = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let dotted = format!(".{e}");
                self.code_file_extensions.iter().any(|x| *x == dotted)
            })
            .unwrap_or(false);
        ext_match || self.include_specific_files.iter().any(|f| f == rel)
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut re = String::with_capacity(glob.len() + 4);
    for c in glob.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re
}

static NON_STANDARD_SPACES: Lazy<Regex> = Lazy::new(|| {
    Regex::new("[\u{00A0}\u{2000}-\u{200A}\u{202F}\u{205F}\u{3000}]")
        .expect("non-standard space class is a valid regex")
});

/// Replace no-break, figure, ideographic and similar spaces with ASCII space.
pub fn replace_non_standard_spaces(input: &str) -> String {
    NON_STANDARD_SPACES.replace_all(input, " ").into_owned()
}

/// Read `.repoinfo.json` from `dir`. A missing file is `Ok(None)`.
pub fn load_overrides(dir: &Path) -> CoreResult<Option<RepoInfoOverrides>> {
    let path = dir.join(OVERRIDE_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| CodeGptError::Config(format!("Error parsing {OVERRIDE_FILE}: {e}")))
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// `path` relative to `root`, joined with `/` on every platform.
fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Errors on the root are fatal; anything deeper is logged and skipped.
fn walk_error(err: walkdir::Error) -> CoreResult<()> {
    if err.depth() == 0 {
        return Err(std::io::Error::from(err).into());
    }
    tracing::debug!(error = %err, "skipping unreadable entry");
    Ok(())
}

/// Depth-limited listing of `dir` in the layout of the `tree` utility.
pub fn generate_tree(dir: &Path, cfg: &RepoInfoConfig) -> CoreResult<String> {
    let exclude = cfg.exclude_regex()?;
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(cfg.tree_depth)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        // the predicate also sees the root, whose own name may be hidden
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !is_hidden(&name) && exclude.as_ref().is_none_or(|re| !re.is_match(&name))
        });

    let mut listed: Vec<(usize, String)> = Vec::new();
    for entry in walker {
        match entry {
            Ok(e) => listed.push((e.depth(), e.file_name().to_string_lossy().into_owned())),
            Err(err) => walk_error(err)?,
        }
    }

    // An entry is last when no later sibling shares its parent.
    let mut last = vec![false; listed.len()];
    let mut sibling_below: Vec<bool> = Vec::new();
    for (i, (depth, _)) in listed.iter().enumerate().rev() {
        sibling_below.resize(*depth, false);
        last[i] = !sibling_below[depth - 1];
        sibling_below[depth - 1] = true;
    }

    let mut out = String::from(".\n");
    let mut ancestors_last: Vec<bool> = Vec::new();
    for ((depth, name), is_last) in listed.iter().zip(last) {
        ancestors_last.truncate(depth - 1);
        for &done in &ancestors_last {
            out.push_str(if done { "    " } else { "│   " });
        }
        out.push_str(if is_last { "└── " } else { "├── " });
        out.push_str(name);
        out.push('\n');
        ancestors_last.push(is_last);
    }
    Ok(replace_non_standard_spaces(&out))
}

/// Inline every matching file as a fenced block, walking `dir` in sorted order.
///
/// Hidden and ignored directories are pruned. Symlinked files are read,
/// symlinked directories are not walked.
pub fn gather_file_contents(dir: &Path, cfg: &RepoInfoConfig) -> CoreResult<String> {
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let rel = relative(dir, e.path());
            let skip = is_hidden(&e.file_name().to_string_lossy())
                || cfg.ignored_directories.iter().any(|d| d.trim_end_matches('/') == rel);
            if skip {
                tracing::debug!(dir = %rel, "skipping directory");
            }
            !skip
        });

    let mut out = String::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                walk_error(err)?;
                continue;
            }
        };
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink()
                && fs::metadata(entry.path()).map(|m| m.is_file()).unwrap_or(false));
        if !is_file {
            continue;
        }
        let rel = relative(dir, entry.path());
        if !cfg.includes_file(&rel, &entry.file_name().to_string_lossy()) {
            continue;
        }
        let bytes = match fs::read(entry.path()) {
            Ok(b) => b,
            Err(err) => {
                tracing::debug!(file = %rel, error = %err, "skipping unreadable file");
                continue;
            }
        };
        match String::from_utf8(bytes) {
            Ok(content) => {
                tracing::trace!(file = %rel, "reading file");
                out.push_str(&format!("\n{rel}:\n```\n{content}\n```\n"));
            }
            Err(_) => tracing::debug!(file = %rel, "skipping non-UTF-8 file"),
        }
    }
    Ok(out)
}

/// Tree plus file contents for `dir`. `.repoinfo.json` overrides apply to this
/// call only; a broken override file is reported and ignored.
pub fn generate_repo_info(
    dir: &Path,
    cfg: &RepoInfoConfig,
    notifier: &dyn Notifier,
) -> CoreResult<String> {
    if !dir.is_dir() {
        return Err(PreconditionError::NoWorkspace(dir.display().to_string()).into());
    }
    let effective = match load_overrides(dir) {
        Ok(Some(o)) => cfg.with_overrides(o),
        Ok(None) => cfg.clone(),
        Err(e) => {
            notifier.warn(&e.to_string());
            cfg.clone()
        }
    };

    let tree = generate_tree(dir, &effective)?;
    let files = gather_file_contents(dir, &effective)?;
    tracing::debug!(
        workspace = %dir.display(),
        tree_bytes = tree.len(),
        file_bytes = files.len(),
        "repository snapshot gathered"
    );
    Ok(format!(
        "The basic structure of the app is as follows:\n```\n{tree}\n```\n{files}"
    ))
}

/// The system prompt sent ahead of every user prompt.
pub fn system_prompt(repo_info: Option<&str>) -> String {
    match repo_info {
        Some(info) => format!(
            "\n{PREAMBLE}\nHere is some information about the repository you are working with:\n{info}\n{ANSWER_RULES}\n"
        ),
        None => format!("{PREAMBLE}\n{ANSWER_RULES}\n"),
    }
}
