//! Configuration validation engine.
//!
//! Validates TOML configuration files against the known schema, detects
//! misspelled fields, and reports plugin declarations that cannot work.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use crate::schema::{AppConfig, SHELL_HOOK_NAMES};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "plugin", "ssr"
    pub category: &'static str,
    /// Dotted path, e.g. "server.prot"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

/// Expected shape of the configuration schema.
enum KnownKeys {
    /// A struct with fixed field names.
    Struct(HashMap<&'static str, KnownKeys>),
    /// A map with dynamic keys whose values have a known shape.
    Map(Box<KnownKeys>),
    /// An array of typed items.
    Array(Box<KnownKeys>),
    /// Scalar value or free-form table, stop recursion.
    Leaf,
}

/// Build the schema map mirroring every field in `schema.rs`.
fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Array, Leaf, Map, Struct};

    let entry = Struct(HashMap::from([
        ("entry", Leaf),
        ("disable_mount", Leaf),
        ("custom_entry", Leaf),
        ("custom_bootstrap", Leaf),
        ("custom_server_entry", Leaf),
    ]));

    let plugin = Struct(HashMap::from([
        ("name", Leaf),
        ("pre", Leaf),
        ("post", Leaf),
        ("rivals", Leaf),
        ("timeout", Leaf),
        ("env", Leaf),
        ("hooks", Leaf),
    ]));

    Struct(HashMap::from([
        (
            "source",
            Struct(HashMap::from([
                ("entries", Map(Box::new(entry))),
                ("enable_async_entry", Leaf),
                ("main_entry_name", Leaf),
            ])),
        ),
        (
            "output",
            Struct(HashMap::from([("dist_path", Leaf), ("ssg", Leaf)])),
        ),
        (
            "server",
            Struct(HashMap::from([
                ("port", Leaf),
                ("ssr", Leaf),
                ("ssr_by_entries", Leaf),
            ])),
        ),
        (
            "html",
            Struct(HashMap::from([("mount_id", Leaf), ("title", Leaf)])),
        ),
        (
            "dev",
            Struct(HashMap::from([("watch", Leaf), ("debounce_ms", Leaf)])),
        ),
        (
            "bundler",
            Struct(HashMap::from([
                ("name", Leaf),
                ("build_command", Leaf),
                ("rebuild_command", Leaf),
                ("env", Leaf),
                ("timeout", Leaf),
            ])),
        ),
        ("plugins", Array(Box::new(plugin))),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&candidate| (candidate, levenshtein(needle, candidate)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(s, _)| s)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate the config file at `path`.
#[must_use]
pub fn validate(path: &Path) -> ValidationResult {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let mut result = validate_toml_str(&crate::env_subst::substitute_env(&content));
            result.config_path = Some(path.to_path_buf());
            result
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("failed to read config file: {e}"),
            }],
            config_path: Some(path.to_path_buf()),
        },
    }
}

/// Validate a TOML string without file-system side effects.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let toml_value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("TOML syntax error: {e}"),
            });
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    let schema = build_schema_map();
    check_unknown_fields(&toml_value, &schema, "", &mut diagnostics);

    match toml::from_str::<AppConfig>(toml_str) {
        Ok(config) => {
            check_plugins(&config, &mut diagnostics);
            check_ssr(&config, &mut diagnostics);
        },
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Walk the TOML value tree against the schema tree and flag unknown keys.
///
/// Unknown top-level sections are only warnings since plugins may read them.
fn check_unknown_fields(
    value: &toml::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };

    match (value, schema) {
        (toml::Value::Table(table), KnownKeys::Struct(fields)) => {
            let mut known_keys: Vec<&str> = fields.keys().copied().collect();
            known_keys.sort_unstable();
            for (key, child_value) in table {
                let path = join(key);
                if let Some(child_schema) = fields.get(key.as_str()) {
                    check_unknown_fields(child_value, child_schema, &path, diagnostics);
                    continue;
                }
                let suggestion = suggest(key, &known_keys, 2);
                let (severity, mut message) = if prefix.is_empty() {
                    (
                        Severity::Warning,
                        "unknown top-level section (kept for plugins)".to_string(),
                    )
                } else {
                    (Severity::Error, "unknown field".to_string())
                };
                if let Some(s) = suggestion {
                    message.push_str(&format!(" (did you mean \"{s}\"?)"));
                }
                diagnostics.push(Diagnostic {
                    severity,
                    category: "unknown-field",
                    path,
                    message,
                });
            }
        },
        (toml::Value::Table(table), KnownKeys::Map(value_schema)) => {
            for (key, child_value) in table {
                check_unknown_fields(child_value, value_schema, &join(key), diagnostics);
            }
        },
        (toml::Value::Array(arr), KnownKeys::Array(item_schema)) => {
            for (i, item) in arr.iter().enumerate() {
                let path = format!("{prefix}[{i}]");
                check_unknown_fields(item, item_schema, &path, diagnostics);
            }
        },
        // Leaf or type mismatch, type errors are caught by deserialization.
        _ => {},
    }
}

/// Check config-declared plugins for names and hooks that cannot resolve.
fn check_plugins(config: &AppConfig, diagnostics: &mut Vec<Diagnostic>) {
    let mut seen = HashSet::new();
    for (i, plugin) in config.plugins.iter().enumerate() {
        let path = format!("plugins[{i}]");
        if plugin.name.trim().is_empty() {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "plugin",
                path: format!("{path}.name"),
                message: "plugin name must not be empty".into(),
            });
        }
        if !seen.insert(plugin.name.as_str()) {
            diagnostics.push(Diagnostic {
                severity: Severity::Warning,
                category: "plugin",
                path: format!("{path}.name"),
                message: format!(
                    "duplicate plugin \"{}\"; only the first declaration runs",
                    plugin.name
                ),
            });
        }
        if plugin.pre.contains(&plugin.name) || plugin.post.contains(&plugin.name) {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "plugin",
                path: path.clone(),
                message: format!("plugin \"{}\" is ordered relative to itself", plugin.name),
            });
        }
        if plugin.hooks.is_empty() {
            diagnostics.push(Diagnostic {
                severity: Severity::Info,
                category: "plugin",
                path: format!("{path}.hooks"),
                message: format!("plugin \"{}\" subscribes to no hooks", plugin.name),
            });
        }
        for hook in plugin.hooks.keys() {
            if SHELL_HOOK_NAMES.contains(&hook.as_str()) {
                continue;
            }
            let message = match suggest(hook, SHELL_HOOK_NAMES, 3) {
                Some(s) => format!("unknown hook \"{hook}\" (did you mean \"{s}\"?)"),
                None => format!("unknown hook \"{hook}\""),
            };
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "plugin",
                path: format!("{path}.hooks.{hook}"),
                message,
            });
        }
    }
}

/// Check SSR settings for values the mode resolution silently ignores.
fn check_ssr(config: &AppConfig, diagnostics: &mut Vec<Diagnostic>) {
    use crate::schema::SsrSetting;

    let check_mode = |setting: &SsrSetting, path: String, diagnostics: &mut Vec<Diagnostic>| {
        if let SsrSetting::Options(opts) = setting
            && let Some(mode) = opts.mode.as_deref()
            && !matches!(mode, "string" | "stream")
        {
            diagnostics.push(Diagnostic {
                severity: Severity::Warning,
                category: "ssr",
                path,
                message: format!("unknown SSR mode \"{mode}\", rendering to a string"),
            });
        }
    };

    check_mode(&config.server.ssr, "server.ssr.mode".into(), diagnostics);

    for (entry, setting) in &config.server.ssr_by_entries {
        check_mode(
            setting,
            format!("server.ssr_by_entries.{entry}.mode"),
            diagnostics,
        );
        let declared = if config.source.entries.is_empty() {
            *entry == config.source.main_entry_name
        } else {
            config.source.entries.contains_key(entry)
        };
        if !declared {
            diagnostics.push(Diagnostic {
                severity: Severity::Warning,
                category: "ssr",
                path: format!("server.ssr_by_entries.{entry}"),
                message: format!("no entrypoint named \"{entry}\""),
            });
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(result: &'a ValidationResult, path: &str) -> Option<&'a Diagnostic> {
        result.diagnostics.iter().find(|d| d.path == path)
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("server", "server"), 0);
        assert_eq!(levenshtein("serer", "server"), 1);
        assert_eq!(levenshtein("mount_id", "mountid"), 1);
    }

    #[test]
    fn empty_config_is_valid() {
        let result = validate_toml_str("");
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn unknown_top_level_section_is_warning_with_suggestion() {
        let result = validate_toml_str("[sever]\nport = 1\n");
        let d = find(&result, "sever").unwrap();
        assert_eq!(d.severity, Severity::Warning);
        assert!(d.message.contains("server"), "{}", d.message);
        assert!(!result.has_errors());
    }

    #[test]
    fn unknown_nested_key_is_error() {
        let result = validate_toml_str("[html]\nmountid = \"app\"\n");
        let d = find(&result, "html.mountid").unwrap();
        assert_eq!(d.severity, Severity::Error);
        assert!(d.message.contains("mount_id"));
    }

    #[test]
    fn unknown_field_inside_entry() {
        let toml = r#"
[source.entries.main]
entry = "src/App.tsx"
custom_entri = true
"#;
        let result = validate_toml_str(toml);
        assert!(find(&result, "source.entries.main.custom_entri").is_some());
    }

    #[test]
    fn syntax_error_detected() {
        let result = validate_toml_str("[server\n");
        assert_eq!(result.diagnostics[0].category, "syntax");
        assert!(result.has_errors());
    }

    #[test]
    fn type_error_detected() {
        let result = validate_toml_str("[server]\nport = \"eighty\"\n");
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.category == "type-error")
        );
    }

    #[test]
    fn unknown_shell_hook_suggests_name() {
        let toml = r#"
[[plugins]]
name = "lint"
hooks = { on_befor_build = "eslint ." }
"#;
        let result = validate_toml_str(toml);
        let d = find(&result, "plugins[0].hooks.on_befor_build").unwrap();
        assert_eq!(d.severity, Severity::Error);
        assert!(d.message.contains("on_before_build"));
    }

    #[test]
    fn duplicate_and_self_referencing_plugins() {
        let toml = r#"
[[plugins]]
name = "lint"
pre = ["lint"]
hooks = { on_before_build = "eslint ." }

[[plugins]]
name = "lint"
hooks = { on_after_build = "echo done" }
"#;
        let result = validate_toml_str(toml);
        assert!(
            find(&result, "plugins[0]")
                .unwrap()
                .message
                .contains("itself")
        );
        assert_eq!(
            find(&result, "plugins[1].name").unwrap().severity,
            Severity::Warning
        );
    }

    #[test]
    fn ssr_by_entries_must_name_an_entry() {
        let toml = r#"
[server.ssr_by_entries]
main = true
admin = { mode = "streaming" }
"#;
        let result = validate_toml_str(toml);
        assert!(find(&result, "server.ssr_by_entries.main").is_none());
        assert!(find(&result, "server.ssr_by_entries.admin").is_some());
        assert!(find(&result, "server.ssr_by_entries.admin.mode").is_some());
        assert!(!result.has_errors());
    }

    #[test]
    fn validate_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trellis.toml");
        std::fs::write(&path, "[output]\nssg = true\n").unwrap();
        let result = validate(&path);
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(result.count(Severity::Error), 0);
    }
}
