use std::path::{Path, PathBuf};

use {anyhow::Result, clap::Subcommand};

use {
    crate::term::{BOLD, CYAN, RED, RESET, YELLOW},
    trellis_config::validate::{self, Diagnostic, Severity, ValidationResult},
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print the effective configuration as JSON.
    Show,
}

pub fn handle_config(action: ConfigAction, app_dir: &Path, config: Option<&Path>) -> Result<()> {
    let path = config
        .map(Path::to_path_buf)
        .or_else(|| trellis_config::find_config_file(app_dir));
    match action {
        ConfigAction::Check { verbose } => check(path, verbose),
        ConfigAction::Show => {
            let config = match path {
                Some(path) => trellis_config::load_config(&path)?,
                None => trellis_config::AppConfig::default(),
            };
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        },
    }
}

/// Schema checks run on TOML. Other formats only get the parse check.
fn check_file(path: &Path) -> ValidationResult {
    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    if is_toml {
        return validate::validate(path);
    }
    let diagnostics = match trellis_config::load_config(path) {
        Ok(_) => Vec::new(),
        Err(e) => vec![Diagnostic {
            severity: Severity::Error,
            category: "syntax",
            path: String::new(),
            message: e.to_string(),
        }],
    };
    ValidationResult {
        diagnostics,
        config_path: Some(path.to_path_buf()),
    }
}

fn check(path: Option<PathBuf>, verbose: bool) -> Result<()> {
    let result = match path {
        Some(ref path) => check_file(path),
        None => validate::validate_toml_str(""),
    };

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
        shown += 1;
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}
