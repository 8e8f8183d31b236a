//! Collaborators the runner forwards hook results to.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};

use {
    anyhow::{Context, bail},
    async_trait::async_trait,
    serde_json::Value,
    tokio::{io::AsyncWriteExt, process::Command},
    tracing::{debug, info, warn},
    trellis_common::{BuildStats, FileChange, GeneratedFile},
    trellis_config::BundlerSettings,
    trellis_plugins::BundlerConfig,
};

// ── Bundler ─────────────────────────────────────────────────────────────────

/// The external bundler driven by the runner.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Prepare a compiler for `config`. Called once per run.
    async fn create_compiler(&self, config: &BundlerConfig) -> anyhow::Result<()>;

    /// Full compilation.
    async fn build(&self, config: &BundlerConfig) -> anyhow::Result<BuildStats>;

    /// Incremental compilation after `change`. Defaults to a full build.
    async fn rebuild(
        &self,
        config: &BundlerConfig,
        change: &FileChange,
    ) -> anyhow::Result<BuildStats> {
        debug!(path = %change.path.display(), "rebuild falls back to a full build");
        self.build(config).await
    }
}

/// Bundler driven through `bundler.build_command` / `bundler.rebuild_command`.
///
/// The bundler config is written as JSON to the command's stdin. A non-zero
/// exit is reported as a compilation with errors. When stdout is a JSON
/// object its `assets` array is read into the stats.
#[derive(Debug, Clone)]
pub struct ShellBundler {
    settings: BundlerSettings,
    app_dir: PathBuf,
}

impl ShellBundler {
    pub fn new(settings: BundlerSettings, app_dir: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            app_dir: app_dir.into(),
        }
    }

    async fn run(&self, command: &str, config: &BundlerConfig) -> anyhow::Result<BuildStats> {
        let payload = serde_json::to_string(config).context("failed to serialize bundler config")?;
        let start = Instant::now();

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.app_dir)
            .envs(&self.settings.env)
            .env("TRELLIS_MODE", config.mode.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn bundler command: {command}"))?;

        if let Some(mut stdin) = child.stdin.take()
            && let Err(e) = stdin.write_all(payload.as_bytes()).await
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(e.into());
        }

        let wait = child.wait_with_output();
        let output = match self.settings.timeout {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), wait)
                .await
                .with_context(|| format!("bundler timed out after {secs}s"))?,
            None => wait.await,
        }
        .context("bundler command failed to complete")?;

        let duration = start.elapsed();
        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let detail = match serde_json::from_str::<Value>(stdout.trim()) {
            Ok(value @ Value::Object(_)) => value,
            _ => serde_json::json!({ "stdout": stdout.trim() }),
        };
        let assets = detail
            .get("assets")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();

        let has_errors = exit_code != 0;
        if has_errors {
            warn!(exit_code, stderr = %stderr.trim(), "bundler reported errors");
        } else {
            info!(
                bundler = %self.settings.name,
                elapsed_ms = duration.as_millis(),
                "bundler finished"
            );
        }

        let mut detail = detail;
        if let Value::Object(map) = &mut detail {
            map.insert("exit_code".into(), exit_code.into());
            if !stderr.trim().is_empty() {
                map.insert("stderr".into(), stderr.trim().into());
            }
        }

        Ok(BuildStats {
            duration,
            has_errors,
            assets,
            detail,
        })
    }

    fn build_command(&self) -> anyhow::Result<&str> {
        match self.settings.build_command.as_deref() {
            Some(cmd) if !cmd.trim().is_empty() => Ok(cmd),
            _ => bail!("no bundler.build_command configured"),
        }
    }
}

#[async_trait]
impl Bundler for ShellBundler {
    async fn create_compiler(&self, config: &BundlerConfig) -> anyhow::Result<()> {
        self.build_command()?;
        debug!(
            bundler = %self.settings.name,
            entries = config.entries.len(),
            "compiler configured"
        );
        Ok(())
    }

    async fn build(&self, config: &BundlerConfig) -> anyhow::Result<BuildStats> {
        let command = self.build_command()?;
        self.run(command, config).await
    }

    async fn rebuild(
        &self,
        config: &BundlerConfig,
        change: &FileChange,
    ) -> anyhow::Result<BuildStats> {
        debug!(path = %change.path.display(), "rebuilding");
        let command = match self.settings.rebuild_command.as_deref() {
            Some(cmd) if !cmd.trim().is_empty() => cmd,
            _ => self.build_command()?,
        };
        self.run(command, config).await
    }
}

// ── File writer ─────────────────────────────────────────────────────────────

/// Destination of generated files.
#[async_trait]
pub trait FileWriter: Send + Sync {
    /// Returns how many files were actually written.
    async fn write(&self, files: &[GeneratedFile]) -> anyhow::Result<usize>;
}

/// Writes generated files to disk, creating parent directories. Relative
/// paths resolve against `root`. Files whose content is unchanged are left
/// alone so watchers do not see spurious changes.
#[derive(Debug, Clone)]
pub struct FsWriter {
    root: PathBuf,
}

impl FsWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn target(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl FileWriter for FsWriter {
    async fn write(&self, files: &[GeneratedFile]) -> anyhow::Result<usize> {
        let mut written = 0usize;
        for file in files {
            if file.encoding != "utf8" {
                return Err(trellis_common::Error::UnsupportedEncoding(file.encoding.clone()))
                    .with_context(|| format!("cannot write {}", file.path.display()));
            }
            let target = self.target(&file.path);
            if let Ok(existing) = tokio::fs::read_to_string(&target).await
                && existing == file.content
            {
                continue;
            }
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            tokio::fs::write(&target, &file.content)
                .await
                .with_context(|| format!("failed to write {}", target.display()))?;
            written += 1;
        }
        debug!(total = files.len(), written, "generated files written");
        Ok(written)
    }
}
