//! Plugins declared in config whose hook implementations are shell commands.
//!
//! Each command runs under `sh -c` with the hook payload as JSON on stdin:
//!
//! - Exit 0, no stdout → continue
//! - Exit 0, stdout JSON `{"action": "modify", "data": {...}}` → on `modify_config`
//!   the data is deep-merged into the config; on `add_watch_files` the data is
//!   an array of extra paths; elsewhere it is ignored
//! - Non-zero exit → the tap fails with stderr as reason
//! - Timeout → the tap fails

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    futures::future::BoxFuture,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tokio::{io::AsyncWriteExt, process::Command},
    tracing::{debug, warn},
    trellis_common::{BuildStats, FileChange},
    trellis_config::ShellPluginConfig,
};

use crate::{
    api::{BundlerConfig, DevCompileDone, PluginApi},
    plugin::{Plugin, PluginDescriptor},
};

/// Response format expected from shell commands on stdout.
#[derive(Debug, Deserialize, Serialize)]
struct ShellResponse {
    action: String,
    #[serde(default)]
    data: Option<Value>,
}

/// What a shell command asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellOutcome {
    Continue,
    Modify(Value),
}

/// One hook implementation backed by an external command.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    plugin: String,
    hook: String,
    command: String,
    timeout: Duration,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
}

impl ShellCommand {
    pub fn new(
        plugin: impl Into<String>,
        hook: impl Into<String>,
        command: impl Into<String>,
        timeout: Duration,
        env: HashMap<String, String>,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            hook: hook.into(),
            command: command.into(),
            timeout,
            env,
            cwd: None,
        }
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub async fn run(&self, payload: &Value) -> Result<ShellOutcome> {
        let payload_json =
            serde_json::to_string(payload).context("failed to serialize hook payload")?;

        debug!(
            plugin = %self.plugin,
            hook = %self.hook,
            command = %self.command,
            payload_len = payload_json.len(),
            "spawning shell command"
        );

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.command)
            .envs(&self.env)
            .env("TRELLIS_PLUGIN", &self.plugin)
            .env("TRELLIS_HOOK", &self.hook)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn command: {}", self.command))?;

        // The child may exit without reading stdin.
        if let Some(mut stdin) = child.stdin.take()
            && let Err(e) = stdin.write_all(payload_json.as_bytes()).await
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(e.into());
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .with_context(|| format!("command timed out after {:?}", self.timeout))?
            .context("command failed to complete")?;

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        debug!(
            plugin = %self.plugin,
            hook = %self.hook,
            exit_code,
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "shell command completed"
        );

        if exit_code != 0 {
            match stderr.trim() {
                "" => bail!("command exited with code {exit_code}"),
                reason => bail!("{reason}"),
            }
        }

        let stdout_trimmed = stdout.trim();
        if stdout_trimmed.is_empty() {
            return Ok(ShellOutcome::Continue);
        }

        match serde_json::from_str::<ShellResponse>(stdout_trimmed) {
            Ok(resp) if resp.action == "modify" => match resp.data {
                Some(data) => Ok(ShellOutcome::Modify(data)),
                None => {
                    warn!(plugin = %self.plugin, hook = %self.hook, "modify action without data, continuing");
                    Ok(ShellOutcome::Continue)
                },
            },
            Ok(_) => Ok(ShellOutcome::Continue),
            Err(e) => {
                warn!(
                    plugin = %self.plugin,
                    hook = %self.hook,
                    error = %e,
                    "stdout is not a JSON response, continuing"
                );
                Ok(ShellOutcome::Continue)
            },
        }
    }
}

/// Notification-style tap: payload out, outcome ignored.
fn notifier<P>(cmd: ShellCommand) -> impl Fn(P) -> BoxFuture<'static, Result<()>> + Send + Sync
where
    P: Serialize + Send + 'static,
{
    move |payload: P| {
        let cmd = cmd.clone();
        Box::pin(async move {
            let value = serde_json::to_value(&payload)?;
            cmd.run(&value).await.map(drop)
        })
    }
}

/// A `[[plugins]]` entry from the app config.
#[derive(Debug, Clone)]
pub struct ShellPlugin {
    descriptor: PluginDescriptor,
    config: ShellPluginConfig,
}

impl ShellPlugin {
    pub fn from_config(config: &ShellPluginConfig) -> Self {
        Self {
            descriptor: PluginDescriptor {
                name: config.name.clone(),
                pre: config.pre.clone(),
                post: config.post.clone(),
                required: Vec::new(),
                rivals: config.rivals.clone(),
            },
            config: config.clone(),
        }
    }

    fn command(&self, hook: &str, command: &str, cwd: &Path) -> ShellCommand {
        ShellCommand::new(
            self.config.name.clone(),
            hook,
            command,
            Duration::from_secs(self.config.timeout),
            self.config.env.clone(),
        )
        .current_dir(cwd)
    }
}

impl Plugin for ShellPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn setup(&self, api: &mut PluginApi) -> Result<()> {
        let cwd = api.context().app_dir().to_path_buf();
        for (hook, command) in &self.config.hooks {
            let cmd = self.command(hook, command, &cwd);
            match hook.as_str() {
                "modify_config" => {
                    api.modify_config(move |config| {
                        let cmd = cmd.clone();
                        async move {
                            let payload = serde_json::to_value(&config)?;
                            match cmd.run(&payload).await? {
                                ShellOutcome::Modify(patch) => Ok(config.merged(patch)?),
                                ShellOutcome::Continue => Ok(config),
                            }
                        }
                    });
                },
                "add_watch_files" => {
                    api.add_watch_files(move |()| {
                        let cmd = cmd.clone();
                        async move {
                            match cmd.run(&Value::Null).await? {
                                ShellOutcome::Modify(paths) => {
                                    serde_json::from_value::<Vec<PathBuf>>(paths)
                                        .context("watch files must be an array of paths")
                                },
                                ShellOutcome::Continue => Ok(Vec::new()),
                            }
                        }
                    });
                },
                "on_prepare" => {
                    api.on_prepare(move |ctx| {
                        let cmd = cmd.clone();
                        async move { cmd.run(&ctx.snapshot()).await.map(drop) }
                    });
                },
                "on_before_create_compiler" => {
                    api.on_before_create_compiler(notifier::<BundlerConfig>(cmd));
                },
                "on_after_create_compiler" => {
                    api.on_after_create_compiler(notifier::<BundlerConfig>(cmd));
                },
                "on_before_build" => {
                    api.on_before_build(notifier::<BundlerConfig>(cmd));
                },
                "on_after_build" => {
                    api.on_after_build(notifier::<BuildStats>(cmd));
                },
                "on_before_dev" => {
                    api.on_before_dev(notifier::<()>(cmd));
                },
                "on_dev_compile_done" => {
                    api.on_dev_compile_done(notifier::<DevCompileDone>(cmd));
                },
                "on_file_changed" => {
                    api.on_file_changed(notifier::<FileChange>(cmd));
                },
                "on_after_dev" => {
                    api.on_after_dev(notifier::<()>(cmd));
                },
                "on_before_exit" => {
                    api.on_before_exit(notifier::<()>(cmd));
                },
                other => bail!("hook `{other}` cannot be implemented by a shell command"),
            }
            debug!(plugin = %self.config.name, hook = %hook, "registered shell command");
        }
        Ok(())
    }
}
