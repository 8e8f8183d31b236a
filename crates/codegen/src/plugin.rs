use std::path::{Path, PathBuf};

use {
    serde_json::{Map, Value},
    tracing::debug,
    trellis_common::{Entrypoint, GeneratedFile},
    trellis_plugins::{AppContext, BundlerConfig, Plugin, PluginApi, PluginDescriptor},
};

use crate::templates::{self, GlobalContextParams, IndexParams, ServerIndexParams};

pub const PLUGIN_NAME: &str = "trellis:runtime";

/// Generates the per-entry runtime files and points the bundler at them.
#[derive(Debug, Clone)]
pub struct RuntimeCodegen {
    descriptor: PluginDescriptor,
}

impl Default for RuntimeCodegen {
    fn default() -> Self {
        Self {
            descriptor: PluginDescriptor::new(PLUGIN_NAME),
        }
    }
}

impl Plugin for RuntimeCodegen {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn setup(&self, api: &mut PluginApi) -> anyhow::Result<()> {
        let ctx = api.context().clone();
        api.generate_files(move |mut files| {
            let ctx = ctx.clone();
            async move {
                files.extend(generate(&ctx));
                Ok(files)
            }
        });

        let ctx = api.context().clone();
        api.modify_bundler_config(move |config| {
            let ctx = ctx.clone();
            async move { Ok(point_entries(&ctx, config)) }
        });
        Ok(())
    }
}

fn entry_dir(ctx: &AppContext, entry: &Entrypoint) -> PathBuf {
    ctx.internal_dir().join(&entry.name)
}

fn resolve(ctx: &AppContext, path: &Path) -> PathBuf {
    ctx.app_dir().join(path)
}

/// Every file generated for the auto-mounted entrypoints of `ctx`.
pub fn generate(ctx: &AppContext) -> Vec<GeneratedFile> {
    let config = ctx.config();
    let meta_name = ctx.meta_name();
    let mut files = Vec::new();

    for entry in ctx.entrypoints().iter().filter(|e| e.is_auto_mount) {
        let dir = entry_dir(ctx, entry);
        let source = resolve(ctx, &entry.entry);
        let custom_bootstrap = entry.custom_bootstrap.as_ref().map(|p| resolve(ctx, p));
        let custom_server_entry = entry.custom_server_entry.as_ref().map(|p| resolve(ctx, p));

        files.push(GeneratedFile::utf8(
            dir.join(templates::ENTRY_POINT_FILE_NAME),
            templates::index(&IndexParams {
                meta_name,
                entry_name: &entry.name,
                entry: &source,
                custom_entry: entry.custom_entry,
                custom_bootstrap: custom_bootstrap.as_deref(),
                mount_id: &config.html.mount_id,
            }),
        ));

        if config.source.enable_async_entry {
            files.push(GeneratedFile::utf8(
                dir.join(templates::ENTRY_BOOTSTRAP_FILE_NAME),
                templates::bootstrap(&entry.name),
            ));
            if entry.ssr_mode.is_some() {
                files.push(GeneratedFile::utf8(
                    dir.join(templates::ENTRY_SERVER_BOOTSTRAP_FILE_NAME),
                    templates::server_bootstrap(),
                ));
            }
        }

        if let Some(mode) = entry.ssr_mode {
            files.push(GeneratedFile::utf8(
                dir.join(templates::SERVER_ENTRY_POINT_FILE_NAME),
                templates::server_index(&ServerIndexParams {
                    meta_name,
                    entry_name: &entry.name,
                    mode,
                    custom_server_entry: custom_server_entry.as_deref(),
                }),
            ));
        }

        files.push(GeneratedFile::utf8(
            dir.join(templates::ENTRY_POINT_REGISTER_FILE_NAME),
            templates::register(),
        ));
        files.push(GeneratedFile::utf8(
            dir.join(templates::ENTRY_POINT_RUNTIME_REGISTER_FILE_NAME),
            templates::runtime_register(meta_name, &entry.runtime_plugins),
        ));
        files.push(GeneratedFile::utf8(
            dir.join(templates::ENTRY_POINT_RUNTIME_GLOBAL_CONTEXT_FILE_NAME),
            templates::runtime_global_context(&GlobalContextParams {
                meta_name,
                entry_name: &entry.name,
                entry: &source,
                custom_entry: entry.custom_entry,
            }),
        ));

        debug!(entry = %entry.name, ssr = ?entry.ssr_mode, "generated entry files");
    }
    files
}

/// Route auto-mounted entries through their generated files. SSR entries
/// also get a server entry under `options.server_entries`.
pub fn point_entries(ctx: &AppContext, mut config: BundlerConfig) -> BundlerConfig {
    let async_entry = ctx.config().source.enable_async_entry;
    let mut server_entries = Map::new();

    for entry in ctx.entrypoints().iter().filter(|e| e.is_auto_mount) {
        let dir = entry_dir(ctx, entry);
        let client = match async_entry {
            true => templates::ENTRY_BOOTSTRAP_FILE_NAME,
            false => templates::ENTRY_POINT_FILE_NAME,
        };
        config.entries.insert(entry.name.clone(), dir.join(client));

        if entry.ssr_mode.is_some() {
            let server = match async_entry {
                true => templates::ENTRY_SERVER_BOOTSTRAP_FILE_NAME,
                false => templates::SERVER_ENTRY_POINT_FILE_NAME,
            };
            server_entries.insert(
                entry.name.clone(),
                Value::String(dir.join(server).to_string_lossy().into_owned()),
            );
        }
    }

    if !server_entries.is_empty() {
        if !config.options.is_object() {
            config.options = Value::Object(Map::new());
        }
        if let Value::Object(options) = &mut config.options {
            options.insert("server_entries".into(), Value::Object(server_entries));
        }
    }
    config
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        rstest::rstest,
        trellis_common::{Command, SsrMode},
        trellis_config::AppConfig,
        trellis_plugins::{AppPaths, Hook},
    };

    use super::*;

    fn ctx(async_entry: bool, entries: Vec<Entrypoint>) -> AppContext {
        let mut config = AppConfig::default();
        config.source.enable_async_entry = async_entry;
        let ctx = AppContext::new(AppPaths::new("/app"), Command::Build, config);
        ctx.set_entrypoints(entries).unwrap();
        ctx
    }

    fn ssr_entry(name: &str, mode: Option<SsrMode>) -> Entrypoint {
        Entrypoint {
            ssr_mode: mode,
            ..Entrypoint::new(name, "src/App.tsx")
        }
    }

    fn names(files: &[GeneratedFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| {
                f.path
                    .strip_prefix("/app/node_modules/.trellis")
                    .unwrap()
                    .display()
                    .to_string()
            })
            .collect()
    }

    #[rstest]
    #[case::csr(false, None, &["main/index.jsx", "main/register.js", "main/runtime-register.js", "main/runtime-global-context.js"])]
    #[case::ssr(false, Some(SsrMode::String), &["main/index.jsx", "main/index.server.jsx", "main/register.js", "main/runtime-register.js", "main/runtime-global-context.js"])]
    #[case::async_csr(true, None, &["main/index.jsx", "main/bootstrap.jsx", "main/register.js", "main/runtime-register.js", "main/runtime-global-context.js"])]
    #[case::async_ssr(true, Some(SsrMode::Stream), &["main/index.jsx", "main/bootstrap.jsx", "main/bootstrap.server.jsx", "main/index.server.jsx", "main/register.js", "main/runtime-register.js", "main/runtime-global-context.js"])]
    fn files_follow_ssr_and_async_settings(
        #[case] async_entry: bool,
        #[case] mode: Option<SsrMode>,
        #[case] expected: &[&str],
    ) {
        let files = generate(&ctx(async_entry, vec![ssr_entry("main", mode)]));
        assert_eq!(names(&files), expected);
        assert!(files.iter().all(|f| f.encoding == "utf8"));
    }

    #[test]
    fn entries_without_auto_mount_generate_nothing() {
        let manual = Entrypoint {
            is_auto_mount: false,
            ..Entrypoint::new("legacy", "src/legacy.tsx")
        };
        assert!(generate(&ctx(false, vec![manual])).is_empty());
    }

    #[test]
    fn bundler_entries_point_at_generated_files() {
        let ctx = ctx(true, vec![
            ssr_entry("main", Some(SsrMode::String)),
            Entrypoint {
                is_auto_mount: false,
                ..Entrypoint::new("legacy", "src/legacy.tsx")
            },
        ]);
        let config = point_entries(&ctx, BundlerConfig::for_context(&ctx));

        assert_eq!(
            config.entries["main"],
            PathBuf::from("/app/node_modules/.trellis/main/bootstrap.jsx")
        );
        assert_eq!(config.entries["legacy"], PathBuf::from("/app/src/legacy.tsx"));
        assert_eq!(
            config.options["server_entries"]["main"],
            "/app/node_modules/.trellis/main/bootstrap.server.jsx"
        );
    }

    #[tokio::test]
    async fn plugin_taps_both_hooks() {
        let ctx = ctx(false, vec![ssr_entry("main", None)]);
        let mut api = PluginApi::new(ctx);
        api.apply(&RuntimeCodegen::default()).unwrap();
        let hooks = api.into_hooks();

        assert_eq!(hooks.generate_files.plugins(), vec![PLUGIN_NAME]);
        assert_eq!(hooks.modify_bundler_config.plugins(), vec![PLUGIN_NAME]);
        let files = hooks.generate_files.call(Vec::new()).await.unwrap();
        assert_eq!(files.len(), 4);
    }
}
