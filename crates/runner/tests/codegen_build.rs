#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use {
    async_trait::async_trait,
    tokio_util::sync::CancellationToken,
    trellis_codegen::RuntimeCodegen,
    trellis_common::{BuildStats, Command, RuntimePlugin},
    trellis_config::AppConfig,
    trellis_plugins::{AppContext, AppPaths, BundlerConfig, Plugin, define_plugin},
    trellis_runner::{Bundler, FsWriter, RunSummary, Runner, RunnerOptions},
};

#[derive(Default)]
struct CapturingBundler {
    seen: Mutex<Option<BundlerConfig>>,
}

#[async_trait]
impl Bundler for CapturingBundler {
    async fn create_compiler(&self, config: &BundlerConfig) -> anyhow::Result<()> {
        *self.seen.lock().unwrap() = Some(config.clone());
        Ok(())
    }

    async fn build(&self, _config: &BundlerConfig) -> anyhow::Result<BuildStats> {
        Ok(BuildStats::default())
    }
}

fn stream_ssr_config() -> AppConfig {
    toml::from_str(
        r#"
        [server]
        ssr = { mode = "stream" }

        [html]
        mount_id = "app"
        "#,
    )
    .unwrap()
}

async fn build(
    dir: &Path,
    config: AppConfig,
    mut plugins: Vec<Arc<dyn Plugin>>,
    bundler: Arc<CapturingBundler>,
) -> (AppContext, RunSummary) {
    plugins.insert(0, Arc::new(RuntimeCodegen::default()));
    let runner = Runner::new(
        RunnerOptions {
            paths: AppPaths::new(dir),
            command: Command::Build,
            config,
        },
        plugins,
        bundler as Arc<dyn Bundler>,
        Arc::new(FsWriter::new(dir)),
    )
    .unwrap();
    let ctx = runner.context().clone();
    let summary = runner.run(CancellationToken::new()).await.unwrap();
    (ctx, summary)
}

#[tokio::test]
async fn build_writes_entry_files_and_routes_the_bundler_through_them() {
    let dir = tempfile::tempdir().unwrap();
    let bundler = Arc::new(CapturingBundler::default());
    let (_, summary) = build(
        dir.path(),
        stream_ssr_config(),
        Vec::new(),
        Arc::clone(&bundler),
    )
    .await;
    assert_eq!(summary.files_generated, 5);
    assert_eq!(summary.files_written, 5);

    let main = dir.path().join("node_modules/.trellis/main");
    let index = std::fs::read_to_string(main.join("index.jsx")).unwrap();
    assert!(index.contains("const ID = \"app\";"));
    let server = std::fs::read_to_string(main.join("index.server.jsx")).unwrap();
    assert!(server.contains("mode: 'stream'"));

    let seen = bundler.seen.lock().unwrap().clone().unwrap();
    assert_eq!(seen.entries["main"], main.join("index.jsx"));
    assert_eq!(
        seen.options["server_entries"]["main"],
        main.join("index.server.jsx").to_string_lossy().as_ref()
    );
}

#[tokio::test]
async fn second_build_leaves_unchanged_files_alone() {
    let dir = tempfile::tempdir().unwrap();
    build(
        dir.path(),
        stream_ssr_config(),
        Vec::new(),
        Arc::default(),
    )
    .await;

    let (_, summary) = build(
        dir.path(),
        stream_ssr_config(),
        Vec::new(),
        Arc::default(),
    )
    .await;
    assert_eq!(summary.files_generated, 5);
    assert_eq!(summary.files_written, 0);
}

#[tokio::test]
async fn runtime_plugins_reach_the_entrypoint_and_the_register_file() {
    let dir = tempfile::tempdir().unwrap();
    let router: Arc<dyn Plugin> = Arc::new(define_plugin("router").setup(|api| {
        api.internal_runtime_plugins(|mut input| async move {
            input.plugins.push(RuntimePlugin {
                name: "router".into(),
                path: "@trellis/plugin-router".into(),
                config: serde_json::json!({"basename": "/"}),
            });
            Ok(input)
        });
        Ok(())
    }));

    let (ctx, _) = build(
        dir.path(),
        AppConfig::default(),
        vec![router],
        Arc::default(),
    )
    .await;

    let names: Vec<_> = ctx.entrypoints()[0]
        .runtime_plugins
        .iter()
        .map(|p| p.name.clone())
        .collect();
    assert_eq!(names, vec!["router"]);

    let register = std::fs::read_to_string(
        dir.path()
            .join("node_modules/.trellis/main/runtime-register.js"),
    )
    .unwrap();
    assert!(register.contains("import plugin_0 from \"@trellis/plugin-router\";"));
    assert!(register.contains(r#"registerPlugin(plugin_0({"basename":"/"}));"#));
}
