//! Source templates for the files generated per entrypoint.

use std::path::Path;

use trellis_common::{RuntimePlugin, SsrMode};

pub const ENTRY_POINT_FILE_NAME: &str = "index.jsx";
pub const ENTRY_BOOTSTRAP_FILE_NAME: &str = "bootstrap.jsx";
pub const ENTRY_SERVER_BOOTSTRAP_FILE_NAME: &str = "bootstrap.server.jsx";
pub const SERVER_ENTRY_POINT_FILE_NAME: &str = "index.server.jsx";
pub const ENTRY_POINT_REGISTER_FILE_NAME: &str = "register.js";
pub const ENTRY_POINT_RUNTIME_REGISTER_FILE_NAME: &str = "runtime-register.js";
pub const ENTRY_POINT_RUNTIME_GLOBAL_CONTEXT_FILE_NAME: &str = "runtime-global-context.js";

/// Quote `s` as a JavaScript string literal.
fn js_str(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

fn js_path(path: &Path) -> String {
    js_str(&path.to_string_lossy())
}

pub struct IndexParams<'a> {
    pub meta_name: &'a str,
    pub entry_name: &'a str,
    pub entry: &'a Path,
    pub custom_entry: bool,
    pub custom_bootstrap: Option<&'a Path>,
    pub mount_id: &'a str,
}

/// Client entry: registers the runtime and mounts the app.
pub fn index(p: &IndexParams<'_>) -> String {
    if p.custom_entry {
        return format!(
            "import './{ENTRY_POINT_REGISTER_FILE_NAME}';\nimport {entry};\n",
            entry = js_path(p.entry),
        );
    }

    let mount = match p.custom_bootstrap {
        Some(bootstrap) => format!(
            "import customBootstrap from {path};\n\ncustomBootstrap(mount);\n",
            path = js_path(bootstrap),
        ),
        None => "mount();\n".to_string(),
    };

    format!(
        r#"import './{register}';
import {{ createElement }} from 'react';
import {{ createRoot }} from 'react-dom/client';
import {{ getGlobalApp }} from '@{meta}/runtime/context';

const ID = {mount_id};

function mount(id = ID) {{
  const container = document.getElementById(id || ID);
  if (!container) {{
    throw new Error(`[{entry_name}] mount point #${{id}} not found`);
  }}
  createRoot(container).render(createElement(getGlobalApp()));
}}

{mount}"#,
        register = ENTRY_POINT_REGISTER_FILE_NAME,
        meta = p.meta_name,
        mount_id = js_str(p.mount_id),
        entry_name = p.entry_name,
    )
}

/// Async entry: defers the real index to a separate chunk.
pub fn bootstrap(entry_name: &str) -> String {
    let index = ENTRY_POINT_FILE_NAME.trim_end_matches(".jsx");
    format!("import(/* webpackChunkName: \"async-{entry_name}\" */ './{index}');\n")
}

pub fn server_bootstrap() -> String {
    let index = SERVER_ENTRY_POINT_FILE_NAME.trim_end_matches(".jsx");
    format!("export const requestHandler = import('./{index}').then((m) => m.requestHandler);\n")
}

pub struct ServerIndexParams<'a> {
    pub meta_name: &'a str,
    pub entry_name: &'a str,
    pub mode: SsrMode,
    pub custom_server_entry: Option<&'a Path>,
}

/// Server entry exporting the request handler for the chosen SSR mode.
pub fn server_index(p: &ServerIndexParams<'_>) -> String {
    if let Some(custom) = p.custom_server_entry {
        return format!(
            "import './{register}';\n\nexport {{ requestHandler }} from {path};\n",
            register = ENTRY_POINT_REGISTER_FILE_NAME,
            path = js_path(custom),
        );
    }
    format!(
        r#"import './{register}';
import {{ createRequestHandler }} from '@{meta}/runtime/ssr/server';
import {{ getGlobalApp }} from '@{meta}/runtime/context';

export const requestHandler = createRequestHandler(getGlobalApp, {{
  entryName: {entry_name},
  mode: '{mode}',
}});
"#,
        register = ENTRY_POINT_REGISTER_FILE_NAME,
        meta = p.meta_name,
        entry_name = js_str(p.entry_name),
        mode = p.mode,
    )
}

pub fn register() -> String {
    format!(
        "import './{ENTRY_POINT_RUNTIME_REGISTER_FILE_NAME}';\nimport './{ENTRY_POINT_RUNTIME_GLOBAL_CONTEXT_FILE_NAME}';\n"
    )
}

/// Registers every runtime plugin with its config.
pub fn runtime_register(meta_name: &str, plugins: &[RuntimePlugin]) -> String {
    let mut imports = format!("import {{ registerPlugin }} from '@{meta_name}/runtime/plugin';\n");
    let mut calls = String::new();
    for (i, plugin) in plugins.iter().enumerate() {
        imports.push_str(&format!(
            "import plugin_{i} from {path};\n",
            path = js_str(&plugin.path)
        ));
        calls.push_str(&format!("registerPlugin(plugin_{i}({}));\n", plugin.config));
    }
    format!("{imports}\n{calls}")
}

pub struct GlobalContextParams<'a> {
    pub meta_name: &'a str,
    pub entry_name: &'a str,
    pub entry: &'a Path,
    pub custom_entry: bool,
}

pub fn runtime_global_context(p: &GlobalContextParams<'_>) -> String {
    let (app_import, app) = if p.custom_entry {
        (String::new(), "undefined")
    } else {
        (format!("import App from {};\n", js_path(p.entry)), "App")
    };
    format!(
        r#"import {{ setGlobalContext }} from '@{meta}/runtime/context';
{app_import}
setGlobalContext({{
  entryName: {entry_name},
  App: {app},
}});
"#,
        meta = p.meta_name,
        entry_name = js_str(p.entry_name),
    )
}
