//! `trellis plugins`: the resolved plugin order and what each plugin taps.

use {
    anyhow::Result,
    trellis_common::Command,
    trellis_plugins::{AppContext, HookSummary, PluginApi, resolve_order},
};

use crate::{
    project::Project,
    term::{BOLD, CYAN, RED, RESET},
};

pub fn handle_plugins(project: &Project, json: bool) -> Result<()> {
    let order = match resolve_order(&project.plugins()) {
        Ok(order) => order,
        Err(e) => {
            eprintln!("{BOLD}{RED}error{RESET} {e}");
            std::process::exit(1);
        },
    };

    let ctx = AppContext::new(project.paths.clone(), Command::Build, project.config.clone());
    let mut api = PluginApi::new(ctx);
    for plugin in &order {
        api.apply(plugin.as_ref())?;
    }
    let hooks = api.into_hooks().describe();

    if json {
        let plugins: Vec<_> = order
            .iter()
            .map(|p| {
                serde_json::json!({
                    "descriptor": p.descriptor(),
                    "hooks": tapped_by(&hooks, p.name()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&plugins)?);
        return Ok(());
    }

    if let Some(path) = project.config_file() {
        eprintln!("Using {}\n", path.display());
    }
    for (i, plugin) in order.iter().enumerate() {
        let d = plugin.descriptor();
        println!("  {BOLD}{}.{RESET} {}", i + 1, d.name);
        for (label, names) in [
            ("pre", &d.pre),
            ("post", &d.post),
            ("required", &d.required),
            ("rivals", &d.rivals),
        ] {
            if !names.is_empty() {
                println!("     {CYAN}{label}{RESET}: {}", names.join(", "));
            }
        }
        let tapped = tapped_by(&hooks, &d.name);
        if !tapped.is_empty() {
            println!("     {CYAN}hooks{RESET}: {}", tapped.join(", "));
        }
    }
    Ok(())
}

fn tapped_by(hooks: &[HookSummary], plugin: &str) -> Vec<&'static str> {
    hooks
        .iter()
        .filter(|h| h.plugins.iter().any(|p| p == plugin))
        .map(|h| h.name)
        .collect()
}
