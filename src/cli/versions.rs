// src/cli/versions.rs — `versions`, `show`, and `render` commands

use crate::infra::config::Config;
use crate::render::{Context, Renderer};
use crate::store::VersionStore;

pub fn run_versions(config: &Config, id: &str) -> anyhow::Result<()> {
    let store = VersionStore::open(&config.store.dir)?;
    let versions = store.list_versions(id)?;
    if versions.is_empty() {
        eprintln!("No saved versions of '{id}'.");
        return Ok(());
    }
    for v in versions {
        println!("{v}");
    }
    Ok(())
}

pub fn run_show(config: &Config, id: &str, version: Option<u32>) -> anyhow::Result<()> {
    let store = VersionStore::open(&config.store.dir)?;
    let text = match version {
        Some(v) => store.get_version(id, v)?,
        None => {
            let draft = store.latest(id)?;
            if draft.is_seed() {
                eprintln!("'{id}' has no saved versions; showing the default template.");
            }
            draft.text
        }
    };
    println!("{text}");
    Ok(())
}

pub fn run_render(
    config: &Config,
    id: &str,
    version: Option<u32>,
    context: &Context,
) -> anyhow::Result<()> {
    let store = VersionStore::open(&config.store.dir)?;
    let renderer = Renderer::new(config.render.undefined);
    let rendered = renderer.render_stored(&store, id, version, context)?;
    println!("{rendered}");
    Ok(())
}
