//! Test fixtures: canned entries and wiring helpers.

use std::sync::Arc;

use atrium_core::{AppDescriptor, RawExports};
use atrium_sandbox::{ScriptRegistry, script_module};

use crate::mocks::{ScriptedApp, StaticFetcher};

/// Base address every fixture entry lives under.
pub const CDN: &str = "https://cdn.example.com";

/// Entry locator for a fixture app.
#[must_use]
pub fn entry_url(name: &str) -> String {
    format!("{CDN}/{name}/index.html")
}

/// Address of a fixture app's entry script.
#[must_use]
pub fn script_url(name: &str) -> String {
    format!("{CDN}/{name}/main.js")
}

/// Address of a fixture app's stylesheet.
#[must_use]
pub fn style_url(name: &str) -> String {
    format!("{CDN}/{name}/theme.css")
}

/// Entry markup with one stylesheet and one flagged entry script.
#[must_use]
pub fn entry_markup(name: &str) -> String {
    format!(
        concat!(
            "<html><head><link rel=\"stylesheet\" href=\"theme.css\"></head>",
            "<body><div id=\"{name}-root\"></div>",
            "<script src=\"main.js\" entry></script></body></html>"
        ),
        name = name
    )
}

/// Serve a complete fixture app (markup, stylesheet, script body) from
/// `fetcher` and return its entry locator.
#[must_use]
pub fn serve_app(fetcher: &Arc<StaticFetcher>, name: &str) -> String {
    fetcher.set(entry_url(name), entry_markup(name));
    fetcher.set(style_url(name), format!("#{name}-root {{ margin: 0; }}"));
    fetcher.set(script_url(name), format!("boot('{name}');"));
    entry_url(name)
}

/// Register a module under `id` that yields `exports` when executed.
pub fn register_exports(scripts: &ScriptRegistry, id: impl Into<String>, exports: RawExports) {
    scripts.register(
        id,
        script_module(move |_sandbox| Ok(Some(exports.clone()))),
    );
}

/// Serve a fixture app and bind a [`ScriptedApp`]'s lifecycles to its entry
/// script. Returns the descriptor to register.
#[must_use]
pub fn install_app(
    fetcher: &Arc<StaticFetcher>,
    scripts: &ScriptRegistry,
    app: &ScriptedApp,
    name: &str,
    container: &str,
    rule: &str,
) -> AppDescriptor {
    let entry = serve_app(fetcher, name);
    register_exports(scripts, script_url(name), app.exports());
    AppDescriptor::new(name, entry.as_str(), container, rule)
}
