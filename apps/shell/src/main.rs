use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use shared::error::ShellError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use view_core::{
    load_settings, Location, LocationSource, MemoryHistory, Navigation, NavigationError, Navigator, Router,
    SubView, ViewNode, ViewTree,
};

mod pages;

use pages::Page;

const DEFAULT_TOUR: &[&str] = &[
    "/drive",
    "/drive/reports",
    "/media/7",
    "/media/0",
    "/media/not-a-number",
    "/tasks/12",
    "back",
    "/drive/reports",
];

/// Replays navigations against the demo view tree and prints what is on screen.
#[derive(Parser, Debug)]
struct Args {
    /// Settings file; `shell.toml` is used when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Emit one JSON snapshot per step instead of text.
    #[arg(long)]
    json: bool,
    /// Paths to visit in order. `back` and `forward` step through history.
    paths: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Snapshot {
    step: String,
    location: Option<Location>,
    chain: Vec<SubView>,
    mounted: Vec<SubView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ShellError>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = load_settings(args.config.as_deref())?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(mode = ?settings.presence_mode, retention = ?settings.max_hidden_nodes, "shell starting");
    let tree = ViewTree::new(settings);
    let root = pages::build(&tree)?;
    root.on_sub_views_change(|views| info!(count = views.len(), "root sub views changed"));

    let steps = if args.paths.is_empty() {
        DEFAULT_TOUR.iter().map(|step| step.to_string()).collect()
    } else {
        args.paths.clone()
    };

    // Loader futures hold `Rc` handles, so loads run on a local task set.
    let local = tokio::task::LocalSet::new();
    local
        .run_until(run(root, steps, args.json))
        .await
}

async fn run(root: Router, steps: Vec<String>, json: bool) -> Result<()> {
    let mut navigator = Navigator::new(root, MemoryHistory::new(Location::new("/")));
    let initial = navigator.sync();
    report(&navigator, "initial", initial.map(Option::unwrap_or_default), json).await?;

    for step in steps {
        let outcome = match step.as_str() {
            "back" => navigator.back().map(Option::unwrap_or_default),
            "forward" => navigator.forward().map(Option::unwrap_or_default),
            href => navigator.navigate(href),
        };
        report(&navigator, &step, outcome, json).await?;
    }
    Ok(())
}

async fn report(
    navigator: &Navigator<MemoryHistory>,
    step: &str,
    outcome: Result<Navigation, NavigationError>,
    json: bool,
) -> Result<()> {
    let error = match outcome {
        Ok(_) => {
            load_chain(navigator.root()).await;
            None
        }
        Err(err) => {
            warn!(step, error = %err, "navigation failed");
            Some(ShellError::from(&err))
        }
    };

    let root = navigator.root();
    finish_animations(root);
    let snapshot = Snapshot {
        step: step.to_string(),
        location: navigator.source().current(),
        chain: root
            .current_chain()
            .iter()
            .filter_map(ViewNode::sub_view)
            .collect(),
        mounted: root.sub_views(),
        error,
    };

    if json {
        println!("{}", serde_json::to_string(&snapshot)?);
    } else {
        print_text(&root.current_chain(), &snapshot);
    }
    Ok(())
}

/// Pulls every unloaded node on the visible chain in parallel.
async fn load_chain(root: &Router) {
    let pending: Vec<_> = root
        .current_chain()
        .into_iter()
        .filter(|node| !node.is_loaded())
        .map(|node| tokio::task::spawn_local(node.load()))
        .collect();

    // Loader failures are reported by the node itself.
    for handle in pending {
        if let Err(err) = handle.await {
            warn!(error = %err, "load task aborted");
        }
    }
}

/// Plays the part of the render boundary: every phase started by the navigation ends now.
/// A no-op in immediate mode.
fn finish_animations(router: &Router) {
    for node in router.active_children() {
        if let Some(child) = node.child_router() {
            finish_animations(&child);
        }
        node.animation_end();
    }
}

fn print_text(chain: &[ViewNode], snapshot: &Snapshot) {
    let href = snapshot
        .location
        .as_ref()
        .map(Location::href)
        .unwrap_or_default();
    println!("[{}] {}", snapshot.step, href);
    if let Some(error) = &snapshot.error {
        println!("  ! {:?}: {}", error.code, error.message);
    }

    for (depth, node) in chain.iter().enumerate() {
        let indent = "  ".repeat(depth + 1);
        let title = node.title().unwrap_or_default();
        match (node.component(), node.load_error()) {
            (Some(component), _) => match component.downcast_ref::<Page>() {
                Some(page) => {
                    println!("{indent}{title}: {}", page.heading);
                    for line in &page.lines {
                        println!("{indent}  - {line}");
                    }
                }
                None => println!("{indent}{title}"),
            },
            (None, Some(err)) => println!("{indent}{title}: failed ({err})"),
            (None, None) => println!("{indent}{title}: loading"),
        }
    }

    let mounted: Vec<_> = snapshot.mounted.iter().map(|view| view.title.as_str()).collect();
    println!("  mounted at root: {}", mounted.join(", "));
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
