//! Demo pages standing in for the application's drives, media and tasks screens.

use std::time::Duration;

use anyhow::{bail, Result};
use view_core::{Component, ComponentRef, Resolved, Router, ViewTree};

const FETCH_DELAY: Duration = Duration::from_millis(25);

/// Rendered body of a demo page.
#[derive(Debug, Clone)]
pub struct Page {
    pub heading: String,
    pub lines: Vec<String>,
}

fn page(heading: impl Into<String>, lines: Vec<String>) -> Component {
    Component::new(Page {
        heading: heading.into(),
        lines,
    })
}

async fn fetch_listing(folder: String) -> Result<Component> {
    tokio::time::sleep(FETCH_DELAY).await;
    let lines = (1..=3).map(|n| format!("{folder}/file-{n}.txt")).collect();
    Ok(page(format!("Folder {folder}"), lines))
}

async fn fetch_media(id: u64) -> Result<Component> {
    tokio::time::sleep(FETCH_DELAY).await;
    if id == 0 {
        bail!("media item {id} is unavailable");
    }
    Ok(page(format!("Media #{id}"), vec![format!("poster-{id}.jpg")]))
}

async fn fetch_board() -> Result<Component> {
    tokio::time::sleep(FETCH_DELAY).await;
    Ok(page(
        "Tasks",
        vec!["todo: 3".into(), "doing: 1".into(), "done: 8".into()],
    ))
}

/// Builds the root router and every nested router under it.
pub fn build(tree: &ViewTree) -> Result<Router> {
    let root = tree.router("/");

    root.route(
        "/",
        Resolved::new("Home", ComponentRef::ready(page("Home", Vec::new()))),
    )?;

    let drive = tree.router("/");
    drive.register("/:folder", |params| {
        let folder = params.get("folder").unwrap_or_default().to_string();
        let title = folder.clone();
        Ok(Some(Resolved::new(
            title,
            ComponentRef::lazy(move || fetch_listing(folder.clone())),
        )))
    })?;
    root.route(
        "/drive",
        Resolved::new("Drive", ComponentRef::ready(page("Drive", Vec::new()))).with_child(drive),
    )?;

    root.register("/media/:id", |params| {
        // Non-numeric ids are not media routes at all.
        let Some(id) = params.get("id").and_then(|raw| raw.parse::<u64>().ok()) else {
            return Ok(None);
        };
        Ok(Some(Resolved::new(
            format!("Media {id}"),
            ComponentRef::lazy(move || fetch_media(id)),
        )))
    })?;

    let tasks = tree.router("/");
    tasks.register("/:task", |params| {
        let task = params.get("task").unwrap_or_default().to_string();
        Ok(Some(Resolved::new(
            format!("Task {task}"),
            ComponentRef::ready(page(format!("Task {task}"), Vec::new())),
        )))
    })?;
    root.route(
        "/tasks",
        Resolved::new("Tasks", ComponentRef::lazy(fetch_board)).with_child(tasks),
    )?;

    Ok(root)
}
