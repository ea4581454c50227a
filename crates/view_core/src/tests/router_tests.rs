use super::*;
use std::cell::{Cell, RefCell};

use shared::domain::PresenceState;

use crate::config::ShellSettings;

fn tree_with(mode: PresenceMode) -> ViewTree {
    ViewTree::new(ShellSettings {
        presence_mode: mode,
        ..ShellSettings::default()
    })
}

fn counted(
    title: &'static str,
    calls: &Rc<Cell<u32>>,
) -> impl Fn(&RouteParams) -> anyhow::Result<Option<Resolved>> + 'static {
    let calls = Rc::clone(calls);
    move |_| {
        calls.set(calls.get() + 1);
        Ok(Some(Resolved::new(title, ComponentRef::ready(title))))
    }
}

fn page(title: &'static str) -> Resolved {
    Resolved::new(title, ComponentRef::ready(title))
}

fn at(path: &str) -> Location {
    Location::new(path)
}

fn titles(router: &Router) -> Vec<String> {
    router
        .current_chain()
        .iter()
        .filter_map(ViewNode::title)
        .collect()
}

#[test]
fn resolves_once_per_concrete_path() {
    let tree = tree_with(PresenceMode::Immediate);
    let root = tree.router("/");
    let calls = Rc::new(Cell::new(0));
    root.register("/a", counted("a", &calls)).expect("register");

    let first = root.start(&at("/a")).expect("first");
    let second = root.start(&at("/a")).expect("second");

    assert_eq!(calls.get(), 1);
    assert_eq!(first.created.len(), 1);
    assert!(second.created.is_empty());
    assert_eq!(first.chain, second.chain);
}

#[test]
fn renavigating_same_path_only_notifies_start_listeners() {
    let tree = tree_with(PresenceMode::Immediate);
    let root = tree.router("/");
    root.route("/a", page("a")).expect("register");
    root.start(&at("/a")).expect("first");

    let starts = Rc::new(Cell::new(0));
    let sub_views = Rc::new(Cell::new(0));
    let node_changes = Rc::new(Cell::new(0));
    {
        let starts = Rc::clone(&starts);
        root.on_start(move |_| starts.set(starts.get() + 1));
        let sub_views = Rc::clone(&sub_views);
        root.on_sub_views_change(move |_| sub_views.set(sub_views.get() + 1));
        let node_changes = Rc::clone(&node_changes);
        root.matched()
            .expect("matched")
            .on_state_change(move |_| node_changes.set(node_changes.get() + 1));
    }

    root.start(&at("/a")).expect("again");

    assert_eq!(starts.get(), 1);
    assert_eq!(sub_views.get(), 0);
    assert_eq!(node_changes.get(), 0);
}

#[test]
fn longest_match_wins_and_ties_go_to_first_registration() {
    let tree = tree_with(PresenceMode::Immediate);
    let root = tree.router("/");
    root.route("/drive", page("drive list")).expect("register");
    root.register("/drive/:id", |params| {
        let id = params.get("id").unwrap_or_default().to_string();
        Ok(Some(Resolved::new(
            format!("drive {id}"),
            ComponentRef::ready(id),
        )))
    })
    .expect("register");
    root.route("/x/:slug", page("x by slug")).expect("register");
    root.route("/x/new", page("x new")).expect("register");

    root.start(&at("/drive/7")).expect("drive");
    assert_eq!(titles(&root), vec!["drive 7"]);
    let node = root.matched().expect("matched");
    assert_eq!(node.params().expect("params").get("id"), Some("7"));
    assert_eq!(node.segment().as_deref(), Some("/drive/7"));

    root.start(&at("/x/new")).expect("x");
    assert_eq!(titles(&root), vec!["x by slug"]);
}

#[test]
fn rest_segment_captures_the_remaining_path() {
    let tree = tree_with(PresenceMode::Immediate);
    let root = tree.router("/");
    root.register("/files/*path", |params| {
        Ok(Some(Resolved::new(
            params.get("path").unwrap_or_default(),
            ComponentRef::ready(()),
        )))
    })
    .expect("register");

    root.start(&at("/files/photos/2024")).expect("files");

    assert_eq!(titles(&root), vec!["photos/2024"]);
}

#[test]
fn nested_resolution_builds_chain_and_notifies_parent_first() {
    let tree = tree_with(PresenceMode::Immediate);
    let root = tree.router("/");
    let child = tree.router("/");
    child.route("/home", page("home")).expect("child route");
    root.route("/a", page("a").with_child(child.clone()))
        .expect("root route");

    let log = Rc::new(RefCell::new(Vec::new()));
    {
        let log = Rc::clone(&log);
        root.on_sub_views_change(move |views| {
            log.borrow_mut().push(format!("root sub views: {}", views.len()))
        });
    }
    {
        let log = Rc::clone(&log);
        child.on_start(move |location| {
            log.borrow_mut()
                .push(format!("child start: {}", location.pathname))
        });
    }
    {
        let log = Rc::clone(&log);
        child.on_sub_views_change(move |views| {
            log.borrow_mut().push(format!("child sub views: {}", views.len()))
        });
    }

    let navigation = root.start(&at("/a/home")).expect("navigate");

    assert_eq!(navigation.chain.len(), 2);
    assert_eq!(navigation.created.len(), 2);
    assert!(navigation.unresolved.is_none());
    assert_eq!(titles(&root), vec!["a", "home"]);
    assert_eq!(
        *log.borrow(),
        vec![
            "root sub views: 1",
            "child start: /home",
            "child sub views: 1"
        ]
    );

    let home = child.matched().expect("home");
    assert_eq!(home.path().as_deref(), Some("/a/home"));
    assert_eq!(home.parent().and_then(|p| p.title()).as_deref(), Some("a"));
    assert_eq!(child.base_path(), "/a");
    assert_eq!(child.parent_node().map(|n| n.id()), root.matched().map(|n| n.id()));
}

#[test]
fn index_layout_starts_child_with_empty_residual() {
    let tree = tree_with(PresenceMode::Animated);
    let root = tree.router("/");
    let sub = tree.router("/");
    sub.route("/home", page("home")).expect("sub route");
    root.route(
        "/",
        Resolved::new("layout1", ComponentRef::ready("main-layout")).with_child(sub.clone()),
    )
    .expect("root route");

    let sub_starts = Rc::new(RefCell::new(Vec::new()));
    {
        let sub_starts = Rc::clone(&sub_starts);
        sub.on_start(move |location| sub_starts.borrow_mut().push(location.pathname.clone()));
    }
    let seen = Rc::new(RefCell::new(Vec::new()));
    {
        let seen = Rc::clone(&seen);
        root.on_sub_views_change(move |views| seen.borrow_mut().push(views.to_vec()));
    }

    let navigation = root.start(&at("/")).expect("navigate");

    assert_eq!(*sub_starts.borrow(), vec!["/"]);
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(seen.borrow()[0].len(), 1);
    assert_eq!(seen.borrow()[0][0].title, "layout1");
    assert!(navigation.unresolved.is_none());
    assert!(sub.matched().is_none());

    let layout = root.matched().expect("layout");
    let component = layout.component().expect("component");
    assert_eq!(component.downcast_ref::<&str>(), Some(&"main-layout"));
}

#[test]
fn keep_alive_reuses_node_identity() {
    let tree = tree_with(PresenceMode::Immediate);
    let root = tree.router("/");
    let a_calls = Rc::new(Cell::new(0));
    let b_calls = Rc::new(Cell::new(0));
    root.register("/a", counted("a", &a_calls)).expect("a");
    root.register("/b", counted("b", &b_calls)).expect("b");

    root.start(&at("/a")).expect("a");
    let first = root.matched().expect("a node");
    root.start(&at("/b")).expect("b");
    assert_eq!(first.presence_state(), PresenceState::Hidden);
    assert!(first.exists());
    root.start(&at("/a")).expect("a again");
    let again = root.matched().expect("a node again");

    assert_eq!(first, again);
    assert_eq!(a_calls.get(), 1);
    assert_eq!(b_calls.get(), 1);
    assert_eq!(again.presence_state(), PresenceState::Visible);
    assert_eq!(root.cached_count(), 2);
}

#[test]
fn exiting_nodes_stay_active_until_animation_end() {
    let tree = tree_with(PresenceMode::Animated);
    let root = tree.router("/");
    root.route("/a", page("a")).expect("a");
    root.route("/b", page("b")).expect("b");

    root.start(&at("/a")).expect("a");
    let a = root.matched().expect("a");
    a.animation_end();
    root.start(&at("/b")).expect("b");

    assert_eq!(a.presence_state(), PresenceState::Exiting);
    assert_eq!(root.active_children().len(), 2);

    let latest = Rc::new(RefCell::new(Vec::new()));
    {
        let latest = Rc::clone(&latest);
        root.on_sub_views_change(move |views| {
            *latest.borrow_mut() = views.iter().map(|v| v.title.clone()).collect()
        });
    }
    assert!(a.animation_end());

    assert_eq!(*latest.borrow(), vec!["b"]);
    assert_eq!(root.active_children().len(), 1);
    assert!(!a.flags().mounted);
}

#[test]
fn hide_transitions_are_emitted_before_show() {
    let tree = tree_with(PresenceMode::Animated);
    let root = tree.router("/");
    root.route("/a", page("a")).expect("a");
    root.route("/b", page("b")).expect("b");
    root.start(&at("/b")).expect("b");
    root.start(&at("/a")).expect("a");
    let a = root.cached("/a").expect("a");
    let b = root.cached("/b").expect("b");
    a.animation_end();
    b.animation_end();

    let log = Rc::new(RefCell::new(Vec::new()));
    for node in [&a, &b] {
        let log = Rc::clone(&log);
        let title = node.title().expect("title");
        node.on_state_change(move |state| {
            log.borrow_mut()
                .push(format!("{title}:{:?}", state.presence.state()))
        });
    }

    root.start(&at("/b")).expect("b again");

    assert_eq!(*log.borrow(), vec!["a:Exiting", "b:Entering"]);
}

#[test]
fn not_found_leaves_chain_unchanged_and_signals_owner() {
    let tree = tree_with(PresenceMode::Immediate);
    let root = tree.router("/");
    root.route("/a", page("a")).expect("a");
    root.start(&at("/a")).expect("a");

    let reported = Rc::new(RefCell::new(Vec::new()));
    {
        let reported = Rc::clone(&reported);
        root.on_not_found(move |err| reported.borrow_mut().push(err.clone()));
    }

    let err = root.start(&at("/missing")).expect_err("not found");

    assert!(matches!(err, RouterError::RouteNotFound { ref path, .. } if path == "/missing"));
    assert_eq!(*reported.borrow(), vec![err]);
    assert_eq!(titles(&root), vec!["a"]);
    assert_eq!(
        root.matched().expect("a").presence_state(),
        PresenceState::Visible
    );
}

#[test]
fn failing_or_empty_resolvers_report_not_found() {
    let tree = tree_with(PresenceMode::Immediate);
    let root = tree.router("/");
    root.register("/broken", |_| Err(anyhow::anyhow!("backend unavailable")))
        .expect("broken");
    root.register("/empty", |_| Ok(None)).expect("empty");

    assert!(matches!(
        root.start(&at("/broken")),
        Err(RouterError::RouteNotFound { .. })
    ));
    assert!(matches!(
        root.start(&at("/empty")),
        Err(RouterError::RouteNotFound { .. })
    ));
    assert_eq!(root.cached_count(), 0);
    assert!(root.current_chain().is_empty());
}

#[test]
fn registration_closes_once_navigation_starts() {
    let tree = tree_with(PresenceMode::Immediate);
    let root = tree.router("/");
    root.route("/a", page("a")).expect("a");
    root.start(&at("/a")).expect("a");

    let err = root.route("/late", page("late")).expect_err("closed");

    assert!(matches!(err, RouterError::RegistrationClosed { ref pattern, .. } if pattern == "/late"));
    assert_eq!(root.patterns(), vec!["/a"]);
}

#[test]
fn duplicate_registration_keeps_slot_and_last_resolver() {
    let tree = tree_with(PresenceMode::Immediate);
    let root = tree.router("/");
    root.route("/a", page("first")).expect("first");
    root.route("/b", page("b")).expect("b");
    root.route("/a/", page("second")).expect("second");

    root.start(&at("/a")).expect("a");

    assert_eq!(root.patterns(), vec!["/a", "/b"]);
    assert_eq!(titles(&root), vec!["second"]);
}

#[test]
fn rejects_malformed_patterns() {
    let tree = tree_with(PresenceMode::Immediate);
    let root = tree.router("/");

    assert!(matches!(
        root.route("/files/*/x", page("x")),
        Err(RouterError::InvalidPattern { .. })
    ));
    assert!(matches!(
        root.route("/:", page("x")),
        Err(RouterError::InvalidPattern { .. })
    ));
    assert!(root.patterns().is_empty());
}

#[test]
fn strips_router_prefix() {
    let tree = tree_with(PresenceMode::Immediate);
    let root = tree.router("/app");
    root.route("/a", page("a")).expect("a");

    root.start(&at("/app/a")).expect("prefixed");
    assert_eq!(titles(&root), vec!["a"]);
    assert_eq!(
        root.matched().and_then(|n| n.path()).as_deref(),
        Some("/app/a")
    );

    assert!(root.start(&at("/other/a")).is_err());
    assert_eq!(titles(&root), vec!["a"]);
}

#[test]
fn nested_not_found_does_not_fail_parent() {
    let tree = tree_with(PresenceMode::Immediate);
    let root = tree.router("/");
    let child = tree.router("/");
    child.route("/home", page("home")).expect("home");
    root.route("/a", page("a").with_child(child.clone()))
        .expect("a");

    let navigation = root.start(&at("/a/nope")).expect("parent ok");

    assert!(matches!(
        navigation.unresolved,
        Some(RouterError::RouteNotFound { .. })
    ));
    assert_eq!(titles(&root), vec!["a"]);
}

#[test]
fn empty_residual_idles_child_router() {
    let tree = tree_with(PresenceMode::Immediate);
    let root = tree.router("/");
    let child = tree.router("/");
    child.route("/home", page("home")).expect("home");
    root.route("/a", page("a").with_child(child.clone()))
        .expect("a");

    root.start(&at("/a/home")).expect("deep");
    let home = child.matched().expect("home");
    root.start(&at("/a")).expect("shallow");

    assert_eq!(titles(&root), vec!["a"]);
    assert_eq!(home.presence_state(), PresenceState::Hidden);
    assert!(home.exists());
    assert!(child.active_children().is_empty());
}

#[test]
fn retention_evicts_least_recently_shown_hidden_nodes() {
    let tree = ViewTree::new(ShellSettings {
        presence_mode: PresenceMode::Immediate,
        max_hidden_nodes: Some(1),
        ..ShellSettings::default()
    });
    let root = tree.router("/");
    let a_calls = Rc::new(Cell::new(0));
    root.register("/a", counted("a", &a_calls)).expect("a");
    root.route("/b", page("b")).expect("b");
    root.route("/c", page("c")).expect("c");

    root.start(&at("/a")).expect("a");
    let evicted = root.matched().expect("a");
    root.start(&at("/b")).expect("b");
    root.start(&at("/c")).expect("c");

    assert!(!evicted.exists());
    assert_eq!(root.cached_count(), 2);
    assert!(root.cached("/b").is_some());

    root.start(&at("/a")).expect("a again");
    assert_eq!(a_calls.get(), 2);
}

#[test]
fn destroying_a_node_detaches_it_once() {
    let tree = tree_with(PresenceMode::Immediate);
    let root = tree.router("/");
    root.route("/a", page("a")).expect("a");
    root.start(&at("/a")).expect("a");
    let node = root.matched().expect("a");

    let emissions = Rc::new(Cell::new(0));
    {
        let emissions = Rc::clone(&emissions);
        root.on_sub_views_change(move |_| emissions.set(emissions.get() + 1));
    }

    assert!(node.destroy());
    assert!(!node.destroy());
    assert_eq!(emissions.get(), 1);
    assert!(root.current_chain().is_empty());
    assert_eq!(root.cached_count(), 0);
    assert!(!node.show());
    assert_eq!(node.flags(), Default::default());
}

#[test]
fn destroying_a_parent_node_resets_its_child_router() {
    let tree = tree_with(PresenceMode::Immediate);
    let root = tree.router("/");
    let child = tree.router("/");
    child.route("/home", page("home")).expect("home");
    root.route("/a", page("a").with_child(child.clone()))
        .expect("a");
    root.start(&at("/a/home")).expect("deep");
    let home = child.matched().expect("home");

    root.matched().expect("a").destroy();

    assert!(!home.exists());
    assert!(child.exists());
    assert_eq!(child.cached_count(), 0);

    root.start(&at("/a/home")).expect("deep again");
    assert_eq!(titles(&root), vec!["a", "home"]);
}

#[test]
fn router_destroy_is_idempotent() {
    let tree = tree_with(PresenceMode::Immediate);
    let root = tree.router("/");
    root.route("/a", page("a")).expect("a");
    root.start(&at("/a")).expect("a");
    let node = root.matched().expect("a");
    let starts = Rc::new(Cell::new(0));
    {
        let starts = Rc::clone(&starts);
        root.on_start(move |_| starts.set(starts.get() + 1));
    }

    assert!(root.destroy());
    assert!(!root.destroy());

    assert!(!node.exists());
    assert!(matches!(
        root.start(&at("/a")),
        Err(RouterError::Destroyed(_))
    ));
    assert_eq!(starts.get(), 0);
    assert_eq!(tree.node_count(), 0);
    assert_eq!(tree.router_count(), 0);
}

#[test]
fn leaving_a_parent_hides_its_sub_chain_first() {
    let tree = tree_with(PresenceMode::Immediate);
    let root = tree.router("/");
    let child = tree.router("/");
    child.route("/x", page("x")).expect("x");
    root.route("/a", page("a").with_child(child.clone()))
        .expect("a");
    root.route("/b", page("b")).expect("b");

    root.start(&at("/a/x")).expect("deep");
    let a = root.matched().expect("a");
    let x = child.matched().expect("x");

    let log = Rc::new(RefCell::new(Vec::new()));
    for node in [&a, &x] {
        let log = Rc::clone(&log);
        let title = node.title().expect("title");
        node.on_state_change(move |state| {
            log.borrow_mut()
                .push(format!("{title}:{:?}", state.presence.state()))
        });
    }

    root.start(&at("/b")).expect("b");

    assert_eq!(titles(&root), vec!["b"]);
    assert_eq!(x.flags(), Default::default());
    assert_eq!(a.flags(), Default::default());
    assert!(child.active_children().is_empty());
    assert_eq!(
        *log.borrow(),
        vec!["x:Exiting", "x:Hidden", "a:Exiting", "a:Hidden"]
    );
    assert_eq!(child.matched(), Some(x.clone()));

    root.start(&at("/a/x")).expect("back to deep");
    assert_eq!(child.matched(), Some(x.clone()));
    assert_eq!(x.presence_state(), PresenceState::Visible);
    assert_eq!(titles(&root), vec!["a", "x"]);
}

#[test]
fn leaving_a_parent_starts_sub_chain_exit_in_animated_mode() {
    let tree = tree_with(PresenceMode::Animated);
    let root = tree.router("/");
    let child = tree.router("/");
    child.route("/x", page("x")).expect("x");
    root.route("/a", page("a").with_child(child.clone()))
        .expect("a");
    root.route("/b", page("b")).expect("b");
    root.start(&at("/a/x")).expect("deep");
    let x = child.matched().expect("x");
    x.animation_end();

    root.start(&at("/b")).expect("b");

    assert_eq!(x.presence_state(), PresenceState::Exiting);
    assert!(x.animation_end());
    assert!(!x.flags().mounted);
    assert!(child.active_children().is_empty());
}

#[test]
fn shared_child_router_follows_the_last_parent() {
    let tree = ViewTree::new(ShellSettings {
        presence_mode: PresenceMode::Immediate,
        max_hidden_nodes: Some(0),
        ..ShellSettings::default()
    });
    let root = tree.router("/");
    let child = tree.router("/");
    child.route("/home", page("home")).expect("home");
    root.route("/:id", page("item").with_child(child.clone()))
        .expect("item");

    root.start(&at("/1/home")).expect("first item");
    let first = root.matched().expect("first");
    let home = child.matched().expect("home");
    assert_eq!(home.path().as_deref(), Some("/1/home"));

    let navigation = root.start(&at("/2/home")).expect("second item");

    assert!(navigation.unresolved.is_none());
    assert!(!first.exists());
    assert!(home.exists());
    assert_eq!(home.path().as_deref(), Some("/2/home"));
    assert_eq!(home.parent(), root.matched());
    assert_eq!(home.presence_state(), PresenceState::Visible);
    assert_eq!(child.base_path(), "/2");
    assert_eq!(titles(&root), vec!["item", "home"]);
}
