//! Path matching and navigation propagation.
//!
//! A router owns an ordered list of `(pattern, resolver)` pairs and a cache of the nodes it
//! has resolved, keyed by concrete path. `start` matches the location against the patterns,
//! shows the matched node, hides the rest of its active set and recurses into the matched
//! node's child router with whatever path is left.

use std::{collections::HashMap, fmt, rc::Rc};

use shared::{
    domain::{NodeId, RouterId},
    protocol::{normalize_path, path_segments, Location, SubView},
};
use tracing::{debug, info, warn};

use crate::{
    config::PresenceMode,
    error::RouterError,
    event_bus::{BusEvent, EventBus, Subscription},
    node::{self, ComponentRef, ViewNode},
    presence::Presence,
    tree::{NodeEntry, ViewTree},
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Literal(String),
    Param(String),
    Rest(String),
}

/// `/`, `/drive`, `/drive/:id`, `/files/*path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<PatternSegment>,
}

struct PatternMatch {
    consumed: usize,
    params: HashMap<String, String>,
}

impl RoutePattern {
    pub fn parse(raw: &str) -> Result<Self, RouterError> {
        let normalized = normalize_path(raw);
        let parts = path_segments(&normalized);
        let invalid = |reason: &str| RouterError::InvalidPattern {
            pattern: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::with_capacity(parts.len());
        for (index, part) in parts.iter().enumerate() {
            if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(invalid("parameter segment without a name"));
                }
                segments.push(PatternSegment::Param(name.to_string()));
            } else if let Some(name) = part.strip_prefix('*') {
                if index + 1 != parts.len() {
                    return Err(invalid("rest segment must be last"));
                }
                let name = if name.is_empty() { "rest" } else { name };
                segments.push(PatternSegment::Rest(name.to_string()));
            } else {
                segments.push(PatternSegment::Literal(part.to_string()));
            }
        }

        Ok(Self {
            raw: normalized,
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Matches a prefix of `path`. A rest segment consumes everything left.
    fn matches(&self, path: &[&str]) -> Option<PatternMatch> {
        let mut params = HashMap::new();
        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                PatternSegment::Literal(expected) => {
                    if path.get(index) != Some(&expected.as_str()) {
                        return None;
                    }
                }
                PatternSegment::Param(name) => {
                    let value = path.get(index)?;
                    params.insert(name.clone(), (*value).to_string());
                }
                PatternSegment::Rest(name) => {
                    let rest = path.get(index..).unwrap_or_default().join("/");
                    params.insert(name.clone(), rest);
                    return Some(PatternMatch {
                        consumed: path.len(),
                        params,
                    });
                }
            }
        }

        Some(PatternMatch {
            consumed: self.segments.len(),
            params,
        })
    }
}

/// What a resolver sees for one concrete path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    pub pattern: String,
    pub path: String,
    values: HashMap<String, String>,
}

impl RouteParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resolver output: the node's title, its component and an optional nested router.
#[derive(Clone)]
pub struct Resolved {
    pub title: String,
    pub component: ComponentRef,
    pub child: Option<Router>,
}

impl Resolved {
    pub fn new(title: impl Into<String>, component: ComponentRef) -> Self {
        Self {
            title: title.into(),
            component,
            child: None,
        }
    }

    pub fn with_child(mut self, child: Router) -> Self {
        self.child = Some(child);
        self
    }
}

type Resolver = Rc<dyn Fn(&RouteParams) -> anyhow::Result<Option<Resolved>>>;

#[derive(Clone)]
pub(crate) struct RouteEntry {
    pattern: RoutePattern,
    resolver: Resolver,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouterEvent {
    Start(Location),
    SubViewsChange(Vec<SubView>),
    NotFound(RouterError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouterEventKind {
    Start,
    SubViewsChange,
    NotFound,
}

impl BusEvent for RouterEvent {
    type Kind = RouterEventKind;

    fn kind(&self) -> Self::Kind {
        match self {
            RouterEvent::Start(_) => RouterEventKind::Start,
            RouterEvent::SubViewsChange(_) => RouterEventKind::SubViewsChange,
            RouterEvent::NotFound(_) => RouterEventKind::NotFound,
        }
    }
}

/// Result of a successful `start`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigation {
    /// This router's chain after the call, outermost first.
    pub chain: Vec<NodeId>,
    /// Nodes resolved for the first time anywhere below this router.
    pub created: Vec<NodeId>,
    /// Set when a nested router could not match the residual path.
    pub unresolved: Option<RouterError>,
}

#[derive(Clone)]
pub struct Router {
    id: RouterId,
    tree: ViewTree,
}

impl PartialEq for Router {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.tree.same(&other.tree)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Router").field(&self.id).finish()
    }
}

impl Router {
    pub(crate) fn from_parts(id: RouterId, tree: ViewTree) -> Self {
        Self { id, tree }
    }

    pub fn id(&self) -> RouterId {
        self.id
    }

    pub fn tree(&self) -> &ViewTree {
        &self.tree
    }

    pub fn exists(&self) -> bool {
        self.tree.with_router(self.id, |_| ()).is_some()
    }

    pub fn prefix(&self) -> Option<String> {
        self.tree.with_router(self.id, |router| router.prefix.clone())
    }

    /// Prefix composed with the owning node's path.
    pub fn base_path(&self) -> String {
        base_path(&self.tree, self.id)
    }

    pub fn parent_node(&self) -> Option<ViewNode> {
        let parent = self.tree.with_router(self.id, |router| router.parent_node)??;
        self.tree.node(parent)
    }

    pub fn is_started(&self) -> bool {
        self.tree
            .with_router(self.id, |router| router.started)
            .unwrap_or(false)
    }

    pub fn patterns(&self) -> Vec<String> {
        self.tree
            .with_router(self.id, |router| {
                router
                    .routes
                    .iter()
                    .map(|route| route.pattern.raw.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Adds a route. Closed once the first `start` ran; a repeated pattern replaces the
    /// earlier resolver in place.
    pub fn register<F>(&self, pattern: &str, resolver: F) -> Result<(), RouterError>
    where
        F: Fn(&RouteParams) -> anyhow::Result<Option<Resolved>> + 'static,
    {
        let pattern = RoutePattern::parse(pattern)?;
        let resolver: Resolver = Rc::new(resolver);
        let id = self.id;

        self.tree
            .with_router_mut(id, |router| {
                if router.started {
                    return Err(RouterError::RegistrationClosed {
                        router: id,
                        pattern: pattern.raw.clone(),
                    });
                }

                match router
                    .routes
                    .iter()
                    .position(|route| route.pattern == pattern)
                {
                    Some(index) => {
                        warn!(router = %id, pattern = %pattern.raw, "duplicate route registration; last one wins");
                        router.routes[index].resolver = resolver;
                    }
                    None => {
                        debug!(router = %id, pattern = %pattern.raw, "route registered");
                        router.routes.push(RouteEntry { pattern, resolver });
                    }
                }
                Ok(())
            })
            .unwrap_or(Err(RouterError::Destroyed(id)))
    }

    /// Registers a route that always resolves to `resolved`.
    pub fn route(&self, pattern: &str, resolved: Resolved) -> Result<(), RouterError> {
        self.register(pattern, move |_| Ok(Some(resolved.clone())))
    }

    pub fn on_start(&self, handler: impl Fn(&Location) + 'static) -> Subscription<RouterEvent> {
        self.bus().on(RouterEventKind::Start, move |event| {
            if let RouterEvent::Start(location) = event {
                handler(location);
            }
        })
    }

    pub fn on_sub_views_change(
        &self,
        handler: impl Fn(&[SubView]) + 'static,
    ) -> Subscription<RouterEvent> {
        self.bus().on(RouterEventKind::SubViewsChange, move |event| {
            if let RouterEvent::SubViewsChange(views) = event {
                handler(views);
            }
        })
    }

    pub fn on_not_found(
        &self,
        handler: impl Fn(&RouterError) + 'static,
    ) -> Subscription<RouterEvent> {
        self.bus().on(RouterEventKind::NotFound, move |event| {
            if let RouterEvent::NotFound(err) = event {
                handler(err);
            }
        })
    }

    pub fn matched(&self) -> Option<ViewNode> {
        let node = self.tree.with_router(self.id, |router| router.matched)??;
        self.tree.node(node)
    }

    pub fn current_chain(&self) -> Vec<ViewNode> {
        current_chain_ids(&self.tree, self.id)
            .into_iter()
            .filter_map(|id| self.tree.node(id))
            .collect()
    }

    /// Mounted nodes in activation order, including ones still exiting.
    pub fn active_children(&self) -> Vec<ViewNode> {
        self.tree
            .with_router(self.id, |router| router.active.clone())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| self.tree.node(id))
            .collect()
    }

    pub fn sub_views(&self) -> Vec<SubView> {
        self.active_children()
            .iter()
            .filter_map(ViewNode::sub_view)
            .collect()
    }

    /// Cached node for a concrete path relative to this router.
    pub fn cached(&self, path: &str) -> Option<ViewNode> {
        let path = normalize_path(path);
        let node = self
            .tree
            .with_router(self.id, |router| router.cache.get(&path).copied())??;
        self.tree.node(node)
    }

    pub fn cached_count(&self) -> usize {
        self.tree
            .with_router(self.id, |router| router.cache.len())
            .unwrap_or(0)
    }

    pub fn start(&self, location: &Location) -> Result<Navigation, RouterError> {
        let Some((prefix, bus)) = self.tree.with_router_mut(self.id, |router| {
            router.started = true;
            (router.prefix.clone(), router.bus.clone())
        }) else {
            return Err(RouterError::Destroyed(self.id));
        };

        info!(
            router = %self.id,
            path = %location.pathname,
            navigation = ?location.navigation,
            "navigation started"
        );
        bus.emit(&RouterEvent::Start(location.clone()));

        let Some(relative) = strip_prefix(&prefix, &location.pathname) else {
            return Err(self.not_found(&location.pathname));
        };
        let segments = path_segments(&relative);

        let Some((route, matched)) = self.find_route(&segments) else {
            if segments.is_empty() {
                debug!(router = %self.id, "no index route; router idle");
                self.settle(None);
                return Ok(Navigation::default());
            }
            return Err(self.not_found(&relative));
        };

        let path = normalize_path(&segments[..matched.consumed].join("/"));
        let mut navigation = Navigation::default();
        let node = match self.cached_id(&path) {
            Some(node) => node,
            None => {
                let params = RouteParams {
                    pattern: route.pattern.raw.clone(),
                    path: path.clone(),
                    values: matched.params,
                };
                let node = self.resolve(&route, params)?;
                navigation.created.push(node);
                node
            }
        };

        self.settle(Some(node));

        let child = self
            .tree
            .with_node(node, |entry| entry.child_router)
            .flatten()
            .and_then(|id| self.tree.router_by_id(id));
        if let Some(child) = child {
            self.attach(&child, node);
            let residual = Location {
                pathname: normalize_path(&segments[matched.consumed..].join("/")),
                query: location.query.clone(),
                navigation: location.navigation,
            };
            match child.start(&residual) {
                Ok(nested) => {
                    navigation.created.extend(nested.created);
                    navigation.unresolved = nested.unresolved;
                }
                Err(err) => navigation.unresolved = Some(err),
            }
        }

        // After the child ran, so a shared child router is already attached to `node`.
        self.apply_retention();
        navigation.chain = current_chain_ids(&self.tree, self.id);
        Ok(navigation)
    }

    /// Hides and forgets every node this router resolved when it is mounted under `owner`.
    /// Routes and listeners stay. A router already re-attached elsewhere is left alone.
    pub(crate) fn detach_from(&self, owner: NodeId) {
        let Some((nodes, was_active)) = self.tree.with_router_mut(self.id, |router| {
            if router.parent_node != Some(owner) {
                debug!(router = %self.id, node = %owner, "child router mounted elsewhere; keeping its nodes");
                return None;
            }
            let was_active = !router.active.is_empty();
            router.matched = None;
            router.active.clear();
            router.parent_node = None;
            Some((router.cache.values().copied().collect::<Vec<_>>(), was_active))
        })
        .flatten() else {
            return;
        };

        for id in nodes {
            ViewNode::from_parts(id, self.tree.clone()).destroy();
        }
        if was_active {
            emit_sub_views(&self.tree, self.id);
        }
    }

    /// Explicit teardown: every cached node, the bus, and the link from the parent node.
    pub fn destroy(&self) -> bool {
        let Some(entry) = self.tree.remove_router(self.id) else {
            return false;
        };
        entry.bus.destroy();

        for id in entry.cache.into_values() {
            ViewNode::from_parts(id, self.tree.clone()).destroy();
        }
        if let Some(parent) = entry.parent_node {
            self.tree.with_node_mut(parent, |node| {
                if node.child_router == Some(self.id) {
                    node.child_router = None;
                }
            });
        }

        debug!(router = %self.id, "router destroyed");
        true
    }

    fn bus(&self) -> EventBus<RouterEvent> {
        self.tree
            .with_router(self.id, |router| router.bus.clone())
            .unwrap_or_else(EventBus::detached)
    }

    /// Mounts `child` under `node`. A child router shared by several nodes follows the one
    /// navigated through last.
    fn attach(&self, child: &Router, node: NodeId) {
        let previous = self
            .tree
            .with_router_mut(child.id, |router| router.parent_node.replace(node))
            .flatten();
        if let Some(previous) = previous.filter(|previous| *previous != node) {
            debug!(router = %child.id, from = %previous, to = %node, "child router re-attached");
        }
    }

    fn cached_id(&self, path: &str) -> Option<NodeId> {
        self.tree
            .with_router(self.id, |router| router.cache.get(path).copied())
            .flatten()
    }

    /// Longest match wins; on equal length the earlier registration wins.
    fn find_route(&self, segments: &[&str]) -> Option<(RouteEntry, PatternMatch)> {
        self.tree
            .with_router(self.id, |router| {
                let mut best: Option<(usize, PatternMatch)> = None;
                for (index, route) in router.routes.iter().enumerate() {
                    let Some(candidate) = route.pattern.matches(segments) else {
                        continue;
                    };
                    let longer = best
                        .as_ref()
                        .map_or(true, |(_, current)| candidate.consumed > current.consumed);
                    if longer {
                        best = Some((index, candidate));
                    }
                }
                best.map(|(index, matched)| (router.routes[index].clone(), matched))
            })
            .flatten()
    }

    fn resolve(&self, route: &RouteEntry, params: RouteParams) -> Result<NodeId, RouterError> {
        let path = params.path.clone();
        let resolved = match (route.resolver)(&params) {
            Ok(Some(resolved)) => resolved,
            Ok(None) => return Err(self.not_found(&path)),
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(router = %self.id, pattern = %route.pattern.raw, error = %reason, "route resolver failed");
                return Err(self.not_found(&path));
            }
        };

        let child = match resolved.child {
            Some(child) if child.tree.same(&self.tree) => Some(child.id),
            Some(child) => {
                warn!(router = %self.id, child = %child.id, "child router belongs to another view tree; ignoring it");
                None
            }
            None => None,
        };
        let presence = Presence::new();
        let node = self.tree.insert_node(NodeEntry {
            segment: path.clone(),
            title: resolved.title,
            params,
            component: resolved.component.into(),
            child_router: child,
            presence: presence.clone(),
            router: self.id,
            bus: EventBus::new(),
            last_shown: 0,
        });
        node::watch_presence(&self.tree, self.id, node, &presence);
        self.tree.with_router_mut(self.id, |router| {
            router.cache.insert(path.clone(), node);
        });

        debug!(router = %self.id, node = %node, path = %path, "view node resolved");
        Ok(node)
    }

    /// Hides every active node except `target` (sub-chains first, deepest first), then shows
    /// `target`. Hide transitions are emitted before the show transition, and this router's
    /// sub view list is published once.
    fn settle(&self, target: Option<NodeId>) {
        let immediate = self.tree.settings().presence_mode == PresenceMode::Immediate;
        let Some(previous) = self.tree.with_router_mut(self.id, |router| {
            router.settling = true;
            router.active.clone()
        }) else {
            return;
        };

        let mut unmounted = Vec::new();
        for id in previous.into_iter().filter(|id| Some(*id) != target) {
            hide_nested(&self.tree, id, immediate);
            let node = ViewNode::from_parts(id, self.tree.clone());
            hide_node(&node, immediate);
            if !node.flags().mounted {
                unmounted.push(id);
            }
        }

        let tick = self.tree.next_tick();
        let added = self
            .tree
            .with_router_mut(self.id, |router| {
                router.active.retain(|id| !unmounted.contains(id));
                router.matched = target;
                match target {
                    Some(target) if !router.active.contains(&target) => {
                        router.active.push(target);
                        true
                    }
                    _ => false,
                }
            })
            .unwrap_or(false);

        if let Some(target) = target {
            self.tree
                .with_node_mut(target, |entry| entry.last_shown = tick);
            let node = ViewNode::from_parts(target, self.tree.clone());
            node.transition(Presence::show);
            if immediate {
                node.transition(Presence::animation_end);
            }
        }

        self.tree
            .with_router_mut(self.id, |router| router.settling = false);
        if added || !unmounted.is_empty() {
            emit_sub_views(&self.tree, self.id);
        }
    }

    /// Evicts the least recently shown hidden nodes beyond `max_hidden_nodes`.
    fn apply_retention(&self) {
        let Some(limit) = self.tree.settings().max_hidden_nodes else {
            return;
        };
        let Some(mut hidden) = self.tree.with_router(self.id, |router| {
            router
                .cache
                .values()
                .copied()
                .filter(|id| !router.active.contains(id) && router.matched != Some(*id))
                .collect::<Vec<_>>()
        }) else {
            return;
        };
        if hidden.len() <= limit {
            return;
        }

        hidden.sort_by_key(|id| {
            let last_shown = self
                .tree
                .with_node(*id, |entry| entry.last_shown)
                .unwrap_or(0);
            (last_shown, *id)
        });
        let excess = hidden.len() - limit;
        for id in hidden.into_iter().take(excess) {
            info!(router = %self.id, node = %id, "evicting hidden view node");
            ViewNode::from_parts(id, self.tree.clone()).destroy();
        }
    }

    fn not_found(&self, path: &str) -> RouterError {
        let err = RouterError::RouteNotFound {
            router: self.id,
            path: path.to_string(),
        };
        warn!(router = %self.id, path, "route not found; keeping current chain");
        self.bus().emit(&RouterEvent::NotFound(err.clone()));
        err
    }
}

pub(crate) fn current_chain_ids(tree: &ViewTree, router: RouterId) -> Vec<NodeId> {
    let mut chain = Vec::new();
    let mut next = Some(router);
    while let Some(router) = next {
        let Some(node) = tree.with_router(router, |entry| entry.matched).flatten() else {
            break;
        };
        if chain.contains(&node) {
            break;
        }
        chain.push(node);
        next = tree.with_node(node, |entry| entry.child_router).flatten();
    }
    chain
}

/// Hides the sub-chain mounted under `node`, deepest first. Cache entries and matches stay,
/// so the next visit restores the sub-chain through the normal show path.
fn hide_nested(tree: &ViewTree, node: NodeId, immediate: bool) {
    let Some(child) = tree.with_node(node, |entry| entry.child_router).flatten() else {
        return;
    };
    let mounted_here = tree
        .with_router(child, |router| router.parent_node == Some(node))
        .unwrap_or(false);
    if !mounted_here {
        return;
    }
    for id in current_chain_ids(tree, child).into_iter().rev() {
        hide_node(&ViewNode::from_parts(id, tree.clone()), immediate);
    }
}

fn hide_node(node: &ViewNode, immediate: bool) {
    node.transition(Presence::hide);
    if immediate {
        node.transition(Presence::animation_end);
    }
}

/// Adds or drops `node` from its router's active set after a presence transition.
pub(crate) fn sync_membership(tree: &ViewTree, router: RouterId, node: NodeId, mounted: bool) {
    let changed = tree
        .with_router_mut(router, |entry| {
            if entry.settling {
                return false;
            }
            let present = entry.active.contains(&node);
            match (mounted, present) {
                (true, false) => {
                    entry.active.push(node);
                    true
                }
                (false, true) => {
                    entry.active.retain(|id| *id != node);
                    true
                }
                _ => false,
            }
        })
        .unwrap_or(false);

    if changed {
        emit_sub_views(tree, router);
    }
}

pub(crate) fn emit_sub_views(tree: &ViewTree, router: RouterId) {
    let Some((active, bus)) = tree.with_router(router, |entry| (entry.active.clone(), entry.bus.clone()))
    else {
        return;
    };
    let views: Vec<SubView> = active
        .into_iter()
        .filter_map(|id| ViewNode::from_parts(id, tree.clone()).sub_view())
        .collect();
    debug!(router = %router, count = views.len(), "sub views changed");
    bus.emit(&RouterEvent::SubViewsChange(views));
}

pub(crate) fn base_path(tree: &ViewTree, router: RouterId) -> String {
    let Some((prefix, parent)) =
        tree.with_router(router, |entry| (entry.prefix.clone(), entry.parent_node))
    else {
        return "/".to_string();
    };
    match parent.and_then(|id| tree.node(id)).and_then(|node| node.path()) {
        Some(parent_path) => join_paths(&parent_path, &prefix),
        None => prefix,
    }
}

pub(crate) fn join_paths(base: &str, tail: &str) -> String {
    normalize_path(&format!("{base}/{tail}"))
}

fn strip_prefix(prefix: &str, pathname: &str) -> Option<String> {
    let pathname = normalize_path(pathname);
    if prefix == "/" {
        return Some(pathname);
    }
    if pathname == prefix {
        return Some("/".to_string());
    }
    pathname
        .strip_prefix(prefix)
        .filter(|rest| rest.starts_with('/'))
        .map(str::to_string)
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
