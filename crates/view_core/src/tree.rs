//! Arena holding every router and view node of one application.
//!
//! Forward edges (router -> cached nodes, node -> child router) and back edges
//! (router -> parent node) are plain ids, so nothing here forms an ownership cycle. Borrows of
//! the arena are kept short and never span a call into user code or an event emission.

use std::{
    cell::RefCell,
    collections::HashMap,
    rc::{Rc, Weak},
};

use shared::{
    domain::{NodeId, RouterId},
    protocol::normalize_path,
};

use crate::{
    config::ShellSettings,
    event_bus::EventBus,
    node::{ComponentSlot, NodeEvent, ViewNode},
    presence::Presence,
    router::{RouteEntry, RouteParams, Router, RouterEvent},
};

pub(crate) struct NodeEntry {
    /// Concrete path matched inside the owning router, e.g. `/drive/42`.
    pub segment: String,
    pub title: String,
    pub params: RouteParams,
    pub component: ComponentSlot,
    pub child_router: Option<RouterId>,
    pub presence: Presence,
    pub router: RouterId,
    pub bus: EventBus<NodeEvent>,
    pub last_shown: u64,
}

pub(crate) struct RouterEntry {
    pub prefix: String,
    /// Node this router is mounted under. A router shared by several nodes follows the one
    /// navigated through last.
    pub parent_node: Option<NodeId>,
    pub routes: Vec<RouteEntry>,
    pub cache: HashMap<String, NodeId>,
    pub matched: Option<NodeId>,
    /// Mounted nodes, in activation order.
    pub active: Vec<NodeId>,
    pub started: bool,
    /// Set while `settle` rebuilds `active`; presence listeners leave membership alone.
    pub settling: bool,
    pub bus: EventBus<RouterEvent>,
}

struct TreeArena {
    nodes: HashMap<NodeId, NodeEntry>,
    routers: HashMap<RouterId, RouterEntry>,
    next_node: u64,
    next_router: u64,
    tick: u64,
    settings: ShellSettings,
}

/// Application-wide context: owns the arena and the settings every router reads.
#[derive(Clone)]
pub struct ViewTree {
    inner: Rc<RefCell<TreeArena>>,
}

#[derive(Clone)]
pub(crate) struct WeakViewTree {
    inner: Weak<RefCell<TreeArena>>,
}

impl WeakViewTree {
    pub fn upgrade(&self) -> Option<ViewTree> {
        self.inner.upgrade().map(|inner| ViewTree { inner })
    }
}

impl Default for ViewTree {
    fn default() -> Self {
        Self::new(ShellSettings::default())
    }
}

impl ViewTree {
    pub fn new(settings: ShellSettings) -> Self {
        Self {
            inner: Rc::new(RefCell::new(TreeArena {
                nodes: HashMap::new(),
                routers: HashMap::new(),
                next_node: 1,
                next_router: 1,
                tick: 0,
                settings,
            })),
        }
    }

    pub fn settings(&self) -> ShellSettings {
        self.inner.borrow().settings.clone()
    }

    /// Creates a router mounted under `prefix` (`/` for none).
    pub fn router(&self, prefix: &str) -> Router {
        let mut arena = self.inner.borrow_mut();
        let id = RouterId(arena.next_router);
        arena.next_router += 1;
        arena.routers.insert(
            id,
            RouterEntry {
                prefix: normalize_path(prefix),
                parent_node: None,
                routes: Vec::new(),
                cache: HashMap::new(),
                matched: None,
                active: Vec::new(),
                started: false,
                settling: false,
                bus: EventBus::new(),
            },
        );
        Router::from_parts(id, self.clone())
    }

    pub fn node(&self, id: NodeId) -> Option<ViewNode> {
        self.inner
            .borrow()
            .nodes
            .contains_key(&id)
            .then(|| ViewNode::from_parts(id, self.clone()))
    }

    pub fn router_by_id(&self, id: RouterId) -> Option<Router> {
        self.inner
            .borrow()
            .routers
            .contains_key(&id)
            .then(|| Router::from_parts(id, self.clone()))
    }

    pub fn node_count(&self) -> usize {
        self.inner.borrow().nodes.len()
    }

    pub fn router_count(&self) -> usize {
        self.inner.borrow().routers.len()
    }

    pub fn same(&self, other: &ViewTree) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakViewTree {
        WeakViewTree {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn next_tick(&self) -> u64 {
        let mut arena = self.inner.borrow_mut();
        arena.tick += 1;
        arena.tick
    }

    pub(crate) fn insert_node(&self, entry: NodeEntry) -> NodeId {
        let mut arena = self.inner.borrow_mut();
        let id = NodeId(arena.next_node);
        arena.next_node += 1;
        arena.nodes.insert(id, entry);
        id
    }

    pub(crate) fn remove_node(&self, id: NodeId) -> Option<NodeEntry> {
        self.inner.borrow_mut().nodes.remove(&id)
    }

    pub(crate) fn remove_router(&self, id: RouterId) -> Option<RouterEntry> {
        self.inner.borrow_mut().routers.remove(&id)
    }

    pub(crate) fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&NodeEntry) -> R) -> Option<R> {
        self.inner.borrow().nodes.get(&id).map(f)
    }

    pub(crate) fn with_node_mut<R>(
        &self,
        id: NodeId,
        f: impl FnOnce(&mut NodeEntry) -> R,
    ) -> Option<R> {
        self.inner.borrow_mut().nodes.get_mut(&id).map(f)
    }

    pub(crate) fn with_router<R>(
        &self,
        id: RouterId,
        f: impl FnOnce(&RouterEntry) -> R,
    ) -> Option<R> {
        self.inner.borrow().routers.get(&id).map(f)
    }

    pub(crate) fn with_router_mut<R>(
        &self,
        id: RouterId,
        f: impl FnOnce(&mut RouterEntry) -> R,
    ) -> Option<R> {
        self.inner.borrow_mut().routers.get_mut(&id).map(f)
    }
}
