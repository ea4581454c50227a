//! Routable view units.
//!
//! A [`ViewNode`] is a cheap handle (id + tree). Once the node is destroyed every accessor
//! reports an empty value and every transition is a no-op.

use std::{any::Any, fmt, future::Future, rc::Rc};

use futures::future::{self, FutureExt, LocalBoxFuture, Shared};
use shared::{
    domain::{NodeId, PresenceState, RouterId},
    protocol::{PresenceFlags, SubView},
};
use tracing::{debug, info, warn};

use crate::{
    error::LoadError,
    event_bus::{BusEvent, EventBus, Subscription},
    presence::Presence,
    router::{self, RouteParams, Router},
    tree::{ViewTree, WeakViewTree},
};

/// Opaque renderable value supplied by the application.
#[derive(Clone)]
pub struct Component(Rc<dyn Any>);

impl Component {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Component(..)")
    }
}

pub type LoadFuture = LocalBoxFuture<'static, anyhow::Result<Component>>;

/// Deferred component supplier.
#[derive(Clone)]
pub struct Loader(Rc<dyn Fn() -> LoadFuture>);

impl Loader {
    pub fn new<F, Fut>(load: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<Component>> + 'static,
    {
        Self(Rc::new(move || load().boxed_local()))
    }

    fn invoke(&self) -> LoadFuture {
        (self.0)()
    }
}

#[derive(Clone)]
pub enum ComponentRef {
    Ready(Component),
    Lazy(Loader),
}

impl ComponentRef {
    pub fn ready<T: Any>(value: T) -> Self {
        Self::Ready(Component::new(value))
    }

    pub fn lazy<F, Fut>(load: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<Component>> + 'static,
    {
        Self::Lazy(Loader::new(load))
    }
}

type SharedLoad = Shared<LocalBoxFuture<'static, Result<Component, LoadError>>>;

pub(crate) enum ComponentSlot {
    Ready(Component),
    Idle(Loader),
    Loading { loader: Loader, future: SharedLoad },
    Failed { loader: Loader, error: LoadError },
}

impl From<ComponentRef> for ComponentSlot {
    fn from(value: ComponentRef) -> Self {
        match value {
            ComponentRef::Ready(component) => Self::Ready(component),
            ComponentRef::Lazy(loader) => Self::Idle(loader),
        }
    }
}

impl ComponentSlot {
    fn status(&self) -> LoadStatus {
        match self {
            Self::Ready(_) => LoadStatus::Loaded,
            Self::Idle(_) => LoadStatus::NotLoaded,
            Self::Loading { .. } => LoadStatus::Loading,
            Self::Failed { .. } => LoadStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    NotLoaded,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeState {
    pub presence: PresenceFlags,
    pub load: LoadStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    StateChange(NodeState),
    ContentReady,
    LoadFailed(LoadError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeEventKind {
    StateChange,
    ContentReady,
    LoadFailed,
}

impl BusEvent for NodeEvent {
    type Kind = NodeEventKind;

    fn kind(&self) -> Self::Kind {
        match self {
            NodeEvent::StateChange(_) => NodeEventKind::StateChange,
            NodeEvent::ContentReady => NodeEventKind::ContentReady,
            NodeEvent::LoadFailed(_) => NodeEventKind::LoadFailed,
        }
    }
}

enum LoadStart {
    Ready(Component),
    Join(SharedLoad),
    Invoke(Loader),
}

#[derive(Clone)]
pub struct ViewNode {
    id: NodeId,
    tree: ViewTree,
}

impl PartialEq for ViewNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.tree.same(&other.tree)
    }
}

impl fmt::Debug for ViewNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ViewNode").field(&self.id).finish()
    }
}

impl ViewNode {
    pub(crate) fn from_parts(id: NodeId, tree: ViewTree) -> Self {
        Self { id, tree }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.tree.with_node(self.id, |_| ()).is_some()
    }

    pub fn title(&self) -> Option<String> {
        self.tree.with_node(self.id, |entry| entry.title.clone())
    }

    /// Path matched inside the owning router.
    pub fn segment(&self) -> Option<String> {
        self.tree.with_node(self.id, |entry| entry.segment.clone())
    }

    /// Full path, composed through the parent chain.
    pub fn path(&self) -> Option<String> {
        let (router, segment) = self
            .tree
            .with_node(self.id, |entry| (entry.router, entry.segment.clone()))?;
        let base = router::base_path(&self.tree, router);
        Some(router::join_paths(&base, &segment))
    }

    pub fn params(&self) -> Option<RouteParams> {
        self.tree.with_node(self.id, |entry| entry.params.clone())
    }

    /// Node the owning router is currently mounted under.
    pub fn parent(&self) -> Option<ViewNode> {
        let router = self.tree.with_node(self.id, |entry| entry.router)?;
        let parent = self.tree.with_router(router, |router| router.parent_node)??;
        self.tree.node(parent)
    }

    pub fn router(&self) -> Option<Router> {
        let router = self.tree.with_node(self.id, |entry| entry.router)?;
        self.tree.router_by_id(router)
    }

    pub fn child_router(&self) -> Option<Router> {
        let child = self.tree.with_node(self.id, |entry| entry.child_router)??;
        self.tree.router_by_id(child)
    }

    /// The node's presence handle. Transitions made through it are reported like the node
    /// helpers: a node `StateChange` and an update of the router's active set.
    pub fn presence(&self) -> Option<Presence> {
        self.tree.with_node(self.id, |entry| entry.presence.clone())
    }

    /// Current flags; a destroyed node reports all flags cleared.
    pub fn flags(&self) -> PresenceFlags {
        self.presence()
            .map(|presence| presence.flags())
            .unwrap_or_default()
    }

    pub fn presence_state(&self) -> PresenceState {
        self.flags().state()
    }

    pub fn load_status(&self) -> LoadStatus {
        self.tree
            .with_node(self.id, |entry| entry.component.status())
            .unwrap_or(LoadStatus::NotLoaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.load_status() == LoadStatus::Loaded
    }

    pub fn state(&self) -> NodeState {
        NodeState {
            presence: self.flags(),
            load: self.load_status(),
        }
    }

    pub fn component(&self) -> Option<Component> {
        self.tree
            .with_node(self.id, |entry| match &entry.component {
                ComponentSlot::Ready(component) => Some(component.clone()),
                _ => None,
            })
            .flatten()
    }

    pub fn load_error(&self) -> Option<LoadError> {
        self.tree
            .with_node(self.id, |entry| match &entry.component {
                ComponentSlot::Failed { error, .. } => Some(error.clone()),
                _ => None,
            })
            .flatten()
    }

    pub fn sub_view(&self) -> Option<SubView> {
        let title = self.title()?;
        let path = self.path()?;
        Some(SubView {
            node_id: self.id,
            title,
            path,
            presence: self.flags(),
            loaded: self.is_loaded(),
        })
    }

    pub fn on_state_change(
        &self,
        handler: impl Fn(&NodeState) + 'static,
    ) -> Subscription<NodeEvent> {
        self.bus()
            .on(NodeEventKind::StateChange, move |event| {
                if let NodeEvent::StateChange(state) = event {
                    handler(state);
                }
            })
    }

    pub fn on_content_ready(&self, handler: impl Fn() + 'static) -> Subscription<NodeEvent> {
        self.bus()
            .on(NodeEventKind::ContentReady, move |_| handler())
    }

    pub fn on_load_failed(&self, handler: impl Fn(&LoadError) + 'static) -> Subscription<NodeEvent> {
        self.bus().on(NodeEventKind::LoadFailed, move |event| {
            if let NodeEvent::LoadFailed(err) = event {
                handler(err);
            }
        })
    }

    pub fn show(&self) -> bool {
        self.transition(Presence::show)
    }

    pub fn hide(&self) -> bool {
        self.transition(Presence::hide)
    }

    /// Fed by the render boundary when a DOM-level animation finishes.
    pub fn animation_end(&self) -> bool {
        self.transition(Presence::animation_end)
    }

    pub fn ready(&self) -> bool {
        self.transition(Presence::ready)
    }

    pub fn set_show(&self, show: bool) -> bool {
        self.transition(|presence| presence.set_show(show))
    }

    pub fn set_unmounted(&self) -> bool {
        self.transition(Presence::set_unmounted)
    }

    /// Pulls the component. Lazy loaders run once; callers arriving while a load is in
    /// flight share it.
    pub fn load(&self) -> LocalBoxFuture<'static, Result<Component, LoadError>> {
        let id = self.id;
        let start = self
            .tree
            .with_node(id, |entry| match &entry.component {
                ComponentSlot::Ready(component) => LoadStart::Ready(component.clone()),
                ComponentSlot::Loading { future, .. } => LoadStart::Join(future.clone()),
                ComponentSlot::Idle(loader) | ComponentSlot::Failed { loader, .. } => {
                    LoadStart::Invoke(loader.clone())
                }
            });

        let loader = match start {
            None => return future::ready(Err(LoadError::Gone(id))).boxed_local(),
            Some(LoadStart::Ready(component)) => return future::ready(Ok(component)).boxed_local(),
            Some(LoadStart::Join(pending)) => return pending.boxed_local(),
            Some(LoadStart::Invoke(loader)) => loader,
        };

        debug!(node = %id, "invoking component loader");
        let pending = loader.invoke();
        let weak = self.tree.downgrade();
        let shared = async move {
            let outcome = pending.await.map_err(|err| LoadError::Failed {
                node: id,
                message: format!("{err:#}"),
            });
            finish_load(&weak, id, &outcome);
            outcome
        }
        .boxed_local()
        .shared();

        let stored = self.tree.with_node_mut(id, |entry| {
            entry.component = ComponentSlot::Loading {
                loader,
                future: shared.clone(),
            };
        });
        if stored.is_some() {
            self.emit_state();
        }
        shared.boxed_local()
    }

    /// Tears the node down: presence, listeners, the child router's nodes and its router's
    /// references. The next visit to its path resolves a fresh node.
    pub fn destroy(&self) -> bool {
        let Some(entry) = self.tree.remove_node(self.id) else {
            return false;
        };
        entry.presence.destroy();
        entry.bus.destroy();

        // The child router belongs to whoever built it; only its nodes go away.
        if let Some(child) = entry.child_router.and_then(|id| self.tree.router_by_id(id)) {
            child.detach_from(self.id);
        }

        let membership_changed = self
            .tree
            .with_router_mut(entry.router, |router| {
                router.cache.retain(|_, node| *node != self.id);
                if router.matched == Some(self.id) {
                    router.matched = None;
                }
                let before = router.active.len();
                router.active.retain(|node| *node != self.id);
                before != router.active.len()
            })
            .unwrap_or(false);

        debug!(node = %self.id, path = %entry.segment, "view node destroyed");
        if membership_changed {
            router::emit_sub_views(&self.tree, entry.router);
        }
        true
    }

    fn bus(&self) -> EventBus<NodeEvent> {
        self.tree
            .with_node(self.id, |entry| entry.bus.clone())
            .unwrap_or_else(EventBus::detached)
    }

    pub(crate) fn emit_state(&self) {
        let Some(bus) = self.tree.with_node(self.id, |entry| entry.bus.clone()) else {
            return;
        };
        bus.emit(&NodeEvent::StateChange(self.state()));
    }

    /// Runs a presence transition. The listener installed by [`watch_presence`] emits the
    /// node state change and keeps the router's active set in step.
    pub(crate) fn transition(&self, action: impl FnOnce(&Presence) -> bool) -> bool {
        match self.presence() {
            Some(presence) => action(&presence),
            None => false,
        }
    }
}

/// Forwards every flag change of `presence` to the node it belongs to.
pub(crate) fn watch_presence(tree: &ViewTree, router: RouterId, node: NodeId, presence: &Presence) {
    let weak = tree.downgrade();
    presence.on_state_change(move |flags| {
        let Some(tree) = weak.upgrade() else {
            return;
        };
        ViewNode::from_parts(node, tree.clone()).emit_state();
        router::sync_membership(&tree, router, node, flags.mounted);
    });
}

fn finish_load(tree: &WeakViewTree, id: NodeId, outcome: &Result<Component, LoadError>) {
    let Some(tree) = tree.upgrade() else {
        return;
    };
    let bus = tree.with_node_mut(id, |entry| {
        let loader = match &entry.component {
            ComponentSlot::Loading { loader, .. } => loader.clone(),
            _ => return None,
        };
        entry.component = match outcome {
            Ok(component) => ComponentSlot::Ready(component.clone()),
            Err(error) => ComponentSlot::Failed {
                loader,
                error: error.clone(),
            },
        };
        Some(entry.bus.clone())
    });
    let Some(bus) = bus.flatten() else {
        return;
    };

    let node = ViewNode::from_parts(id, tree);
    match outcome {
        Ok(_) => {
            info!(node = %id, "component loaded");
            bus.emit(&NodeEvent::ContentReady);
        }
        Err(err) => {
            warn!(node = %id, error = %err, "component loader failed");
            bus.emit(&NodeEvent::LoadFailed(err.clone()));
        }
    }
    node.emit_state();
}

#[cfg(test)]
#[path = "tests/node_tests.rs"]
mod tests;
