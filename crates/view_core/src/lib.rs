//! Reactive view core: an event bus, a presence state machine, and a hierarchical router
//! that resolves nested paths into lazily loaded view nodes.
//!
//! Everything is single-threaded. Handles ([`Router`], [`ViewNode`], [`Presence`]) are cheap
//! clones into a shared [`ViewTree`] and may be captured by listeners and resolvers.

pub mod config;
pub mod error;
pub mod event_bus;
pub mod history;
pub mod node;
pub mod presence;
pub mod router;
pub mod tree;

pub use config::{load_settings, PresenceMode, ShellSettings};
pub use error::{LoadError, NavigationError, RouterError};
pub use event_bus::{BusEvent, EventBus, ListenerId, Subscription};
pub use history::{LocationSource, MemoryHistory, Navigator};
pub use node::{Component, ComponentRef, LoadStatus, Loader, NodeEvent, NodeState, ViewNode};
pub use presence::{Presence, PresenceEvent};
pub use router::{Navigation, Resolved, RouteParams, RoutePattern, Router, RouterEvent};
pub use tree::ViewTree;

pub use shared::{
    domain::{NavigationType, NodeId, PresenceState, RouterId},
    protocol::{Location, PresenceFlags, SubView},
};
