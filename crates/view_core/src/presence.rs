//! Mount/visibility lifecycle of a view, independent of routing.
//!
//! `Hidden -> Entering -> Visible -> Exiting -> Hidden`. Each arrow on the way in and out is
//! split in two: `show`/`hide` start the phase and `animation_end` completes it. Headless
//! callers collapse a phase by calling `animation_end` right away.

use std::{cell::RefCell, rc::Rc};

use shared::{domain::PresenceState, protocol::PresenceFlags};
use tracing::debug;

use crate::event_bus::{BusEvent, EventBus, Subscription};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    StateChange(PresenceFlags),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenceEventKind {
    StateChange,
}

impl BusEvent for PresenceEvent {
    type Kind = PresenceEventKind;

    fn kind(&self) -> Self::Kind {
        match self {
            PresenceEvent::StateChange(_) => PresenceEventKind::StateChange,
        }
    }
}

struct PresenceInner {
    flags: PresenceFlags,
    destroyed: bool,
}

#[derive(Clone)]
pub struct Presence {
    inner: Rc<RefCell<PresenceInner>>,
    bus: EventBus<PresenceEvent>,
}

impl Default for Presence {
    fn default() -> Self {
        Self::new()
    }
}

impl Presence {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(PresenceInner {
                flags: PresenceFlags::default(),
                destroyed: false,
            })),
            bus: EventBus::new(),
        }
    }

    pub fn flags(&self) -> PresenceFlags {
        self.inner.borrow().flags
    }

    pub fn state(&self) -> PresenceState {
        self.flags().state()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.borrow().destroyed
    }

    pub fn on_state_change(
        &self,
        handler: impl Fn(&PresenceFlags) + 'static,
    ) -> Subscription<PresenceEvent> {
        self.bus
            .on(PresenceEventKind::StateChange, move |event| match event {
                PresenceEvent::StateChange(flags) => handler(flags),
            })
    }

    /// Starts entering. An exiting view is reversed back into entering.
    pub fn show(&self) -> bool {
        self.transition("show", |flags| match flags.state() {
            PresenceState::Hidden => {
                flags.mounted = true;
                flags.entering = true;
                true
            }
            PresenceState::Exiting => {
                flags.exiting = false;
                flags.entering = true;
                true
            }
            PresenceState::Entering | PresenceState::Visible => false,
        })
    }

    /// Starts exiting. An entering view is cut short into exiting.
    pub fn hide(&self) -> bool {
        self.transition("hide", |flags| match flags.state() {
            PresenceState::Visible | PresenceState::Entering => {
                flags.entering = false;
                flags.visible = false;
                flags.exiting = true;
                true
            }
            PresenceState::Hidden | PresenceState::Exiting => false,
        })
    }

    /// Completes whichever phase is in flight.
    pub fn animation_end(&self) -> bool {
        self.transition("animation_end", |flags| match flags.state() {
            PresenceState::Entering => complete_enter(flags),
            PresenceState::Exiting => complete_exit(flags),
            PresenceState::Hidden | PresenceState::Visible => false,
        })
    }

    /// Completes an entering phase; ignored in any other state.
    pub fn ready(&self) -> bool {
        self.transition("ready", |flags| {
            flags.state() == PresenceState::Entering && complete_enter(flags)
        })
    }

    /// Completes an exiting phase; ignored in any other state.
    pub fn set_unmounted(&self) -> bool {
        self.transition("set_unmounted", |flags| {
            flags.state() == PresenceState::Exiting && complete_exit(flags)
        })
    }

    pub fn set_show(&self, show: bool) -> bool {
        if show {
            self.show()
        } else {
            self.hide()
        }
    }

    /// Clears every flag and drops all listeners without emitting. Safe to call twice.
    pub fn destroy(&self) -> bool {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.destroyed {
                return false;
            }
            inner.destroyed = true;
            inner.flags = PresenceFlags::default();
        }
        self.bus.destroy();
        true
    }

    fn transition(
        &self,
        action: &'static str,
        apply: impl FnOnce(&mut PresenceFlags) -> bool,
    ) -> bool {
        let flags = {
            let mut inner = self.inner.borrow_mut();
            if inner.destroyed {
                return false;
            }
            let from = inner.flags.state();
            if !apply(&mut inner.flags) {
                return false;
            }
            debug!(action, ?from, to = ?inner.flags.state(), "presence transition");
            inner.flags
        };
        self.bus.emit(&PresenceEvent::StateChange(flags));
        true
    }
}

fn complete_enter(flags: &mut PresenceFlags) -> bool {
    flags.entering = false;
    flags.visible = true;
    true
}

fn complete_exit(flags: &mut PresenceFlags) -> bool {
    flags.exiting = false;
    flags.mounted = false;
    true
}

#[cfg(test)]
#[path = "tests/presence_tests.rs"]
mod tests;
