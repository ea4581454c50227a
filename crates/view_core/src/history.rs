//! Bridge between a location source (browser history, a test double) and the root router.

use shared::{domain::NavigationType, protocol::Location};
use tracing::debug;

use crate::{
    error::NavigationError,
    router::{Navigation, Router},
};

pub trait LocationSource {
    fn current(&self) -> Option<Location>;

    /// Records a new entry, dropping anything forward of the current one.
    fn push(&mut self, location: Location) -> Location;

    fn replace(&mut self, location: Location) -> Location;

    fn back(&mut self) -> Option<Location>;

    fn forward(&mut self) -> Option<Location>;
}

/// In-memory entry stack with a cursor.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    entries: Vec<Location>,
    cursor: usize,
}

impl MemoryHistory {
    pub fn new(initial: Location) -> Self {
        Self {
            entries: vec![initial],
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Location] {
        &self.entries
    }

    fn step(&mut self, forward: bool) -> Option<Location> {
        let target = if forward {
            self.cursor.checked_add(1).filter(|next| *next < self.entries.len())?
        } else {
            self.cursor.checked_sub(1)?
        };
        self.cursor = target;
        let entry = self.entries.get_mut(target)?;
        entry.navigation = NavigationType::Pop;
        Some(entry.clone())
    }
}

impl LocationSource for MemoryHistory {
    fn current(&self) -> Option<Location> {
        self.entries.get(self.cursor).cloned()
    }

    fn push(&mut self, location: Location) -> Location {
        let location = location.with_navigation(NavigationType::Push);
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(location.clone());
        self.cursor = self.entries.len() - 1;
        location
    }

    fn replace(&mut self, location: Location) -> Location {
        let location = location.with_navigation(NavigationType::Replace);
        match self.entries.get_mut(self.cursor) {
            Some(entry) => *entry = location.clone(),
            None => {
                self.entries.push(location.clone());
                self.cursor = self.entries.len() - 1;
            }
        }
        location
    }

    fn back(&mut self) -> Option<Location> {
        self.step(false)
    }

    fn forward(&mut self) -> Option<Location> {
        self.step(true)
    }
}

/// Drives the root router from a location source.
///
/// `navigate`/`replace` are outbound: the source is asked to move, then the router follows.
/// `location_changed` is inbound: the source already moved (popstate) and only the router
/// needs to catch up.
pub struct Navigator<S: LocationSource> {
    root: Router,
    source: S,
}

impl<S: LocationSource> Navigator<S> {
    pub fn new(root: Router, source: S) -> Self {
        Self { root, source }
    }

    pub fn root(&self) -> &Router {
        &self.root
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn navigate(&mut self, href: &str) -> Result<Navigation, NavigationError> {
        let location = self.source.push(Location::parse(href)?);
        debug!(href = %location.href(), "push navigation");
        Ok(self.root.start(&location)?)
    }

    pub fn replace(&mut self, href: &str) -> Result<Navigation, NavigationError> {
        let location = self.source.replace(Location::parse(href)?);
        debug!(href = %location.href(), "replace navigation");
        Ok(self.root.start(&location)?)
    }

    /// `Ok(None)` when there is no earlier entry.
    pub fn back(&mut self) -> Result<Option<Navigation>, NavigationError> {
        match self.source.back() {
            Some(location) => Ok(Some(self.root.start(&location)?)),
            None => Ok(None),
        }
    }

    pub fn forward(&mut self) -> Result<Option<Navigation>, NavigationError> {
        match self.source.forward() {
            Some(location) => Ok(Some(self.root.start(&location)?)),
            None => Ok(None),
        }
    }

    pub fn location_changed(&mut self, location: &Location) -> Result<Navigation, NavigationError> {
        Ok(self.root.start(location)?)
    }

    /// Re-runs the source's current entry, e.g. on first load.
    pub fn sync(&mut self) -> Result<Option<Navigation>, NavigationError> {
        match self.source.current() {
            Some(location) => Ok(Some(self.root.start(&location)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;
