use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    domain::{NavigationType, NodeId, PresenceState},
    error::{ErrorCode, ShellException},
};

const PARSE_BASE: &str = "http://shell.local/";

/// A navigation request as delivered by a location source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub pathname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default)]
    pub navigation: NavigationType,
}

impl Location {
    pub fn new(pathname: impl AsRef<str>) -> Self {
        Self {
            pathname: normalize_path(pathname.as_ref()),
            query: None,
            navigation: NavigationType::Initial,
        }
    }

    pub fn with_navigation(mut self, navigation: NavigationType) -> Self {
        self.navigation = navigation;
        self
    }

    /// Parses an absolute URL or a bare path (`/drive/1?sort=name`).
    pub fn parse(href: &str) -> Result<Self, ShellException> {
        let base = Url::parse(PARSE_BASE)
            .map_err(|err| ShellException::new(ErrorCode::InvalidLocation, err.to_string()))?;
        let url = base.join(href.trim()).map_err(|err| {
            ShellException::new(
                ErrorCode::InvalidLocation,
                format!("invalid location '{href}': {err}"),
            )
        })?;

        Ok(Self {
            pathname: normalize_path(url.path()),
            query: url.query().filter(|q| !q.is_empty()).map(str::to_string),
            navigation: NavigationType::Initial,
        })
    }

    pub fn segments(&self) -> Vec<&str> {
        path_segments(&self.pathname)
    }

    pub fn href(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{query}", self.pathname),
            None => self.pathname.clone(),
        }
    }
}

/// Collapses repeated slashes, forces a leading slash and drops a trailing one.
pub fn normalize_path(raw: &str) -> String {
    let segments = path_segments(raw);
    if segments.is_empty() {
        return "/".to_string();
    }
    format!("/{}", segments.join("/"))
}

pub fn path_segments(raw: &str) -> Vec<&str> {
    raw.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// Presence flags as read by the render boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PresenceFlags {
    pub mounted: bool,
    pub visible: bool,
    pub entering: bool,
    pub exiting: bool,
}

impl PresenceFlags {
    pub fn state(&self) -> PresenceState {
        if self.entering {
            PresenceState::Entering
        } else if self.exiting {
            PresenceState::Exiting
        } else if self.visible {
            PresenceState::Visible
        } else {
            PresenceState::Hidden
        }
    }
}

/// One entry of a router's active children, in activation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubView {
    pub node_id: NodeId,
    pub title: String,
    pub path: String,
    pub presence: PresenceFlags,
    pub loaded: bool,
}
