use crate::config::{AppConfig, MatchMode};
use crate::error::RouteError;
use crate::route::{Route, RouteMatch, RouteMatcher};
use tracing::{debug, warn};

/// Ordered, immutable route list.
///
/// Routes are kept in declaration order and consulted in reverse, so a
/// later, more specific prefix is tried before an earlier, general one and
/// the empty catch-all prefix is effectively last.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
    mode: MatchMode,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>, mode: MatchMode) -> Self {
        Self { routes, mode }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let routes = config
            .routes
            .iter()
            .map(|r| Route::from_config(r, &config.upstream))
            .collect();
        Self::new(routes, config.routing.match_mode)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Like [`RouteMatcher::match_path`], with an explicit no-route error
    pub fn resolve(&self, path: &str) -> Result<RouteMatch<'_>, RouteError> {
        self.match_path(path).ok_or_else(|| {
            warn!("No route matched path: {}", path);
            RouteError::NoRouteMatched {
                path: path.to_string(),
            }
        })
    }
}

impl RouteMatcher for RouteTable {
    fn match_path(&self, path: &str) -> Option<RouteMatch<'_>> {
        let route = self
            .routes
            .iter()
            .rev()
            .find(|route| prefix_matches(&route.path_prefix, path, self.mode))?;

        let upstream_path = strip_prefix(path, &route.path_prefix);
        debug!(
            "Route match: {} -> {} {}",
            path,
            route.authority(),
            upstream_path
        );

        Some(RouteMatch {
            route,
            upstream_path,
        })
    }
}

/// Test whether `prefix` owns `path` under the given mode
pub fn prefix_matches(prefix: &str, path: &str, mode: MatchMode) -> bool {
    if !path.starts_with(prefix) {
        return false;
    }
    match mode {
        MatchMode::Prefix => true,
        MatchMode::Segment => {
            if prefix.is_empty() || prefix.ends_with('/') {
                return true;
            }
            matches!(path.as_bytes().get(prefix.len()), None | Some(b'/' | b'?'))
        }
    }
}

/// Remove `prefix` from `path`; the result always starts with `/`.
///
/// `/api/users` with `/api` gives `/users`, `/api` gives `/`, and
/// `/api?x=1` gives `/?x=1`.
pub fn strip_prefix(path: &str, prefix: &str) -> String {
    let rest = path.strip_prefix(prefix).unwrap_or(path);
    if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{}", rest)
    }
}
