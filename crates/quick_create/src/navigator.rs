use anyhow::{anyhow, Context, Result};
use url::Url;

/// Turns a logical `module/action` route into an absolute URL.
pub trait Navigator: Send + Sync {
    fn build_url(&self, route: &str, query: &[(&str, &str)]) -> Result<String>;
}

/// Resolves routes against a fixed base URL: `venue/edit` -> `<base>/venue/edit`.
///
/// A query string embedded in the route (`event/edit?id=7`) is kept and
/// `query` pairs are appended after it.
#[derive(Debug, Clone)]
pub struct RouteNavigator {
    base: Url,
}

impl RouteNavigator {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base =
            Url::parse(base_url).with_context(|| format!("invalid base url '{base_url}'"))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("base url '{base_url}' cannot carry routes"));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.set_query(None);
        base.set_fragment(None);
        Ok(Self { base })
    }

    /// Path of the base URL, always ending in `/`. Links rendered by the host start with it.
    pub fn base_path(&self) -> &str {
        self.base.path()
    }
}

impl Navigator for RouteNavigator {
    fn build_url(&self, route: &str, query: &[(&str, &str)]) -> Result<String> {
        let route = route.trim_start_matches('/');
        let path = route.split('?').next().unwrap_or_default();
        let mut segments = path.split('/');
        let (Some(module), Some(action), None) = (segments.next(), segments.next(), segments.next())
        else {
            return Err(anyhow!("route '{route}' is not of the form module/action"));
        };
        if module.is_empty() || action.is_empty() {
            return Err(anyhow!("route '{route}' is not of the form module/action"));
        }
        // A colon in the first segment would be read as a URL scheme.
        if module.contains(':') {
            return Err(anyhow!("route '{route}' names an invalid module"));
        }

        let mut url = self
            .base
            .join(route)
            .with_context(|| format!("failed to resolve route '{route}'"))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url.into())
    }
}

#[cfg(test)]
#[path = "tests/navigator_tests.rs"]
mod tests;
