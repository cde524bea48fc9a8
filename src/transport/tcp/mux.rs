use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::handler::Handler;

/// Auxiliary routes served next to the RPC path, such as health checks.
///
/// Routes are matched on the exact request path. They never consult the
/// registry.
#[derive(Clone, Default)]
pub struct Mux {
    routes: HashMap<String, Arc<dyn Handler>>,
}

impl Mux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(mut self, path: impl Into<String>, handler: impl Handler) -> Self {
        self.routes.insert(path.into(), Arc::new(handler));
        self
    }

    pub(crate) fn route(&self, path: &str) -> Option<Arc<dyn Handler>> {
        self.routes.get(path).cloned()
    }
}

impl fmt::Debug for Mux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<_> = self.routes.keys().collect();
        paths.sort();
        f.debug_struct("Mux").field("paths", &paths).finish()
    }
}
