//! Per-request middleware chain.
//!
//! Built once per matched request from three sources, in this fixed order:
//!
//! 1. global middlewares
//! 2. the route's group middlewares, when the route was registered in a group
//! 3. the route's own middlewares
//!
//! then capped by the route handler. Nothing is deduplicated: a middleware
//! registered both globally and on the group runs twice.

use crate::handler::BoxedHandler;
use crate::middleware::BoxedMiddleware;
use crate::router::RouteEntry;

pub(crate) struct Chain {
    middlewares: Vec<BoxedMiddleware>,
    handler: BoxedHandler,
}

/// What sits at a given cursor position.
pub(crate) enum Stage<'a> {
    Middleware(&'a BoxedMiddleware),
    Handler(&'a BoxedHandler),
    /// Past the handler. Further `next()` calls are no-ops.
    Done,
}

impl Chain {
    pub(crate) fn assemble(
        global: &[BoxedMiddleware],
        group: Option<&[BoxedMiddleware]>,
        route: &RouteEntry,
    ) -> Self {
        let group = group.unwrap_or_default();
        let mut middlewares =
            Vec::with_capacity(global.len() + group.len() + route.middlewares().len());
        middlewares.extend_from_slice(global);
        middlewares.extend_from_slice(group);
        middlewares.extend_from_slice(route.middlewares());
        Self { middlewares, handler: route.handler().clone() }
    }

    /// A chain with no middleware at all (mounted sub-routers).
    pub(crate) fn terminal(handler: BoxedHandler) -> Self {
        Self { middlewares: Vec::new(), handler }
    }

    #[cfg(test)]
    pub(crate) fn from_parts(middlewares: Vec<BoxedMiddleware>, handler: BoxedHandler) -> Self {
        Self { middlewares, handler }
    }

    pub(crate) fn stage(&self, position: usize) -> Stage<'_> {
        match position.cmp(&self.middlewares.len()) {
            std::cmp::Ordering::Less => Stage::Middleware(&self.middlewares[position]),
            std::cmp::Ordering::Equal => Stage::Handler(&self.handler),
            std::cmp::Ordering::Greater => Stage::Done,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.middlewares.len()
    }
}
