//! Router dispatcher
//!
//! The health route plus seven resource groups, each mounted under a fixed
//! prefix:
//! - auth, users: accounts and sessions
//! - dishes, categories: the menu
//! - orders, cart: ordering
//! - reviews: dish reviews
//!
//! Group handlers live outside this crate and are handed in through
//! [`Collaborators`]. A group nobody mounted answers 404 like any other
//! unknown path.

pub mod health;

use std::collections::BTreeMap;
use std::fmt;

use axum::extract::OriginalUri;
use axum::routing::get;
use axum::Router;

use crate::error::ApiError;
use crate::state::AppContext;

pub use health::{health_check, HealthResponse};

pub const HEALTH_PATH: &str = "/api/health";

/// Resource group mounted under `/api`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resource {
    Auth,
    Users,
    Dishes,
    Categories,
    Orders,
    Cart,
    Reviews,
}

impl Resource {
    pub const ALL: [Resource; 7] = [
        Self::Auth,
        Self::Users,
        Self::Dishes,
        Self::Categories,
        Self::Orders,
        Self::Cart,
        Self::Reviews,
    ];

    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Auth => "/api/auth",
            Self::Users => "/api/users",
            Self::Dishes => "/api/dishes",
            Self::Categories => "/api/categories",
            Self::Orders => "/api/orders",
            Self::Cart => "/api/cart",
            Self::Reviews => "/api/reviews",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Handler sets for the resource groups, keyed by [`Resource`]
#[derive(Default)]
pub struct Collaborators {
    groups: BTreeMap<Resource, Router<AppContext>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `router` under the prefix of `resource`. Mounting the same
    /// resource twice replaces the earlier router.
    pub fn mount(mut self, resource: Resource, router: Router<AppContext>) -> Self {
        if self.groups.insert(resource, router).is_some() {
            tracing::warn!(prefix = resource.prefix(), "route group mounted twice, keeping the last");
        }
        self
    }

    pub fn is_mounted(&self, resource: Resource) -> bool {
        self.groups.contains_key(&resource)
    }

    pub fn mounted(&self) -> impl Iterator<Item = Resource> + '_ {
        self.groups.keys().copied()
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.groups.keys()).finish()
    }
}

/// All routes plus the not-found fallback, still waiting for state
pub fn api_router(collaborators: Collaborators) -> Router<AppContext> {
    let mut router = Router::new().route(HEALTH_PATH, get(health_check));

    for resource in Resource::ALL {
        match collaborators.groups.get(&resource) {
            Some(group) => {
                tracing::debug!(prefix = resource.prefix(), "mounting route group");
                router = router.nest(resource.prefix(), group.clone());
            }
            None => tracing::debug!(prefix = resource.prefix(), "no handlers for route group"),
        }
    }

    router.fallback(not_found)
}

/// Fallback for anything no route matched
pub async fn not_found(OriginalUri(uri): OriginalUri) -> ApiError {
    ApiError::not_found(uri.path())
}
