//! Subscription registry.
//!
//! Maps an owning context to its live subscriptions, each stored as the
//! teardown that detaches the remote watch:
//! - `register` replaces and tears down any earlier subscription for the same identity
//! - `unregister` tears down one identity, silently ignoring absent ones
//! - `unregister_all` tears down a whole context and ends its generation, releasing
//!   the relationship hooks it installed
//!
//! # Example
//!
//! ```ignore
//! let registry = SubscriptionRegistry::new();
//! let ctx = ContextId::from("route:posts");
//!
//! registry.register(&ctx, identity.clone(), teardown);
//! registry.unregister(&ctx, &identity);
//! registry.unregister_all(&ctx);
//! ```

mod manager;

pub use manager::{ClosedContext, SubscriptionRegistry};
