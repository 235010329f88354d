//! Client-side session state
//!
//! This module provides:
//! - The session store with sign-in, sign-out and rehydration
//! - Listener subscription for state transitions
//! - A persisted snapshot of the observable state

mod store;
mod subscribers;

pub use store::{AuthStore, AuthStoreBuilder};
pub use subscribers::Subscription;
