//! Request extractors.
//!
//! - [`owner::RequestOwner`] -- Caller identity from the `X-User-Id` header.

pub mod owner;
