//! Image generation providers and load balancing.
//!
//! - [`provider`]: the [`ImageProvider`](provider::ImageProvider) trait and
//!   its request/response types.
//! - [`client`]: HTTP implementation against a remote generation server.
//! - [`balancer`]: provider selection, health probing, and stats.

pub mod balancer;
pub mod client;
pub mod provider;

pub use balancer::{BalanceStrategy, BalancerStats, LoadBalancer, SelectedProvider};
pub use client::HttpImageProvider;
pub use provider::{GeneratedImage, GenerationRequest, ImageProvider, ProviderError};
