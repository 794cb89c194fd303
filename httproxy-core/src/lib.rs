//! httproxy - a load-balancing reverse HTTP proxy
//!
//! Every inbound request is sent to one randomly chosen upstream, with the
//! request rewritten for that target (path, host, credentials, deadline).
//! Redirects can optionally be followed for one hop, and any failure turns
//! into a configurable error response.
//!
//! The main components are organized into the following modules:
//! - `upstream`: Upstream targets and the immutable upstream set
//! - `load_balancer`: Random upstream selection
//! - `director`: Request rewriting for the selected upstream
//! - `proxy`: Forwarding, redirect following and error handling
//! - `redirect`: Single-hop redirect resolution and response merging
//! - `middleware`: Request dumping and access logging
//! - `service`: Hyper service wrapping the pipeline
//! - `server`: Listener, optional TLS and connection handling

pub mod body;
pub mod config;
pub mod director;
pub mod error;
pub mod load_balancer;
pub mod middleware;
pub mod proxy;
pub mod redirect;
pub mod server;
pub mod service;
pub mod upstream;
pub mod utils;

pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
pub use proxy::ReverseProxy;
pub use hyper;
