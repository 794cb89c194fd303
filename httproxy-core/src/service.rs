//! Hyper service binding the proxy pipeline to inbound connections.

use std::{convert::Infallible, net::SocketAddr, pin::Pin, sync::Arc};

use http::{Request, Response};
use hyper::{
    body::{Body, Bytes, Incoming},
    service::Service as HyperService,
};
use tracing::debug;

use crate::{
    body::{self, ProxyBody},
    error::BoxError,
    middleware::Middleware,
    proxy::ReverseProxy,
};

/// Per-connection handle on the shared proxy.
///
/// Cloned for every accepted connection; `from` records the peer address.
#[derive(Clone)]
pub struct ProxyService {
    proxy: Arc<ReverseProxy>,
    middleware: Middleware,
    pub from: Option<SocketAddr>,
}

impl ProxyService {
    pub fn new(proxy: Arc<ReverseProxy>, middleware: Middleware) -> Self {
        Self {
            proxy,
            middleware,
            from: None,
        }
    }

    /// Returns a copy bound to the given peer address.
    pub fn for_peer(&self, from: SocketAddr) -> Self {
        let mut service = self.clone();
        service.from = Some(from);
        service
    }

    pub fn proxy(&self) -> &Arc<ReverseProxy> {
        &self.proxy
    }

    /// Runs middleware and the proxy for one request.
    pub async fn process<B>(&self, req: Request<B>) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        debug!("Processing request: {} {}", req.method(), req.uri());

        let req = req.map(body::boxed);
        let (req, summary) = self.middleware.process_incoming(self.from, req).await;
        let response = self.proxy.handle(req, self.from).await;
        self.middleware.process_outgoing(&summary, response.status());
        response
    }
}

impl HyperService<Request<Incoming>> for ProxyService {
    type Response = Response<ProxyBody>;

    type Error = Infallible;

    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.process(req).await) })
    }
}
