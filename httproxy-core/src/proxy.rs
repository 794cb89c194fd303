//! The forwarding pipeline.
//!
//! `ReverseProxy::handle` runs one request end to end: pick an upstream,
//! rewrite the request, forward it, optionally follow one redirect, and turn
//! any failure into the configured error response.

use std::net::SocketAddr;

use http::{Request, Response, header, request::Parts};
use hyper::body::{Body, Bytes};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tokio::time::timeout_at;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::{debug, error, warn};

use crate::{
    body::{self, DeadlineBody, ProxyBody},
    config::ProxyConfig,
    director::{ForwardContext, direct},
    error::{BoxError, ProxyError, Result},
    load_balancer::LoadBalancer,
    redirect,
    upstream::UpstreamSet,
    utils::remove_hop_by_hop_headers,
};

type HttpClient = Client<HttpsConnector<HttpConnector>, ProxyBody>;

/// Reverse proxy over a fixed set of upstreams.
///
/// Cheap to share behind an `Arc`; nothing in it is mutated after construction.
pub struct ReverseProxy {
    load_balancer: LoadBalancer,
    config: ProxyConfig,
    client: HttpClient,
}

impl ReverseProxy {
    /// Creates the proxy. Upstream validation already happened in `UpstreamSet`.
    pub fn new(upstreams: UpstreamSet, config: ProxyConfig) -> Self {
        debug!(
            "Creating proxy with {} upstream(s), follow_redirects: {}, timeout: {:?}",
            upstreams.len(),
            config.follow_redirects,
            config.timeout
        );
        Self {
            load_balancer: LoadBalancer::new(upstreams),
            config,
            client: build_client(),
        }
    }

    /// Parses `urls` and creates the proxy, failing on an empty or invalid list.
    pub fn from_urls<I, S>(urls: I, config: ProxyConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::new(UpstreamSet::new(urls)?, config))
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn upstreams(&self) -> &UpstreamSet {
        self.load_balancer.upstreams()
    }

    /// Proxies one request. Never fails: errors become the configured error response.
    pub async fn handle<B>(&self, req: Request<B>, client_addr: Option<SocketAddr>) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (mut parts, body) = req.into_parts();
        let upstream = self.load_balancer.select();
        debug!("Selected upstream {} for {} {}", upstream, parts.method, parts.uri);

        let ctx = match direct(&mut parts, upstream, self.config.timeout, client_addr) {
            Ok(ctx) => ctx,
            Err(e) => return self.error_response(&upstream.to_string(), &e),
        };

        match self.round_trip(parts, body::boxed(body), &ctx).await {
            Ok(response) => response,
            Err(e) => self.error_response(&ctx.upstream, &e),
        }
    }

    async fn round_trip(
        &self,
        parts: Parts,
        body: ProxyBody,
        ctx: &ForwardContext,
    ) -> Result<Response<ProxyBody>> {
        let response = self.forward(Request::from_parts(parts, body), ctx).await?;
        if self.config.follow_redirects {
            self.follow_redirect(response, ctx).await
        } else {
            Ok(response)
        }
    }

    /// Sends the rewritten request and streams the upstream response back.
    async fn forward(&self, req: Request<ProxyBody>, ctx: &ForwardContext) -> Result<Response<ProxyBody>> {
        debug!("Sending {} request to {}", req.method(), ctx.target);

        let response = self
            .with_deadline(ctx, self.client.request(req))
            .await?
            .map_err(|e| ProxyError::forwarding(ctx.upstream.clone(), e))?;

        debug!("Upstream {} responded with {}", ctx.upstream, response.status());

        let (mut parts, incoming) = response.into_parts();
        remove_hop_by_hop_headers(&mut parts.headers);
        Ok(Response::from_parts(parts, self.bounded_body(body::boxed(incoming), ctx)))
    }

    /// Replaces a redirect response with one GET to its `Location`.
    ///
    /// The follow-up shares the remaining deadline of the original request.
    async fn follow_redirect(
        &self,
        response: Response<ProxyBody>,
        ctx: &ForwardContext,
    ) -> Result<Response<ProxyBody>> {
        let (parts, original_body) = response.into_parts();
        let Some(location) = redirect::location(&parts, &ctx.target) else {
            return Ok(Response::from_parts(parts, original_body));
        };
        // The redirect body is never shown to the caller once followed.
        drop(original_body);

        debug!("Following redirect from {} to {}", ctx.upstream, location);

        let (uri, auth) = redirect::follow_up_target(&location)
            .map_err(|e| ProxyError::redirect(location.as_str(), e))?;
        let mut follow_up = Request::get(uri)
            .body(body::empty())
            .map_err(|e| ProxyError::redirect(location.as_str(), e))?;
        if let Some(auth) = auth {
            follow_up.headers_mut().insert(header::AUTHORIZATION, auth);
        }

        let followed = self
            .with_deadline(ctx, self.client.request(follow_up))
            .await?
            .map_err(|e| ProxyError::redirect(location.as_str(), e))?;

        debug!("Redirect target {} responded with {}", location, followed.status());

        let followed = followed.map(|incoming| self.bounded_body(body::boxed(incoming), ctx));
        let mut response = Response::from_parts(parts, body::empty());
        redirect::merge_followed(&mut response, followed);
        Ok(response)
    }

    /// Awaits `fut`, giving up at the request deadline.
    async fn with_deadline<F: Future>(&self, ctx: &ForwardContext, fut: F) -> Result<F::Output> {
        match ctx.deadline {
            Some(deadline) => timeout_at(deadline, fut).await.map_err(|_| ctx.timeout_error()),
            None => Ok(fut.await),
        }
    }

    /// Makes the response body obey the request deadline as well.
    fn bounded_body(&self, body: ProxyBody, ctx: &ForwardContext) -> ProxyBody {
        match (ctx.deadline, ctx.timeout) {
            (Some(deadline), Some(timeout)) => body::boxed(DeadlineBody::new(
                body,
                deadline,
                timeout,
                ctx.upstream.clone(),
            )),
            _ => body,
        }
    }

    /// Terminal failure path: log and answer with the configured status and body.
    pub fn error_response(&self, upstream: &str, err: &ProxyError) -> Response<ProxyBody> {
        error!(upstream = %upstream, error = %err, "Proxy error");

        let body = if self.config.error_body.is_empty() {
            body::empty()
        } else {
            body::full(self.config.error_body.clone())
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.config.error_status;
        response
    }
}

fn build_client() -> HttpClient {
    let connector = match HttpsConnectorBuilder::new().with_native_roots() {
        Ok(builder) => builder.https_or_http().enable_http1().build(),
        Err(e) => {
            warn!("Failed to load native root certificates, https upstreams will not verify: {e}");
            let tls = ClientConfig::builder()
                .with_root_certificates(RootCertStore::empty())
                .with_no_client_auth();
            HttpsConnectorBuilder::new()
                .with_tls_config(tls)
                .https_or_http()
                .enable_http1()
                .build()
        }
    };
    Client::builder(TokioExecutor::new()).build(connector)
}
