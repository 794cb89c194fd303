use std::sync::Arc;

use anyhow::Result;
use clap::Parser as _;
use httproxy_core::{
    ReverseProxy,
    middleware::Middleware,
    server::{Server, load_tls_acceptor},
    service::ProxyService,
    upstream::UpstreamSet,
};
use tracing::{Instrument as _, info, info_span};

mod config;
mod logging;

use config::{Args, Settings};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let settings = match Settings::load(args) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {e:#}");
            std::process::exit(2);
        }
    };

    if let Err(e) = logging::init_logging(settings.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let span = info_span!("httproxy", prefix = %settings.prefix);
    if let Err(e) = run(settings).instrument(span).await {
        tracing::error!("Fatal: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(settings: Settings) -> Result<()> {
    let upstreams = UpstreamSet::new(&settings.urls)?;

    info!(
        "Proxy server is listening on {}, upstreams = {}, timeout = {:?}, errorResponseCode = {}, followRedirects = {}, verbose = {}, dump = {}",
        settings.listen,
        upstreams,
        settings.proxy.timeout,
        settings.proxy.error_status.as_u16(),
        settings.proxy.follow_redirects,
        settings.verbose,
        settings.dump
    );

    let tls_acceptor = match &settings.tls {
        Some(tls) => Some(load_tls_acceptor(&tls.certificate, &tls.private_key)?),
        None => None,
    };

    let proxy = Arc::new(ReverseProxy::new(upstreams, settings.proxy));
    let service = ProxyService::new(proxy, Middleware::new(settings.dump, settings.verbose));
    let server = Server::new(settings.listen, service, tls_acceptor).await?;

    info!("Server started successfully, accepting connections");

    tokio::select! {
        _ = server.serve() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
