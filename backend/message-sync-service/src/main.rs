use actix_web::{web, App, HttpServer};
use anyhow::{anyhow, Context};
use message_sync_service::{
    config, logging,
    middleware::JwtAuth,
    routes,
    state::{AppState, Backends},
    websocket::{gateway, Dispatcher},
};
use notification_bus::NotificationSubscriber;
use tokio::net::TcpListener;

const SUBSCRIPTION_CAPACITY: usize = 4096;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let cfg = config::Config::from_env()?;

    let backends = Backends::from_config(&cfg)
        .await
        .context("failed to initialise backends")?;
    let state = AppState::new(cfg, backends);

    // Bus deliveries -> locally connected sockets
    let subscription = state
        .subscriber
        .subscribe(SUBSCRIPTION_CAPACITY)
        .await
        .context("failed to subscribe to notifications")?;
    let dispatcher = Dispatcher::new(state.registry.clone(), state.membership.clone());
    let dispatcher_task = tokio::spawn(dispatcher.run(subscription));

    let ws_addr = format!("0.0.0.0:{}", state.config.gateway.port);
    let listener = TcpListener::bind(&ws_addr)
        .await
        .with_context(|| format!("failed to bind websocket listener on {ws_addr}"))?;
    let gateway_task = tokio::spawn(gateway::serve(listener, state.clone()));

    let bind_addr = format!("0.0.0.0:{}", state.config.http_port);
    tracing::info!(%bind_addr, %ws_addr, "starting message-sync-service");

    // actix-web server futures are not Send, so the server runs in the foreground
    let rest_state = state.clone();
    let rest_server = HttpServer::new(move || {
        App::new()
            .wrap(JwtAuth::new(rest_state.jwt.clone()))
            .wrap(actix_web::middleware::Logger::default())
            .app_data(web::Data::new(rest_state.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .with_context(|| format!("failed to bind REST server on {bind_addr}"))?
    .run();

    tokio::select! {
        res = rest_server => res.context("REST server failed"),
        res = gateway_task => res.context("gateway task panicked")?.context("gateway failed"),
        res = dispatcher_task => {
            res.context("dispatcher task panicked")?;
            Err(anyhow!("notification dispatcher stopped"))
        }
    }
}
