//! The `bearerbox` process entry point (§6 CLI surface, §5 concurrency
//! model): parses CLI flags and an optional config file, wires every
//! component named in §2 together around the four shared queues, and
//! blocks until an orderly shutdown drains `flow_threads`.
//!
//! Grounded on `gw/bearerbox.c`'s `main` (arg parsing, driver startup
//! order, `wait_for_termination` at the end) with the CLI surface
//! itself parsed by `clap` per §10.C.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use bearerbox::admin::{AdminServer, Counters};
use bearerbox::boxc::{BoxConnectionManager, BoxRegistry};
use bearerbox::config::{CliArgs, GatewayConfig};
use bearerbox::dispatch::{run_http_reply_pump, DispatchEngine};
use bearerbox::heartbeat;
use bearerbox::lifecycle::GatewayState;
use bearerbox::smsc::{NullSmsc, SmscManager};
use bearerbox::urltrans::UrlTranslationList;
use bearerbox::wdp::WdpRouter;
use bearerbox::{Lifecycle, Queue};

/// How far above the minimum reported box load a box may sit before
/// it's skipped during selection while alternatives exist (§4.E).
const BOX_LOAD_MARGIN: i32 = 5;

fn main() {
    let args = CliArgs::parse();
    init_logging(args.verbosity);

    let (config, translations) = match &args.config_file {
        Some(path) => match GatewayConfig::load(path) {
            Ok(loaded) => loaded,
            Err(e) => {
                error!("failed to load config file {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => (GatewayConfig::default(), UrlTranslationList::new()),
    };

    if let Err(e) = run(args, config, translations) {
        error!("bearerbox exiting on error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbosity: i32) {
    let default_filter = match verbosity {
        v if v <= 0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();
}

fn run(args: CliArgs, config: GatewayConfig, translations: UrlTranslationList) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let lifecycle = Lifecycle::new_with_state(args.initial_state());
    lifecycle.install_signal_handlers();

    let incoming_sms = Arc::new(Queue::new(config.max_queue));
    let outgoing_sms = Arc::new(Queue::new(config.max_queue));
    let incoming_wdp = Arc::new(Queue::new(config.max_queue));
    let outgoing_wdp = Arc::new(Queue::new(config.max_queue));

    // D: SMSC manager, one built-in loopback driver (§4.D).
    let mut smsc_manager = SmscManager::new(incoming_sms.clone(), outgoing_sms.clone());
    let null_smsc = Arc::new(NullSmsc::new("loopback"));
    smsc_manager.start(null_smsc.clone());
    lifecycle.register_driver(null_smsc.clone());
    let smsc_manager = Arc::new(smsc_manager);

    {
        let smsc_manager = smsc_manager.clone();
        let suspended = lifecycle.suspended.clone();
        thread::Builder::new()
            .name("smsc-outbound".into())
            .spawn(move || smsc_manager.run_outbound(&suspended))
            .expect("failed to spawn smsc outbound thread");
    }

    // There are no real box/SMSC subscriber processes in this
    // standalone demo, so the one concrete driver emits its own
    // heartbeat (accepted-message count as "load") into `incoming_sms`
    // to exercise the heartbeat primitive end to end (§4.K); dispatch
    // workers silently ignore non-SMS messages (`into_sms` returns
    // `None`), so this is harmless noise on the real traffic queue.
    let heartbeat_handle = {
        let driver = null_smsc.clone();
        heartbeat::start(incoming_sms.clone(), Duration::from_secs(config.heartbeat_freq), move || {
            driver.accept() as i32
        })
    };

    // E: box connection manager (smsbox/wapbox TCP listeners + routers).
    let registry = Arc::new(BoxRegistry::new(BOX_LOAD_MARGIN));
    let box_manager = BoxConnectionManager::new(
        registry,
        incoming_sms.clone(),
        outgoing_sms.clone(),
        incoming_wdp.clone(),
        outgoing_wdp.clone(),
    );

    let smsbox_addr: SocketAddr = format!("{}:{}", config.bearerbox_host, config.smsbox_port).parse()?;
    let wapbox_addr: SocketAddr = format!("{}:{}", config.bearerbox_host, config.wapbox_port).parse()?;
    let admin_addr: SocketAddr = format!("{}:{}", config.bearerbox_host, config.admin_port).parse()?;

    runtime.spawn({
        let box_manager = box_manager.clone();
        async move {
            if let Err(e) = box_manager.run_smsbox_listener(smsbox_addr).await {
                error!("smsbox listener stopped: {e}");
            }
        }
    });
    runtime.spawn({
        let box_manager = box_manager.clone();
        async move {
            if let Err(e) = box_manager.run_wapbox_listener(wapbox_addr).await {
                error!("wapbox listener stopped: {e}");
            }
        }
    });
    runtime.spawn({
        let box_manager = box_manager.clone();
        async move { box_manager.run_incoming_sms_router().await }
    });
    runtime.spawn({
        let box_manager = box_manager.clone();
        async move { box_manager.run_incoming_wdp_router().await }
    });

    // F: WDP router.
    let wdp_addr: SocketAddr = format!("{}:{}", config.bearerbox_host, config.wapbox_port + 1).parse()?;
    let wdp_router = WdpRouter::new(
        incoming_wdp.clone(),
        outgoing_wdp.clone(),
        lifecycle.suspended.clone(),
        lifecycle.isolated.clone(),
    );
    runtime.spawn(async move {
        if let Err(e) = wdp_router.run(wdp_addr).await {
            error!("WDP router stopped: {e}");
        }
    });

    // G/H: URL-translation table + service dispatcher.
    let (dispatch_engine, http_rx) = DispatchEngine::new(
        Arc::new(translations),
        incoming_sms.clone(),
        outgoing_sms.clone(),
        config.global_sender.clone(),
        config.sms_max_length,
        Duration::from_secs(config.http_timeout_secs),
    );
    dispatch_engine.spawn_workers(config.dispatcher_pool_size);
    runtime.spawn(run_http_reply_pump(dispatch_engine, http_rx));

    // L: HTTP admin surface, folding in the SMSC manager's status.
    let counters = Counters::new();
    let mut admin_server = AdminServer::new(lifecycle.clone(), counters);
    admin_server.add_source(smsc_manager.clone());
    runtime.spawn(async move {
        if let Err(e) = admin_server.run(admin_addr).await {
            error!("admin HTTP surface stopped: {e}");
        }
    });

    info!(
        "bearerbox started: smsbox={smsbox_addr} wapbox={wapbox_addr} admin={admin_addr} wdp={wdp_addr} state={:?}",
        lifecycle.state()
    );

    // §5: "Main blocks consuming flow_threads until empty." With no
    // separate per-task producer (the listeners/routers above observe
    // shutdown purely through their own queues' end-of-stream, per
    // §4.E/§4.F), a single watcher producer stands in for "the process
    // itself", released once the lifecycle reaches SHUTDOWN.
    lifecycle.flow_threads.add_producer();
    {
        let lifecycle = lifecycle.clone();
        thread::Builder::new()
            .name("shutdown-watcher".into())
            .spawn(move || loop {
                thread::sleep(Duration::from_millis(200));
                if matches!(lifecycle.state(), GatewayState::Shutdown) {
                    lifecycle.flow_threads.remove_producer();
                    return;
                }
            })
            .expect("failed to spawn shutdown watcher thread");
    }
    lifecycle.wait_for_drain();

    heartbeat_handle.stop();
    info!("bearerbox shut down cleanly");
    Ok(())
}
