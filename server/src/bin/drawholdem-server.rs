#![warn(rust_2018_idioms)]

use std::str::FromStr;

use flexi_logger::{LogSpecBuilder, LoggerHandle};
use futures::future::{select, Either};
use futures::pin_mut;
use log::{error, info, warn, LevelFilter};
use tokio::sync::{mpsc, watch};

use drawholdem_server::{run, settings};

fn main() -> anyhow::Result<()> {
    let settings = settings::load()?;
    let _logger = setup_logger(&settings.logging)?;
    let mut signal_rx = setup_signal()?;
    let runtime = setup_runtime(&settings.runtime)?;

    runtime.block_on(async move {
        // Spin up the server.
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(async move {
            if let Err(e) = run(settings.server, settings.game, shutdown_rx).await {
                error!("server stopped: {}", e);
            }
        });
        // Forward receiving signal to shutdown notification.
        let signal = async move {
            signal_rx.recv().await;
            info!("sending shutdown notice");
            if shutdown_tx.send(true).is_err() {
                warn!("server already gone");
            }
        };
        pin_mut!(signal);
        // Wait either for receiving the signal, or for the server task to
        // stop unexpectedly (e.g. due to a panic).
        let completed = select(signal, server).await;
        match completed {
            // We've received the signal, and need to wait for the server to
            // shutdown gracefully.
            Either::Left((_, server)) => {
                if let Err(e) = server.await {
                    error!("server task: {}", e);
                }
            }
            // The server stopped but signal still hasn't been received, so
            // there's an error.
            Either::Right((res, _)) => {
                error!("server stopped unexpectedly");
                if let Err(e) = res {
                    error!("server task: {}", e);
                }
            }
        };
    });
    info!("good-bye, world!");
    Ok(())
}

fn setup_logger(l: &settings::Logging) -> anyhow::Result<LoggerHandle> {
    let mut spec_builder = LogSpecBuilder::new();
    spec_builder.default(LevelFilter::from_str(&l.level)?);
    let spec = spec_builder.build();
    let handle = flexi_logger::Logger::with(spec)
        .format(flexi_logger::default_format)
        .start()?;
    Ok(handle)
}

fn setup_signal() -> anyhow::Result<mpsc::Receiver<()>> {
    let (signal_tx, signal_rx) = mpsc::channel(2);
    ctrlc::set_handler(move || {
        info!("received interrupt signal");
        let _ = signal_tx.try_send(());
    })?;
    Ok(signal_rx)
}

fn setup_runtime(r: &settings::Runtime) -> anyhow::Result<tokio::runtime::Runtime> {
    let mut builder = if r.threaded {
        let worker_threads = if r.worker_threads == 0 {
            warn!("worker_threads must be positive; adjusting to 1");
            1
        } else {
            r.worker_threads
        };
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.worker_threads(worker_threads);
        builder
    } else {
        tokio::runtime::Builder::new_current_thread()
    };
    builder.enable_all().thread_name(&r.thread_name);
    Ok(builder.build()?)
}
