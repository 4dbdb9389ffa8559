use std::error::Error;
use std::sync::Arc;

use futures::future::FutureExt;
use log::{info, initialize_logger};
use tokio::sync::mpsc;
use warp::Filter;

use portal::config::Settings;
use portal::environment::{self, Config, Environment};
use portal::routes;
use portal::urls::Urls;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let logger = initialize_logger();

    let settings = Settings::from_env()?;

    info!(logger, "Starting..."; "main_port" => settings.port, "admin_port" => settings.admin_port);

    let (db, store) = environment::connect(&logger, &settings).await?;
    let logger = Arc::new(logger);

    let urls = Arc::new(Urls::new(&settings.base_url, &settings.candidates_path)?);
    let config = Config::new(settings.max_resume_size);
    let environment = Environment::new(logger.clone(), db, store, urls, config);

    let (termination_sender, mut termination_receiver) = mpsc::channel::<()>(1);

    let terminate: routes::admin::TerminationFunctionWrapper = Arc::new(move || {
        let termination_sender = termination_sender.clone();

        async move {
            // the receiver only goes away once shutdown has begun
            termination_sender.send(()).await.ok();
        }
        .boxed()
    });

    let should_terminate = async move {
        termination_receiver.recv().await;
    }
    .shared();

    let ctrlc = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();
        let logger = logger.clone();

        let signal = tokio::signal::ctrl_c();

        async move {
            tokio::select! {
                _ = should_terminate => {},
                _ = signal => {
                    info!(logger, "Received interrupt...");
                    terminate().await;
                }
            }
        }
    };

    let main_server = {
        let should_terminate = should_terminate.clone();

        let api = routes::make_api(environment.clone(), &settings.cors_origin);

        let (address, main_server) = warp::serve(api)
            .try_bind_with_graceful_shutdown(([0, 0, 0, 0], settings.port), async {
                should_terminate.await;
            })?;

        info!(logger, "Serving API"; "address" => %address, "base_url" => %environment.urls.candidates());

        main_server
    };

    let admin_server = {
        let should_terminate = should_terminate.clone();

        let routes = routes::admin::make_healthz_route()
            .or(routes::admin::make_termination_route(terminate));

        let (_, admin_server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(([0, 0, 0, 0], settings.admin_port), async {
                should_terminate.await;
            })?;

        admin_server
    };

    tokio::join!(ctrlc, main_server, admin_server);

    info!(logger, "Exiting gracefully...");

    Ok(())
}
