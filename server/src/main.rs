#[macro_use]
extern crate rocket;

mod entrypoints;

use std::sync::Arc;
use std::time::Duration;

use rocket_db_pools::Database;
use rocket_prometheus::PrometheusMetrics;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use commit_games_server::db::{self, DB};
use commit_games_server::identity;

#[derive(Debug, serde::Deserialize)]
pub struct Env {
    claim_sleep_duration_in_minutes: Option<u32>,
}

#[launch]
async fn rocket() -> _ {
    dotenv::dotenv().ok();

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().pretty());
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    let env = envy::from_env::<Env>().expect("Failed to load environment variables");
    let sleep_duration =
        Duration::from_secs(env.claim_sleep_duration_in_minutes.unwrap_or(10) as u64 * 60);
    let atomic_bool = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let atomic_bool_clone = atomic_bool.clone();

    let prometheus = PrometheusMetrics::new();
    let cors = rocket_cors::CorsOptions::default()
        .to_cors()
        .expect("Failed to build CORS options");

    let span = tracing::info_span!("Starting Rocket");
    let _enter = span.enter();

    rocket::build()
        .attach(db::stage())
        .attach(prometheus.clone())
        .mount("/metrics", prometheus)
        .attach(cors)
        .attach(rocket::fairing::AdHoc::on_liftoff(
            "Claim orphan commits every X minutes",
            move |rocket| {
                Box::pin(async move {
                    let db = DB::fetch(rocket)
                        .expect("Failed to get DB connection")
                        .clone();

                    rocket::tokio::spawn(async move {
                        let mut interval = rocket::tokio::time::interval(sleep_duration);
                        while atomic_bool.load(std::sync::atomic::Ordering::Relaxed) {
                            interval.tick().await;

                            match identity::claim_all_orphans(&db).await {
                                Ok(0) => {}
                                Ok(claimed) => {
                                    tracing::info!(claimed, "orphan reconciliation pass")
                                }
                                Err(e) => {
                                    tracing::error!("Failed to claim orphan commits: {:#?}", e)
                                }
                            }
                        }
                    });
                })
            },
        ))
        .attach(rocket::fairing::AdHoc::on_shutdown(
            "Stop claiming orphan commits",
            |_| {
                Box::pin(async move {
                    atomic_bool_clone.store(false, std::sync::atomic::Ordering::Relaxed);
                })
            },
        ))
        .attach(entrypoints::stage())
}
