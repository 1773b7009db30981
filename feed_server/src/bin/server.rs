use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{info, warn};

use feed_schema::load_schema_from_env;
use feed_server::demo::install_demo;
use feed_server::{
    apply_network_event, build_feed_app, drain_outbound, load_server_config_from_env, run_tick,
    start_feed_listener, FeedMetrics,
};

const METRICS_EVERY: u64 = 50;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (schema, schema_metadata) = load_schema_from_env()?;
    let (config, _) = load_server_config_from_env();

    let mut app = build_feed_app(schema, Arc::clone(&config));
    if config.demo.enabled {
        install_demo(&mut app, &config.demo);
    }

    let listener = start_feed_listener(config.bind, config.write_queue_frames)
        .ok_or("feed listener failed to start")?;
    info!(
        target: "tile_feed::server",
        bind = %listener.local_addr(),
        schema = ?schema_metadata.path(),
        tick_ms = config.tick_interval_ms,
        "Tile feed server ready"
    );

    let interval = config.tick_interval();
    let mut ticks = 0u64;
    loop {
        let started = Instant::now();

        for event in listener.poll() {
            apply_network_event(&mut app, event);
        }
        run_tick(&mut app);
        for (connection, frame) in drain_outbound(&mut app) {
            listener.send(connection, frame);
        }

        ticks += 1;
        if ticks % METRICS_EVERY == 0 {
            let metrics = app.world.resource::<FeedMetrics>();
            match serde_json::to_string(metrics) {
                Ok(json) => info!(target: "tile_feed::metrics", metrics = %json, "metrics.snapshot"),
                Err(err) => warn!(target: "tile_feed::metrics", error = %err, "metrics.encode_failed"),
            }
        }

        if let Some(remaining) = interval.checked_sub(started.elapsed()) {
            thread::sleep(remaining);
        }
    }
}
