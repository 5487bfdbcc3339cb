use lazy_static::lazy_static;
use prometheus::IntCounter;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

lazy_static! {
    pub static ref CACHE_HIT_TOTAL: IntCounter =
        IntCounter::with_opts(Opts::new("cache_hit_total", "documents served from the TTL store"))
            .expect("metric can not be created");

    pub static ref CACHE_MISS_TOTAL: IntCounter =
        IntCounter::with_opts(Opts::new("cache_miss_total", "documents fetched through to the store"))
            .expect("metric can not be created");

    pub static ref CACHE_RESYNC_TOTAL: IntCounter = IntCounter::with_opts(Opts::new(
        "cache_resync_total",
        "list-then-watch cycles restarted after a watch failure"
    ))
    .expect("metric can not be created");

    pub static ref EVENTS_PUBLISHED_TOTAL: IntCounter = IntCounter::with_opts(Opts::new(
        "events_published_total",
        "change events broadcast to the cluster"
    ))
    .expect("metric can not be created");

    pub static ref EVENTS_LOST_TOTAL: IntCounter = IntCounter::with_opts(Opts::new(
        "events_lost_total",
        "change events dropped because publish failed"
    ))
    .expect("metric can not be created");

    pub static ref EVENTS_DEDUPED_TOTAL: IntCounter = IntCounter::with_opts(Opts::new(
        "events_deduped_total",
        "incoming events merged into an identical pending event"
    ))
    .expect("metric can not be created");

    pub static ref OBSERVER_GAUGE: IntGauge =
        IntGauge::with_opts(Opts::new("observers", "long-poll observers currently registered"))
            .expect("metric can not be created");

    pub static ref TOPIC_GAUGE: IntGauge =
        IntGauge::with_opts(Opts::new("topics", "distinct topics currently registered"))
            .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

fn register_custom_metrics() {
    REGISTRY
        .register(Box::new(CACHE_HIT_TOTAL.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(CACHE_MISS_TOTAL.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(CACHE_RESYNC_TOTAL.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(EVENTS_PUBLISHED_TOTAL.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(EVENTS_LOST_TOTAL.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(EVENTS_DEDUPED_TOTAL.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(OBSERVER_GAUGE.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(TOPIC_GAUGE.clone()))
        .expect("collector can be registered");
}

pub async fn start_server(port: u16, mut shutdown_signal: watch::Receiver<()>) {
    register_custom_metrics();

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    let (_, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        eprintln!("could not encode custom metrics: {}", e);
    };
    let mut res = match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    };

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        eprintln!("could not encode prometheus metrics: {}", e);
    };
    let res_custom = match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("prometheus metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    };

    res.push_str(&res_custom);
    Ok(res)
}
