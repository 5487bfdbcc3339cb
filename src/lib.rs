mod cache;
mod config;
mod constants;
mod errors;
mod metrics;
mod model;
mod node;
mod pubsub;
mod store;
mod transport;
pub mod utils;

pub use cache::*;
pub use config::*;
pub use constants::*;
pub use errors::*;
pub use metrics::*;
pub use model::*;
pub use node::*;
pub use pubsub::*;
pub use store::*;
pub use transport::*;

//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
