pub mod schema;

pub use schema::{
    CollectionsConfig, Config, GatewayConfig, PolicyConfig, TrackerConfig,
};
