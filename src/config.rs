//! Command-line and environment configuration.
//!
//! Every flag can also be set through the environment variable named next to
//! it, which is how the service is configured in containers.

use clap::Args;
use reqwest::Url;
use std::time::Duration;

use crate::mqtt::MqttSettings;
use crate::services::geocoding::GeocoderSettings;
use crate::store::PoolSettings;

#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    pub database_max_connections: u32,

    /// Connection attempts before startup gives up
    #[arg(long, env = "DATABASE_CONNECT_ATTEMPTS", default_value_t = 5)]
    pub database_connect_attempts: u32,

    #[arg(long, env = "DATABASE_CONNECT_DELAY_SECS", default_value_t = 5)]
    pub database_connect_delay_secs: u64,
}

impl DatabaseArgs {
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            url: self.database_url.clone(),
            max_connections: self.database_max_connections,
            connect_attempts: self.database_connect_attempts.max(1),
            connect_delay: Duration::from_secs(self.database_connect_delay_secs),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct MqttArgs {
    #[arg(long, env = "MQTT_HOST", default_value = "mqtt.hsl.fi")]
    pub mqtt_host: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,

    /// Client id presented to the broker; generated from the process id when unset
    #[arg(long, env = "MQTT_CLIENT_ID")]
    pub mqtt_client_id: Option<String>,

    #[arg(long, env = "MQTT_KEEP_ALIVE_SECS", default_value_t = 60)]
    pub mqtt_keep_alive_secs: u64,

    /// Topic filter to subscribe to
    #[arg(
        long,
        env = "MQTT_TOPIC",
        default_value = "/hfp/v2/journey/ongoing/+/bus/+/+/+/+/+/+/+/2/#"
    )]
    pub mqtt_topic: String,
}

impl MqttArgs {
    pub fn settings(&self) -> MqttSettings {
        MqttSettings {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            client_id: self
                .mqtt_client_id
                .clone()
                .unwrap_or_else(|| format!("hfp-ingest-{}", std::process::id())),
            keep_alive: Duration::from_secs(self.mqtt_keep_alive_secs),
            topic: self.mqtt_topic.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct LookupArgs {
    /// Digitransit routing GraphQL endpoint
    #[arg(
        long,
        env = "DIGITRANSIT_URL",
        default_value = "https://api.digitransit.fi/routing/v1/routers/hsl/index/graphql"
    )]
    pub digitransit_url: Url,

    #[arg(long, env = "DIGITRANSIT_SUBSCRIPTION_KEY", hide_env_values = true)]
    pub digitransit_subscription_key: Option<String>,

    /// Namespace prefixed to stop ids in lookups
    #[arg(long, env = "STOP_ID_NAMESPACE", default_value = "HSL")]
    pub stop_id_namespace: String,

    #[arg(
        long,
        env = "NOMINATIM_URL",
        default_value = "https://nominatim.openstreetmap.org/"
    )]
    pub nominatim_url: Url,

    #[arg(long, env = "NOMINATIM_USER_AGENT", default_value = "hfp_ingest")]
    pub nominatim_user_agent: String,

    /// Minimum spacing between geocoding requests
    #[arg(long, env = "GEOCODE_MIN_INTERVAL_MS", default_value_t = 1100)]
    pub geocode_min_interval_ms: u64,

    #[arg(long, env = "GEOCODE_MAX_ATTEMPTS", default_value_t = 3)]
    pub geocode_max_attempts: u32,

    #[arg(long, env = "GEOCODE_RETRY_DELAY_SECS", default_value_t = 5)]
    pub geocode_retry_delay_secs: u64,

    /// JSON file mapping operator codes to names
    #[arg(long, env = "OPERATORS_PATH", default_value = "config/operators.json")]
    pub operators_path: String,
}

impl LookupArgs {
    pub fn geocoder_settings(&self) -> GeocoderSettings {
        GeocoderSettings {
            min_interval: Duration::from_millis(self.geocode_min_interval_ms),
            max_attempts: self.geocode_max_attempts,
            retry_delay: Duration::from_secs(self.geocode_retry_delay_secs),
        }
    }
}
