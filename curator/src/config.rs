use crate::errors::{Error, Result};
use crate::scheduler::PublishSchedule;

use envconfig::Envconfig;
use std::str::FromStr;
use std::time;

#[derive(Envconfig, Clone)]
pub struct Config {
    /// Discord bot token, used by the gateway client and to look up reactions.
    #[envconfig(from = "API_TOKEN")]
    pub api_token: String,

    #[envconfig(from = "STORE_URL")]
    pub store_url: String,

    #[envconfig(from = "TIMEZONE", default = "Europe/Stockholm")]
    pub timezone: String,

    #[envconfig(from = "PUBLISH_TIME", default = "08:40")]
    pub publish_time: String,

    #[envconfig(from = "MIN_POSITIVE_VOTES", default = "1")]
    pub min_positive_votes: i64,

    #[envconfig(from = "MAX_CONCURRENT_TALLIES", default = "16")]
    pub max_concurrent_tallies: usize,

    #[envconfig(from = "REACTION_TIMEOUT_MS", default = "10000")]
    pub reaction_timeout: EnvMsDuration,

    #[envconfig(from = "STORE_TIMEOUT_MS", default = "5000")]
    pub store_timeout: EnvMsDuration,
}

impl Config {
    /// Reads the config from the environment and checks the values that can't
    /// be checked while parsing.
    pub fn load() -> Result<Config> {
        let config = Config::init_from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.api_token.trim().is_empty() {
            return Err(Error::Configuration(String::from("API_TOKEN is empty")));
        }
        if self.store_url.trim().is_empty() {
            return Err(Error::Configuration(String::from("STORE_URL is empty")));
        }
        if self.max_concurrent_tallies == 0 {
            return Err(Error::Configuration(String::from(
                "MAX_CONCURRENT_TALLIES must be at least 1",
            )));
        }
        self.schedule()?;
        Ok(())
    }

    pub fn schedule(&self) -> Result<PublishSchedule> {
        PublishSchedule::parse(&self.publish_time, &self.timezone)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}
