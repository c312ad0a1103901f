use crate::Result;
use crate::error::Error;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;

pub fn config() -> &'static Config {
    static INSTANCE: OnceLock<Config> = OnceLock::new();

    INSTANCE.get_or_init(|| {
        Config::load_from_env().unwrap_or_else(|err| {
            panic!("FATAL - WHILE LOADING Config -cause: {:?}", err);
        })
    })
}

#[allow(non_snake_case)]
pub struct Config {
    // --TG
    pub TG_GROUP_ID: i64,
    // -- DB
    pub DB_URL: String,
    // -- AmoCRM
    pub AMO_URL: String,
    pub AMO_TOKEN: String,
    // unix seconds, used until the first sync is logged
    pub SYNC_FROM: i64,
    // -- Bot output
    pub LEADS_LIMIT: u32,
    // -- Schedule for worker
    pub SCHEDULE: String,
}

impl Config {
    fn load_from_env() -> Result<Config> {
        Ok(Config {
            TG_GROUP_ID: get_env_as_parse("TG_GROUP_ID")?,
            DB_URL: get_env("DB_URL")?,
            AMO_URL: get_env("AMO_URL")?,
            AMO_TOKEN: get_env("AMO_TOKEN")?,
            SYNC_FROM: get_env_as_parse_or("SYNC_FROM", 0)?,
            LEADS_LIMIT: get_env_as_parse_or("LEADS_LIMIT", 10)?,
            SCHEDULE: get_env("SCHEDULE")?,
        })
    }
}

fn get_env(name: &'static str) -> Result<String> {
    env::var(name).map_err(|_| Error::ConfigMissingEnv(name))
}

fn get_env_as_parse<T: FromStr>(name: &'static str) -> Result<T> {
    let val = get_env(name)?;
    parse_value(name, &val)
}

fn get_env_as_parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(val) => parse_value(name, &val),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &'static str, val: &str) -> Result<T> {
    val.trim()
        .parse::<T>()
        .map_err(|_| Error::ConfigWrongFormat(name))
}
