use serde::Deserialize;

use crate::error::Result;
use crate::storage::StorageType;

#[derive(Debug, PartialEq, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct Config {
    pub log_level: LogLevel,
    pub storage_type: StorageType,
    /// Backing file of the file storage engine. Ignored by the memory engine.
    pub path: Option<String>,
    /// Number of frames in the buffer pool.
    pub pool_size: usize,
    /// K parameter of the LRU-K replacer.
    pub replacer_k: usize,
}

impl Config {
    pub fn new(file: &str) -> Result<Config> {
        let mut cfg = config::Config::builder()
            .set_default("storage_type", "memory")?
            .set_default("log_level", "debug")?
            .set_default("pool_size", 64i64)?
            .set_default("replacer_k", 2i64)?;
        if !file.is_empty() {
            cfg = cfg.add_source(config::File::with_name(file))
        }
        cfg = cfg.add_source(config::Environment::with_prefix("PAGEBOX"));
        Ok(cfg.build()?.try_deserialize()?)
    }
}
