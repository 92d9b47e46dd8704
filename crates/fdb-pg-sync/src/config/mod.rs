//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use crate::error::Result;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl SourceConfig {
    /// Build an ODBC connection string for the Firebird driver.
    pub fn connection_string(&self) -> String {
        format!(
            "Driver={{{}}};Dbname={}/{}:{};Uid={};Pwd={};CharSet={};",
            self.driver, self.host, self.port, self.database, self.user, self.password,
            self.charset
        )
    }
}

impl TargetConfig {
    /// Build a tokio-postgres config.
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config.host(&self.host);
        pg_config.port(self.port);
        pg_config.dbname(&self.database);
        pg_config.user(&self.user);
        pg_config.password(&self.password);
        pg_config
    }
}
