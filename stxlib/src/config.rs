//! `ClientConfig`
//!
//! Server, network and file locations of a client, and the log configuration built from them.

use std::{
    io::{self, Error},
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use log::LevelFilter;
use log4rs::{
    Config,
    append::rolling_file::{
        RollingFileAppender,
        policy::compound::{
            CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
        },
    },
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};

pub use stx_sync::config::SyncConfig;

/// Mainnet ledger API.
pub const DEFAULT_MAINNET_API_SERVER: &str = "https://stacks-node-api.mainnet.stacks.co";
/// Testnet ledger API. Used by default as the faucet only exists on test networks.
pub const DEFAULT_TESTNET_API_SERVER: &str = "https://stacks-node-api.testnet.stacks.co";
/// Ledger API of a local mocknet node.
pub const DEFAULT_MOCKNET_API_SERVER: &str = "http://localhost:3999";
/// File the account snapshots are stored in.
pub const DEFAULT_DATA_FILE_NAME: &str = "stx-sandbox.dat";
/// Log file name.
pub const DEFAULT_LOGFILE_NAME: &str = "stx-sandbox.debug.log";

/// The networks a client can run against
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Network {
    /// Mainnet
    Mainnet,
    /// Public testnet
    #[default]
    Testnet,
    /// Local development network
    Mocknet,
}

impl Network {
    /// Default API server of the network.
    pub fn default_api_server(&self) -> &'static str {
        match self {
            Self::Mainnet => DEFAULT_MAINNET_API_SERVER,
            Self::Testnet => DEFAULT_TESTNET_API_SERVER,
            Self::Mocknet => DEFAULT_MOCKNET_API_SERVER,
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Mocknet => "mocknet",
        };
        write!(f, "{name}")
    }
}

/// An error determining the network from a string.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkFromStringError {
    /// of unknown network
    #[error("Invalid network name '{0}'. Expected one of: mainnet, testnet, mocknet.")]
    UnknownNetwork(String),
}

/// Converts a network name to a [`Network`].
pub fn network_from_str(network_name: &str) -> Result<Network, NetworkFromStringError> {
    match network_name {
        "mainnet" => Ok(Network::Mainnet),
        "testnet" => Ok(Network::Testnet),
        "mocknet" => Ok(Network::Mocknet),
        _ => Err(NetworkFromStringError::UnknownNetwork(
            network_name.to_string(),
        )),
    }
}

/// An error building an API server uri.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidServerError {
    /// The server string is not a valid uri.
    #[error("invalid server uri '{server}'. {reason}")]
    InvalidUri {
        /// Rejected input
        server: String,
        /// Parser message
        reason: String,
    },
}

/// Builds the API server uri from user input, falling back to the network's default server.
///
/// Hosts without a scheme are assumed to use https.
///
/// # Examples
///
/// ```
/// use stxlib::config::{Network, construct_api_uri};
///
/// assert_eq!(
///     construct_api_uri(Some("localhost:3999".to_string()), Network::Mocknet).unwrap(),
///     "https://localhost:3999/"
/// );
/// assert_eq!(
///     construct_api_uri(None, Network::Testnet).unwrap(),
///     "https://stacks-node-api.testnet.stacks.co/"
/// );
/// ```
pub fn construct_api_uri(
    server: Option<String>,
    network: Network,
) -> Result<http::Uri, InvalidServerError> {
    let server = match server {
        Some(server) if !server.trim().is_empty() => {
            let server = server.trim();
            if server.starts_with("http://") || server.starts_with("https://") {
                server.to_string()
            } else {
                format!("https://{server}")
            }
        }
        _ => network.default_api_server().to_string(),
    };

    server
        .parse::<http::Uri>()
        .map_err(|e| InvalidServerError::InvalidUri {
            server: server.clone(),
            reason: e.to_string(),
        })
}

/// Builder of [`ClientConfig`].
#[derive(Clone, Debug, Default)]
pub struct ClientConfigBuilder {
    /// Ledger API server. Defaults to the network's server.
    pub api_server: Option<http::Uri>,
    /// Network
    pub network: Network,
    /// The directory where the data and log files will be created. Defaults to `~/.stx-sandbox/<network>`.
    pub data_dir: Option<PathBuf>,
    /// Sync configuration.
    pub sync_config: SyncConfig,
}

impl ClientConfigBuilder {
    /// Set the ledger API server.
    /// # Examples
    /// ```
    /// use stxlib::config::ClientConfigBuilder;
    /// use http::Uri;
    /// let config = ClientConfigBuilder::default()
    ///     .set_api_server("http://localhost:3999".parse::<Uri>().unwrap())
    ///     .create();
    /// assert_eq!(config.get_api_server(), "http://localhost:3999/");
    /// ```
    pub fn set_api_server(&mut self, api_server: http::Uri) -> &mut Self {
        self.api_server = Some(api_server);
        self
    }

    /// Set the network.
    pub fn set_network(&mut self, network: Network) -> &mut Self {
        self.network = network;
        self
    }

    /// Set the directory the data and log files are stored in.
    pub fn set_data_dir(&mut self, dir: PathBuf) -> &mut Self {
        self.data_dir = Some(dir);
        self
    }

    /// Set the sync configuration.
    pub fn set_sync_config(&mut self, sync_config: SyncConfig) -> &mut Self {
        self.sync_config = sync_config;
        self
    }

    /// Creates the config.
    pub fn create(&self) -> ClientConfig {
        let api_server = match &self.api_server {
            Some(api_server) => api_server.clone(),
            None => http::Uri::from_static(self.network.default_api_server()),
        };
        ClientConfig {
            api_server: Arc::new(RwLock::new(api_server)),
            network: self.network,
            data_dir: self.data_dir.clone(),
            data_file_name: DEFAULT_DATA_FILE_NAME.into(),
            logfile_name: DEFAULT_LOGFILE_NAME.into(),
            sync_config: self.sync_config,
        }
    }
}

/// Configuration data for the creation of a [`crate::client::StxClient`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Ledger API server. Shared with the transport so a server change applies to the next request.
    pub api_server: Arc<RwLock<http::Uri>>,
    /// Network
    pub network: Network,
    /// The directory where the data and log files will be created.
    pub data_dir: Option<PathBuf>,
    /// The filename of the account snapshots. Created in `data_dir`.
    pub data_file_name: PathBuf,
    /// The filename of the logfile. Created in `data_dir`.
    pub logfile_name: PathBuf,
    /// Sync configuration
    pub sync_config: SyncConfig,
}

impl ClientConfig {
    /// Creates a builder for `network`.
    #[must_use]
    pub fn build(network: Network) -> ClientConfigBuilder {
        ClientConfigBuilder {
            network,
            ..ClientConfigBuilder::default()
        }
    }

    /// Returns the current API server.
    pub fn get_api_server(&self) -> http::Uri {
        self.api_server
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Changes the API server used by every subsequent request.
    pub fn set_api_server(&self, api_server: http::Uri) {
        log::info!("Changing API server to {api_server}");
        *self
            .api_server
            .write()
            .unwrap_or_else(PoisonError::into_inner) = api_server;
    }

    /// Returns the data directory, creating it if it does not exist.
    pub fn get_data_dir(&self) -> io::Result<Box<Path>> {
        let data_dir = match &self.data_dir {
            Some(data_dir) => data_dir.clone(),
            None => {
                let mut data_dir = dirs::home_dir().ok_or_else(|| {
                    Error::new(io::ErrorKind::NotFound, "Couldn't determine home directory!")
                })?;
                data_dir.push(".stx-sandbox");
                data_dir.push(self.network.to_string());
                data_dir
            }
        };
        std::fs::create_dir_all(&data_dir)?;

        Ok(data_dir.into_boxed_path())
    }

    /// Path of the account snapshot file.
    pub fn get_data_path(&self) -> io::Result<Box<Path>> {
        let mut data_path = self.get_data_dir()?.into_path_buf();
        data_path.push(&self.data_file_name);

        Ok(data_path.into_boxed_path())
    }

    /// Path of the log file.
    pub fn get_log_path(&self) -> io::Result<Box<Path>> {
        let mut log_path = self.get_data_dir()?.into_path_buf();
        log_path.push(&self.logfile_name);

        Ok(log_path.into_boxed_path())
    }

    /// Build the Logging config
    pub fn get_log_config(&self) -> io::Result<Config> {
        let window_size = 3; // log0, log1, log2
        let roller_pattern = self
            .get_data_dir()?
            .join("stx-sandbox-log{}")
            .to_string_lossy()
            .into_owned();
        let fixed_window_roller = FixedWindowRoller::builder()
            .build(&roller_pattern, window_size)
            .map_err(|e| Error::other(format!("{e}")))?;
        let size_limit = 5 * 1024 * 1024; // 5MB as max log file size to roll
        let size_trigger = SizeTrigger::new(size_limit);
        let compound_policy =
            CompoundPolicy::new(Box::new(size_trigger), Box::new(fixed_window_roller));

        Config::builder()
            .appender(
                Appender::builder()
                    .filter(Box::new(ThresholdFilter::new(LevelFilter::Info)))
                    .build(
                        "logfile",
                        Box::new(
                            RollingFileAppender::builder()
                                .encoder(Box::new(PatternEncoder::new("{d} {l}::{m}{n}")))
                                .build(self.get_log_path()?, Box::new(compound_policy))?,
                        ),
                    ),
            )
            .build(
                Root::builder()
                    .appender("logfile")
                    .build(LevelFilter::Debug),
            )
            .map_err(|e| Error::other(format!("{e}")))
    }
}
