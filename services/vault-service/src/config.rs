use anyhow::{Context, Result, bail};
use std::net::SocketAddr;
use std::time::Duration;
use tv_chain_client::{ContractAddresses, NetworkConfig};
use tv_chain_client::network::network_by_slug;

/// Runtime settings, read once at startup.
///
/// | variable | default |
/// |---|---|
/// | `TIMEVAULT_BIND_ADDR` | `0.0.0.0:8080` |
/// | `TIMEVAULT_NETWORK` | `base`; must have a TimeVault deployment |
/// | `TIMEVAULT_RPC_URL` | the network's public RPC; empty disables the wallet provider |
/// | `TIMEVAULT_STORE_PATH` | unset keeps state in memory |
/// | `TIMEVAULT_POLL_INTERVAL_SECS` | `30` |
#[derive(Debug, Clone)]
pub(crate) struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub network: &'static NetworkConfig,
    pub contracts: ContractAddresses,
    pub rpc_url: Option<String>,
    pub store_path: Option<String>,
    pub poll_interval: Duration,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_addr = lookup("TIMEVAULT_BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_owned())
            .parse::<SocketAddr>()
            .context("TIMEVAULT_BIND_ADDR")?;

        let slug = lookup("TIMEVAULT_NETWORK").unwrap_or_else(|| "base".to_owned());
        let Some(network) = network_by_slug(slug.trim()) else {
            bail!("TIMEVAULT_NETWORK: unknown network {slug:?}");
        };
        let Some(contracts) = network.contracts() else {
            bail!("TIMEVAULT_NETWORK: no TimeVault deployment on {}", network.name);
        };

        let rpc_url = match lookup("TIMEVAULT_RPC_URL") {
            Some(url) if url.trim().is_empty() => None,
            Some(url) => Some(url.trim().to_owned()),
            None => Some(network.rpc_url.to_owned()),
        };

        let store_path = lookup("TIMEVAULT_STORE_PATH").filter(|path| !path.trim().is_empty());

        let poll_secs = match lookup("TIMEVAULT_POLL_INTERVAL_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .context("TIMEVAULT_POLL_INTERVAL_SECS")?,
            None => 30,
        };
        if poll_secs == 0 {
            bail!("TIMEVAULT_POLL_INTERVAL_SECS must be positive");
        }

        Ok(Self {
            bind_addr,
            network,
            contracts,
            rpc_url,
            store_path,
            poll_interval: Duration::from_secs(poll_secs),
        })
    }
}
