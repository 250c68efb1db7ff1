//! Static network and deployment configuration.

use tv_api_types::{ChainId, WalletAddress};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeCurrency {
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
    pub chain_id: ChainId,
    pub name: &'static str,
    pub rpc_url: &'static str,
    pub block_explorer: &'static str,
    pub native_currency: NativeCurrency,
}

const ETHER: NativeCurrency = NativeCurrency {
    name: "Ether",
    symbol: "ETH",
    decimals: 18,
};

pub const BASE_MAINNET: NetworkConfig = NetworkConfig {
    chain_id: ChainId(8453),
    name: "Base",
    rpc_url: "https://mainnet.base.org",
    block_explorer: "https://basescan.org",
    native_currency: ETHER,
};

pub const BASE_SEPOLIA: NetworkConfig = NetworkConfig {
    chain_id: ChainId(84532),
    name: "Base Sepolia",
    rpc_url: "https://sepolia.base.org",
    block_explorer: "https://sepolia.basescan.org",
    native_currency: ETHER,
};

impl NetworkConfig {
    /// The TimeVault deployment on this network, if there is one.
    pub fn contracts(&self) -> Option<ContractAddresses> {
        match self.chain_id {
            ChainId(8453) => Some(ContractAddresses::base_mainnet()),
            _ => None,
        }
    }
}

pub static KNOWN_NETWORKS: [NetworkConfig; 2] = [BASE_MAINNET, BASE_SEPOLIA];

pub fn network_by_chain_id(chain_id: ChainId) -> Option<&'static NetworkConfig> {
    KNOWN_NETWORKS.iter().find(|network| network.chain_id == chain_id)
}

pub fn network_by_slug(slug: &str) -> Option<&'static NetworkConfig> {
    match slug {
        "base" | "base-mainnet" => Some(&KNOWN_NETWORKS[0]),
        "base-sepolia" => Some(&KNOWN_NETWORKS[1]),
        _ => None,
    }
}

/// Addresses of the deployed token, vault and router contracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractAddresses {
    pub usdc: WalletAddress,
    pub lock_options: WalletAddress,
    pub vault_treasury: WalletAddress,
    pub timelock_vault: WalletAddress,
    pub vault_router: WalletAddress,
}

impl ContractAddresses {
    pub fn base_mainnet() -> Self {
        Self {
            usdc: addr("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
            lock_options: addr("0x305e57b81b5A846a5De7F77322ac4BC12CDc806D"),
            vault_treasury: addr("0x127881a076F7027bB36aE2c25E0571f631EDCB4e"),
            timelock_vault: addr("0xCa7dc1f1E5B5F2334ad46fb7A5D3C8B450D105FD"),
            vault_router: addr("0x7bf78156c26C88a8f0f8dA129208FBD39a38dE0a"),
        }
    }
}

fn addr(raw: &str) -> WalletAddress {
    WalletAddress(raw.to_owned())
}
