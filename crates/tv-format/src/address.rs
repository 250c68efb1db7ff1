use alloy_primitives::keccak256;

/// `0x` followed by exactly 40 hex characters.
pub fn is_valid_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(hex) => hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}

/// `0x1234...abcd` with `chars` characters kept on each side. Invalid
/// addresses are returned untouched.
pub fn shorten_address(address: &str, chars: usize) -> String {
    if !is_valid_address(address) || chars >= 20 {
        return address.to_owned();
    }
    format!("{}...{}", &address[..chars + 2], &address[address.len() - chars..])
}

/// EIP-55 mixed-case checksum encoding.
pub fn checksum_address(address: &str) -> String {
    if !is_valid_address(address) {
        return address.to_owned();
    }

    let lower = address[2..].to_ascii_lowercase();
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (index, ch) in lower.chars().enumerate() {
        let byte = hash[index / 2];
        let nibble = if index % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if ch.is_ascii_alphabetic() && nibble >= 8 {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}

pub fn address_explorer_url(explorer: &str, address: &str) -> String {
    format!("{}/address/{address}", explorer.trim_end_matches('/'))
}

pub fn tx_explorer_url(explorer: &str, tx_hash: &str) -> String {
    format!("{}/tx/{tx_hash}", explorer.trim_end_matches('/'))
}
