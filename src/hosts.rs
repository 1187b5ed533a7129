use crate::ports::entries;
use anyhow::{bail, Context, Result};
use ipnet::{IpNet, Ipv4Net};
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

/// Parse a host list. One entry per line; `#` starts a comment.
///
/// With `expand_cidr`, entries such as `10.0.0.0/30` are expanded into their host
/// addresses. Pairwise scans pass `false` so that entry `i` stays entry `i`.
pub fn parse_hosts_str(s: &str, expand_cidr: bool) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for (line_no, line) in entries(s) {
        if line.split_whitespace().count() != 1 {
            bail!("line {line_no}: expected a single host, got: {line}");
        }
        if line.contains('/') {
            if !expand_cidr {
                bail!("line {line_no}: CIDR blocks are not allowed in pairwise mode: {line}");
            }
            let net: IpNet = line
                .parse()
                .with_context(|| format!("line {line_no}: invalid CIDR: {line}"))?;
            let ips = expand_cidr_to_ips(net);
            if ips.is_empty() {
                bail!("line {line_no}: CIDR has no IPv4 host addresses: {line}");
            }
            out.extend(ips.into_iter().map(|ip| ip.to_string()));
            continue;
        }
        out.push(line.to_string());
    }
    Ok(out)
}

/// Load a host list from a file path.
pub fn load_hosts_from_path(path: impl AsRef<Path>, expand_cidr: bool) -> Result<Vec<String>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read hosts file: {}", path.as_ref().display()))?;
    parse_hosts_str(&content, expand_cidr)
}

/// Expand a CIDR into individual IP addresses suitable for host scanning.
///
/// For IPv4, excludes the network and broadcast addresses.
/// IPv6 blocks are not expanded and yield an empty list.
pub fn expand_cidr_to_ips(cidr: IpNet) -> Vec<IpAddr> {
    match cidr {
        IpNet::V4(n4) => expand_ipv4net_hosts(n4)
            .into_iter()
            .map(IpAddr::V4)
            .collect(),
        IpNet::V6(_) => Vec::new(),
    }
}

fn expand_ipv4net_hosts(net: Ipv4Net) -> Vec<Ipv4Addr> {
    let start = u32::from(net.network());
    let end = u32::from(net.broadcast());
    // /32 and /31 carry no room for network + broadcast; probe them as-is.
    if end <= start + 1 {
        return (start..=end).map(Ipv4Addr::from).collect();
    }
    (start + 1..end).map(Ipv4Addr::from).collect()
}
