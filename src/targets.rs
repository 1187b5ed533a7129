use crate::error::{Result, ScanError};
use crate::types::Target;

/// Validated, immutable list of targets to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSet {
    targets: Vec<Target>,
}

impl TargetSet {
    /// Pair `hosts[i]` with `ports[i]`. Both lists must be non-empty and of equal length.
    pub fn build_pairwise(hosts: &[String], ports: &[u16]) -> Result<Self> {
        ensure_non_empty(hosts, ports)?;
        if hosts.len() != ports.len() {
            return Err(ScanError::config(format!(
                "pairwise mode needs as many ports as hosts ({} hosts, {} ports)",
                hosts.len(),
                ports.len()
            )));
        }
        let targets = hosts
            .iter()
            .zip(ports)
            .enumerate()
            .map(|(index, (host, &port))| Target { index, host: host.clone(), port })
            .collect();
        Ok(Self { targets })
    }

    /// Every host combined with every port, host-major.
    pub fn build_cross_product(hosts: &[String], ports: &[u16]) -> Result<Self> {
        ensure_non_empty(hosts, ports)?;
        let targets = hosts
            .iter()
            .flat_map(|host| ports.iter().map(move |&port| (host, port)))
            .enumerate()
            .map(|(index, (host, port))| Target { index, host: host.clone(), port })
            .collect();
        Ok(Self { targets })
    }

    pub fn single(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(ScanError::config("host must not be empty"));
        }
        Ok(Self { targets: vec![Target { index: 0, host, port }] })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }
}

impl IntoIterator for TargetSet {
    type Item = Target;
    type IntoIter = std::vec::IntoIter<Target>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets.into_iter()
    }
}

fn ensure_non_empty(hosts: &[String], ports: &[u16]) -> Result<()> {
    if hosts.is_empty() {
        return Err(ScanError::config("host list is empty"));
    }
    if ports.is_empty() {
        return Err(ScanError::config("port list is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pairwise_matches_by_index() {
        let set = TargetSet::build_pairwise(&hosts(&["a", "b", "a"]), &[80, 443, 80]).unwrap();
        let got: Vec<_> = set.iter().map(|t| (t.index, t.host.as_str(), t.port)).collect();
        assert_eq!(got, vec![(0, "a", 80), (1, "b", 443), (2, "a", 80)]);
    }

    #[test]
    fn pairwise_length_mismatch_is_config_error() {
        let err = TargetSet::build_pairwise(&hosts(&["a", "b", "c"]), &[1, 2]).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn cross_product_size_and_order() {
        let set = TargetSet::build_cross_product(&hosts(&["a", "b"]), &[1, 2, 3]).unwrap();
        assert_eq!(set.len(), 6);
        let got: Vec<_> = set.into_iter().map(|t| format!("{}:{}", t.host, t.port)).collect();
        assert_eq!(got, vec!["a:1", "a:2", "a:3", "b:1", "b:2", "b:3"]);
    }

    #[test]
    fn empty_inputs_rejected() {
        assert!(TargetSet::build_cross_product(&[], &[80]).is_err());
        assert!(TargetSet::build_cross_product(&hosts(&["a"]), &[]).is_err());
        assert!(TargetSet::build_pairwise(&[], &[]).is_err());
        assert!(TargetSet::single("  ", 80).is_err());
    }
}
