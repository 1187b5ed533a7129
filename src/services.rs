use std::collections::HashMap;
use std::sync::OnceLock;

static TCP_SERVICES: OnceLock<HashMap<u16, &'static str>> = OnceLock::new();

// IANA names as found in /etc/services for the ports scans usually hit.
fn init_tcp_services() -> HashMap<u16, &'static str> {
    HashMap::from([
        (7, "echo"),
        (9, "discard"),
        (13, "daytime"),
        (21, "ftp"),
        (22, "ssh"),
        (23, "telnet"),
        (25, "smtp"),
        (53, "domain"),
        (79, "finger"),
        (80, "http"),
        (88, "kerberos"),
        (110, "pop3"),
        (111, "sunrpc"),
        (119, "nntp"),
        (135, "epmap"),
        (139, "netbios-ssn"),
        (143, "imap2"),
        (179, "bgp"),
        (389, "ldap"),
        (443, "https"),
        (445, "microsoft-ds"),
        (465, "submissions"),
        (514, "shell"),
        (515, "printer"),
        (587, "submission"),
        (631, "ipp"),
        (636, "ldaps"),
        (873, "rsync"),
        (993, "imaps"),
        (995, "pop3s"),
        (1080, "socks"),
        (1433, "ms-sql-s"),
        (1521, "oracle"),
        (1723, "pptp"),
        (1883, "mqtt"),
        (2049, "nfs"),
        (2181, "zookeeper"),
        (2375, "docker"),
        (3128, "squid"),
        (3306, "mysql"),
        (3389, "ms-wbt-server"),
        (3690, "svn"),
        (4369, "epmd"),
        (5060, "sip"),
        (5432, "postgresql"),
        (5672, "amqp"),
        (5900, "vnc"),
        (5985, "wsman"),
        (6379, "redis"),
        (6667, "ircd"),
        (8080, "http-alt"),
        (8443, "https-alt"),
        (9092, "kafka"),
        (9200, "elasticsearch"),
        (11211, "memcache"),
        (27017, "mongodb"),
    ])
}

/// Well-known TCP service name for `port`, if there is one.
pub fn tcp_service_name(port: u16) -> Option<&'static str> {
    TCP_SERVICES.get_or_init(init_tcp_services).get(&port).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_ports() {
        assert_eq!(tcp_service_name(22), Some("ssh"));
        assert_eq!(tcp_service_name(443), Some("https"));
        assert_eq!(tcp_service_name(47123), None);
    }
}
