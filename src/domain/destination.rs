use std::net::Ipv6Addr;

/// Returns `host` as a `host:port` dial address, appending `default_port`
/// when the specifier carries no port.
///
/// Colons inside a bracketed IPv6 literal are not port separators, and a bare
/// IPv6 literal is bracketed before the port is appended. Bracketed forms
/// other than `[addr]` and `[addr]:port` are returned unchanged.
pub fn host_including_port(host: &str, default_port: u16) -> String {
    if host.starts_with('[') {
        // Only `[addr]` gets a port; anything else is left for the dialer to refuse.
        return if host.ends_with(']') && host.matches(']').count() == 1 {
            format!("{}:{}", host, default_port)
        } else {
            host.to_string()
        };
    }

    if host.parse::<Ipv6Addr>().is_ok() {
        return format!("[{}]:{}", host, default_port);
    }

    if host.contains(':') {
        host.to_string()
    } else {
        format!("{}:{}", host, default_port)
    }
}
