use anyhow::{bail, Error};

/// Resolves well-known service names (the subset the compiler commonly sees
/// in rule files) to their numeric port.
pub fn parse_named_port(name: &str) -> Result<u16, Error> {
    Ok(match name {
        "ssh" => 22,
        "telnet" => 23,
        "smtp" => 25,
        "domain" | "dns" => 53,
        "http" => 80,
        "pop3" => 110,
        "ntp" => 123,
        "imap" => 143,
        "snmp" => 161,
        "ldap" => 389,
        "https" => 443,
        "smtps" => 465,
        "imaps" => 993,
        "pop3s" => 995,
        _ => bail!("unknown service name: {name}"),
    })
}
