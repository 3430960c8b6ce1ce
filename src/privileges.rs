// ABOUTME: Grants the panel's MySQL account access from a given host
// ABOUTME: Validates IPv4 or domain addresses and reloads the privilege tables

use std::net::Ipv4Addr;

use crate::config::{DatabaseConfig, GrantSyntax};
use crate::engine::Engine;
use crate::error::{PanelError, PanelResult};
use crate::utils::quote_string_literal;

/// A validated grant address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantAddress {
    Ip(Ipv4Addr),
    Domain(String),
}

impl std::fmt::Display for GrantAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ip(ip) => write!(f, "{}", ip),
            Self::Domain(domain) => f.write_str(domain),
        }
    }
}

/// Dotted quad, each part one to three digits worth at most 255
fn matches_ipv4_pattern(address: &str) -> bool {
    let parts: Vec<&str> = address.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|part| {
            !part.is_empty()
                && part.len() <= 3
                && part.chars().all(|c| c.is_ascii_digit())
                && part.parse::<u16>().is_ok_and(|n| n <= 255)
        })
}

/// Alphanumeric labels (inner single dashes allowed) and an alphabetic TLD
fn matches_domain_pattern(address: &str) -> bool {
    let labels: Vec<&str> = address.split('.').collect();
    let Some((tld, hosts)) = labels.split_last() else {
        return false;
    };

    if hosts.is_empty() || tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic()) {
        return false;
    }

    hosts.iter().all(|label| {
        label
            .split('-')
            .all(|chunk| !chunk.is_empty() && chunk.chars().all(|c| c.is_ascii_alphanumeric()))
    })
}

/// Validate and normalise an address for a GRANT
///
/// IPv4 addresses are round-tripped through strict parsing, which also rejects
/// octets with leading zeros. There is no IPv6 support.
///
/// # Examples
///
/// ```
/// # use mysql_panel::privileges::{parse_grant_address, GrantAddress};
/// assert!(matches!(parse_grant_address("10.0.0.5"), Ok(GrantAddress::Ip(_))));
/// assert!(matches!(parse_grant_address("app.example.com"), Ok(GrantAddress::Domain(_))));
/// assert!(parse_grant_address("10.0.0.256").is_err());
/// assert!(parse_grant_address("%").is_err());
/// ```
pub fn parse_grant_address(address: &str) -> PanelResult<GrantAddress> {
    let invalid = || PanelError::invalid("Invalid IP address or domain");

    if matches_ipv4_pattern(address) {
        let ip: Ipv4Addr = address.parse().map_err(|_| invalid())?;
        return Ok(GrantAddress::Ip(ip));
    }

    if matches_domain_pattern(address) {
        return Ok(GrantAddress::Domain(address.to_string()));
    }

    Err(invalid())
}

/// Statements that grant `account` full access from `address`
pub fn grant_statements(
    account: &DatabaseConfig,
    address: &GrantAddress,
    syntax: GrantSyntax,
) -> Vec<String> {
    let grantee = format!(
        "{}@{}",
        quote_string_literal(&account.username),
        quote_string_literal(&address.to_string())
    );
    let password = quote_string_literal(&account.password);

    let mut statements = match syntax {
        GrantSyntax::Legacy => vec![format!(
            "GRANT ALL ON *.* TO {} IDENTIFIED BY {} WITH GRANT OPTION",
            grantee, password
        )],
        GrantSyntax::Modern => vec![
            format!("CREATE USER IF NOT EXISTS {} IDENTIFIED BY {}", grantee, password),
            format!("GRANT ALL ON *.* TO {} WITH GRANT OPTION", grantee),
        ],
    };
    statements.push("FLUSH PRIVILEGES".to_string());
    statements
}

/// Grant the configured account access from `address` and flush privileges
///
/// Returns the normalised address on success.
pub async fn grant_access(
    engine: &dyn Engine,
    account: &DatabaseConfig,
    syntax: GrantSyntax,
    address: &str,
) -> PanelResult<String> {
    let address = parse_grant_address(address)?;

    tracing::info!(
        "Granting privileges to '{}' from {}",
        account.username,
        address
    );

    for statement in grant_statements(account, &address, syntax) {
        engine.execute(&statement).await.map_err(|e| {
            tracing::error!("Privilege statement failed for {}: {:#}", address, e);
            PanelError::failed(format!(
                "An error occurred, please check the logs 😢: {:#}",
                e
            ))
        })?;
    }

    tracing::info!("✓ Privileges flushed for {}", address);
    Ok(address.to_string())
}
