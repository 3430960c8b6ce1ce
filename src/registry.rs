// ABOUTME: Live registry of user databases on the server
// ABOUTME: Filters the protected system schemas out of every listing

use anyhow::{Context, Result};

use crate::engine::Engine;

/// Engine-internal schemas that are never listed or dropped
pub const PROTECTED_SCHEMAS: [&str; 4] = ["information_schema", "mysql", "performance_schema", "sys"];

pub fn is_protected(name: &str) -> bool {
    PROTECTED_SCHEMAS.contains(&name)
}

/// List user databases, in the order the server reports them
///
/// Always a fresh `SHOW DATABASES`; nothing is cached.
pub async fn list_databases(engine: &dyn Engine) -> Result<Vec<String>> {
    let names = engine
        .schema_names()
        .await
        .context("Failed to list databases")?;

    Ok(names.into_iter().filter(|name| !is_protected(name)).collect())
}

/// Whether `name` is a user database present on the server
pub async fn database_exists(engine: &dyn Engine, name: &str) -> Result<bool> {
    Ok(list_databases(engine).await?.iter().any(|db| db == name))
}
