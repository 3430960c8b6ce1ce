// ABOUTME: Creates and drops single databases
// ABOUTME: Validates names and existence before issuing the schema statement

use anyhow::Context;

use crate::engine::Engine;
use crate::error::{PanelError, PanelResult};
use crate::registry::{is_protected, list_databases};
use crate::utils::{quote_identifier, validate_database_name};

/// Create an empty database and return the refreshed registry
///
/// No tables are created.
///
/// # Errors
///
/// - `InvalidInput` when the name fails validation
/// - `AlreadyExists` when the server already has a schema with that name
///   (system schemas included)
/// - `OperationFailed` when the server rejects the statement
pub async fn create_database(engine: &dyn Engine, name: &str) -> PanelResult<Vec<String>> {
    validate_database_name(name)?;

    let existing = engine
        .schema_names()
        .await
        .context("Failed to list databases")?;
    if existing.iter().any(|db| db == name) {
        return Err(PanelError::AlreadyExists(
            "The database already exists, try another name 😢".to_string(),
        ));
    }

    tracing::info!("Creating database '{}'", name);
    engine
        .execute(&format!("CREATE DATABASE {}", quote_identifier(name)))
        .await
        .map_err(|e| {
            tracing::error!("Failed to create database '{}': {:#}", name, e);
            PanelError::failed(format!(
                "An error occurred while creating the database 😢: {:#}",
                e
            ))
        })?;
    tracing::info!("✓ Database '{}' created", name);

    Ok(list_databases(engine).await?)
}

/// Drop a user database and return the refreshed registry
///
/// # Errors
///
/// - `Protected` for the system schemas, whatever else is true
/// - `NotFound` when no such user database exists
/// - `OperationFailed` when the server rejects the statement
pub async fn drop_database(engine: &dyn Engine, name: &str) -> PanelResult<Vec<String>> {
    if is_protected(name) {
        return Err(PanelError::Protected(
            "You can't delete this database, try another 😢".to_string(),
        ));
    }

    let databases = list_databases(engine).await?;
    if !databases.iter().any(|db| db == name) {
        return Err(PanelError::not_found(
            "The database doesn't exist, try another name 😢",
        ));
    }

    // Names that exist but cannot be quoted safely are refused, not dropped.
    validate_database_name(name)?;

    tracing::info!("Dropping database '{}'", name);
    engine
        .execute(&format!("DROP DATABASE {}", quote_identifier(name)))
        .await
        .map_err(|e| {
            tracing::error!("Failed to drop database '{}': {:#}", name, e);
            PanelError::failed(format!(
                "An error occurred while deleting the database 😢: {:#}",
                e
            ))
        })?;
    tracing::info!("✓ Database '{}' dropped", name);

    Ok(list_databases(engine).await?)
}
