// ABOUTME: hash-secret command: prints a bcrypt hash for SECRET_STRING
// ABOUTME: The plaintext secret is never logged

use anyhow::{bail, Result};

/// Hash `secret` and print the value to put in `SECRET_STRING`
pub fn hash_secret(secret: &str, cost: u32) -> Result<()> {
    if secret.is_empty() {
        bail!("Secret cannot be empty");
    }
    if !(4..=31).contains(&cost) {
        bail!("bcrypt cost must be between 4 and 31, got {}", cost);
    }

    let hash = crate::auth::hash_secret(secret, cost)?;
    println!("{}", hash);
    Ok(())
}
