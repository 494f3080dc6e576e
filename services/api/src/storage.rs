//! services/api/src/storage.rs
//!
//! Startup-time storage selection and bootstrap seeding.
//!
//! Backends are probed in fixed priority order: relational, document store,
//! in-memory. The first one that initializes cleanly is the terminal
//! selection for the process lifetime; there is no re-probing later. The
//! in-memory backend cannot fail, so selection always succeeds.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use studypack_core::domain::{NewUser, Role, User};
use studypack_core::ports::{PortError, PortResult, StorageService};
use tracing::{info, warn};

use crate::adapters::{DocumentAdapter, MemoryAdapter, SqlAdapter};
use crate::config::Config;

/// First/last name of the account seeded into an empty store.
pub const BOOTSTRAP_ADMIN_FIRST_NAME: &str = "Admin";
pub const BOOTSTRAP_ADMIN_LAST_NAME: &str = "Administrator";

/// Probes the backends in priority order and returns the first that
/// initializes. Initialization failures are logged and fall through.
pub async fn select_storage(config: &Config) -> Arc<dyn StorageService> {
    if let Some(url) = &config.database_url {
        match SqlAdapter::connect(url).await {
            Ok(adapter) => {
                info!("Selected relational storage backend");
                return Arc::new(adapter);
            }
            Err(e) => warn!("Relational backend unavailable, falling back: {}", e),
        }
    } else {
        info!("DATABASE_URL not set, skipping relational backend");
    }

    match DocumentAdapter::open(&config.document_store_path) {
        Ok(adapter) => {
            info!(
                "Selected document storage backend at {}",
                config.document_store_path.display()
            );
            return Arc::new(adapter);
        }
        Err(e) => warn!("Document backend unavailable, falling back: {}", e),
    }

    info!("Selected in-memory storage backend (no persistence)");
    Arc::new(MemoryAdapter::new())
}

/// Seeds exactly one bootstrap admin if the store holds zero users.
///
/// The guard is the zero-users check itself, re-evaluated on every startup,
/// so seeding stays idempotent across restarts without any separate flag.
/// Returns the created account, or `None` when the store was not empty.
pub async fn seed_bootstrap_admin(
    store: &dyn StorageService,
    password: &str,
) -> PortResult<Option<User>> {
    if store.count_users().await? > 0 {
        return Ok(None);
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PortError::Unexpected(format!("Failed to hash bootstrap password: {}", e)))?
        .to_string();

    let admin = store
        .create_user(NewUser {
            first_name: BOOTSTRAP_ADMIN_FIRST_NAME.to_string(),
            last_name: BOOTSTRAP_ADMIN_LAST_NAME.to_string(),
            password_hash,
            role: Role::Admin,
            subject: None,
        })
        .await?;

    info!(
        "Seeded bootstrap admin account '{} {}' ({})",
        admin.first_name, admin.last_name, admin.id
    );
    Ok(Some(admin))
}
