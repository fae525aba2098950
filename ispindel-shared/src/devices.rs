/// Device registry
///
/// Owner-scoped device management plus the deletion cascade into
/// fermentations.

use crate::auth::tokens::generate_api_key;
use crate::brewing::BrewingError;
use crate::models::{CreateIspindel, Fermentation, Ispindel};
use chrono::Utc;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

/// Devices a single account may register
pub const MAX_DEVICES_PER_USER: i64 = 4;

/// Note appended to fermentations whose device the owner deleted
pub const OWNER_DELETE_NOTE: &str = "Ended - measuring device was deleted";

/// Note appended to fermentations whose device the administrator deleted
pub const ADMIN_DELETE_NOTE: &str = "Ended - measuring device was deleted by the administrator";

/// Who is deleting a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletedBy {
    Owner(Uuid),
    Admin,
}

impl DeletedBy {
    pub fn note(&self) -> &'static str {
        match self {
            DeletedBy::Owner(_) => OWNER_DELETE_NOTE,
            DeletedBy::Admin => ADMIN_DELETE_NOTE,
        }
    }
}

/// Registers a new device with a fresh API key
pub async fn create_device(
    pool: &PgPool,
    user_id: Uuid,
    name: &str,
    description: &str,
) -> Result<Ispindel, BrewingError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BrewingError::NameRequired);
    }

    if Ispindel::count_by_user(pool, user_id).await? >= MAX_DEVICES_PER_USER {
        return Err(BrewingError::DeviceLimitReached {
            max: MAX_DEVICES_PER_USER,
        });
    }

    let ispindel = Ispindel::create(
        pool,
        CreateIspindel {
            user_id,
            name: name.to_string(),
            description: description.trim().to_string(),
            api_key: generate_api_key(),
        },
    )
    .await?;

    info!(user_id = %user_id, ispindel_id = %ispindel.id, "Registered iSpindel");

    Ok(ispindel)
}

pub async fn update_device(
    pool: &PgPool,
    user_id: Uuid,
    id: Uuid,
    name: &str,
    description: &str,
    is_active: bool,
) -> Result<Ispindel, BrewingError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BrewingError::NameRequired);
    }

    Ispindel::update_details(pool, id, user_id, name, description.trim(), is_active)
        .await?
        .ok_or(BrewingError::DeviceNotFound)
}

/// Issues a new API key; the old one stops working immediately
pub async fn regenerate_api_key(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<String, BrewingError> {
    let api_key = generate_api_key();

    Ispindel::set_api_key(pool, id, user_id, &api_key)
        .await?
        .ok_or(BrewingError::DeviceNotFound)?;

    info!(user_id = %user_id, ispindel_id = %id, "Regenerated iSpindel API key");

    Ok(api_key)
}

/// Deletes a device and ends the fermentations it was measuring
///
/// In one transaction: the device row is locked (and ownership checked
/// unless the administrator is deleting), every running fermentation on
/// it is ended, detached and annotated, and the device is soft-deleted.
/// Returns the number of fermentations that were ended.
pub async fn delete_device(
    pool: &PgPool,
    ispindel_id: Uuid,
    deleted_by: DeletedBy,
) -> Result<u64, BrewingError> {
    let mut tx = pool.begin().await?;

    let device = Ispindel::lock(&mut *tx, ispindel_id)
        .await?
        .filter(|d| match deleted_by {
            DeletedBy::Owner(user_id) => d.user_id == user_id,
            DeletedBy::Admin => true,
        })
        .ok_or(BrewingError::DeviceNotFound)?;

    let ended = Fermentation::end_all_for_device(&mut *tx, device.id, Utc::now(), deleted_by.note()).await?;
    Ispindel::soft_delete(&mut *tx, device.id).await?;

    tx.commit().await?;

    info!(
        ispindel_id = %device.id,
        owner_id = %device.user_id,
        by_admin = matches!(deleted_by, DeletedBy::Admin),
        fermentations_ended = ended,
        "Deleted iSpindel"
    );

    Ok(ended)
}

/// Active devices not attached to a running fermentation
pub async fn available_devices(pool: &PgPool, user_id: Uuid) -> Result<Vec<Ispindel>, sqlx::Error> {
    Ispindel::list_available(pool, user_id).await
}

/// Active devices that a running fermentation is using
pub async fn busy_devices(pool: &PgPool, user_id: Uuid) -> Result<Vec<Ispindel>, sqlx::Error> {
    Ispindel::list_busy(pool, user_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_notes() {
        assert_eq!(DeletedBy::Owner(Uuid::nil()).note(), "Ended - measuring device was deleted");
        assert_eq!(
            DeletedBy::Admin.note(),
            "Ended - measuring device was deleted by the administrator"
        );
    }
}
