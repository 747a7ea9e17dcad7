use crate::config::SeedAdmin;
use crate::database::{self, MongoDB};
use crate::models::{Role, User};
use crate::utils::validation::{is_valid_email, normalize_email, normalize_phone};
use mongodb::bson::doc;

/// Cria o primeiro admin. Se o email já existe, não toca na conta.
pub async fn seed_admin(db: &MongoDB, admin: &SeedAdmin, bcrypt_cost: u32) {
    let email = normalize_email(&admin.email);
    if !is_valid_email(&email) {
        log::error!("❌ SEED_ADMIN_EMAIL is not a valid email, skipping admin seed");
        return;
    }
    let phone = match normalize_phone(&admin.phone) {
        Ok(phone) => phone,
        Err(_) => {
            log::error!("❌ SEED_ADMIN_PHONE is not a valid phone, skipping admin seed");
            return;
        }
    };

    let collection = db.collection::<User>(database::USERS);
    match collection.count_documents(doc! { "email": &email }).await {
        Ok(0) => {}
        Ok(_) => {
            log::info!("👑 Admin {} already exists, skipping seed", email);
            return;
        }
        Err(e) => {
            log::error!("❌ Admin seed lookup failed: {}", e);
            return;
        }
    }

    let user = match User::new(&admin.name, &email, &phone, &admin.password, Role::Admin, bcrypt_cost) {
        Ok(user) => user,
        Err(e) => {
            log::error!("❌ Failed to hash seed admin password: {}", e);
            return;
        }
    };

    match collection.insert_one(&user).await {
        Ok(_) => log::info!("👑 Seeded admin account {}", email),
        Err(e) => log::error!("❌ Failed to seed admin {}: {}", email, e),
    }
}
