use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::{doc, oid::ObjectId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::database::{self, MongoDB};
use crate::models::{now_millis, LoginHistory, NotificationKind, Role, User, UserInfo};
use crate::services::notification_service::NotificationDispatcher;
use crate::utils::validation::{is_valid_email, normalize_email, normalize_phone, Validator};
use crate::utils::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

// JWT Claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user id (hex)
    pub email: String,
    pub name: String,
    pub role: Role,
    pub phone: String,
    pub token_type: TokenType,
    pub iat: usize,
    pub exp: usize,
    pub jti: String,
    pub aud: String,
    pub iss: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<ObjectId, AppError> {
        ObjectId::parse_str(&self.sub)
            .map_err(|_| AppError::Unauthorized("Invalid token subject".to_string()))
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_role(&self, min: Role) -> Result<(), AppError> {
        if self.role >= min {
            Ok(())
        } else {
            Err(AppError::forbidden())
        }
    }

    /// Staff may act on any phone; everyone else only on their own.
    pub fn ensure_phone_owner(&self, phone: &str) -> Result<String, AppError> {
        let normalized = normalize_phone(phone)?;
        if self.is_staff() || normalized == self.phone {
            Ok(normalized)
        } else {
            Err(AppError::Forbidden(
                "Phone number does not belong to this account".to_string(),
            ))
        }
    }
}

// Request/Response structures
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    /// Email or phone number
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub user: UserInfo,
}

/// Client metadata captured for login history.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Claims for a user; also used for API-key requests, which never see a token.
pub fn build_claims(user: &User, token_type: TokenType, config: &JwtConfig) -> Claims {
    let now = Utc::now();
    let exp = match token_type {
        TokenType::Access => now + Duration::minutes(config.access_ttl_minutes),
        TokenType::Refresh => now + Duration::days(config.refresh_ttl_days),
    };

    Claims {
        sub: user.id.map(|id| id.to_hex()).unwrap_or_default(),
        email: user.email.clone(),
        name: user.name.clone(),
        role: user.role,
        phone: user.phone.clone(),
        token_type,
        iat: now.timestamp() as usize,
        exp: exp.timestamp() as usize,
        jti: Uuid::new_v4().to_string(),
        aud: config.audience.clone(),
        iss: config.issuer.clone(),
    }
}

pub fn generate_token(user: &User, token_type: TokenType, config: &JwtConfig) -> Result<String, AppError> {
    let claims = build_claims(user, token_type, config);
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
}

// Verify JWT token
pub fn verify_token(token: &str, config: &JwtConfig) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[config.audience.as_str()]);
    validation.set_issuer(&[config.issuer.as_str()]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Access tokens only; a refresh token cannot open protected routes.
pub fn verify_access_token(token: &str, config: &JwtConfig) -> Result<Claims, AppError> {
    let claims = verify_token(token, config)?;
    if claims.token_type != TokenType::Access {
        return Err(AppError::Unauthorized("Access token required".to_string()));
    }
    Ok(claims)
}

fn auth_response(user: User, config: &JwtConfig) -> Result<AuthResponse, AppError> {
    let token = generate_token(&user, TokenType::Access, config)?;
    let refresh_token = generate_token(&user, TokenType::Refresh, config)?;
    Ok(AuthResponse {
        token,
        refresh_token,
        expires_in: config.access_ttl_minutes * 60,
        user: UserInfo::from(user),
    })
}

pub async fn register(
    db: &MongoDB,
    config: &JwtConfig,
    bcrypt_cost: u32,
    notifier: &NotificationDispatcher,
    request: &RegisterRequest,
) -> Result<AuthResponse, AppError> {
    Validator::new()
        .required(&request.name, "name")
        .email(&request.email, "email")
        .phone(&request.phone, "phone")
        .password(&request.password, "password")
        .finish()?;

    let email = normalize_email(&request.email);
    let phone = normalize_phone(&request.phone)?;

    let collection = db.collection::<User>(database::USERS);
    let existing = collection
        .find_one(doc! { "$or": [ { "email": &email }, { "phone": &phone } ] })
        .await?;
    if let Some(existing) = existing {
        let field = if existing.email == email { "Email" } else { "Phone" };
        return Err(AppError::Conflict(format!("{} is already registered", field)));
    }

    let mut user = User::new(&request.name, &email, &phone, &request.password, Role::User, bcrypt_cost)?;
    let result = collection.insert_one(&user).await?;
    user.id = result.inserted_id.as_object_id();

    log::info!("✅ User registered: {}", email);

    if let Some(user_id) = user.id {
        notifier.notify(
            user_id,
            NotificationKind::Account,
            "Welcome aboard",
            &format!("Hi {}, your courier account is ready.", user.name),
        );
    }

    auth_response(user, config)
}

fn identifier_filter(identifier: &str) -> Result<mongodb::bson::Document, AppError> {
    if is_valid_email(identifier) {
        Ok(doc! { "email": normalize_email(identifier) })
    } else {
        let phone = normalize_phone(identifier)
            .map_err(|_| AppError::Unauthorized("Invalid credentials".to_string()))?;
        Ok(doc! { "phone": phone })
    }
}

pub async fn login(
    db: &MongoDB,
    config: &JwtConfig,
    client: &ClientInfo,
    request: &LoginRequest,
) -> Result<AuthResponse, AppError> {
    let collection = db.collection::<User>(database::USERS);
    let identifier = request.identifier.trim();

    let user = match identifier_filter(identifier) {
        Ok(filter) => collection.find_one(filter).await?,
        Err(_) => None,
    };

    let Some(user) = user else {
        record_login(db, None, identifier, client, false, Some("unknown account")).await;
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    };

    if !user.verify_password(&request.password) {
        record_login(db, user.id, identifier, client, false, Some("wrong password")).await;
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    if !user.is_active {
        record_login(db, user.id, identifier, client, false, Some("inactive account")).await;
        return Err(AppError::Forbidden("Account is inactive".to_string()));
    }

    let now = now_millis();
    collection
        .update_one(
            doc! { "_id": user.id },
            doc! { "$set": { "last_login": now, "updated_at": now } },
        )
        .await?;
    record_login(db, user.id, identifier, client, true, None).await;

    let mut user = user;
    user.last_login = Some(now);
    auth_response(user, config)
}

/// Best-effort: a failed history write never blocks the login itself.
async fn record_login(
    db: &MongoDB,
    user_id: Option<ObjectId>,
    identifier: &str,
    client: &ClientInfo,
    success: bool,
    reason: Option<&str>,
) {
    let entry = LoginHistory {
        id: None,
        user_id,
        identifier: identifier.to_string(),
        ip: client.ip.clone(),
        user_agent: client.user_agent.clone(),
        success,
        reason: reason.map(String::from),
        created_at: now_millis(),
    };

    if let Err(e) = db
        .collection::<LoginHistory>(database::LOGIN_HISTORY)
        .insert_one(&entry)
        .await
    {
        log::warn!("⚠️  Failed to record login attempt for {}: {}", identifier, e);
    }
}

pub async fn refresh_token(
    db: &MongoDB,
    config: &JwtConfig,
    request: &RefreshTokenRequest,
) -> Result<AuthResponse, AppError> {
    let claims = verify_token(&request.refresh_token, config)?;
    if claims.token_type != TokenType::Refresh {
        return Err(AppError::Unauthorized("Refresh token required".to_string()));
    }

    let user = find_user(db, claims.user_id()?)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".to_string()))?;

    if !user.is_active {
        return Err(AppError::Forbidden("Account is inactive".to_string()));
    }

    auth_response(user, config)
}

pub async fn change_password(
    db: &MongoDB,
    bcrypt_cost: u32,
    user_id: ObjectId,
    request: &ChangePasswordRequest,
) -> Result<(), AppError> {
    Validator::new()
        .password(&request.new_password, "new_password")
        .finish()?;

    let user = find_user(db, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

    if !user.verify_password(&request.current_password) {
        return Err(AppError::Unauthorized("Current password is incorrect".to_string()));
    }

    let hashed = bcrypt::hash(&request.new_password, bcrypt_cost)?;
    db.collection::<User>(database::USERS)
        .update_one(
            doc! { "_id": user_id },
            doc! { "$set": { "password": hashed, "updated_at": now_millis() } },
        )
        .await?;

    Ok(())
}

pub async fn find_user(db: &MongoDB, user_id: ObjectId) -> Result<Option<User>, AppError> {
    Ok(db
        .collection::<User>(database::USERS)
        .find_one(doc! { "_id": user_id })
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(role: Role) -> User {
        let mut user = User::new("Ada", "ada@example.com", "+15550100200", "correct horse", role, 4).unwrap();
        user.id = Some(ObjectId::new());
        user
    }

    #[test]
    fn access_token_round_trip() {
        let config = JwtConfig::default();
        let user = sample_user(Role::Moderator);
        let token = generate_token(&user, TokenType::Access, &config).unwrap();

        let claims = verify_access_token(&token, &config).unwrap();
        assert_eq!(claims.sub, user.id.unwrap().to_hex());
        assert_eq!(claims.role, Role::Moderator);
        assert_eq!(claims.phone, "+15550100200");
        assert_eq!(claims.user_id().unwrap(), user.id.unwrap());
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let config = JwtConfig::default();
        let token = generate_token(&sample_user(Role::User), TokenType::Refresh, &config).unwrap();

        assert!(verify_token(&token, &config).is_ok());
        assert!(matches!(
            verify_access_token(&token, &config),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn wrong_secret_or_audience_is_rejected() {
        let config = JwtConfig::default();
        let token = generate_token(&sample_user(Role::User), TokenType::Access, &config).unwrap();

        let other_secret = JwtConfig { secret: "another-secret".into(), ..JwtConfig::default() };
        assert!(verify_token(&token, &other_secret).is_err());

        let other_audience = JwtConfig { audience: "someone-else".into(), ..JwtConfig::default() };
        assert!(verify_token(&token, &other_audience).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        // bem além do leeway padrão de 60s
        let config = JwtConfig { access_ttl_minutes: -10, ..JwtConfig::default() };
        let token = generate_token(&sample_user(Role::User), TokenType::Access, &config).unwrap();
        assert!(verify_token(&token, &config).is_err());
    }

    #[test]
    fn phone_ownership() {
        let config = JwtConfig::default();
        let token = generate_token(&sample_user(Role::User), TokenType::Access, &config).unwrap();
        let claims = verify_access_token(&token, &config).unwrap();

        assert_eq!(claims.ensure_phone_owner("+1 555 010 0200").unwrap(), "+15550100200");
        assert!(matches!(
            claims.ensure_phone_owner("+1 555 999 0000"),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            claims.ensure_phone_owner("abc"),
            Err(AppError::Validation(_))
        ));

        let staff = Claims { role: Role::Moderator, ..claims };
        assert_eq!(staff.ensure_phone_owner("+1 555 999 0000").unwrap(), "+15559990000");
    }

    #[test]
    fn role_requirements() {
        let config = JwtConfig::default();
        let token = generate_token(&sample_user(Role::Moderator), TokenType::Access, &config).unwrap();
        let claims = verify_access_token(&token, &config).unwrap();

        assert!(claims.require_role(Role::User).is_ok());
        assert!(claims.require_role(Role::Moderator).is_ok());
        assert!(matches!(claims.require_role(Role::Admin), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn login_identifier_filters() {
        assert_eq!(
            identifier_filter("Ada@Example.com").unwrap(),
            doc! { "email": "ada@example.com" }
        );
        assert_eq!(
            identifier_filter("+1 (555) 010-0200").unwrap(),
            doc! { "phone": "+15550100200" }
        );
        assert!(identifier_filter("not an identifier").is_err());
    }
}
