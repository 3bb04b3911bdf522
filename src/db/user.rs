use sqlx::sqlite::SqlitePool;

use super::password::{self, PasswordError};

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "admin" => UserRole::Admin,
            _ => UserRole::User,
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub role: UserRole,
    pub has_image: bool,
    pub created_at: String,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            role: self.role,
            has_image: self.has_image,
            created_at: self.created_at.clone(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    phone: Option<String>,
    password_hash: String,
    role: String,
    has_image: i32,
    created_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            password_hash: row.password_hash,
            role: UserRole::from_str(&row.role),
            has_image: row.has_image != 0,
            created_at: row.created_at,
        }
    }
}

/// Public view of a user. Never carries the password hash or image bytes.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub has_image: bool,
    pub created_at: String,
}

/// Profile image stored alongside the user record.
#[derive(Debug, Clone)]
pub struct UserImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Input for [`UserStore::create`]. The password is plaintext and hashed on insert.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    pub role: UserRole,
    pub image: Option<UserImage>,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateUserError {
    #[error("email or phone already registered")]
    Conflict,
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user, hashing the password off the async runtime.
    pub async fn create(&self, new_user: NewUser) -> Result<User, CreateUserError> {
        let plaintext = new_user.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&plaintext))
            .await
            .map_err(|e| PasswordError::Hash(e.to_string()))??;

        let id = uuid::Uuid::new_v4().to_string();
        let (image, image_type) = match new_user.image {
            Some(img) => (Some(img.bytes), Some(img.content_type)),
            None => (None, None),
        };

        let result = sqlx::query(
            "INSERT INTO users (id, name, email, phone, password_hash, role, image, image_type)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&new_user.phone)
        .bind(&password_hash)
        .bind(new_user.role.as_str())
        .bind(image)
        .bind(image_type)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(CreateUserError::Conflict);
            }
            Err(e) => return Err(e.into()),
        }

        self.get_by_id(&id)
            .await?
            .ok_or(CreateUserError::Database(sqlx::Error::RowNotFound))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, name, email, phone, password_hash, role, (image IS NOT NULL) AS has_image, created_at
             FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by login handle: email (case-insensitive) or phone number.
    pub async fn get_by_login(&self, login: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, name, email, phone, password_hash, role, (image IS NOT NULL) AS has_image, created_at
             FROM users WHERE email = ? OR phone = ? LIMIT 1",
        )
        .bind(login)
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Check a plaintext password against the user's stored hash.
    pub async fn verify_password(&self, user: &User, password: &str) -> Result<bool, PasswordError> {
        let hash = user.password_hash.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
            .await
            .map_err(|e| PasswordError::Hash(e.to_string()))?
    }

    /// Check that neither the email nor the phone number is taken.
    pub async fn is_available(&self, email: &str, phone: Option<&str>) -> Result<bool, sqlx::Error> {
        let count: (i32,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ? OR phone = ?")
            .bind(email)
            .bind(phone)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 == 0)
    }

    /// List all users, oldest first.
    pub async fn list(&self) -> Result<Vec<User>, sqlx::Error> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT id, name, email, phone, password_hash, role, (image IS NOT NULL) AS has_image, created_at
             FROM users ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Set the role for a user.
    pub async fn set_role(&self, id: &str, role: UserRole) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Load the profile image for a user, if one was uploaded.
    pub async fn get_image(&self, id: &str) -> Result<Option<UserImage>, sqlx::Error> {
        let row: Option<(Option<Vec<u8>>, Option<String>)> =
            sqlx::query_as("SELECT image, image_type FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match row {
            Some((Some(bytes), Some(content_type))) => Some(UserImage {
                content_type,
                bytes,
            }),
            _ => None,
        })
    }

    /// Delete a user by ID.
    pub async fn delete(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
