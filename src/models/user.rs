//! User model and authentication claims

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

/// Account type slug carried in access tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccountTypeSlug {
    Guest,
    Reader,
    Librarian,
    Admin,
}

impl AccountTypeSlug {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountTypeSlug::Guest => "guest",
            AccountTypeSlug::Reader => "reader",
            AccountTypeSlug::Librarian => "librarian",
            AccountTypeSlug::Admin => "admin",
        }
    }
}

impl std::fmt::Display for AccountTypeSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AccountTypeSlug {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "guest" => Ok(AccountTypeSlug::Guest),
            "reader" => Ok(AccountTypeSlug::Reader),
            "librarian" => Ok(AccountTypeSlug::Librarian),
            "admin" => Ok(AccountTypeSlug::Admin),
            _ => Err(format!("Invalid account type slug: {}", s)),
        }
    }
}

/// Borrower as seen by the engine. Accounts are managed by the user store.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub login: String,
    pub role_id: i32,
}

/// JWT Claims for authenticated users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub account_type: AccountTypeSlug,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    /// Librarians and administrators
    pub fn is_staff(&self) -> bool {
        matches!(self.account_type, AccountTypeSlug::Librarian | AccountTypeSlug::Admin)
    }

    pub fn require_staff(&self) -> AppResult<()> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(AppError::Authorization("Librarian privileges required".to_string()))
        }
    }

    pub fn require_borrower(&self) -> AppResult<()> {
        if self.account_type == AccountTypeSlug::Guest {
            Err(AppError::Authorization("Guest accounts cannot borrow".to_string()))
        } else {
            Ok(())
        }
    }

    /// User an operation runs for: the caller, or `requested` when staff acts on a reader's behalf
    pub fn acting_user(&self, requested: Option<i32>) -> AppResult<i32> {
        match requested {
            Some(user_id) if user_id != self.user_id => {
                self.require_staff()?;
                Ok(user_id)
            }
            _ => Ok(self.user_id),
        }
    }
}
