/// Authentication module
///
/// Password hashing, the token codec, the session manager that rotates and
/// revokes refresh tokens, the access-token guard, and the HTTP transport
/// for tokens.

mod claims;
mod guard;
mod jwt;
mod password;
mod session;
mod transport;

pub use claims::{Claims, TokenClass};
pub use guard::{authenticate, Principal};
pub use jwt::TokenCodec;
pub use password::{PasswordHasher, MAX_HASH_COST, MIN_HASH_COST};
pub use session::{Registration, SessionManager, TokenPair};
pub use transport::{
    extract_access_token, extract_refresh_token, removal_cookie, token_cookie,
    ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE,
};
