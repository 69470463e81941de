//! Auth types.

use serde::{Deserialize, Serialize};

/// JWT claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // user_id
    pub tier: String, // subscription tier label
    pub exp: u64,     // expiration timestamp
    pub iat: u64,     // issued at
}
