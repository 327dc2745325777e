//! Identity service constants and service error codes
//!
//! The error codes are the service-specific `code` values carried in the
//! JSON body of a failed response. The request pipeline classifies failures
//! by (HTTP status, code) into handler hooks using these values.

/// Identity service token endpoint (refresh and authorization-code grants)
pub const TOKEN_PATH: &str = "/api/v2/oauth/token";

/// Grant type for exchanging a refresh token
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

/// Grant type for exchanging a PKCE authorization code
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";

/// User id sentinel meaning "the user the access token belongs to"
pub const CURRENT_USER: u64 = 0;

/// Service error codes
pub mod codes {
    /// Access token is malformed, revoked, or unknown
    pub const ACCESS_TOKEN_INVALID: i64 = 1001;
    /// Access token was valid but has expired
    pub const ACCESS_TOKEN_EXPIRED: i64 = 1002;
    /// Refresh token is malformed, revoked, or unknown
    pub const REFRESH_TOKEN_INVALID: i64 = 1003;
    /// Refresh token has expired
    pub const REFRESH_TOKEN_EXPIRED: i64 = 1004;
    /// The operation requires the user to enter their password again
    pub const PASSWORD_REENTRY_REQUIRED: i64 = 1005;
    /// The token lacks the scope required for the operation
    pub const ACCESS_DENIED: i64 = 1006;

    /// Codes meaning the access token can no longer be used
    pub const ACCESS_TOKEN_CODES: &[i64] = &[ACCESS_TOKEN_INVALID, ACCESS_TOKEN_EXPIRED];

    /// Codes meaning the refresh token can no longer be used
    pub const REFRESH_TOKEN_CODES: &[i64] = &[REFRESH_TOKEN_INVALID, REFRESH_TOKEN_EXPIRED];
}
