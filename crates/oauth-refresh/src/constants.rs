//! OAuth 2.0 wire constants (RFC 6749 section 6)

/// `grant_type` value for exchanging a refresh token
pub const GRANT_TYPE_REFRESH: &str = "refresh_token";

/// Content type of token endpoint request bodies
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Token endpoints answer in JSON
pub const JSON_CONTENT_TYPE: &str = "application/json";
