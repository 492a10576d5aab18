// Headers shared by every storage service.
pub const X_MS_CLIENT_REQUEST_ID: &str = "x-ms-client-request-id";
pub const X_MS_REQUEST_ID: &str = "x-ms-request-id";
pub const X_MS_ERROR_CODE: &str = "x-ms-error-code";
pub const CONTENT_MD5: &str = "content-md5";

// Env values used to configure client defaults.
pub const REQRETRY_LOCATION_MODE: &str = "REQRETRY_LOCATION_MODE";
pub const REQRETRY_TIMEOUT_MS: &str = "REQRETRY_TIMEOUT_MS";
pub const REQRETRY_MAX_EXECUTION_TIME_MS: &str = "REQRETRY_MAX_EXECUTION_TIME_MS";
pub const REQRETRY_RETRY_POLICY: &str = "REQRETRY_RETRY_POLICY";
pub const REQRETRY_RETRY_MAX_ATTEMPTS: &str = "REQRETRY_RETRY_MAX_ATTEMPTS";
pub const REQRETRY_RETRY_BACKOFF_MS: &str = "REQRETRY_RETRY_BACKOFF_MS";
