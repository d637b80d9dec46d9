/// Error code registry for thorns
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 4000-4999: Execution errors
/// - 7000-7999: Validation errors
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_PARSE_ERROR: u16 = 1002;
    pub const CONFIG_INVALID_VALUE: u16 = 1003;
    pub const CONFIG_UNKNOWN_BACKEND: u16 = 1004;
    pub const CONFIG_INVALID_WORKERS: u16 = 1005;
    pub const CONFIG_INVALID_LOG_LEVEL: u16 = 1006;

    // Execution errors (4000-4999)
    pub const EXEC_POOL_BUILD_FAILED: u16 = 4001;

    // Validation errors (7000-7999)
    pub const VALIDATION_NOT_A_NUMBER: u16 = 7001;
    pub const VALIDATION_OUT_OF_RANGE: u16 = 7002;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        ErrorCode::CONFIG_GENERIC => "General configuration error",
        ErrorCode::CONFIG_NOT_FOUND => "Configuration file not found",
        ErrorCode::CONFIG_PARSE_ERROR => "Configuration file could not be parsed",
        ErrorCode::CONFIG_INVALID_VALUE => "Invalid configuration value",
        ErrorCode::CONFIG_UNKNOWN_BACKEND => "Unknown map backend",
        ErrorCode::CONFIG_INVALID_WORKERS => "Worker count must be at least 1",
        ErrorCode::CONFIG_INVALID_LOG_LEVEL => "Unknown log level",

        ErrorCode::EXEC_POOL_BUILD_FAILED => "Worker pool could not be created",

        ErrorCode::VALIDATION_NOT_A_NUMBER => "Value is not a number",
        ErrorCode::VALIDATION_OUT_OF_RANGE => "Value is out of range",
        _ => "Unknown error code",
    }
}
