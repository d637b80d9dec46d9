use super::ThornsError;

/// Extension trait for convenient error conversion
pub trait ErrorExt<T> {
    fn to_config_error(self, message: impl Into<String>) -> Result<T, ThornsError>;
    fn to_config_error_with_code(
        self,
        code: u16,
        message: impl Into<String>,
        field: Option<&str>,
    ) -> Result<T, ThornsError>;
}

impl<T, E> ErrorExt<T> for Result<T, E>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn to_config_error(self, message: impl Into<String>) -> Result<T, ThornsError> {
        self.map_err(|e| ThornsError::config(message).with_source(e))
    }

    fn to_config_error_with_code(
        self,
        code: u16,
        message: impl Into<String>,
        field: Option<&str>,
    ) -> Result<T, ThornsError> {
        self.map_err(|e| {
            ThornsError::config_with_code(code, message, field.map(str::to_string)).with_source(e)
        })
    }
}
