//! Error handling utilities

use tracing::error;

/// Handle fatal errors and exit with appropriate status code
///
/// - For `ThornsError`: shows the user message, and the full chain in verbose mode
/// - For other errors: shows the error and its chain in verbose mode, exits with 1
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    use crate::error::{describe_error_code, ThornsError};

    error!("Fatal error: {}", error);

    let exit_code = if let Some(thorns_err) = error.downcast_ref::<ThornsError>() {
        eprintln!("{}", thorns_err.user_message());

        if verbose >= 1 {
            eprintln!(
                "\nError code E{:04}: {}",
                thorns_err.code(),
                describe_error_code(thorns_err.code())
            );
            eprintln!("\nContext Chain:\n{}", thorns_err.developer_message());
        }

        thorns_err.exit_code()
    } else {
        eprintln!("Error: {error}");

        if verbose >= 1 {
            eprintln!("\nError chain:");
            for (i, cause) in error.chain().enumerate() {
                eprintln!("  {}: {}", i, cause);
            }
        }

        1
    };

    std::process::exit(exit_code)
}
