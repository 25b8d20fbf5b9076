//! Configuration validation.

use super::EncoderOptions;
use crate::error::{EncodeError, Result};

/// Validate the encoder options.
pub fn validate(options: &EncoderOptions) -> Result<()> {
    if options.max_row_log_bytes == 0 {
        return Err(EncodeError::Config(
            "max_row_log_bytes must be at least 1".into(),
        ));
    }
    if options.max_value_log_chars == 0 {
        return Err(EncodeError::Config(
            "max_value_log_chars must be at least 1".into(),
        ));
    }
    if options.max_value_log_chars > options.max_row_log_bytes {
        return Err(EncodeError::Config(format!(
            "max_value_log_chars ({}) cannot exceed max_row_log_bytes ({})",
            options.max_value_log_chars, options.max_row_log_bytes
        )));
    }

    Ok(())
}
