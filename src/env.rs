//! Environment variable substitution for configuration values
//!
//! Variables are referenced as `${VAR_NAME}`, or `${VAR_NAME:-fallback}` to
//! use `fallback` when the variable is unset.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::env;

use crate::config::ConfigError;

/// Matches `${VAR_NAME}` and `${VAR_NAME:-fallback}`
static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").unwrap()
});

/// Substitute environment variable references in a string.
///
/// Returns an error listing all missing variables if any are unset and have
/// no fallback.
///
/// # Examples
///
/// ```ignore
/// use bucket_fs::env::substitute_env_vars;
///
/// std::env::set_var("MY_BUCKET", "media");
/// let result = substitute_env_vars("name: ${MY_BUCKET}").unwrap();
/// assert_eq!(result, "name: media");
/// ```
pub fn substitute_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut missing_vars: Vec<String> = Vec::new();

    let result = ENV_VAR_PATTERN.replace_all(input, |caps: &Captures| {
        let var_name = &caps[1];
        match (env::var(var_name), caps.get(2)) {
            (Ok(value), _) => value,
            (Err(_), Some(fallback)) => fallback.as_str().to_string(),
            (Err(_), None) => {
                if !missing_vars.iter().any(|v| v == var_name) {
                    missing_vars.push(var_name.to_string());
                }
                String::new()
            }
        }
    });

    if !missing_vars.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Missing environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result.into_owned())
}
