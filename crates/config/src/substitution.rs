use anyhow::Result;
use regex::Regex;
use std::env;
use tracing::{debug, warn};

const ENV_VAR_PATTERN: &str = r"\$\{(\w+)\}|\$(\w+)";

/// Substitute environment variables in the format ${VAR_NAME} or $VAR_NAME
///
/// Unset variables keep their placeholder so the validator can report them.
pub fn substitute_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(ENV_VAR_PATTERN)?;
    let mut missing_vars = Vec::new();

    let result = re.replace_all(content, |caps: &regex::Captures| {
        let placeholder = &caps[0];
        let var_name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();

        match env::var(var_name) {
            Ok(value) => {
                debug!("Substituting environment variable: {}", var_name);
                value
            }
            Err(_) => {
                warn!("Environment variable '{}' not set", var_name);
                missing_vars.push(var_name.to_string());
                placeholder.to_string()
            }
        }
    });
    let result = result.into_owned();

    if !missing_vars.is_empty() {
        debug!(
            "Environment variables not set (may use defaults or fail validation): {:?}",
            missing_vars
        );
    }

    Ok(result)
}

/// Get environment variable with a default value
pub fn get_env_or_default(var_name: &str, default: &str) -> String {
    match env::var(var_name) {
        Ok(value) => value,
        Err(_) => {
            debug!(
                "Environment variable '{}' not set, using default: \"{}\"",
                var_name, default
            );
            default.to_string()
        }
    }
}

/// Check if a string contains unresolved environment variable placeholders
pub fn has_unresolved_env_vars(content: &str) -> bool {
    Regex::new(ENV_VAR_PATTERN)
        .map(|re| re.is_match(content))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutes_both_forms() {
        env::set_var("SIMPLEX_SUBST_A", "alpha");
        env::set_var("SIMPLEX_SUBST_B", "beta");
        let out = substitute_env_vars("x: ${SIMPLEX_SUBST_A}\ny: $SIMPLEX_SUBST_B").unwrap();
        assert_eq!(out, "x: alpha\ny: beta");
        assert!(!has_unresolved_env_vars(&out));
    }

    #[test]
    fn test_missing_variable_keeps_placeholder() {
        env::remove_var("SIMPLEX_SUBST_MISSING");
        let out = substitute_env_vars("x: ${SIMPLEX_SUBST_MISSING}").unwrap();
        assert_eq!(out, "x: ${SIMPLEX_SUBST_MISSING}");
        assert!(has_unresolved_env_vars(&out));
    }

    #[test]
    fn test_env_or_default() {
        env::remove_var("SIMPLEX_SUBST_UNSET");
        assert_eq!(get_env_or_default("SIMPLEX_SUBST_UNSET", "fallback"), "fallback");
    }
}
