// cglx/src/config.rs
//
//! Runtime configuration.

use std::env;

static DIAGNOSTIC_ENV_VAR: &str = "LIBGL_DIAGNOSTIC";
static NO_CONTEXT_GC_ENV_VAR: &str = "CGLX_NO_CONTEXT_GC";

/// Knobs that affect how the registry reports and reclaims.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Log native error strings at `warn` level whenever a native call fails.
    pub diagnostic: bool,
    /// Run a garbage collection pass after every context destruction.
    pub collect_on_context_destroy: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            diagnostic: false,
            collect_on_context_destroy: true,
        }
    }
}

impl Config {
    /// Reads the configuration from the environment.
    ///
    /// `LIBGL_DIAGNOSTIC` enables diagnostics when set to anything. `CGLX_NO_CONTEXT_GC`
    /// disables the collection pass at context destruction.
    pub fn from_env() -> Config {
        Config {
            diagnostic: env::var_os(DIAGNOSTIC_ENV_VAR).is_some(),
            collect_on_context_destroy: env::var_os(NO_CONTEXT_GC_ENV_VAR).is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        env::remove_var(DIAGNOSTIC_ENV_VAR);
        env::remove_var(NO_CONTEXT_GC_ENV_VAR);
        assert_eq!(Config::from_env(), Config::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        env::set_var(DIAGNOSTIC_ENV_VAR, "1");
        env::set_var(NO_CONTEXT_GC_ENV_VAR, "");
        let config = Config::from_env();
        env::remove_var(DIAGNOSTIC_ENV_VAR);
        env::remove_var(NO_CONTEXT_GC_ENV_VAR);

        assert!(config.diagnostic);
        assert!(!config.collect_on_context_destroy);
    }
}
