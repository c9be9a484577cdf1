use std::time::Duration;

const UPDATE_RESOURCE_TIMEOUT_VAR: &str = "UPDATE_RESOURCE_TIMEOUT";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Tunables read once at startup. `UPDATE_RESOURCE_TIMEOUT` is the only
/// environment-driven knob the controller has.
#[derive(Debug, Clone)]
pub struct Config {
    pub update_resource_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let secs = std::env::var(UPDATE_RESOURCE_TIMEOUT_VAR)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or_else(|| {
                tracing::debug!(
                    "{UPDATE_RESOURCE_TIMEOUT_VAR} unset or invalid, defaulting to {DEFAULT_TIMEOUT_SECS}s"
                );
                DEFAULT_TIMEOUT_SECS
            });

        Config {
            update_resource_timeout: Duration::from_secs(secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // `std::env::var` is process-global; serialize the two tests below so
    // they don't race each other under the default multi-threaded test runner.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn default_timeout_is_300s() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::remove_var(UPDATE_RESOURCE_TIMEOUT_VAR);
        }
        let config = Config::from_env();
        assert_eq!(config.update_resource_timeout, Duration::from_secs(300));
    }

    #[test]
    fn reads_timeout_from_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var(UPDATE_RESOURCE_TIMEOUT_VAR, "60");
        }
        let config = Config::from_env();
        assert_eq!(config.update_resource_timeout, Duration::from_secs(60));
        unsafe {
            std::env::remove_var(UPDATE_RESOURCE_TIMEOUT_VAR);
        }
    }
}
