/*!
 * Environment Access
 *
 * Explicit environment passthrough: the observer and the engine may live
 * under different isolation boundaries, so nothing reads the process
 * environment implicitly on the observer's behalf.
 */

use crate::core::errors::BrokerError;
use crate::core::types::BrokerResult;

pub trait EnvironmentAccess: Send + Sync {
    fn get(&self, name: &str) -> BrokerResult<Option<String>>;

    /// Set or, with `None`, remove a variable
    fn set(&self, name: &str, value: Option<&str>) -> BrokerResult<()>;
}

/// Passthrough to the host process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl EnvironmentAccess for ProcessEnvironment {
    fn get(&self, name: &str) -> BrokerResult<Option<String>> {
        validate_name(name)?;
        match std::env::var(name) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(BrokerError::invalid_argument(format!(
                "environment variable {} is not valid unicode",
                name
            ))),
        }
    }

    fn set(&self, name: &str, value: Option<&str>) -> BrokerResult<()> {
        validate_name(name)?;
        if value.is_some_and(|v| v.contains('\0')) {
            return Err(BrokerError::invalid_argument("value contains a NUL byte"));
        }
        match value {
            Some(value) => std::env::set_var(name, value),
            None => std::env::remove_var(name),
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> BrokerResult<()> {
    if name.is_empty() || name.contains('=') || name.contains('\0') {
        return Err(BrokerError::invalid_argument(format!(
            "invalid environment variable name {:?}",
            name
        )));
    }
    Ok(())
}
