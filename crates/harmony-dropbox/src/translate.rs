//! Translation of Dropbox call outcomes into canonical errors
//!
//! | Outcome                                       | Result                  |
//! |-----------------------------------------------|-------------------------|
//! | value present                                 | `Ok(value)`             |
//! | empty payload                                 | `InvalidResponse`       |
//! | HTTP 401                                      | `NotAuthenticated`      |
//! | `path(_lookup)/not_found`, identifier known   | `DoesNotExist(id)`      |
//! | `path/conflict`, identifier known             | `Conflicted(id)`        |
//! | undecodable payload                           | `InvalidResponse`       |
//! | anything else                                 | `ConnectionFailed(err)` |

use harmony_core::domain::ServiceError;
use tracing::warn;

use crate::CallError;

/// Interprets an outcome that must carry a value
pub(crate) fn process<T>(outcome: Result<Option<T>, CallError>) -> Result<T, ServiceError> {
    resolve(outcome, None)
}

/// Interprets an outcome concerning the object named `identifier`
pub(crate) fn process_object<T>(
    outcome: Result<Option<T>, CallError>,
    identifier: &str,
) -> Result<T, ServiceError> {
    resolve(outcome, Some(identifier))
}

/// Interprets an outcome whose payload is not needed
pub(crate) fn process_unit(
    outcome: Result<(), CallError>,
    identifier: Option<&str>,
) -> Result<(), ServiceError> {
    outcome.map_err(|e| translate(e, identifier))
}

fn resolve<T>(
    outcome: Result<Option<T>, CallError>,
    identifier: Option<&str>,
) -> Result<T, ServiceError> {
    match outcome {
        Ok(Some(value)) => Ok(value),
        Ok(None) => {
            warn!(identifier, "Dropbox reported success without a payload");
            Err(ServiceError::InvalidResponse)
        }
        Err(e) => Err(translate(e, identifier)),
    }
}

/// Maps a single [`CallError`] onto a [`ServiceError`]
pub(crate) fn translate(error: CallError, identifier: Option<&str>) -> ServiceError {
    match (error, identifier) {
        (CallError::Unauthorized(_), _) => ServiceError::NotAuthenticated,
        (CallError::Decode(e), _) => {
            warn!(identifier, error = %e, "Undecodable Dropbox response");
            ServiceError::InvalidResponse
        }
        (error, Some(id)) if error.is_not_found() => ServiceError::DoesNotExist(id.to_string()),
        (error, Some(id)) if error.is_conflict() => ServiceError::Conflicted(id.to_string()),
        (error, _) => ServiceError::connection_failed(error),
    }
}
