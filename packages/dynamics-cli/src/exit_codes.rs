use dynamics_api::{ConfigError, DynamicsError, ErrorKind};

pub const SUCCESS: i32 = 0;
pub const EXECUTION_ERROR: i32 = 1;
pub const INPUT_ERROR: i32 = 2;
pub const CONNECTION_ERROR: i32 = 3;
pub const TIMEOUT: i32 = 4;
pub const PROTOCOL_ERROR: i32 = 5;
pub const PARTIAL_FAILURE: i32 = 6;

pub fn for_kind(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Configuration => INPUT_ERROR,
        ErrorKind::Transport => CONNECTION_ERROR,
        ErrorKind::Timeout => TIMEOUT,
        ErrorKind::Protocol => PROTOCOL_ERROR,
        ErrorKind::Cleanup => PARTIAL_FAILURE,
    }
}

pub fn for_error(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<DynamicsError>() {
        return for_kind(e.kind());
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return INPUT_ERROR;
    }
    EXECUTION_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_errors_map_by_kind() {
        let err = anyhow::Error::new(DynamicsError::UnexpectedReceiveTimeout {
            stream: "pose".to_string(),
            timeout_ms: 5000,
        });
        assert_eq!(for_error(&err), TIMEOUT);

        let err = anyhow::Error::new(DynamicsError::InvalidAddress("x".to_string()))
            .context("connecting");
        assert_eq!(for_error(&err), INPUT_ERROR);
    }

    #[test]
    fn test_other_errors_are_execution_errors() {
        assert_eq!(for_error(&anyhow::anyhow!("disk full")), EXECUTION_ERROR);
    }
}
