use std::process;

use crate::error::ConntopError;

/// Standard Unix exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidUsage = 2,
}

impl ExitCode {
    pub fn exit(self) -> ! {
        process::exit(self as i32)
    }

    /// Usage errors anywhere in the chain map to `InvalidUsage`.
    pub fn for_error(error: &anyhow::Error) -> Self {
        let usage = error
            .chain()
            .filter_map(|cause| cause.downcast_ref::<ConntopError>())
            .any(ConntopError::is_usage_error);
        if usage {
            ExitCode::InvalidUsage
        } else {
            ExitCode::GeneralError
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_code_for_error() {
        let usage: anyhow::Error = ConntopError::config("bad").into();
        assert_eq!(ExitCode::for_error(&usage), ExitCode::InvalidUsage);

        let wrapped = Err::<(), _>(ConntopError::config("bad"))
            .context("while loading")
            .unwrap_err();
        assert_eq!(ExitCode::for_error(&wrapped), ExitCode::InvalidUsage);

        let runtime: anyhow::Error = ConntopError::StagePanicked { stage: "parser" }.into();
        assert_eq!(ExitCode::for_error(&runtime), ExitCode::GeneralError);

        assert_eq!(
            ExitCode::for_error(&anyhow::anyhow!("disk on fire")),
            ExitCode::GeneralError
        );
    }
}
