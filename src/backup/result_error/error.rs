use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use itertools::Itertools;
use std::fmt::Debug;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    LiblzmaStream(#[from] liblzma::stream::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    ThreadPoolBuildError(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    Nix(#[from] nix::errno::Errno),
    #[error("{program} exited with {status}:\n{}", indent::indent_all_with("  ", stderr))]
    CommandFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{:?} {} failed:\n{}", obj_debug, fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithDebugObjAndFnName {
        error: Box<Error>,
        obj_debug: Box<dyn Debug + Send + Sync>,
        fn_name: String,
    },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>, O: Debug + Send + Sync + 'static> WithDebugObjectAndFnName<S, O> for Error {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        Error::WithDebugObjAndFnName {
            error: Box::new(self),
            obj_debug: Box::new(obj),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(|e| e.into_iter())),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    /// Folds an optional accumulated error with a new one.
    pub fn chain_opt(acc: Option<Error>, other: Error) -> Error {
        match acc {
            None => other,
            Some(e) => e.chain(other),
        }
    }

    /// Number of leaf errors, flattening `LotsOfError`.
    pub fn count(&self) -> usize {
        match self {
            Error::LotsOfError(v) => v.iter().map(Error::count).sum(),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found(msg: &str) -> Error {
        Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, msg.to_string()))
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        match Error::from(io_error) {
            Error::Io(_) => (),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_with_msg_display() {
        let error = not_found("file not found").with_msg("Operation failed");
        let error_str = error.to_string();

        assert!(error_str.contains("Operation failed"));
        assert!(error_str.contains("  file not found"));
    }

    #[test]
    fn test_error_with_debug_display() {
        let error = not_found("file not found").with_debug_object_and_fn_name(42, "prune");
        let error_str = error.to_string();

        assert!(error_str.starts_with("42 prune failed:"));
        assert!(error_str.contains("file not found"));
    }

    #[test]
    fn test_error_chain_flattens() {
        let chained = not_found("a").chain(not_found("b")).chain(not_found("c"));
        match &chained {
            Error::LotsOfError(errors) => assert_eq!(errors.len(), 3),
            _ => panic!("Expected LotsOfError"),
        }
        assert_eq!(chained.count(), 3);
        assert_eq!(chained.into_iter().count(), 3);
    }

    #[test]
    fn test_error_chain_opt() {
        let first = Error::chain_opt(None, not_found("a"));
        assert!(matches!(first, Error::Io(_)));

        let second = Error::chain_opt(Some(first), not_found("b"));
        assert_eq!(second.count(), 2);
    }

    #[test]
    fn test_command_failed_display() {
        use std::os::unix::process::ExitStatusExt;

        let error = Error::CommandFailed {
            program: "mysqldump".to_string(),
            status: ExitStatus::from_raw(2 << 8),
            stderr: "Access denied".to_string(),
        };
        let error_str = error.to_string();

        assert!(error_str.starts_with("mysqldump exited with"));
        assert!(error_str.contains("  Access denied"));
    }
}
