//! Tests for error types.

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = Error::config("unknown case sensitivity");
        assert_eq!(
            err.to_string(),
            "configuration error: unknown case sensitivity"
        );
    }

    #[test]
    fn test_invalid_path_display() {
        let err = SnapshotError::invalid_path("src/lib.rs", "path must be absolute");
        assert_eq!(
            err.to_string(),
            "invalid path 'src/lib.rs': path must be absolute"
        );
    }

    #[test]
    fn test_snapshot_error_conversion() {
        let snap_err = SnapshotError::invalid_path("x", "y");
        let err: Error = snap_err.into();
        assert!(matches!(err, Error::Snapshot(_)));
    }

    #[test]
    fn test_probe_error_keeps_source() {
        let err = SnapshotError::Probe {
            path: "/proj/a.txt".to_string(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/proj/a.txt"));
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "denied");
    }

    #[test]
    fn test_watcher_error_conversion() {
        let watch_err = WatcherError::RegistrationFailed {
            path: "/tmp/test".to_string(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        };
        let err: Error = watch_err.into();
        assert!(matches!(err, Error::Watcher(_)));
        assert!(err.is_registration_failure());
    }

    #[test]
    fn test_registration_failure_display() {
        let err = WatcherError::RegistrationFailed {
            path: "/proj/src".to_string(),
            source: io::Error::other("no space left for watches"),
        };
        assert_eq!(
            err.to_string(),
            "failed to watch path '/proj/src': no space left for watches"
        );
    }

    #[test]
    fn test_close_failed_is_not_registration_failure() {
        let err: Error = WatcherError::CloseFailed {
            source: io::Error::other("bad descriptor"),
        }
        .into();
        assert!(!err.is_registration_failure());
        assert_eq!(
            err.to_string(),
            "watcher error: failed to close watch service: bad descriptor"
        );
    }

    #[test]
    fn test_service_init_display() {
        let err = WatcherError::ServiceInit {
            reason: "inotify limit reached".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to start watch service: inotify limit reached"
        );
    }

    #[test]
    fn test_error_internal() {
        let err = Error::internal("test internal error");
        assert_eq!(err.to_string(), "internal error: test internal error");
    }

    #[test]
    fn test_error_debug_format() {
        let err = Error::Internal("something went wrong".to_string());
        let debug_str = format!("{err:?}");
        assert!(debug_str.contains("Internal"));
        assert!(debug_str.contains("something went wrong"));
    }

    #[test]
    fn test_error_propagation_with_question_mark() {
        fn inner() -> Result<i32> {
            Err(Error::config("inner error"))
        }

        fn outer() -> Result<i32> {
            let _ = inner()?;
            Ok(0)
        }

        let result = outer();
        assert_eq!(
            result.unwrap_err().to_string(),
            "configuration error: inner error"
        );
    }
}
