use std::borrow::Cow;

use prometheus::IntCounter;

mod metrics;

/// ErrorMetadata object can be attached to an anyhow error chain via
/// `.context(e /*ErrorMetadata*/)`. It is a generic object to be used
/// across the codebase to tag errors with information that is used to classify.
///
/// The short_msg is used as a tag - available for tests and for metrics
/// logging - to have a message that is resilient to changes in copy.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("{msg}")]
pub struct ErrorMetadata {
    /// The error code associated with this ErrorMetadata
    pub code: ErrorCode,
    /// short ScreamingCamelCase. Usable in tests for string matching
    /// w/ a standard test helper.
    /// Eg InvalidIndexName
    pub short_msg: Cow<'static, str>,
    /// human readable - operator facing. Should be longer and descriptive.
    pub msg: Cow<'static, str>,
}

#[cfg_attr(any(test, feature = "testing"), derive(proptest_derive::Arbitrary))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The run was set up wrong: bad names, missing output location, a
    /// factory that cannot produce an indexer or merger.
    InvalidConfiguration,
    /// Indexing one partition failed.
    BuildFailed,
    /// Merging two fragments failed.
    MergeFailed,
    /// Moving the final fragment to the canonical output failed.
    CommitFailed,
}

impl ErrorMetadata {
    /// Configuration error. Always raised before the offending work starts.
    ///
    /// The short_msg should be a CapitalCamelCased describing the error (eg
    /// InvalidIndexName). The msg should be a descriptive message targeted
    /// toward the operator.
    pub fn invalid_configuration(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::InvalidConfiguration,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    pub fn build_failed(msg: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code: ErrorCode::BuildFailed,
            short_msg: BUILD_FAILED.into(),
            msg: msg.into(),
        }
    }

    pub fn merge_failed(msg: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code: ErrorCode::MergeFailed,
            short_msg: MERGE_FAILED.into(),
            msg: msg.into(),
        }
    }

    /// The fragment named in `msg` stays on disk under its allocated name and
    /// needs manual recovery.
    pub fn commit_failed(msg: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code: ErrorCode::CommitFailed,
            short_msg: COMMIT_FAILED.into(),
            msg: msg.into(),
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        self.code == ErrorCode::InvalidConfiguration
    }

    pub fn is_worker_failure(&self) -> bool {
        matches!(self.code, ErrorCode::BuildFailed | ErrorCode::MergeFailed)
    }

    pub fn is_commit_failure(&self) -> bool {
        self.code == ErrorCode::CommitFailed
    }

    fn metric_status_label_value(&self) -> &'static str {
        match self.code {
            ErrorCode::InvalidConfiguration => "configuration_error",
            ErrorCode::BuildFailed => "build_failed",
            ErrorCode::MergeFailed => "merge_failed",
            ErrorCode::CommitFailed => "commit_failed",
        }
    }

    pub fn custom_metric(&self) -> &'static IntCounter {
        match self.code {
            ErrorCode::InvalidConfiguration => &crate::metrics::INVALID_CONFIGURATION_ERROR_TOTAL,
            ErrorCode::BuildFailed => &crate::metrics::BUILD_FAILED_ERROR_TOTAL,
            ErrorCode::MergeFailed => &crate::metrics::MERGE_FAILED_ERROR_TOTAL,
            ErrorCode::CommitFailed => &crate::metrics::COMMIT_FAILED_ERROR_TOTAL,
        }
    }
}

pub trait ErrorMetadataAnyhowExt {
    fn is_configuration_error(&self) -> bool;
    fn is_worker_failure(&self) -> bool;
    fn is_commit_failure(&self) -> bool;
    fn error_code(&self) -> Option<ErrorCode>;
    fn short_msg(&self) -> &str;
    fn msg(&self) -> &str;
    fn metric_status_label_value(&self) -> &'static str;
    fn report_metric(&self);
    fn wrap_error_message<F>(self, f: F) -> Self
    where
        F: FnOnce(String) -> String;
}

impl ErrorMetadataAnyhowExt for anyhow::Error {
    /// Returns true if error is tagged as InvalidConfiguration
    fn is_configuration_error(&self) -> bool {
        if let Some(e) = self.downcast_ref::<ErrorMetadata>() {
            return e.is_configuration_error();
        }
        false
    }

    /// Returns true if error is tagged as BuildFailed or MergeFailed
    fn is_worker_failure(&self) -> bool {
        if let Some(e) = self.downcast_ref::<ErrorMetadata>() {
            return e.is_worker_failure();
        }
        false
    }

    /// Returns true if error is tagged as CommitFailed
    fn is_commit_failure(&self) -> bool {
        if let Some(e) = self.downcast_ref::<ErrorMetadata>() {
            return e.is_commit_failure();
        }
        false
    }

    fn error_code(&self) -> Option<ErrorCode> {
        self.downcast_ref::<ErrorMetadata>().map(|e| e.code)
    }

    /// Return the short_msg associated with this Error
    fn short_msg(&self) -> &str {
        if let Some(e) = self.downcast_ref::<ErrorMetadata>() {
            return &e.short_msg;
        }
        INTERNAL_ERROR
    }

    /// Return the descriptive msg associated with this Error
    fn msg(&self) -> &str {
        if let Some(e) = self.downcast_ref::<ErrorMetadata>() {
            return &e.msg;
        }
        INTERNAL_ERROR_MSG
    }

    /// Return the value to use for the `status` label on a timer metric
    fn metric_status_label_value(&self) -> &'static str {
        if let Some(e) = self.downcast_ref::<ErrorMetadata>() {
            return e.metric_status_label_value();
        }
        "error"
    }

    fn report_metric(&self) {
        if let Some(e) = self.downcast_ref::<ErrorMetadata>() {
            e.custom_metric().inc();
        }
    }

    /// Wrap the underlying error message, maintaining the underlying error
    /// metadata short code if it exists.
    fn wrap_error_message<F>(self, f: F) -> Self
    where
        F: FnOnce(String) -> String,
    {
        if let Some(mut em) = self.downcast_ref::<ErrorMetadata>().cloned() {
            // Underlying ErrorMetadata. Reuse and reattach it.
            em.msg = f(em.msg.to_string()).into();
            return self.context(em);
        }

        // No underlying code. Just use .context()
        let new_msg = f(self.to_string());
        self.context(new_msg)
    }
}

pub const INTERNAL_ERROR_MSG: &str = "The index build failed unexpectedly.";
pub const INTERNAL_ERROR: &str = "InternalError";
pub const BUILD_FAILED: &str = "PartitionBuildFailed";
pub const MERGE_FAILED: &str = "FragmentMergeFailed";
pub const COMMIT_FAILED: &str = "OutputCommitFailed";

#[cfg(any(test, feature = "testing"))]
mod proptest_impls {
    use proptest::prelude::*;

    use super::{
        ErrorCode,
        ErrorMetadata,
    };

    impl Arbitrary for ErrorMetadata {
        type Parameters = ();

        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with((): Self::Parameters) -> Self::Strategy {
            any::<ErrorCode>()
                .prop_map(|ec| match ec {
                    ErrorCode::InvalidConfiguration => {
                        ErrorMetadata::invalid_configuration("Invalid", "configuration")
                    },
                    ErrorCode::BuildFailed => ErrorMetadata::build_failed("build"),
                    ErrorCode::MergeFailed => ErrorMetadata::merge_failed("merge"),
                    ErrorCode::CommitFailed => ErrorMetadata::commit_failed("commit"),
                })
                .boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;
    use proptest::prelude::*;

    use crate::{
        ErrorCode,
        ErrorMetadata,
        ErrorMetadataAnyhowExt,
        INTERNAL_ERROR,
    };

    proptest! {
        #![proptest_config(
            ProptestConfig { failure_persistence: None, ..ProptestConfig::default() }
        )]

        #[test]
        fn test_classification_is_exclusive(err in any::<ErrorMetadata>()) {
            let flags = [
                err.is_configuration_error(),
                err.is_worker_failure(),
                err.is_commit_failure(),
            ];
            assert_eq!(flags.iter().filter(|f| **f).count(), 1);
            assert_ne!(err.short_msg, INTERNAL_ERROR);
        }

        #[test]
        fn test_classification_survives_context(err in any::<ErrorMetadata>()) {
            let code = err.code;
            let e: anyhow::Result<()> = Err(anyhow::anyhow!("disk full"));
            let e = e.context(err).context("while indexing").unwrap_err();
            assert_eq!(e.error_code(), Some(code));
        }
    }

    #[test]
    fn test_unclassified_error() {
        let e = anyhow::anyhow!("boom");
        assert!(!e.is_configuration_error());
        assert!(!e.is_worker_failure());
        assert_eq!(e.short_msg(), INTERNAL_ERROR);
        assert_eq!(e.metric_status_label_value(), "error");
    }

    #[test]
    fn test_wrap_error_message_keeps_code() {
        let e = anyhow::anyhow!("io").context(ErrorMetadata::merge_failed("merging a and b"));
        let e = e.wrap_error_message(|msg| format!("{msg} into c"));
        assert_eq!(e.error_code(), Some(ErrorCode::MergeFailed));
        assert_eq!(e.msg(), "merging a and b into c");
    }
}
