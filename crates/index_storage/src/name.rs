use std::{
    fmt,
    ops::Deref,
    str::FromStr,
    sync::LazyLock,
};

use errors::ErrorMetadata;
use regex::Regex;

// Names are used as file name prefixes, and `.` separates the name from the
// structure suffix, so it must not appear in the name itself.
static INDEX_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("static regex"));

/// The name of one index (a fragment or the committed output) within its
/// location.
#[cfg_attr(any(test, feature = "testing"), derive(proptest_derive::Arbitrary))]
#[derive(Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
#[must_use]
pub struct IndexName(
    #[cfg_attr(
        any(test, feature = "testing"),
        proptest(strategy = "\"[a-zA-Z0-9_-]{1,24}\"")
    )]
    String,
);

impl IndexName {
    /// Builds `<prefix><n>`, the shape used for allocated fragment names.
    pub fn numbered(prefix: &IndexName, n: u64) -> Self {
        // Appending digits to a valid name keeps it valid.
        Self(format!("{}{n}", prefix.0))
    }
}

impl TryFrom<String> for IndexName {
    type Error = anyhow::Error;

    fn try_from(s: String) -> anyhow::Result<Self> {
        anyhow::ensure!(
            INDEX_NAME_REGEX.is_match(&s),
            ErrorMetadata::invalid_configuration(
                "InvalidIndexName",
                format!("Index name {s:?} may only contain alphanumerics, '_' and '-'"),
            )
        );
        Ok(Self(s))
    }
}

impl TryFrom<&str> for IndexName {
    type Error = anyhow::Error;

    fn try_from(s: &str) -> anyhow::Result<Self> {
        s.to_string().try_into()
    }
}

impl FromStr for IndexName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        s.try_into()
    }
}

impl From<IndexName> for String {
    fn from(value: IndexName) -> Self {
        value.0
    }
}

impl Deref for IndexName {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for IndexName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use errors::ErrorMetadataAnyhowExt;
    use proptest::prelude::*;

    use super::IndexName;

    #[test]
    fn test_invalid_names() {
        for bad in ["", "data.properties", "a/b", "with space", "../data"] {
            let err = IndexName::try_from(bad).unwrap_err();
            assert!(err.is_configuration_error(), "{bad:?} was accepted");
            assert_eq!(err.short_msg(), "InvalidIndexName");
        }
    }

    #[test]
    fn test_numbered() -> anyhow::Result<()> {
        let prefix: IndexName = "data_stream".parse()?;
        assert_eq!(&*IndexName::numbered(&prefix, 0), "data_stream0");
        assert_eq!(&*IndexName::numbered(&prefix, 17), "data_stream17");
        Ok(())
    }

    proptest! {
        #![proptest_config(
            ProptestConfig { failure_persistence: None, ..ProptestConfig::default() }
        )]

        #[test]
        fn test_name_roundtrips_through_string(name in any::<IndexName>()) {
            let s = String::from(name.clone());
            prop_assert_eq!(IndexName::try_from(s).unwrap(), name);
        }
    }
}
