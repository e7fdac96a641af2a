/// Field layout generation of the data records in `simulation.log`.
///
/// Decided once by the RUN header, every USER, REQUEST and GROUP line is read with the layout it
/// selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum LogFormatVersion {
    /// Gatling before 3.5, data records carry the virtual user id.
    #[display("legacy")]
    Legacy,
    /// Gatling 3.5 and later, user ids were dropped from data records.
    #[display("current")]
    Current,
}

/// First Gatling release that writes the current layout.
const FIRST_CURRENT_RELEASE: (u32, u32, u32) = (3, 5, 0);

/// First log format generation marker that denotes the current layout.
const FIRST_CURRENT_GENERATION: u32 = 2;

impl LogFormatVersion {
    /// Resolve the layout from the version token found in the RUN header.
    ///
    /// Three component tokens are Gatling release versions (`3.4.2`, `3.9.5-M1`). Two component
    /// tokens are log format generation markers (`2.0`). Anything else is not a version token.
    pub fn from_version_token(token: &str) -> Option<Self> {
        let release = token.trim().split('-').next()?;
        let parts = release
            .split('.')
            .map(|part| part.parse::<u32>().ok())
            .collect::<Option<Vec<_>>>()?;

        let is_current = match parts.as_slice() {
            [generation, _] => *generation >= FIRST_CURRENT_GENERATION,
            [major, minor, patch] => (*major, *minor, *patch) >= FIRST_CURRENT_RELEASE,
            _ => return None,
        };

        Some(if is_current {
            LogFormatVersion::Current
        } else {
            LogFormatVersion::Legacy
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_versions() {
        assert_eq!(
            Some(LogFormatVersion::Legacy),
            LogFormatVersion::from_version_token("3.0.0")
        );
        assert_eq!(
            Some(LogFormatVersion::Legacy),
            LogFormatVersion::from_version_token("3.4.2")
        );
        assert_eq!(
            Some(LogFormatVersion::Current),
            LogFormatVersion::from_version_token("3.5.0")
        );
        assert_eq!(
            Some(LogFormatVersion::Current),
            LogFormatVersion::from_version_token("3.10.3")
        );
        assert_eq!(
            Some(LogFormatVersion::Current),
            LogFormatVersion::from_version_token("3.9.5-M1")
        );
    }

    #[test]
    fn generation_markers() {
        assert_eq!(
            Some(LogFormatVersion::Current),
            LogFormatVersion::from_version_token("2.0")
        );
        assert_eq!(
            Some(LogFormatVersion::Legacy),
            LogFormatVersion::from_version_token("1.0")
        );
    }

    #[test]
    fn not_a_version() {
        assert_eq!(None, LogFormatVersion::from_version_token("1700000000000"));
        assert_eq!(None, LogFormatVersion::from_version_token("description"));
        assert_eq!(None, LogFormatVersion::from_version_token(" "));
        assert_eq!(None, LogFormatVersion::from_version_token("1.2.3.4"));
        assert_eq!(None, LogFormatVersion::from_version_token("v3.5.0"));
    }

    #[test]
    fn display() {
        assert_eq!("legacy", LogFormatVersion::Legacy.to_string());
        assert_eq!("current", LogFormatVersion::Current.to_string());
    }
}
