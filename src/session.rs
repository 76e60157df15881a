//! Experimental sessions
//!
//! Session names follow the `dayN-<kind>` convention of the fear-conditioning
//! protocol. The labeling rules depend only on the session family.

use crate::error::ComputeError;
use serde::{Deserialize, Serialize};

/// Substring identifying habituation sessions in the safe context
pub const MORNING_MARKER: &str = "morn";

/// Substring identifying conditioning sessions in the scary context
pub const AFTERNOON_MARKER: &str = "noon";

/// Identifier of the first context test session
pub const TEST1_SESSION: &str = "day4-test1";

/// Identifier of the second context test session
pub const TEST2_SESSION: &str = "day5-test2";

/// Recorded sessions, indexed by their position in the recording order
pub const KNOWN_SESSIONS: [&str; 7] = [
    "day1-epm",
    "day2-morning",
    "day2-afternoon",
    "day3-morning",
    "day3-afternoon",
    TEST1_SESSION,
    TEST2_SESSION,
];

/// Name of the session recorded at `index`
pub fn session_name(index: usize) -> Option<&'static str> {
    KNOWN_SESSIONS.get(index).copied()
}

/// Recording-order index of a session name
pub fn session_index(name: &str) -> Option<usize> {
    KNOWN_SESSIONS.iter().position(|s| *s == name)
}

/// Family of a session, which determines its block schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionFamily {
    Morning,
    Afternoon,
    Test1,
    Test2,
}

impl SessionFamily {
    /// Classify a session name
    ///
    /// Habituation and conditioning sessions match by marker substring; test
    /// sessions must be one of the two test identifiers exactly.
    pub fn classify(session_name: &str) -> Result<Self, ComputeError> {
        if session_name.contains(MORNING_MARKER) {
            Ok(SessionFamily::Morning)
        } else if session_name.contains(AFTERNOON_MARKER) {
            Ok(SessionFamily::Afternoon)
        } else if session_name == TEST1_SESSION {
            Ok(SessionFamily::Test1)
        } else if session_name == TEST2_SESSION {
            Ok(SessionFamily::Test2)
        } else {
            Err(ComputeError::UnknownSessionError(session_name.to_string()))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionFamily::Morning => "morning",
            SessionFamily::Afternoon => "afternoon",
            SessionFamily::Test1 => "test1",
            SessionFamily::Test2 => "test2",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_sessions() {
        assert_eq!(
            SessionFamily::classify("day2-morning").unwrap(),
            SessionFamily::Morning
        );
        assert_eq!(
            SessionFamily::classify("day3-afternoon").unwrap(),
            SessionFamily::Afternoon
        );
        assert_eq!(
            SessionFamily::classify("day4-test1").unwrap(),
            SessionFamily::Test1
        );
        assert_eq!(
            SessionFamily::classify("day5-test2").unwrap(),
            SessionFamily::Test2
        );
    }

    #[test]
    fn test_unknown_sessions() {
        for name in [
            "day9-nope",
            "day1-epm",
            "",
            "day4-test12",
            "day9-test10",
            "xtest2y",
            "test1",
            "day5-test2 ",
        ] {
            assert!(matches!(
                SessionFamily::classify(name),
                Err(ComputeError::UnknownSessionError(_))
            ));
        }
    }

    #[test]
    fn test_session_catalog() {
        assert_eq!(session_name(0), Some("day1-epm"));
        assert_eq!(session_name(6), Some("day5-test2"));
        assert_eq!(session_name(7), None);
        assert_eq!(session_index("day4-test1"), Some(5));
        assert_eq!(session_index("day9-nope"), None);
    }
}
