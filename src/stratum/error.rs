use {super::*, snafu::Snafu};

/// Errors surfaced on the stratum wire as `[code, message, null]`.
///
/// Format and authorization faults get real rejects; everything past the
/// submit guards is answered affirmatively regardless, so these codes mostly
/// show up in logs and in the share event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StratumError {
    IncorrectNtimeSize,
    InvalidNtime,
    NtimeOutOfRange,
    IncorrectNonceSize,
    IncorrectSolutionSize,
    NotSupported,
    JobNotFound,
    DuplicateShare,
    LowDifficultyShare { difficulty: f64 },
    UnauthorizedWorker,
    NotSubscribed,
}

impl StratumError {
    pub fn code(&self) -> u32 {
        match self {
            Self::IncorrectNtimeSize
            | Self::InvalidNtime
            | Self::NtimeOutOfRange
            | Self::IncorrectNonceSize
            | Self::IncorrectSolutionSize
            | Self::NotSupported => 20,
            Self::JobNotFound => 21,
            Self::DuplicateShare => 22,
            Self::LowDifficultyShare { .. } => 23,
            Self::UnauthorizedWorker => 24,
            Self::NotSubscribed => 25,
        }
    }
}

impl Display for StratumError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncorrectNtimeSize => write!(f, "incorrect size of ntime"),
            Self::InvalidNtime => write!(f, "invalid ntime"),
            Self::NtimeOutOfRange => write!(f, "ntime out of range"),
            Self::IncorrectNonceSize => write!(f, "incorrect size of nonce"),
            Self::IncorrectSolutionSize => write!(f, "incorrect size of solution"),
            Self::NotSupported => write!(f, "Not supported."),
            Self::JobNotFound => write!(f, "job not found"),
            Self::DuplicateShare => write!(f, "duplicate share"),
            Self::LowDifficultyShare { difficulty } => {
                write!(f, "low difficulty share of {difficulty}")
            }
            Self::UnauthorizedWorker => write!(f, "unauthorized worker"),
            Self::NotSubscribed => write!(f, "not subscribed"),
        }
    }
}

impl Serialize for StratumError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (self.code(), self.to_string(), Value::Null).serialize(serializer)
    }
}

/// Parse-level failures inside the stratum newtypes.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum InternalError {
    #[snafu(display("Failed to parse hex string: {source}"))]
    HexParse { source: hex::FromHexError },

    #[snafu(display("Invalid length: expected {expected}, got {actual}"))]
    InvalidLength { expected: usize, actual: usize },

    #[snafu(display("Parse error: {message}"))]
    Parse { message: String },

    #[snafu(display("Invalid value: {reason}"))]
    InvalidValue { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes() {
        assert_eq!(StratumError::IncorrectNtimeSize.code(), 20);
        assert_eq!(StratumError::InvalidNtime.code(), 20);
        assert_eq!(StratumError::NtimeOutOfRange.code(), 20);
        assert_eq!(StratumError::IncorrectNonceSize.code(), 20);
        assert_eq!(StratumError::IncorrectSolutionSize.code(), 20);
        assert_eq!(StratumError::NotSupported.code(), 20);
        assert_eq!(StratumError::JobNotFound.code(), 21);
        assert_eq!(StratumError::DuplicateShare.code(), 22);
        assert_eq!(
            StratumError::LowDifficultyShare { difficulty: 0.5 }.code(),
            23
        );
        assert_eq!(StratumError::UnauthorizedWorker.code(), 24);
        assert_eq!(StratumError::NotSubscribed.code(), 25);
    }

    #[test]
    fn serializes_as_error_triple() {
        assert_eq!(
            serde_json::to_value(StratumError::DuplicateShare).unwrap(),
            json!([22, "duplicate share", null])
        );

        assert_eq!(
            serde_json::to_value(StratumError::JobNotFound).unwrap(),
            json!([21, "job not found", null])
        );
    }

    #[test]
    fn low_difficulty_message_carries_value() {
        let error = StratumError::LowDifficultyShare { difficulty: 0.25 };
        assert_eq!(error.to_string(), "low difficulty share of 0.25");
    }

    #[test]
    fn internal_error_display() {
        let err = InternalError::InvalidLength {
            expected: 64,
            actual: 32,
        };
        assert_eq!(err.to_string(), "Invalid length: expected 64, got 32");
    }
}
