use std::fmt;

/// A bot token or API key that must never reach a log line.
///
/// `Debug` and `Display` always print `[REDACTED]`. Call `unsecure()` at the
/// single point where the value goes into an HTTP header or gateway payload.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Access the raw underlying string
    pub fn unsecure(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatting_redacts() {
        let token = SecretString::new("MTA5.abc.def");
        assert_eq!(format!("{}", token), "[REDACTED]");
        assert_eq!(format!("{:?}", token), "SecretString([REDACTED])");
        assert_eq!(token.unsecure(), "MTA5.abc.def");
    }
}
