//! In-memory handling of secret material

use secrecy::{ExposeSecret, SecretString};

/// Secret material held by a backend: fetched values, bearer tokens and
/// client secrets.
///
/// The buffer is zeroed when dropped. Formatting with `{}` or `{:?}` prints
/// `[REDACTED]`, so a value can sit in a struct that derives `Debug`.
#[derive(Clone)]
pub struct SecureSecret(SecretString);

impl SecureSecret {
    /// Take ownership of `value`.
    #[must_use]
    pub fn new(value: String) -> Self {
        Self(SecretString::from(value))
    }

    /// Borrow the plaintext.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Copy the plaintext into a JSON string, the shape every backend returns.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::String(self.expose().to_owned())
    }
}

impl From<String> for SecureSecret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecureSecret {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

impl std::fmt::Debug for SecureSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl std::fmt::Display for SecureSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expose_returns_plaintext() {
        let token = SecureSecret::new("eyJ0eXAiOiJKV1Qi".to_string());
        assert_eq!(token.expose(), "eyJ0eXAiOiJKV1Qi");
    }

    #[test]
    fn test_formatting_is_redacted() {
        let secret = SecureSecret::from("a_value_v1");
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(format!("{secret}"), "[REDACTED]");

        #[derive(Debug)]
        #[allow(dead_code)]
        struct Holder {
            value: SecureSecret,
        }
        let holder = format!("{:?}", Holder { value: secret });
        assert!(!holder.contains("a_value_v1"));
    }

    #[test]
    fn test_to_json() {
        let secret = SecureSecret::from("");
        assert_eq!(secret.to_json(), serde_json::Value::String(String::new()));
        assert_eq!(SecureSecret::from("v").to_json(), "v");
    }
}
