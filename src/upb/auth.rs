//! PIM challenge/response authentication.
//!
//! When the PIM hello announces that authentication is required it carries a random
//! challenge. The client answers with its username and the HMAC-MD5 of the challenge
//! keyed by the shared password, hex encoded with the case of every letter swapped.
//! The proxy recomputes the same value from its configured credentials so it can report
//! whether the exchange should succeed.
//!
//! A challenge is good for exactly one attempt. It is dropped whatever the outcome and
//! a retry has to wait for the PIM to issue a new one.

use hmac::{Hmac, Mac};
use md5::Md5;
use serde::Serialize;

use super::error::AuthError;
use super::hex;

type HmacMd5 = Hmac<Md5>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthState {
    AwaitingChallenge,
    ChallengeReceived,
    Verifying,
    Authenticated,
    Failed,
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug)]
pub struct Authenticator {
    credentials: Option<Credentials>,
    challenge: Option<Vec<u8>>,
    state: AuthState,
}

impl Authenticator {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            credentials,
            challenge: None,
            state: AuthState::AwaitingChallenge,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn challenge(&self) -> Option<&[u8]> {
        self.challenge.as_deref()
    }

    /// Capture a fresh challenge from the PIM hello.
    pub fn set_challenge(&mut self, challenge: Vec<u8>) {
        self.challenge = Some(challenge);
        self.state = AuthState::ChallengeReceived;
    }

    /// Check a client answer against the captured challenge. Consumes the challenge.
    pub fn verify(&mut self, username: &str, response: &str) -> Result<(), AuthError> {
        let challenge = match self.challenge.take() {
            Some(c) => c,
            None => {
                return Err(match self.state {
                    AuthState::Authenticated | AuthState::Failed => AuthError::StaleChallenge,
                    _ => AuthError::NoChallenge,
                })
            }
        };
        self.state = AuthState::Verifying;

        let outcome = match self.credentials.as_ref() {
            None => Err(AuthError::NotConfigured),
            Some(creds) if creds.username != username => {
                Err(AuthError::UnknownUser(username.to_string()))
            }
            Some(creds) => match expected_response(&creds.password, &challenge) {
                Ok(expected) if expected == response => Ok(()),
                Ok(_) => Err(AuthError::BadResponse),
                Err(e) => Err(e),
            },
        };

        self.state = if outcome.is_ok() {
            AuthState::Authenticated
        } else {
            AuthState::Failed
        };
        outcome
    }

    /// Forget any pending challenge and return to the initial state.
    pub fn reset(&mut self) {
        self.challenge = None;
        self.state = AuthState::AwaitingChallenge;
    }
}

/// The response string a client must send for `challenge`.
pub fn expected_response(password: &str, challenge: &[u8]) -> Result<String, AuthError> {
    let mut mac =
        HmacMd5::new_from_slice(password.as_bytes()).map_err(|_| AuthError::NotConfigured)?;
    mac.update(challenge);
    let digest = mac.finalize().into_bytes();
    Ok(swap_case(&hex::encode(&digest)))
}

fn swap_case(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_lowercase() {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Option<Credentials> {
        Some(Credentials {
            username: "upstart".to_string(),
            password: "secret".to_string(),
        })
    }

    #[test]
    fn response_is_case_swapped_hex() {
        let resp = expected_response("secret", &[0x11; 32]).unwrap();
        assert_eq!(resp.len(), 32);
        assert!(resp.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert_eq!(swap_case("a1B2"), "A1b2");
    }

    #[test]
    fn rfc2202_vector_matches() {
        // HMAC-MD5("Jefe", "what do ya want for nothing?")
        let resp = expected_response("Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(resp, "750C783E6AB0B503EAA86E310A5DB738");
    }

    #[test]
    fn correct_answer_authenticates() {
        let mut auth = Authenticator::new(creds());
        let challenge = vec![0x5A; 32];
        let answer = expected_response("secret", &challenge).unwrap();
        auth.set_challenge(challenge);
        assert_eq!(auth.state(), AuthState::ChallengeReceived);
        assert_eq!(auth.verify("upstart", &answer), Ok(()));
        assert_eq!(auth.state(), AuthState::Authenticated);
        assert!(auth.challenge().is_none());
    }

    #[test]
    fn wrong_password_fails_and_challenge_is_stale() {
        let mut auth = Authenticator::new(creds());
        let challenge = vec![0x01; 32];
        let good = expected_response("secret", &challenge).unwrap();
        let bad = expected_response("guess", &challenge).unwrap();
        auth.set_challenge(challenge);
        assert_eq!(auth.verify("upstart", &bad), Err(AuthError::BadResponse));
        assert_eq!(auth.state(), AuthState::Failed);
        assert_eq!(auth.verify("upstart", &good), Err(AuthError::StaleChallenge));
    }

    #[test]
    fn username_must_match() {
        let mut auth = Authenticator::new(creds());
        let challenge = vec![0x02; 32];
        let answer = expected_response("secret", &challenge).unwrap();
        auth.set_challenge(challenge);
        assert_eq!(
            auth.verify("intruder", &answer),
            Err(AuthError::UnknownUser("intruder".to_string()))
        );
    }

    #[test]
    fn no_challenge_and_no_credentials() {
        let mut auth = Authenticator::new(creds());
        assert_eq!(auth.verify("upstart", "00"), Err(AuthError::NoChallenge));

        let mut bare = Authenticator::new(None);
        bare.set_challenge(vec![1, 2, 3]);
        assert_eq!(bare.verify("upstart", "00"), Err(AuthError::NotConfigured));
    }

    #[test]
    fn debug_redacts_password() {
        let shown = format!("{:?}", creds().unwrap());
        assert!(!shown.contains("secret"));
    }
}
