//! Response verification.

use crate::request::Response;

/// Message shown when a response fails verification for no specific reason.
pub const GENERIC_FAILURE_MESSAGE: &str = "Seems like something went wrong. You will find the error message in the API Response. If you are having difficulty with Authentication, we have a guide for you in our docs.";

/// Receives the message a verifier attaches to a rejected response.
///
/// The last message set wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorSlot {
    message: Option<String>,
}

impl ErrorSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the error message.
    pub fn set(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    /// Returns the message, if one was set.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns `true` if a message was set.
    pub fn is_set(&self) -> bool {
        self.message.is_some()
    }

    /// Consumes the slot and returns the message.
    pub fn into_message(self) -> Option<String> {
        self.message
    }
}

/// Classifies a response as passed or failed.
///
/// The returned boolean is authoritative. A message set on the slot is only
/// kept when the verifier returns `false`.
///
/// Closures with the signature `Fn(&Response, &mut ErrorSlot) -> bool`
/// implement this trait.
///
/// # Examples
///
/// ```
/// use walkthrough_core::{ErrorSlot, Response, Verifier};
///
/// let verify = |response: &Response, errors: &mut ErrorSlot| {
///     if response.status_code != 200 {
///         errors.set("Oops your request failed");
///         return false;
///     }
///     true
/// };
///
/// let mut slot = ErrorSlot::new();
/// assert!(!verify.verify(&Response::new(404), &mut slot));
/// assert_eq!(slot.message(), Some("Oops your request failed"));
/// ```
pub trait Verifier: Send + Sync {
    /// Returns `true` if the response passes.
    fn verify(&self, response: &Response, errors: &mut ErrorSlot) -> bool;
}

impl<F> Verifier for F
where
    F: Fn(&Response, &mut ErrorSlot) -> bool + Send + Sync,
{
    fn verify(&self, response: &Response, errors: &mut ErrorSlot) -> bool {
        self(response, errors)
    }
}

/// Status-code based verification policy.
///
/// Auth rejection codes are checked first, then accepted codes; anything
/// else fails with the generic message.
///
/// # Examples
///
/// ```
/// use walkthrough_core::{ErrorSlot, Response, StatusVerifier, Verifier};
///
/// let verifier = StatusVerifier::accepting([200])
///     .with_auth_rejection([400, 401], "Authentication Token is Required")
///     .with_failure_message("API Call wasn't able to get a valid response. Please try again.");
///
/// let mut slot = ErrorSlot::new();
/// assert!(!verifier.verify(&Response::new(401), &mut slot));
/// assert_eq!(slot.message(), Some("Authentication Token is Required"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusVerifier {
    accepted: Vec<u16>,
    auth_codes: Vec<u16>,
    auth_message: String,
    failure_message: String,
}

impl Default for StatusVerifier {
    fn default() -> Self {
        Self::accepting([200, 201])
    }
}

impl StatusVerifier {
    /// Accepts exactly the given status codes.
    pub fn accepting(codes: impl IntoIterator<Item = u16>) -> Self {
        Self {
            accepted: codes.into_iter().collect(),
            auth_codes: Vec::new(),
            auth_message: String::new(),
            failure_message: GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }

    /// Rejects the given codes with a dedicated authentication message.
    pub fn with_auth_rejection(
        mut self,
        codes: impl IntoIterator<Item = u16>,
        message: impl Into<String>,
    ) -> Self {
        self.auth_codes = codes.into_iter().collect();
        self.auth_message = message.into();
        self
    }

    /// Replaces the generic failure message.
    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = message.into();
        self
    }

    /// Returns `true` if the status is accepted and not an auth rejection.
    pub fn accepts(&self, status_code: u16) -> bool {
        !self.auth_codes.contains(&status_code) && self.accepted.contains(&status_code)
    }
}

impl Verifier for StatusVerifier {
    fn verify(&self, response: &Response, errors: &mut ErrorSlot) -> bool {
        let status = response.status_code;
        if self.auth_codes.contains(&status) {
            errors.set(self.auth_message.clone());
            false
        } else if self.accepted.contains(&status) {
            true
        } else {
            errors.set(self.failure_message.clone());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_slot_last_message_wins() {
        let mut slot = ErrorSlot::new();
        assert!(!slot.is_set());
        slot.set("first");
        slot.set("second");
        assert_eq!(slot.into_message(), Some("second".to_string()));
    }

    #[test]
    fn test_default_accepts_200_and_201() {
        let verifier = StatusVerifier::default();
        let mut slot = ErrorSlot::new();

        assert!(verifier.verify(&Response::new(200), &mut slot));
        assert!(verifier.verify(&Response::new(201), &mut slot));
        assert!(!slot.is_set());

        assert!(!verifier.verify(&Response::new(204), &mut slot));
        assert_eq!(slot.message(), Some(GENERIC_FAILURE_MESSAGE));
    }

    #[test]
    fn test_auth_codes_take_precedence() {
        let verifier = StatusVerifier::accepting([200, 401])
            .with_auth_rejection([401], "Authentication Token is Required");
        let mut slot = ErrorSlot::new();

        assert!(!verifier.accepts(401));
        assert!(!verifier.verify(&Response::new(401), &mut slot));
        assert_eq!(slot.message(), Some("Authentication Token is Required"));
    }

    #[test]
    fn test_closure_verifier() {
        let verifier = |response: &Response, errors: &mut ErrorSlot| {
            let ok = response.is_success();
            if !ok {
                errors.set(format!("status {}", response.status_code));
            }
            ok
        };
        let boxed: Box<dyn Verifier> = Box::new(verifier);
        let mut slot = ErrorSlot::new();
        assert!(!boxed.verify(&Response::new(503), &mut slot));
        assert_eq!(slot.message(), Some("status 503"));
    }
}
