//! Response classification.
//!
//! The co-processor's replies are free text. Rather than parsing them, the
//! engine looks for tokens in whatever has been received so far. The rules
//! for that live behind [`ResponseMatcher`] so they can be swapped and tested
//! on their own.

use crate::util;

/// Tokens a pending exchange is waiting for.
#[derive(Debug, Clone, Copy)]
pub struct Expect<'a> {
    /// Any of these completes the exchange successfully.
    pub success: &'a [&'a str],
    /// Any of these fails the exchange, unless a success token is also present.
    pub failure: &'a [&'a str],
}

/// Failure tokens every exchange recognizes.
pub const DEFAULT_FAILURES: &[&str] = &["ERROR"];

/// Token the firmware prints when it cannot take a command right now.
pub const BUSY: &str = "busy";

impl<'a> Expect<'a> {
    /// Waits for `success`, failing on `failure`.
    pub const fn new(success: &'a [&'a str], failure: &'a [&'a str]) -> Self {
        Self { success, failure }
    }

    /// Waits for `success` with the default failure set.
    pub const fn any(success: &'a [&'a str]) -> Self {
        Self::new(success, DEFAULT_FAILURES)
    }
}

/// Verdict on the bytes received so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// The success token at this index of [`Expect::success`] was found.
    Matched(usize),
    /// A failure token was found.
    Failed,
    /// The firmware reported `busy`.
    Busy,
}

/// Decides whether a response is complete and how it ended.
pub trait ResponseMatcher {
    /// Returns `None` while the response is still incomplete.
    fn classify(&self, response: &[u8], expect: &Expect<'_>) -> Option<Outcome>;
}

/// Bounded substring matching.
///
/// Success tokens are checked first, then failure tokens, then `busy`. A
/// response holding both the expected token and `ERROR` therefore counts as
/// a success.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstringMatcher;

impl ResponseMatcher for SubstringMatcher {
    fn classify(&self, response: &[u8], expect: &Expect<'_>) -> Option<Outcome> {
        if let Some(i) = expect
            .success
            .iter()
            .position(|t| util::contains(response, t.as_bytes()))
        {
            return Some(Outcome::Matched(i));
        }
        if expect
            .failure
            .iter()
            .any(|t| util::contains(response, t.as_bytes()))
        {
            return Some(Outcome::Failed);
        }
        if util::contains(response, BUSY.as_bytes()) {
            return Some(Outcome::Busy);
        }
        None
    }
}

impl<M: ResponseMatcher + ?Sized> ResponseMatcher for &M {
    fn classify(&self, response: &[u8], expect: &Expect<'_>) -> Option<Outcome> {
        (**self).classify(response, expect)
    }
}
