use serde::{Deserialize, Serialize};

pub const SUCCESS_CODE: i32 = 200;
pub const FAIL_CODE: i32 = 500;

/// Generic `{code, message, payload}` return value used by every remote and
/// local operation. Exactly two outcomes are recognized at this layer:
/// [`SUCCESS_CODE`] and [`FAIL_CODE`]. The message may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEnvelope<T> {
    pub code: i32,
    pub msg: String,
    pub content: Option<T>,
}

impl<T> ResultEnvelope<T> {
    pub fn ok() -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: String::new(),
            content: None,
        }
    }

    pub fn ok_msg(msg: impl Into<String>) -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: msg.into(),
            content: None,
        }
    }

    pub fn of(content: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: String::new(),
            content: Some(content),
        }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self {
            code: FAIL_CODE,
            msg: msg.into(),
            content: None,
        }
    }

    /// Failure with no payload and no message, for callers that treat the
    /// absence of a message as "nothing to report".
    pub fn fail_empty() -> Self {
        Self {
            code: FAIL_CODE,
            msg: String::new(),
            content: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}
