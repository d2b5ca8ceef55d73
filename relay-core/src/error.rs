//! The framework's error taxonomy: a small, closed set of integer codes
//! (see the framework's design notes) plus fingerprinting for debug-mode
//! aggregation.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Closed taxonomy of error codes. The framework reserves the range below 1000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Code {
    Ok = 0,
    SysInternal = 101,
    SysBusy = 102,
    SysUnhandled = 103,
    CallerInvalidRequest = 201,
    CallerUnauthorizedAccess = 202,
    UserInvalidAct = 301,
    UserUnauthorizedAct = 302,
}

impl Code {
    fn http_status(self) -> StatusCode {
        match self {
            Code::Ok => StatusCode::OK,
            Code::SysInternal | Code::SysUnhandled => StatusCode::INTERNAL_SERVER_ERROR,
            Code::SysBusy => StatusCode::SERVICE_UNAVAILABLE,
            Code::CallerInvalidRequest => StatusCode::BAD_REQUEST,
            Code::CallerUnauthorizedAccess => StatusCode::UNAUTHORIZED,
            Code::UserInvalidAct => StatusCode::BAD_REQUEST,
            Code::UserUnauthorizedAct => StatusCode::FORBIDDEN,
        }
    }

    pub fn from_i32(v: i32) -> Option<Code> {
        Some(match v {
            0 => Code::Ok,
            101 => Code::SysInternal,
            102 => Code::SysBusy,
            103 => Code::SysUnhandled,
            201 => Code::CallerInvalidRequest,
            202 => Code::CallerUnauthorizedAccess,
            301 => Code::UserInvalidAct,
            302 => Code::UserUnauthorizedAct,
            _ => return None,
        })
    }
}

impl Serialize for Code {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        (*self as i32).serialize(s)
    }
}

impl<'de> Deserialize<'de> for Code {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let v = i32::deserialize(d)?;
        Code::from_i32(v).ok_or_else(|| serde::de::Error::custom(format!("unknown error code {v}")))
    }
}

/// A single captured stack frame, used for fingerprinting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Frame {
    pub file: String,
    pub function: String,
    pub line: u32,
}

const MAX_STACK_DEPTH: usize = 32;

/// The framework's error type. Two errors are equal iff their codes match —
/// callers compare by sentinel code, never by message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayError {
    pub code: Code,
    pub desc: String,
    pub cause: String,
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub stack: Vec<Frame>,
}

impl PartialEq for RelayError {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}
impl Eq for RelayError {}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code as i32, self.desc)
    }
}

impl std::error::Error for RelayError {}

impl RelayError {
    /// A fresh error carrying `code`, never a mutated shared sentinel.
    pub fn new(code: Code, desc: impl Into<String>) -> Self {
        RelayError {
            code,
            desc: desc.into(),
            cause: String::new(),
            fingerprint: None,
            stack: Vec::new(),
        }
    }

    /// Sets `Desc`, consuming and returning `self` (builder style).
    pub fn d(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = cause.into();
        self
    }

    /// Captures the current call stack, bounded to 32 frames.
    pub fn with_stack(mut self) -> Self {
        self.stack = capture_stack(MAX_STACK_DEPTH);
        self
    }

    /// Hashes the (file, function, line) triple of each stack frame, MD5s the
    /// concatenation, and records the aggregate in the fingerprint tables.
    pub fn with_fingerprint(mut self) -> Self {
        if self.stack.is_empty() {
            self = self.with_stack();
        }
        let mut joined = String::new();
        for frame in &self.stack {
            joined.push_str(&frame.file);
            joined.push(':');
            joined.push_str(&frame.function);
            joined.push(':');
            joined.push_str(&frame.line.to_string());
            joined.push('|');
        }
        let digest = format!("{:x}", md5::compute(joined.as_bytes()));
        fingerprint_table().record(&digest, &self.stack);
        self.fingerprint = Some(digest);
        self
    }
}

/// Captures up to `max` frames of the current call stack via
/// `std::backtrace::Backtrace`'s stable `Display` output — the only
/// structured-enough surface available without a nightly feature.
fn capture_stack(max: usize) -> Vec<Frame> {
    let bt = std::backtrace::Backtrace::force_capture();
    let text = format!("{bt}");
    let mut frames = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || !line.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        if let Some(idx) = line.find(':') {
            let name = line[idx + 1..].trim();
            if !name.is_empty() {
                frames.push(Frame {
                    file: "backtrace".to_string(),
                    function: name.to_string(),
                    line: 0,
                });
            }
        }
        if frames.len() >= max {
            break;
        }
    }
    frames
}

/// Process-global aggregation tables used by the debug `/error/query/:fingerprint`
/// and `/error/statics` endpoints.
#[derive(Default)]
pub struct FingerprintTable {
    inner: Mutex<HashMap<String, FingerprintEntry>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FingerprintEntry {
    pub count: u64,
    pub stack: Vec<Frame>,
}

impl FingerprintTable {
    fn record(&self, digest: &str, stack: &[Frame]) {
        let mut map = self.inner.lock().expect("fingerprint table poisoned");
        let entry = map.entry(digest.to_string()).or_insert_with(|| FingerprintEntry {
            count: 0,
            stack: stack.to_vec(),
        });
        entry.count += 1;
    }

    pub fn query(&self, fingerprint: &str) -> Option<FingerprintEntry> {
        self.inner.lock().expect("fingerprint table poisoned").get(fingerprint).cloned()
    }

    pub fn statics(&self) -> HashMap<String, FingerprintEntry> {
        self.inner.lock().expect("fingerprint table poisoned").clone()
    }
}

static FINGERPRINTS: OnceLock<FingerprintTable> = OnceLock::new();

pub fn fingerprint_table() -> &'static FingerprintTable {
    FINGERPRINTS.get_or_init(FingerprintTable::default)
}

/// Sentinel constructors. Each call produces a fresh [`RelayError`]; none of
/// these ever hold or mutate shared state — reusing a shared sentinel
/// instance across calls is treated as a defect, not reproduced here.
pub mod sentinel {
    use super::{Code, RelayError};

    macro_rules! sentinel_fn {
        ($name:ident, $code:expr, $default_desc:expr) => {
            pub fn $name(desc: impl Into<String>) -> RelayError {
                let d = desc.into();
                RelayError::new($code, if d.is_empty() { $default_desc.to_string() } else { d })
            }
        };
    }

    sentinel_fn!(sys_internal, Code::SysInternal, "internal error");
    sentinel_fn!(sys_busy, Code::SysBusy, "server busy");
    sentinel_fn!(sys_unhandled, Code::SysUnhandled, "unhandled panic");
    sentinel_fn!(caller_invalid_request, Code::CallerInvalidRequest, "invalid request");
    sentinel_fn!(caller_unauthorized_access, Code::CallerUnauthorizedAccess, "unauthorized");
    sentinel_fn!(user_invalid_act, Code::UserInvalidAct, "invalid action");
    sentinel_fn!(user_unauthorized_act, Code::UserUnauthorizedAct, "unauthorized action");
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.code.http_status();
        let body = serde_json::json!({
            "data": serde_json::Value::Object(Default::default()),
            "error": {
                "code": self.code as i32,
                "desc": self.desc,
                "cause": self.cause,
                "fingerprint": self.fingerprint,
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_code_only() {
        let a = sentinel::caller_invalid_request("missing field x");
        let b = sentinel::caller_invalid_request("missing field y");
        assert_eq!(a, b);
        assert_ne!(a, sentinel::sys_internal(""));
    }

    #[test]
    fn new_never_mutates_a_shared_sentinel() {
        let a = sentinel::sys_internal("first");
        let b = sentinel::sys_internal("second");
        assert_eq!(a.code, b.code);
        assert_ne!(a.desc, b.desc);
    }

    #[test]
    fn error_roundtrips_through_json() {
        let err = sentinel::sys_internal("boom").with_fingerprint();
        let json = serde_json::to_string(&err).unwrap();
        let back: RelayError = serde_json::from_str(&json).unwrap();
        assert_eq!(err.code, back.code);
        assert_eq!(err.desc, back.desc);
        assert_eq!(err.cause, back.cause);
        assert_eq!(err.fingerprint, back.fingerprint);
    }

    #[test]
    fn fingerprint_table_aggregates_counts() {
        let tagged = sentinel::sys_internal("x").with_fingerprint();
        let fp = tagged.fingerprint.clone().unwrap();
        let before = fingerprint_table().query(&fp).map(|e| e.count).unwrap_or(0);
        let _ = sentinel::sys_internal("x").with_fingerprint();
        let after = fingerprint_table().query(&fp).map(|e| e.count).unwrap_or(0);
        assert!(after >= before);
    }
}
