//! Stratum message shapes.
//!
//! The dialect is line-delimited JSON-RPC: requests carry `id`, `method`,
//! `params`; responses carry `result` or an `[code, message, null]` error
//! array; notifications are requests with a null id. This module owns the
//! method table and the serialization of everything the pool sends.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};

use crate::job::Job;

/// JSON-RPC and Stratum error codes used in replies.
pub mod error_code {
    /// Request without a method field.
    pub const INVALID_REQUEST: i64 = -32600;
    /// Unknown method.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Wrong arity or parameter types.
    pub const INVALID_PARAMS: i64 = -32602;

    /// Malformed share (bad hex lengths or structure).
    pub const OTHER: i64 = 20;
    /// Share names a job the registry no longer holds.
    pub const STALE_JOB: i64 = 21;
    /// Share hash above the session's target.
    pub const LOW_DIFFICULTY: i64 = 23;
    /// Submit before authorize.
    pub const UNAUTHORIZED: i64 = 24;
}

/// Methods the pool understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::AsRefStr)]
pub enum Method {
    #[strum(serialize = "mining.subscribe")]
    Subscribe,
    #[strum(serialize = "mining.authorize")]
    Authorize,
    #[strum(serialize = "mining.submit")]
    Submit,
    #[strum(serialize = "mining.configure")]
    Configure,
    #[strum(serialize = "mining.suggest_difficulty")]
    SuggestDifficulty,
    #[strum(serialize = "mining.suggest_target")]
    SuggestTarget,
    #[strum(serialize = "mining.extranonce.subscribe")]
    ExtranonceSubscribe,
    #[strum(serialize = "mining.multi_version")]
    MultiVersion,
    #[strum(serialize = "mining.get_transactions")]
    GetTransactions,
}

/// Notification method names the pool emits.
pub const SET_DIFFICULTY: &str = "mining.set_difficulty";
pub const NOTIFY: &str = "mining.notify";

/// An inbound JSON-RPC frame.
///
/// `id` distinguishes an absent field (`None`) from an explicit null
/// (`Some(Value::Null)`); a null id marks a notification.
#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default, deserialize_with = "value_as_some")]
    pub id: Option<Value>,
    pub method: Option<String>,
    #[serde(default)]
    pub params: Value,
}

fn value_as_some<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl Request {
    /// Params as a slice; non-array params read as empty.
    pub fn params_list(&self) -> &[Value] {
        self.params.as_array().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Serialize a result response.
pub fn response(id: &Value, result: Value) -> String {
    json!({ "id": id, "result": result, "error": null }).to_string()
}

/// Serialize an error response, array form `[code, message, null]`.
pub fn error_response(id: &Value, code: i64, message: &str) -> String {
    json!({ "id": id, "result": null, "error": [code, message, null] }).to_string()
}

/// Serialize a notification.
pub fn notification(method: &str, params: Value) -> String {
    json!({ "id": null, "method": method, "params": params }).to_string()
}

/// Header timestamp for outgoing jobs: the current epoch second.
pub fn current_ntime() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32
}

/// `mining.notify` parameter array for a job.
pub fn notify_params(job: &Job, ntime: u32, clean_jobs: bool) -> Value {
    json!([
        job.id.as_str(),
        job.prev_hash_hex(),
        job.coinbase1,
        job.coinbase2,
        job.branches_hex(),
        format!("{:08x}", job.version),
        job.bits.to_string(),
        format!("{ntime:08x}"),
        clean_jobs,
    ])
}

/// A fully serialized `mining.notify` line.
pub fn notify_line(job: &Job, ntime: u32, clean_jobs: bool) -> String {
    notification(NOTIFY, notify_params(job, ntime, clean_jobs))
}

/// A fully serialized `mining.set_difficulty` line.
pub fn set_difficulty_line(difficulty: f64) -> String {
    notification(SET_DIFFICULTY, json!([difficulty]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_method_table() {
        assert_eq!(Method::from_str("mining.subscribe"), Ok(Method::Subscribe));
        assert_eq!(Method::from_str("mining.submit"), Ok(Method::Submit));
        assert_eq!(
            Method::from_str("mining.extranonce.subscribe"),
            Ok(Method::ExtranonceSubscribe)
        );
        assert!(Method::from_str("mining.unknown").is_err());
        assert_eq!(Method::Submit.as_ref(), "mining.submit");
    }

    #[test]
    fn test_request_parsing() {
        let req: Request =
            serde_json::from_str(r#"{"id":1,"method":"mining.subscribe","params":["miner/1.0"]}"#)
                .unwrap();
        assert_eq!(req.id, Some(json!(1)));
        assert_eq!(req.method.as_deref(), Some("mining.subscribe"));
        assert_eq!(req.params_list().len(), 1);

        // Notifications carry a null id.
        let req: Request =
            serde_json::from_str(r#"{"id":null,"method":"mining.ping","params":[]}"#).unwrap();
        assert_eq!(req.id, Some(Value::Null));

        // Missing params defaults to empty.
        let req: Request = serde_json::from_str(r#"{"id":2,"method":"x"}"#).unwrap();
        assert!(req.params_list().is_empty());
    }

    #[test]
    fn test_response_shapes() {
        let line = response(&json!(5), json!(true));
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["id"], json!(5));
        assert_eq!(parsed["result"], json!(true));
        assert_eq!(parsed["error"], Value::Null);

        let line = error_response(&json!(6), error_code::STALE_JOB, "Stale job");
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["result"], Value::Null);
        assert_eq!(parsed["error"], json!([21, "Stale job", null]));
    }

    #[test]
    fn test_set_difficulty_line() {
        let parsed: Value = serde_json::from_str(&set_difficulty_line(0.01)).unwrap();
        assert_eq!(parsed["method"], json!(SET_DIFFICULTY));
        assert_eq!(parsed["params"], json!([0.01]));
        assert_eq!(parsed["id"], Value::Null);
    }
}
