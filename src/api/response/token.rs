use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub access_token: Option<String>,
    /* seconds, sent either as a number or as a string */
    pub expires_in: Option<Value>,
}

impl Token {
    /// Lease announced by the server. A zero lease is no hint at all.
    pub fn expires_in_secs(&self) -> Option<u64> {
        let secs = match self.expires_in.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        secs.filter(|secs| *secs > 0)
    }
}
