use serde::{Deserialize, Deserializer};

/// Reply body of a OneBot action. Absent or `null` fields default, so `{}` reads as success.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DispatchOutcome {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub retcode: i64,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
}

fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        self.status == "ok" || self.retcode == 0
    }
}

/// How a reply should be read.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Structured reply that reports success.
    Accepted(DispatchOutcome),
    /// Structured reply that reports failure.
    Rejected(DispatchOutcome),
    /// Opaque body with HTTP 200.
    BareOk,
    /// Opaque body with any other status.
    HttpFailure { status: u16 },
}

/// A parsed body decides on its own; the HTTP status only matters when the body is opaque.
pub fn judge(status: u16, body: &[u8]) -> Verdict {
    match serde_json::from_slice::<DispatchOutcome>(body) {
        Ok(outcome) if outcome.is_success() => Verdict::Accepted(outcome),
        Ok(outcome) => Verdict::Rejected(outcome),
        Err(_) if status == 200 => Verdict::BareOk,
        Err(_) => Verdict::HttpFailure { status },
    }
}
