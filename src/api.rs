
pub mod error;
pub mod fingerprint;
pub mod metrics;
pub mod pointer;
pub mod stage;
pub mod store;
pub mod variables;

// serialize Option<DateTime<Utc>> as an RFC 3339 string
mod opt_rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::de::{self, Deserialize, Deserializer};
    use serde::ser::{Serialize, Serializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>
    {
        let s = Option::<String>::deserialize(deserializer)?;
        if let Some(s) = s {
            let parsed = DateTime::parse_from_rfc3339(&s).map_err(de::Error::custom)?;
            Ok(Some(parsed.with_timezone(&Utc)))
        } else {
            Ok(None)
        }
    }

    pub fn serialize<S>(time: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = time.map(|time| time.to_rfc3339());
        s.serialize(serializer)
    }
}
