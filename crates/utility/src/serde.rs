/// Local date-times as exchanged with the tracking backend:
/// `YYYY-MM-DDTHH:MM:SS` without offset.
pub mod local_date_time {
    use chrono::NaiveDateTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn format(value: &NaiveDateTime) -> String {
        value.format(FORMAT).to_string()
    }

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, FORMAT).map_err(Error::custom)
    }
}

/// Instants as sent by position feeds. Accepts RFC 3339 strings, naive local
/// date-times (with optional fractional seconds) and epoch milliseconds.
pub mod instant {
    use core::fmt;

    use chrono::{DateTime, Local, NaiveDateTime, TimeZone as _};
    use serde::{
        de::{self, Visitor},
        Deserializer, Serializer,
    };

    pub fn parse(value: &str) -> Option<DateTime<Local>> {
        if let Ok(date_time) = DateTime::parse_from_rfc3339(value) {
            return Some(date_time.with_timezone(&Local));
        }
        let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
        Local.from_local_datetime(&naive).earliest()
    }

    pub fn serialize<S>(value: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Local>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct InstantVisitor;

        impl<'de> Visitor<'de> for InstantVisitor {
            type Value = DateTime<Local>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a date-time string or epoch milliseconds")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                parse(value).ok_or_else(|| {
                    de::Error::invalid_value(de::Unexpected::Str(value), &self)
                })
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Local.timestamp_millis_opt(value).single().ok_or_else(|| {
                    de::Error::invalid_value(de::Unexpected::Signed(value), &self)
                })
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let millis = i64::try_from(value).map_err(|_| {
                    de::Error::invalid_value(de::Unexpected::Unsigned(value), &self)
                })?;
                self.visit_i64(millis)
            }

            fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                self.visit_i64(value as i64)
            }
        }

        deserializer.deserialize_any(InstantVisitor)
    }
}

/// Server ids may arrive as JSON numbers or strings; both are kept as
/// strings.
pub mod string_or_number {
    use core::fmt;

    use serde::{
        de::{self, Visitor},
        Deserializer,
    };

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdVisitor;

        impl<'de> Visitor<'de> for IdVisitor {
            type Value = String;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or an integer id")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<String, E> {
                Ok(value.to_owned())
            }

            fn visit_string<E: de::Error>(self, value: String) -> Result<String, E> {
                Ok(value)
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<String, E> {
                Ok(value.to_string())
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<String, E> {
                Ok(value.to_string())
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        struct Wrapper(#[serde(deserialize_with = "deserialize")] String);

        let value: Option<Wrapper> = serde::Deserialize::deserialize(deserializer)?;
        Ok(value.map(|Wrapper(id)| id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Timelike};
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Stamped {
        #[serde(with = "super::instant")]
        at: chrono::DateTime<chrono::Local>,
        #[serde(deserialize_with = "super::string_or_number::deserialize")]
        id: String,
    }

    #[test]
    fn local_date_time_uses_backend_format() {
        let value = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        assert_eq!(super::local_date_time::format(&value), "2024-01-05T23:59:59");
    }

    #[test]
    fn instants_accept_several_encodings() {
        let naive: Stamped =
            serde_json::from_str(r#"{"at":"2024-01-05T10:15:30.250","id":7}"#).unwrap();
        assert_eq!(naive.at.hour(), 10);
        assert_eq!(naive.id, "7");

        let rfc: Stamped =
            serde_json::from_str(r#"{"at":"2024-01-05T10:15:30Z","id":"a"}"#).unwrap();
        assert_eq!(rfc.at.timestamp(), 1_704_449_730);

        let millis: Stamped =
            serde_json::from_str(r#"{"at":1704449730000,"id":"b"}"#).unwrap();
        assert_eq!(millis.at.timestamp(), 1_704_449_730);
    }

    #[test]
    fn garbage_instants_are_rejected() {
        let result = serde_json::from_str::<Stamped>(r#"{"at":"yesterday","id":1}"#);
        assert!(result.is_err());
    }
}
