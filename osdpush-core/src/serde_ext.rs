// serde implementations for chrono::Duration, which can be applied with the
// `with` field attribute.

pub mod duration_seconds {
    use std::fmt;

    use chrono::Duration;

    pub fn serialize<S>(duration: &Duration, s: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        s.serialize_i64(duration.num_seconds())
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        d.deserialize_i64(DurationVisitor)
    }

    struct DurationVisitor;

    impl serde::de::Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a duration in seconds")
        }

        fn visit_i64<E>(self, value: i64) -> Result<Duration, E>
        where
            E: serde::de::Error,
        {
            Duration::try_seconds(value).ok_or(serde::de::Error::custom("out of bounds"))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Duration, E>
        where
            E: serde::de::Error,
        {
            match i64::try_from(value) {
                Ok(v) => Duration::try_seconds(v).ok_or(serde::de::Error::custom("out of bounds")),
                Err(e) => Err(serde::de::Error::custom(e)),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use chrono::Duration;
        use serde::Deserialize;
        use serde::Serialize;

        #[derive(Debug, Deserialize, Serialize, PartialEq)]
        struct Data {
            #[serde(with = "super")]
            duration: Duration,
        }

        #[test]
        fn test_deserialize() {
            assert_eq!(
                Data {
                    duration: Duration::seconds(1800)
                },
                serde_json::from_str::<Data>(r#"{"duration":1800}"#).unwrap()
            );

            assert!(
                serde_json::from_str::<Data>(&format!(r#"{{"duration":{}}}"#, u64::MAX)).is_err()
            );
        }

        #[test]
        fn test_serialize() {
            let data = Data {
                duration: Duration::seconds(1800),
            };
            assert_eq!(r#"{"duration":1800}"#, serde_json::to_string(&data).unwrap());
        }
    }
}
