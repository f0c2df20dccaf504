//! Serde adapter for `f64` fields that may be infinite or NaN.
//!
//! JSON has no literal for non-finite numbers, so they are written as the
//! strings `"inf"`, `"-inf"` and `"nan"`. Finite values stay plain numbers.
//! Use with `#[serde(with = "ldats_core::float_serde")]`.

use serde::de::{self, Unexpected};
use serde::{Deserialize, Deserializer, Serializer};

/// Writes finite values as numbers and the rest as tagged strings.
pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else if value.is_nan() {
        serializer.serialize_str("nan")
    } else if *value > 0.0 {
        serializer.serialize_str("inf")
    } else {
        serializer.serialize_str("-inf")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Encoded {
    Number(f64),
    Tag(String),
}

/// Reads a number or one of the non-finite tags.
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Encoded::deserialize(deserializer)? {
        Encoded::Number(value) => Ok(value),
        Encoded::Tag(tag) => match tag.as_str() {
            "inf" => Ok(f64::INFINITY),
            "-inf" => Ok(f64::NEG_INFINITY),
            "nan" => Ok(f64::NAN),
            other => Err(de::Error::invalid_value(
                Unexpected::Str(other),
                &"a number, \"inf\", \"-inf\" or \"nan\"",
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Scored {
        #[serde(with = "crate::float_serde")]
        value: f64,
    }

    fn round_trip(value: f64) -> (String, f64) {
        let json = serde_json::to_string(&Scored { value }).unwrap();
        let back: Scored = serde_json::from_str(&json).unwrap();
        (json, back.value)
    }

    #[test]
    fn non_finite_values_survive_json() {
        assert_eq!(round_trip(f64::INFINITY), (r#"{"value":"inf"}"#.into(), f64::INFINITY));
        assert_eq!(
            round_trip(f64::NEG_INFINITY),
            (r#"{"value":"-inf"}"#.into(), f64::NEG_INFINITY)
        );
        let (json, back) = round_trip(f64::NAN);
        assert_eq!(json, r#"{"value":"nan"}"#);
        assert!(back.is_nan());
    }

    #[test]
    fn finite_values_stay_numbers() {
        assert_eq!(round_trip(-12.5), (r#"{"value":-12.5}"#.into(), -12.5));
        let parsed: Scored = serde_json::from_str(r#"{"value": 3}"#).unwrap();
        assert_eq!(parsed.value, 3.0);
        assert!(serde_json::from_str::<Scored>(r#"{"value":"huge"}"#).is_err());
    }
}
