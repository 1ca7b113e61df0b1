//! Decoding JSON payloads out of `az` output
//!
//! `az` can print warnings or progress text ahead of its JSON result, so the
//! payload is located by its opening bracket rather than parsed from byte 0.

use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Decode the JSON array starting at the first `[` in `output`.
pub fn parse_array<T: DeserializeOwned>(output: &str) -> Result<Vec<T>> {
    parse_anchored(output, '[')
}

/// Decode the JSON object starting at the first `{` in `output`.
pub fn parse_object<T: DeserializeOwned>(output: &str) -> Result<T> {
    parse_anchored(output, '{')
}

fn parse_anchored<T: DeserializeOwned>(output: &str, anchor: char) -> Result<T> {
    let start = output.find(anchor).ok_or_else(|| {
        Error::internal(format!("no JSON payload starting with '{}' in az output", anchor))
    })?;

    // Trailing text after the payload is tolerated, only the first value is read.
    let mut stream = serde_json::Deserializer::from_str(&output[start..]).into_iter::<T>();
    match stream.next() {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(Error::internal(format!("malformed JSON in az output: {}", e))),
        None => Err(Error::internal("empty JSON payload in az output")),
    }
}
