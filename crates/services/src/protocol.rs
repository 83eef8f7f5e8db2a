//! Wire format of the classification service.
//!
//! Outbound frames are raw JPEG bytes. Every frame is answered with one text
//! message, `{"ready": false}` until the service has enough temporal context
//! and then `{"ready": true, "predicted_label": .., "confidence": .., "probs": {..}}`.

use std::collections::BTreeMap;

use serde::Deserialize;
use url::Url;

use sign_core::model::{LabelMap, Observation};
use sign_core::GateInput;

use crate::error::{EndpointError, ProtocolError};

/// Path of the streaming prediction route on the service.
pub const PREDICT_PATH: &str = "/ws/predict";

/// Label the service sends when it is ready but not yet decided.
pub const UNDECIDED_LABEL: &str = "...";

//
// ─── ENDPOINT ──────────────────────────────────────────────────────────────────
//

/// WebSocket URL of the prediction route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Derive the endpoint from the page the trainer is served from.
    ///
    /// `https` pages upgrade to `wss`, `http` pages use `ws`. Host and port are
    /// kept; path, query and fragment are replaced.
    ///
    /// # Errors
    ///
    /// Returns `EndpointError` if the URL does not parse, has no host, or uses
    /// a scheme other than `http`/`https`.
    pub fn from_page_url(raw: &str) -> Result<Self, EndpointError> {
        let page = parse_url(raw)?;
        let scheme = match page.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => return Err(EndpointError::UnsupportedScheme(other.to_owned())),
        };
        if page.host_str().is_none() {
            return Err(EndpointError::MissingHost(raw.to_owned()));
        }

        let mut url = page;
        url.set_scheme(scheme)
            .map_err(|()| EndpointError::UnsupportedScheme(scheme.to_owned()))?;
        url.set_path(PREDICT_PATH);
        url.set_query(None);
        url.set_fragment(None);
        Ok(Self { url })
    }

    /// Use an explicit `ws://` or `wss://` URL as-is.
    ///
    /// # Errors
    ///
    /// Returns `EndpointError` if the URL does not parse or is not a WebSocket URL.
    pub fn parse(raw: &str) -> Result<Self, EndpointError> {
        let url = parse_url(raw)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(EndpointError::UnsupportedScheme(url.scheme().to_owned()));
        }
        if url.host_str().is_none() {
            return Err(EndpointError::MissingHost(raw.to_owned()));
        }
        Ok(Self { url })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "wss"
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url.as_str())
    }
}

pub(crate) fn parse_url(raw: &str) -> Result<Url, EndpointError> {
    Url::parse(raw.trim()).map_err(|source| EndpointError::InvalidUrl {
        raw: raw.to_owned(),
        source,
    })
}

//
// ─── MESSAGES ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
struct WireMessage {
    ready: bool,
    #[serde(default, alias = "predicted_action")]
    predicted_label: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    probs: Option<BTreeMap<String, f32>>,
}

/// One finalized classifier answer, still in the service's vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
    pub probabilities: BTreeMap<String, f32>,
}

impl Prediction {
    /// Map the raw label onto the catalog and validate the confidence.
    ///
    /// Unmapped labels pass through unchanged.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` for a blank label or a confidence outside `[0, 1]`.
    pub fn observation(&self, labels: &LabelMap) -> Result<Observation, ProtocolError> {
        let symbol = labels.lookup(&self.label).into_symbol()?;
        Ok(Observation::new(symbol, self.confidence)?)
    }
}

/// Decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceMessage {
    /// Not enough context for a verdict yet. Not a failed prediction.
    Pending,
    Prediction(Prediction),
}

impl ServiceMessage {
    /// Decode one text message.
    ///
    /// The service's undecided sentinel is reported as `Pending`.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` for invalid JSON or a finalized message without
    /// a label or confidence.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let wire: WireMessage = serde_json::from_str(text)?;
        if !wire.ready {
            return Ok(Self::Pending);
        }

        let label = wire
            .predicted_label
            .ok_or(ProtocolError::MissingField("predicted_label"))?;
        if label == UNDECIDED_LABEL {
            return Ok(Self::Pending);
        }
        let confidence = wire
            .confidence
            .ok_or(ProtocolError::MissingField("confidence"))?;

        Ok(Self::Prediction(Prediction {
            label,
            confidence,
            probabilities: wire.probs.unwrap_or_default(),
        }))
    }

    /// Convert into gate input, mapping labels through `labels`.
    ///
    /// # Errors
    ///
    /// See [`Prediction::observation`].
    pub fn into_gate_input(self, labels: &LabelMap) -> Result<GateInput, ProtocolError> {
        match self {
            Self::Pending => Ok(GateInput::Pending),
            Self::Prediction(prediction) => {
                Ok(GateInput::Ready(prediction.observation(labels)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sign_core::model::Symbol;

    #[test]
    fn endpoint_follows_page_scheme_and_port() {
        let plain = Endpoint::from_page_url("http://localhost:8001/practice?x=1#top").unwrap();
        assert_eq!(plain.as_str(), "ws://localhost:8001/ws/predict");
        assert!(!plain.is_secure());

        let secure = Endpoint::from_page_url("https://signs.example.org/app/").unwrap();
        assert_eq!(secure.as_str(), "wss://signs.example.org/ws/predict");
        assert!(secure.is_secure());
    }

    #[test]
    fn endpoint_rejects_unknown_schemes() {
        assert!(matches!(
            Endpoint::from_page_url("ftp://example.org/"),
            Err(EndpointError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            Endpoint::from_page_url("not a url"),
            Err(EndpointError::InvalidUrl { .. })
        ));
        assert!(Endpoint::parse("http://localhost:8001/ws/predict").is_err());
        assert!(Endpoint::parse("ws://127.0.0.1:9000/custom").is_ok());
    }

    #[test]
    fn not_ready_is_pending() {
        assert_eq!(
            ServiceMessage::decode(r#"{"ready": false}"#).unwrap(),
            ServiceMessage::Pending
        );
    }

    #[test]
    fn undecided_sentinel_is_pending() {
        let text = r#"{"ready": true, "predicted_action": "...", "confidence": 0.41, "probs": {}}"#;
        assert_eq!(ServiceMessage::decode(text).unwrap(), ServiceMessage::Pending);
    }

    #[test]
    fn decodes_both_label_field_names() {
        let legacy = r#"{"ready": true, "predicted_action": "hello", "confidence": 0.93,
                         "probs": {"hello": 0.93, "thanks": 0.07}}"#;
        let ServiceMessage::Prediction(prediction) = ServiceMessage::decode(legacy).unwrap() else {
            panic!("expected a prediction");
        };
        assert_eq!(prediction.label, "hello");
        assert_eq!(prediction.probabilities.len(), 2);

        let current = r#"{"ready": true, "predicted_label": "thanks", "confidence": 0.7}"#;
        let ServiceMessage::Prediction(prediction) = ServiceMessage::decode(current).unwrap() else {
            panic!("expected a prediction");
        };
        assert_eq!(prediction.label, "thanks");
        assert!(prediction.probabilities.is_empty());
    }

    #[test]
    fn null_probabilities_keep_the_prediction() {
        let text = r#"{"ready":true,"predicted_label":"S1","confidence":0.9,"probs":null}"#;
        let ServiceMessage::Prediction(prediction) = ServiceMessage::decode(text).unwrap() else {
            panic!("expected a prediction");
        };
        assert_eq!(prediction.label, "S1");
        assert!((prediction.confidence - 0.9).abs() < f32::EPSILON);
        assert!(prediction.probabilities.is_empty());
    }

    #[test]
    fn malformed_messages_are_errors() {
        assert!(matches!(
            ServiceMessage::decode("{not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            ServiceMessage::decode(r#"{"ready": true, "confidence": 0.9}"#),
            Err(ProtocolError::MissingField("predicted_label"))
        ));
        assert!(matches!(
            ServiceMessage::decode(r#"{"ready": true, "predicted_label": "hello"}"#),
            Err(ProtocolError::MissingField("confidence"))
        ));
    }

    #[test]
    fn gate_input_maps_labels_and_validates_confidence() {
        let labels = LabelMap::new().with_entry("hello_sign", Symbol::new("hello").unwrap());

        let mapped = ServiceMessage::decode(
            r#"{"ready": true, "predicted_label": "hello_sign", "confidence": 0.8}"#,
        )
        .unwrap()
        .into_gate_input(&labels)
        .unwrap();
        let GateInput::Ready(observation) = mapped else {
            panic!("expected an observation");
        };
        assert_eq!(observation.label().as_str(), "hello");

        let unmapped = ServiceMessage::decode(
            r#"{"ready": true, "predicted_label": "wave", "confidence": 0.8}"#,
        )
        .unwrap()
        .into_gate_input(&labels)
        .unwrap();
        let GateInput::Ready(observation) = unmapped else {
            panic!("expected an observation");
        };
        assert_eq!(observation.label().as_str(), "wave");

        let out_of_range = ServiceMessage::decode(
            r#"{"ready": true, "predicted_label": "wave", "confidence": 1.7}"#,
        )
        .unwrap()
        .into_gate_input(&labels);
        assert!(matches!(out_of_range, Err(ProtocolError::Observation(_))));
    }
}
