use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// The `request_type` discriminant shared by both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Predict,
    Synthesise,
    Autocomplete,
    AudioData,
    Event,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Predict => "PREDICT",
            RequestType::Synthesise => "SYNTHESISE",
            RequestType::Autocomplete => "AUTOCOMPLETE",
            RequestType::AudioData => "AUDIO_DATA",
            RequestType::Event => "EVENT",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PREDICT" => Ok(RequestType::Predict),
            "SYNTHESISE" => Ok(RequestType::Synthesise),
            "AUTOCOMPLETE" => Ok(RequestType::Autocomplete),
            "AUDIO_DATA" => Ok(RequestType::AudioData),
            "EVENT" => Ok(RequestType::Event),
            other => Err(ProtocolError::UnknownRequestType(other.to_string())),
        }
    }
}

/// Speaking style attached to a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Conversation,
    #[default]
    Mixed,
    Reading,
}

impl Mood {
    pub const ALL: [Mood; 3] = [Mood::Conversation, Mood::Mixed, Mood::Reading];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Conversation => "conversation",
            Mood::Mixed => "mixed",
            Mood::Reading => "reading",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesiseData {
    pub text: String,
    pub mood: Mood,
    pub tts_data: BTreeMap<String, f64>,
    pub is_advanced: bool,
}

/// Payload of an outbound EVENT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    pub event_type: String,
    pub event_data: Value,
    /// RFC 3339, UTC, millisecond precision.
    pub timestamp: String,
}

impl EventData {
    pub fn new(event_type: impl Into<String>, event_data: Value, at: DateTime<Utc>) -> Self {
        EventData {
            event_type: event_type.into(),
            event_data,
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Outbound message, serialized as `{"request_type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "request_type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    Predict { text: String },
    Synthesise(SynthesiseData),
    Autocomplete { input: String },
    AudioData { audio: String },
    Event(EventData),
}

impl Request {
    pub fn request_type(&self) -> RequestType {
        match self {
            Request::Predict { .. } => RequestType::Predict,
            Request::Synthesise(_) => RequestType::Synthesise,
            Request::Autocomplete { .. } => RequestType::Autocomplete,
            Request::AudioData { .. } => RequestType::AudioData,
            Request::Event(_) => RequestType::Event,
        }
    }

    pub fn event(event_type: impl Into<String>, event_data: Value, at: DateTime<Utc>) -> Self {
        Request::Event(EventData::new(event_type, event_data, at))
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Inbound message from the service.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Three candidate phrases (the service asks for exactly three).
    Predict { options: Vec<String> },
    Synthesise { audio_url: String },
    Autocomplete { options: Vec<String> },
    /// Transcription of a recorded audio segment.
    AudioData { transcription: String },
    /// Acknowledgement of an EVENT; carries whatever the service sent.
    Event(Value),
}

impl Response {
    pub fn request_type(&self) -> RequestType {
        match self {
            Response::Predict { .. } => RequestType::Predict,
            Response::Synthesise { .. } => RequestType::Synthesise,
            Response::Autocomplete { .. } => RequestType::Autocomplete,
            Response::AudioData { .. } => RequestType::AudioData,
            Response::Event(_) => RequestType::Event,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    request_type: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct OptionsData {
    options: Vec<String>,
}

#[derive(Deserialize)]
struct SynthesisedData {
    audio_url: String,
}

fn payload<T: for<'de> Deserialize<'de>>(
    request_type: RequestType,
    data: Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::Payload {
        request_type: request_type.as_str(),
        source,
    })
}

/// Decode one inbound text frame.
///
/// A bare `null` frame (what the service replies to EVENT) decodes to
/// [`ProtocolError::Empty`].
pub fn decode(raw: &str) -> Result<Response, ProtocolError> {
    let value: Value = serde_json::from_str(raw)?;
    if value.is_null() {
        return Err(ProtocolError::Empty);
    }
    let envelope: Envelope = serde_json::from_value(value)?;
    let request_type: RequestType = envelope.request_type.parse()?;

    let response = match request_type {
        RequestType::Predict => {
            let data: OptionsData = payload(request_type, envelope.data)?;
            Response::Predict {
                options: data.options,
            }
        }
        RequestType::Synthesise => {
            let data: SynthesisedData = payload(request_type, envelope.data)?;
            Response::Synthesise {
                audio_url: data.audio_url,
            }
        }
        RequestType::Autocomplete => {
            let data: OptionsData = payload(request_type, envelope.data)?;
            Response::Autocomplete {
                options: data.options,
            }
        }
        RequestType::AudioData => Response::AudioData {
            transcription: payload(request_type, envelope.data)?,
        },
        RequestType::Event => Response::Event(envelope.data),
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn to_value(req: &Request) -> Value {
        serde_json::from_str(&req.encode().unwrap()).unwrap()
    }

    #[test]
    fn outbound_envelopes_match_wire_format() {
        assert_eq!(
            to_value(&Request::Predict { text: "hi".into() }),
            json!({"request_type": "PREDICT", "data": {"text": "hi"}})
        );
        assert_eq!(
            to_value(&Request::Autocomplete { input: "he".into() }),
            json!({"request_type": "AUTOCOMPLETE", "data": {"input": "he"}})
        );
        let audio = "data:audio/webm;base64,AAAA";
        assert_eq!(
            to_value(&Request::AudioData {
                audio: audio.into()
            }),
            json!({"request_type": "AUDIO_DATA", "data": {"audio": audio}})
        );
    }

    #[test]
    fn synthesise_uses_camel_case_fields() {
        let req = Request::Synthesise(SynthesiseData {
            text: "hello".into(),
            mood: Mood::Reading,
            tts_data: [("tone".to_string(), 2.5)].into_iter().collect(),
            is_advanced: true,
        });
        assert_eq!(
            to_value(&req),
            json!({
                "request_type": "SYNTHESISE",
                "data": {
                    "text": "hello",
                    "mood": "reading",
                    "ttsData": {"tone": 2.5},
                    "isAdvanced": true
                }
            })
        );
    }

    #[test]
    fn event_timestamp_is_utc_millis() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let req = Request::event("key_press", json!({"button": "a"}), at);
        assert_eq!(req.request_type(), RequestType::Event);
        assert_eq!(
            to_value(&req),
            json!({
                "request_type": "EVENT",
                "data": {
                    "eventType": "key_press",
                    "eventData": {"button": "a"},
                    "timestamp": "2024-03-01T12:30:05.000Z"
                }
            })
        );
    }

    #[test]
    fn decodes_every_response_kind() {
        let predict = r#"{"request_type":"PREDICT","data":{"options":["a","b","c"]}}"#;
        assert_eq!(
            decode(predict).unwrap(),
            Response::Predict {
                options: vec!["a".into(), "b".into(), "c".into()]
            }
        );
        let synthesise = r#"{"request_type":"SYNTHESISE","data":{"audio_url":"http://x/1.wav"}}"#;
        assert_eq!(
            decode(synthesise).unwrap(),
            Response::Synthesise {
                audio_url: "http://x/1.wav".into()
            }
        );
        let autocomplete = r#"{"request_type":"AUTOCOMPLETE","data":{"options":["hey"]}}"#;
        assert_eq!(
            decode(autocomplete).unwrap(),
            Response::Autocomplete {
                options: vec!["hey".into()]
            }
        );
        let audio = r#"{"request_type":"AUDIO_DATA","data":"hello there","language":"en"}"#;
        assert_eq!(
            decode(audio).unwrap(),
            Response::AudioData {
                transcription: "hello there".into()
            }
        );
        assert!(matches!(
            decode(r#"{"request_type":"EVENT"}"#).unwrap(),
            Response::Event(Value::Null)
        ));
    }

    #[test]
    fn unknown_request_type_is_benign() {
        let err = decode(r#"{"request_type":"SHUTDOWN","data":{}}"#).unwrap_err();
        assert!(matches!(
            &err,
            ProtocolError::UnknownRequestType(t) if t == "SHUTDOWN"
        ));
        assert!(err.is_benign());
        assert!(decode("null").unwrap_err().is_benign());
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(matches!(
            decode("{not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode(r#"{"data":{}}"#),
            Err(ProtocolError::Malformed(_))
        ));
        let err = decode(r#"{"request_type":"PREDICT","data":{"options":"nope"}}"#).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Payload {
                request_type: "PREDICT",
                ..
            }
        ));
        assert!(!err.is_benign());
    }

    #[test]
    fn request_type_round_trips_through_strings() {
        for t in [
            RequestType::Predict,
            RequestType::Synthesise,
            RequestType::Autocomplete,
            RequestType::AudioData,
            RequestType::Event,
        ] {
            assert_eq!(t.as_str().parse::<RequestType>().unwrap(), t);
            assert_eq!(serde_json::to_value(t).unwrap(), json!(t.as_str()));
        }
    }
}
