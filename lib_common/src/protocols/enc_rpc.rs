//! # ENC RPC Envelope
//!
//! Wire types exchanged between the plugin manager and the ENC service, plus the
//! framing used to carry them over TCP.
//!
//! ## Framing
//! Every message is one JSON document preceded by a 4-byte big-endian length
//! (`tokio_util::codec::LengthDelimitedCodec`). A connection may carry several
//! request/response exchanges in sequence.
//!
//! ## Envelopes
//! - [`Args`]: verb, path parameters, multi-valued query string and optional body.
//! - [`Reply`]: result data, numeric status (`0` success, `1` error) and error text.
//!
//! Field names are PascalCase on the wire, matching what the manager sends.

use std::collections::HashMap;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// `PluginReturn` value of a successful reply.
pub const STATUS_SUCCESS: i64 = 0;
/// `PluginReturn` value of a failed reply.
pub const STATUS_ERROR: i64 = 1;

/// Path parameter carrying the private database location.
pub const DB_PATH_PARAM: &str = "PluginDatabasePath";

/// Verb tag of a fetch request.
pub const VERB_FETCH: &str = "GET";
/// Verb tag of a replace request.
pub const VERB_REPLACE: &str = "POST";

/// Largest frame accepted in either direction.
pub const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// Errors from encoding, decoding or transporting envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed before a reply was received")]
    ConnectionClosed,
}

/// Body bytes travel as a base64 string inside the JSON envelope.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// # Request Envelope
///
/// Sent by the manager for every HTTP call routed to the plugin.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Args {
    /// Path-style parameters set by the invoking process (not the network client).
    #[serde(default)]
    pub path_params: HashMap<String, String>,
    /// Query string; each key may carry zero, one or many values.
    #[serde(default)]
    pub query_string: HashMap<String, Vec<String>>,
    /// Raw request body.
    #[serde(default, with = "base64_bytes")]
    pub post_data: Vec<u8>,
    /// `GET` (fetch) or `POST` (replace).
    #[serde(default)]
    pub query_type: String,
}

impl Args {
    /// Starts an envelope with the given verb tag.
    pub fn new(query_type: impl Into<String>) -> Self {
        Self {
            query_type: query_type.into(),
            ..Default::default()
        }
    }

    /// Appends a query string value.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_string.entry(key.into()).or_default().push(value.into());
        self
    }

    /// Sets a path parameter.
    pub fn with_path_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(key.into(), value.into());
        self
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.post_data = body;
        self
    }

    /// First value of a query parameter. A key present with an empty value list
    /// counts as absent; a present empty string does not.
    pub fn query_first(&self, key: &str) -> Option<&str> {
        self.query_string
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Whether a query parameter was sent with at least one value.
    pub fn has_query(&self, key: &str) -> bool {
        self.query_first(key).is_some()
    }

    /// A non-empty path parameter.
    pub fn path_param(&self, key: &str) -> Option<&str> {
        self.path_params
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// # Replace Body
///
/// JSON body of a replace request. Missing fields decode as empty.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PostedData {
    #[serde(default, alias = "classes")]
    pub classes: Vec<String>,
    #[serde(default, alias = "dc")]
    pub dc: String,
    #[serde(default, alias = "environment")]
    pub environment: String,
}

/// # Response Envelope
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Reply {
    /// Formatted classification (fetch only).
    #[serde(default)]
    pub enc_data: String,
    /// `STATUS_SUCCESS` or `STATUS_ERROR`.
    pub plugin_return: i64,
    /// Error message, empty on success.
    #[serde(default)]
    pub plugin_error: String,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        self.plugin_return == STATUS_SUCCESS
    }
}

/// Result of handling one request, before it is flattened onto the wire.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(into = "Reply")]
pub enum Outcome {
    /// Success, carrying the payload (possibly empty).
    Success(String),
    /// Failure, carrying the error message.
    Failure(String),
}

impl From<Outcome> for Reply {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success(enc_data) => Reply {
                enc_data,
                plugin_return: STATUS_SUCCESS,
                plugin_error: String::new(),
            },
            Outcome::Failure(plugin_error) => Reply {
                enc_data: String::new(),
                plugin_return: STATUS_ERROR,
                plugin_error,
            },
        }
    }
}

impl From<Reply> for Outcome {
    fn from(reply: Reply) -> Self {
        if reply.is_success() {
            Outcome::Success(reply.enc_data)
        } else {
            Outcome::Failure(reply.plugin_error)
        }
    }
}

/// A framed transport carrying ENC envelopes.
pub type EncFramed<T> = Framed<T, LengthDelimitedCodec>;

/// Wraps a byte stream in the ENC frame codec.
pub fn framed<T: AsyncRead + AsyncWrite>(io: T) -> EncFramed<T> {
    let codec = LengthDelimitedCodec::builder()
        .length_field_length(4)
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec();
    Framed::new(io, codec)
}

/// Reads the next message. `Ok(None)` means the peer closed the stream cleanly.
pub async fn read_message<M, T>(framed: &mut EncFramed<T>) -> Result<Option<M>, ProtocolError>
where
    M: DeserializeOwned,
    T: AsyncRead + AsyncWrite + Unpin,
{
    match framed.next().await {
        Some(frame) => {
            let frame = frame?;
            Ok(Some(serde_json::from_slice(&frame)?))
        }
        None => Ok(None),
    }
}

/// Serializes and sends one message.
pub async fn write_message<M, T>(framed: &mut EncFramed<T>, message: &M) -> Result<(), ProtocolError>
where
    M: Serialize,
    T: AsyncRead + AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(message)?;
    framed.send(Bytes::from(payload)).await?;
    Ok(())
}

/// Parameters of a fetch call.
#[derive(Debug, Clone, Default)]
pub struct FetchQuery {
    pub salt_id: String,
    pub dc: String,
    pub env: String,
    pub version: String,
    /// Ask for the line-oriented text form instead of JSON.
    pub yaml: bool,
}

/// # ENC Client
///
/// Issues fetch/replace calls over one TCP connection.
pub struct EncClient {
    framed: EncFramed<TcpStream>,
}

impl EncClient {
    /// Connects to an ENC service.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ProtocolError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self { framed: framed(stream) })
    }

    /// Sends a raw envelope and waits for its reply.
    pub async fn call(&mut self, args: &Args) -> Result<Reply, ProtocolError> {
        write_message(&mut self.framed, args).await?;
        read_message(&mut self.framed)
            .await?
            .ok_or(ProtocolError::ConnectionClosed)
    }

    /// Fetches the classification of a node.
    pub async fn fetch(&mut self, db_path: &str, query: &FetchQuery) -> Result<Reply, ProtocolError> {
        let mut args = Args::new(VERB_FETCH)
            .with_path_param(DB_PATH_PARAM, db_path)
            .with_query("salt_id", query.salt_id.as_str())
            .with_query("dc", query.dc.as_str())
            .with_query("env", query.env.as_str())
            .with_query("version", query.version.as_str());
        if query.yaml {
            args = args.with_query("yaml", "true");
        }
        self.call(&args).await
    }

    /// Replaces the override classes of a node.
    pub async fn replace(
        &mut self,
        db_path: &str,
        salt_id: &str,
        env_id: &str,
        body: &PostedData,
    ) -> Result<Reply, ProtocolError> {
        let args = Args::new(VERB_REPLACE)
            .with_path_param(DB_PATH_PARAM, db_path)
            .with_query("salt_id", salt_id)
            .with_query("env_id", env_id)
            .with_body(serde_json::to_vec(body)?);
        self.call(&args).await
    }
}
