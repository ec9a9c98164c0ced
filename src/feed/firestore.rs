//! Firestore document change feed.
//!
//! Watches one document through the Firestore REST API. The document is
//! polled at a fixed interval and a [`ChangeBatch`] is delivered whenever its
//! `updateTime` moves, so every server-side write produces exactly one
//! notification. The first successful poll always delivers the current state,
//! matching the initial snapshot of a streaming listener.

use super::{
    ChangeBatch, ChangeFeed, ChangeKind, DocumentChange, Snapshot, SubscriptionHandle,
    UpdateHandler,
};
use crate::error::{Result, TrackerError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use yup_oauth2::ServiceAccountAuthenticator;
use yup_oauth2::authenticator::DefaultAuthenticator;

const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const DEFAULT_ENDPOINT: &str = "https://firestore.googleapis.com/v1";

/// Supplies bearer tokens for Firestore requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// A currently valid access token.
    async fn bearer_token(&self) -> Result<String>;
}

struct ServiceAccountTokens {
    auth: DefaultAuthenticator,
}

#[async_trait]
impl TokenSource for ServiceAccountTokens {
    async fn bearer_token(&self) -> Result<String> {
        let token = self
            .auth
            .token(&[FIRESTORE_SCOPE])
            .await
            .map_err(|e| TrackerError::Feed(format!("Failed to obtain access token: {}", e)))?;
        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| TrackerError::Feed("Access token response had no token".to_string()))
    }
}

struct ClientInner {
    http: Client,
    tokens: Arc<dyn TokenSource>,
    endpoint: String,
    project_id: String,
    database: String,
    poll_interval: Duration,
}

/// Handle to a Firestore database.
///
/// # Examples
///
/// ```rust,no_run
/// use truck_tracker::feed::firestore::FirestoreClient;
///
/// # async fn example() -> truck_tracker::error::Result<()> {
/// let client = FirestoreClient::from_service_account_json("service-account.json").await?;
/// let location = client.collection("truck").document("location");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FirestoreClient {
    inner: Arc<ClientInner>,
}

impl FirestoreClient {
    /// Create a client from a service-account key file with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::CredentialsNotFound`] if the file does not exist
    /// and [`TrackerError::Authentication`] if it cannot be used.
    pub async fn from_service_account_json(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder(path.as_ref()).build().await
    }

    /// Create a builder for a client authenticated by the given key file.
    pub fn builder(credentials_path: impl Into<PathBuf>) -> FirestoreClientBuilder {
        FirestoreClientBuilder::new(credentials_path)
    }

    /// Google Cloud project the client talks to.
    pub fn project_id(&self) -> &str {
        &self.inner.project_id
    }

    /// Reference a collection by name.
    pub fn collection(&self, name: impl Into<String>) -> CollectionRef {
        CollectionRef {
            client: self.clone(),
            name: name.into(),
        }
    }

    fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.inner.project_id, self.inner.database
        )
    }
}

/// Builder for a [`FirestoreClient`].
pub struct FirestoreClientBuilder {
    credentials_path: PathBuf,
    database: String,
    endpoint: String,
    poll_interval: Duration,
    timeout: Duration,
    tokens: Option<(String, Arc<dyn TokenSource>)>,
}

impl FirestoreClientBuilder {
    /// Create a builder with default settings.
    pub fn new(credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            database: "(default)".to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
            tokens: None,
        }
    }

    /// Database id within the project. Default is `(default)`.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// REST endpoint, e.g. a local emulator. Default is the public API.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// How often watched documents are polled. Default is 1 second.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Request timeout. Default is 10 seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a custom token source instead of the key file's service account.
    pub fn with_token_source(
        mut self,
        project_id: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        self.tokens = Some((project_id.into(), tokens));
        self
    }

    /// Build the client.
    ///
    /// The key file is checked before anything else, so a missing file never
    /// reaches the network.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The key file is missing
    /// - The key file cannot be parsed or has no project id
    /// - The authenticator or HTTP client cannot be constructed
    pub async fn build(self) -> Result<FirestoreClient> {
        let (project_id, tokens) = match self.tokens {
            Some(custom) => custom,
            None => service_account_tokens(&self.credentials_path).await?,
        };

        if self.poll_interval.is_zero() {
            return Err(TrackerError::Feed(
                "Poll interval must be greater than zero".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| TrackerError::Feed(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(project = %project_id, database = %self.database, "firestore client ready");

        Ok(FirestoreClient {
            inner: Arc::new(ClientInner {
                http,
                tokens,
                endpoint: self.endpoint,
                project_id,
                database: self.database,
                poll_interval: self.poll_interval,
            }),
        })
    }
}

async fn service_account_tokens(path: &Path) -> Result<(String, Arc<dyn TokenSource>)> {
    if !path.exists() {
        return Err(TrackerError::CredentialsNotFound(path.to_path_buf()));
    }

    let key = yup_oauth2::read_service_account_key(path)
        .await
        .map_err(|e| TrackerError::Authentication(e.to_string()))?;
    let project_id = key.project_id.clone().ok_or_else(|| {
        TrackerError::Authentication("Key file does not name a project_id".to_string())
    })?;
    let auth = ServiceAccountAuthenticator::builder(key)
        .build()
        .await
        .map_err(|e| TrackerError::Authentication(e.to_string()))?;

    Ok((project_id, Arc::new(ServiceAccountTokens { auth })))
}

/// Reference to a collection.
pub struct CollectionRef {
    client: FirestoreClient,
    name: String,
}

impl CollectionRef {
    /// Reference a document in this collection.
    pub fn document(&self, id: impl Into<String>) -> DocumentRef {
        DocumentRef {
            client: self.client.clone(),
            collection: self.name.clone(),
            id: id.into(),
        }
    }
}

/// Reference to a single document. Subscribing to it watches for changes.
#[derive(Clone)]
pub struct DocumentRef {
    client: FirestoreClient,
    collection: String,
    id: String,
}

impl DocumentRef {
    /// Document id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path relative to the database root, e.g. `truck/location`.
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }

    fn url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.client.inner.endpoint,
            self.client.documents_root(),
            self.path()
        )
    }

    /// Read the document once. `None` means it does not exist.
    async fn fetch(&self) -> Result<Option<RawDocument>> {
        let token = self.client.inner.tokens.bearer_token().await?;

        let response = self
            .client
            .inner
            .http
            .get(self.url())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| TrackerError::Feed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(TrackerError::Feed(format!(
                "HTTP request failed with status {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let document = response
            .json::<RawDocument>()
            .await
            .map_err(|e| TrackerError::Feed(format!("Failed to parse document: {}", e)))?;
        Ok(Some(document))
    }
}

#[async_trait]
impl ChangeFeed for DocumentRef {
    async fn subscribe(&self, handler: Arc<dyn UpdateHandler>) -> Result<SubscriptionHandle> {
        let document = self.clone();
        let interval = self.client.inner.poll_interval;
        let path = self.path();

        tracing::info!(document = %path, ?interval, "watching document");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut observed = Observed::Unknown;

            loop {
                ticker.tick().await;
                let current = match document.fetch().await {
                    Ok(current) => current,
                    Err(e) => {
                        tracing::warn!(document = %path, error = %e, "poll failed");
                        continue;
                    }
                };
                match observed.advance(&document.id, current) {
                    Ok(Some(batch)) => {
                        tracing::debug!(document = %path, snapshots = batch.snapshots.len(), "document changed");
                        handler.on_snapshot(&batch);
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(document = %path, error = %e, "could not decode document"),
                }
            }
        });

        Ok(SubscriptionHandle::new(move || task.abort()))
    }

    fn describe(&self) -> String {
        format!("firestore:{}/{}", self.client.documents_root(), self.path())
    }
}

/// Document as returned by `GET .../documents/{path}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    #[serde(default)]
    fields: Map<String, Value>,
    #[serde(default)]
    update_time: Option<String>,
}

/// What the poller last saw.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Observed {
    Unknown,
    Missing,
    Present(String),
}

impl Observed {
    /// Compare with a fresh read and produce a batch if anything changed.
    ///
    /// State only advances when the document decodes, so a bad read is
    /// retried on the next tick.
    fn advance(&mut self, id: &str, current: Option<RawDocument>) -> Result<Option<ChangeBatch>> {
        let read_time = Utc::now();

        let Some(raw) = current else {
            let previous = std::mem::replace(self, Observed::Missing);
            if let Observed::Present(_) = previous {
                return Ok(Some(ChangeBatch {
                    snapshots: Vec::new(),
                    changes: vec![DocumentChange {
                        kind: ChangeKind::Removed,
                        document_id: id.to_string(),
                    }],
                    read_time,
                }));
            }
            if previous == Observed::Unknown {
                tracing::info!(document = id, "document does not exist yet");
            }
            return Ok(None);
        };

        let version = raw.update_time.clone().unwrap_or_default();
        if *self == Observed::Present(version.clone()) {
            return Ok(None);
        }

        let fields = decode_fields(raw.fields)?;
        let mut snapshot = Snapshot::new(id, fields);
        if let Some(update_time) = parse_timestamp(&version) {
            snapshot = snapshot.with_update_time(update_time);
        }

        let kind = match self {
            Observed::Present(_) => ChangeKind::Modified,
            _ => ChangeKind::Added,
        };
        *self = Observed::Present(version);

        Ok(Some(ChangeBatch {
            snapshots: vec![snapshot],
            changes: vec![DocumentChange {
                kind,
                document_id: id.to_string(),
            }],
            read_time,
        }))
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Convert Firestore's typed field encoding into plain JSON.
fn decode_fields(fields: Map<String, Value>) -> Result<Map<String, Value>> {
    fields
        .into_iter()
        .map(|(key, value)| Ok((key, decode_value(value)?)))
        .collect()
}

/// Convert a single typed value, e.g. `{"doubleValue": 1.5}` -> `1.5`.
fn decode_value(value: Value) -> Result<Value> {
    let map = match value {
        Value::Object(map) => map,
        other => {
            return Err(TrackerError::Feed(format!(
                "Expected a typed Firestore value, got {}",
                other
            )));
        }
    };
    let Some((kind, inner)) = map.into_iter().next() else {
        return Err(TrackerError::Feed("Empty Firestore value".to_string()));
    };

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => Ok(inner),
        // int64 travels as a decimal string
        "integerValue" => match &inner {
            Value::String(s) => s
                .parse::<i64>()
                .map(|i| Value::Number(i.into()))
                .map_err(|e| TrackerError::Feed(format!("Invalid integerValue {}: {}", s, e))),
            Value::Number(_) => Ok(inner),
            other => Err(TrackerError::Feed(format!("Invalid integerValue {}", other))),
        },
        // NaN and infinities travel as strings; keep them as strings
        "doubleValue" => match inner {
            Value::Number(n) => Ok(Value::Number(n)),
            Value::String(s) => Ok(s
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::String(s))),
            other => Err(TrackerError::Feed(format!("Invalid doubleValue {}", other))),
        },
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => Ok(inner),
        "geoPointValue" => Ok(inner),
        "arrayValue" => {
            let values = match inner {
                Value::Object(mut array) => array.remove("values").unwrap_or(Value::Array(Vec::new())),
                other => other,
            };
            match values {
                Value::Array(items) => items
                    .into_iter()
                    .map(decode_value)
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array),
                other => Err(TrackerError::Feed(format!("Invalid arrayValue {}", other))),
            }
        }
        "mapValue" => {
            let fields = match inner {
                Value::Object(mut m) => m.remove("fields").unwrap_or(Value::Object(Map::new())),
                other => other,
            };
            match fields {
                Value::Object(fields) => decode_fields(fields).map(Value::Object),
                other => Err(TrackerError::Feed(format!("Invalid mapValue {}", other))),
            }
        }
        other => Err(TrackerError::Feed(format!(
            "Unsupported Firestore value type: {}",
            other
        ))),
    }
}
