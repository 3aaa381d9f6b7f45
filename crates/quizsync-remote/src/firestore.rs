//! Firestore REST remote store.
//!
//! Layout per user:
//! - `users/{uid}/attempts/{attemptId}`: one document per attempt plus a
//!   server-assigned `syncedAt`
//! - `users/{uid}/stats/aggregate`: `totalQuestions`, `totalCorrect`,
//!   `lastActive`, only ever changed through field transforms
//!
//! Every write goes through the `documents:commit` endpoint so attempt
//! creation can carry an `exists: false` precondition and the aggregate can be
//! merge-incremented without reading it first.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use quizsync_core::error::RemoteError;
use quizsync_core::model::{AggregateDelta, AggregateStats, AttemptRecord, QuestionId, UserId};
use quizsync_core::traits::{AppendOutcome, RemoteStore};

const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com";
const DEFAULT_DATABASE: &str = "(default)";

/// Firestore-backed remote store.
pub struct FirestoreRemote {
    base_url: String,
    project_id: String,
    database: String,
    api_key: String,
    auth_token: Option<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl FirestoreRemote {
    pub fn new(
        project_id: &str,
        api_key: &str,
        base_url: Option<String>,
        timeout_secs: u64,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            project_id: project_id.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            api_key: api_key.to_string(),
            auth_token: None,
            timeout_secs,
            client,
        })
    }

    pub fn with_database(mut self, database: &str) -> Self {
        if !database.is_empty() {
            self.database = database.to_string();
        }
        self
    }

    /// Send the signed-in user's ID token with every request.
    pub fn with_auth_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_string());
        self
    }

    fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database
        )
    }

    fn user_root(&self, user: &UserId) -> Result<String, RemoteError> {
        let uid = user.as_str();
        if uid.is_empty() || uid.contains('/') {
            return Err(RemoteError::Unauthenticated(format!(
                "invalid user id {uid:?}"
            )));
        }
        Ok(format!("{}/users/{uid}", self.documents_root()))
    }

    fn attempt_write(&self, user: &UserId, record: &AttemptRecord) -> Result<Write, RemoteError> {
        Ok(Write {
            update: Document {
                name: format!("{}/attempts/{}", self.user_root(user)?, record.id),
                fields: attempt_fields(record),
            },
            update_mask: None,
            current_document: Some(Precondition { exists: false }),
            update_transforms: vec![FieldTransform::server_time("syncedAt")],
        })
    }

    fn aggregate_write(&self, user: &UserId, delta: AggregateDelta) -> Result<Write, RemoteError> {
        Ok(Write {
            update: Document {
                name: format!("{}/stats/aggregate", self.user_root(user)?),
                fields: BTreeMap::new(),
            },
            // An empty mask leaves every existing field alone (merge).
            update_mask: Some(DocumentMask {
                field_paths: Vec::new(),
            }),
            current_document: None,
            update_transforms: vec![
                FieldTransform::increment("totalQuestions", delta.questions),
                FieldTransform::increment("totalCorrect", delta.correct),
                FieldTransform::server_time("lastActive"),
            ],
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout(self.timeout_secs)
        } else {
            RemoteError::NetworkError(e.to_string())
        }
    }

    /// Apply the writes atomically.
    ///
    /// A failed `exists: false` precondition is reported as
    /// [`AppendOutcome::AlreadyPresent`].
    async fn commit(&self, writes: Vec<Write>) -> Result<AppendOutcome, RemoteError> {
        let has_precondition = writes.iter().any(|w| w.current_document.is_some());
        let url = format!(
            "{}/v1/{}:commit?key={}",
            self.base_url,
            self.documents_root(),
            self.api_key
        );

        let response = self
            .authorize(self.client.post(url))
            .json(&CommitRequest { writes })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(AppendOutcome::Created);
        }

        let body = response.text().await.unwrap_or_default();
        let api_status = serde_json::from_str::<FirestoreError>(&body)
            .map(|e| e.error.status)
            .unwrap_or_default();

        // ABORTED contention is also HTTP 409; only the body status says the
        // document exists.
        let exists = api_status == "ALREADY_EXISTS" || api_status == "FAILED_PRECONDITION";
        if has_precondition && exists {
            debug!(status, %api_status, "document already exists");
            return Ok(AppendOutcome::AlreadyPresent);
        }
        Err(classify_status(status, body))
    }
}

fn classify_status(status: u16, body: String) -> RemoteError {
    match status {
        401 | 403 => RemoteError::Unauthenticated(body),
        _ => RemoteError::ApiError {
            status,
            message: body,
        },
    }
}

#[async_trait]
impl RemoteStore for FirestoreRemote {
    fn name(&self) -> &str {
        "firestore"
    }

    #[instrument(skip(self, record), fields(user = %user, attempt = %record.id))]
    async fn append_attempt(
        &self,
        user: &UserId,
        record: &AttemptRecord,
    ) -> Result<AppendOutcome, RemoteError> {
        let write = self.attempt_write(user, record)?;
        self.commit(vec![write]).await
    }

    #[instrument(skip(self), fields(user = %user))]
    async fn increment_aggregate(
        &self,
        user: &UserId,
        delta: AggregateDelta,
    ) -> Result<(), RemoteError> {
        let write = self.aggregate_write(user, delta)?;
        self.commit(vec![write]).await.map(|_| ())
    }

    #[instrument(skip(self, record), fields(user = %user, attempt = %record.id))]
    async fn commit_attempt(
        &self,
        user: &UserId,
        record: &AttemptRecord,
    ) -> Result<AppendOutcome, RemoteError> {
        let writes = vec![
            self.attempt_write(user, record)?,
            self.aggregate_write(user, AggregateDelta::from(record))?,
        ];
        self.commit(writes).await
    }

    #[instrument(skip(self), fields(user = %user))]
    async fn fetch_aggregate(&self, user: &UserId) -> Result<Option<AggregateStats>, RemoteError> {
        let url = format!(
            "{}/v1/{}/stats/aggregate?key={}",
            self.base_url,
            self.user_root(user)?,
            self.api_key
        );

        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status().as_u16();
        if status == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let document: AggregateDocument = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("failed to parse aggregate: {e}")))?;
        document.into_stats().map(Some)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CommitRequest {
    writes: Vec<Write>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Write {
    update: Document,
    #[serde(skip_serializing_if = "Option::is_none")]
    update_mask: Option<DocumentMask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_document: Option<Precondition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    update_transforms: Vec<FieldTransform>,
}

#[derive(Serialize)]
struct Document {
    name: String,
    fields: BTreeMap<String, FieldValue>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentMask {
    field_paths: Vec<String>,
}

#[derive(Serialize)]
struct Precondition {
    exists: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldTransform {
    field_path: String,
    #[serde(flatten)]
    kind: TransformKind,
}

impl FieldTransform {
    fn increment(field: &str, by: u64) -> Self {
        Self {
            field_path: field.to_string(),
            kind: TransformKind::Increment(FieldValue::IntegerValue(by.to_string())),
        }
    }

    fn server_time(field: &str) -> Self {
        Self {
            field_path: field.to_string(),
            kind: TransformKind::SetToServerValue(ServerValue::RequestTime),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum TransformKind {
    Increment(FieldValue),
    SetToServerValue(ServerValue),
}

#[derive(Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum ServerValue {
    RequestTime,
}

/// Typed Firestore value. Integers travel as decimal strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum FieldValue {
    IntegerValue(String),
    DoubleValue(f64),
    StringValue(String),
    BooleanValue(bool),
    TimestampValue(String),
    ArrayValue(ArrayValue),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
struct ArrayValue {
    #[serde(default)]
    values: Vec<FieldValue>,
}

impl FieldValue {
    fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::IntegerValue(v) => v.parse().ok(),
            FieldValue::DoubleValue(v) if *v >= 0.0 => Some(*v as u64),
            _ => None,
        }
    }
}

/// Document fields for an attempt. `synced` is local state and never sent.
fn attempt_fields(record: &AttemptRecord) -> BTreeMap<String, FieldValue> {
    let mistakes = record
        .mistakes
        .iter()
        .map(|m| match m {
            QuestionId::Index(i) => FieldValue::IntegerValue(i.to_string()),
            QuestionId::Key(k) => FieldValue::StringValue(k.clone()),
        })
        .collect();

    BTreeMap::from([
        (
            "score".to_string(),
            FieldValue::IntegerValue(record.score.to_string()),
        ),
        (
            "total".to_string(),
            FieldValue::IntegerValue(record.total.to_string()),
        ),
        (
            "subject".to_string(),
            FieldValue::StringValue(record.subject.clone()),
        ),
        (
            "timestamp".to_string(),
            FieldValue::TimestampValue(
                record
                    .timestamp
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        ),
        (
            "mistakes".to_string(),
            FieldValue::ArrayValue(ArrayValue { values: mistakes }),
        ),
        (
            "timeSpent".to_string(),
            FieldValue::IntegerValue(record.time_spent.to_string()),
        ),
    ])
}

#[derive(Deserialize)]
struct AggregateDocument {
    #[serde(default)]
    fields: AggregateFields,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AggregateFields {
    total_questions: Option<FieldValue>,
    total_correct: Option<FieldValue>,
    last_active: Option<FieldValue>,
}

impl AggregateDocument {
    fn into_stats(self) -> Result<AggregateStats, RemoteError> {
        let count = |value: Option<FieldValue>, field: &str| -> Result<u64, RemoteError> {
            match value {
                None => Ok(0),
                Some(v) => v
                    .as_u64()
                    .ok_or_else(|| RemoteError::Decode(format!("{field} is not a count: {v:?}"))),
            }
        };

        let last_active = match self.fields.last_active {
            Some(FieldValue::TimestampValue(ts)) => Some(
                DateTime::parse_from_rfc3339(&ts)
                    .map_err(|e| RemoteError::Decode(format!("bad lastActive {ts:?}: {e}")))?
                    .with_timezone(&Utc),
            ),
            _ => None,
        };

        Ok(AggregateStats {
            total_questions: count(self.fields.total_questions, "totalQuestions")?,
            total_correct: count(self.fields.total_correct, "totalCorrect")?,
            last_active,
        })
    }
}

#[derive(Deserialize)]
struct FirestoreError {
    error: FirestoreErrorBody,
}

#[derive(Deserialize)]
struct FirestoreErrorBody {
    #[serde(default)]
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const COMMIT_PATH: &str = "/v1/projects/upsc-prep/databases/(default)/documents:commit";

    fn remote(server: &MockServer) -> FirestoreRemote {
        FirestoreRemote::new("upsc-prep", "test-key", Some(server.uri()), 5).unwrap()
    }

    fn record() -> AttemptRecord {
        AttemptRecord::new(8, 10, "history")
            .with_time_spent(30)
            .with_mistakes(vec![QuestionId::Index(3), QuestionId::Key("q-17".into())])
            .with_timestamp(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
    }

    #[test]
    fn attempt_fields_exclude_synced_flag() {
        let mut r = record();
        r.synced = true;
        let fields = attempt_fields(&r);
        assert!(!fields.contains_key("synced"));
        assert_eq!(fields["timeSpent"], FieldValue::IntegerValue("30".into()));
        assert_eq!(
            fields["timestamp"],
            FieldValue::TimestampValue("2024-03-01T10:00:00.000Z".into())
        );
        let json = serde_json::to_value(&fields["mistakes"]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"arrayValue": {"values": [
                {"integerValue": "3"},
                {"stringValue": "q-17"}
            ]}})
        );
    }

    #[test]
    fn aggregate_write_uses_increment_transforms() {
        let server_uri = "http://localhost:1".to_string();
        let remote = FirestoreRemote::new("upsc-prep", "k", Some(server_uri), 5).unwrap();
        let write = remote
            .aggregate_write(
                &UserId::new("u1"),
                AggregateDelta {
                    questions: 10,
                    correct: 8,
                },
            )
            .unwrap();
        let json = serde_json::to_value(&write).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "update": {
                    "name": "projects/upsc-prep/databases/(default)/documents/users/u1/stats/aggregate",
                    "fields": {}
                },
                "updateMask": {"fieldPaths": []},
                "updateTransforms": [
                    {"fieldPath": "totalQuestions", "increment": {"integerValue": "10"}},
                    {"fieldPath": "totalCorrect", "increment": {"integerValue": "8"}},
                    {"fieldPath": "lastActive", "setToServerValue": "REQUEST_TIME"}
                ]
            })
        );
    }

    #[test]
    fn user_ids_with_slashes_are_rejected() {
        let remote =
            FirestoreRemote::new("upsc-prep", "k", Some("http://localhost:1".into()), 5).unwrap();
        assert!(matches!(
            remote.user_root(&UserId::new("a/b")),
            Err(RemoteError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn append_creates_with_precondition() {
        let server = MockServer::start().await;
        let r = record();

        Mock::given(method("POST"))
            .and(path(COMMIT_PATH))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "writes": [{
                    "update": {
                        "name": format!(
                            "projects/upsc-prep/databases/(default)/documents/users/u1/attempts/{}",
                            r.id
                        )
                    },
                    "currentDocument": {"exists": false},
                    "updateTransforms": [
                        {"fieldPath": "syncedAt", "setToServerValue": "REQUEST_TIME"}
                    ]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "writeResults": [{}],
                "commitTime": "2024-03-01T10:00:01Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = remote(&server)
            .append_attempt(&UserId::new("u1"), &r)
            .await
            .unwrap();
        assert_eq!(outcome, AppendOutcome::Created);
    }

    #[tokio::test]
    async fn existing_document_is_already_present() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(COMMIT_PATH))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "error": {"code": 409, "message": "Document already exists", "status": "ALREADY_EXISTS"}
            })))
            .mount(&server)
            .await;

        let outcome = remote(&server)
            .commit_attempt(&UserId::new("u1"), &record())
            .await
            .unwrap();
        assert_eq!(outcome, AppendOutcome::AlreadyPresent);
    }

    #[tokio::test]
    async fn commit_attempt_sends_both_writes() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(COMMIT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        remote(&server)
            .commit_attempt(&UserId::new("u1"), &record())
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let writes = body["writes"].as_array().unwrap();
        assert_eq!(writes.len(), 2);
        assert!(writes[0]["update"]["name"]
            .as_str()
            .unwrap()
            .contains("/attempts/"));
        assert!(writes[1]["update"]["name"]
            .as_str()
            .unwrap()
            .ends_with("/stats/aggregate"));
    }

    #[tokio::test]
    async fn aggregate_conflict_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(COMMIT_PATH))
            .respond_with(ResponseTemplate::new(409).set_body_string("aborted"))
            .mount(&server)
            .await;

        let err = remote(&server)
            .increment_aggregate(
                &UserId::new("u1"),
                AggregateDelta {
                    questions: 1,
                    correct: 1,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::ApiError { status: 409, .. }));
    }

    #[tokio::test]
    async fn aborted_attempt_commit_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(COMMIT_PATH))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "error": {"code": 409, "message": "Too much contention", "status": "ABORTED"}
            })))
            .mount(&server)
            .await;

        let err = remote(&server)
            .commit_attempt(&UserId::new("u1"), &record())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::ApiError { status: 409, .. }));
    }

    #[tokio::test]
    async fn bare_conflict_on_attempt_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(COMMIT_PATH))
            .respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
            .mount(&server)
            .await;

        let err = remote(&server)
            .append_attempt(&UserId::new("u1"), &record())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::ApiError { status: 409, .. }));
    }

    #[tokio::test]
    async fn permission_denied_is_unauthenticated() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(COMMIT_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_string("PERMISSION_DENIED"))
            .mount(&server)
            .await;

        let err = remote(&server)
            .append_attempt(&UserId::new("u1"), &record())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn bearer_token_is_sent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(COMMIT_PATH))
            .and(header("authorization", "Bearer id-token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        remote(&server)
            .with_auth_token("id-token-123")
            .append_attempt(&UserId::new("u1"), &record())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fetch_aggregate_decodes_document() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path_regex(r"/users/u1/stats/aggregate$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "projects/upsc-prep/databases/(default)/documents/users/u1/stats/aggregate",
                "fields": {
                    "totalQuestions": {"integerValue": "120"},
                    "totalCorrect": {"integerValue": "87"},
                    "lastActive": {"timestampValue": "2024-03-01T10:00:01.123Z"}
                }
            })))
            .mount(&server)
            .await;

        let stats = remote(&server)
            .fetch_aggregate(&UserId::new("u1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.total_questions, 120);
        assert_eq!(stats.total_correct, 87);
        assert!(stats.last_active.is_some());
    }

    #[tokio::test]
    async fn fetch_aggregate_missing_document() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let stats = remote(&server)
            .fetch_aggregate(&UserId::new("u1"))
            .await
            .unwrap();
        assert!(stats.is_none());
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        // Nothing listens on port 1.
        let remote =
            FirestoreRemote::new("upsc-prep", "k", Some("http://127.0.0.1:1".into()), 5).unwrap();
        let err = remote
            .append_attempt(&UserId::new("u1"), &record())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::NetworkError(_)), "got {err:?}");
    }
}
