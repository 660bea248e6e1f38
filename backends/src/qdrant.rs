//! Qdrant REST client and readiness probe
//!
//! Endpoints used:
//! - `GET /collections` (health)
//! - `GET|PUT|PATCH|DELETE /collections/{name}`
//! - `PUT /collections/{name}/points?wait=true`
//! - `POST /collections/{name}/points/search`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use vecbench_core::workload::VectorRow;
use vecbench_core::{
    CollectionSpec, CollectionStats, HealthProbe, IndexingParams, ProbeOutcome, QueryVector,
    ServiceClient, ServiceError, VectorBatch,
};

use crate::http::{classify_error, HttpConfig};

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Serialize)]
struct CreateCollection<'a> {
    vectors: VectorParams<'a>,
    hnsw_config: HnswConfigDiff,
    on_disk_payload: bool,
}

#[derive(Debug, Serialize)]
struct VectorParams<'a> {
    size: usize,
    distance: &'a str,
    on_disk: bool,
    datatype: &'a str,
}

#[derive(Debug, Default, Serialize)]
struct HnswConfigDiff {
    #[serde(skip_serializing_if = "Option::is_none")]
    m: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ef_construct: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    on_disk: Option<bool>,
}

#[derive(Debug, Serialize)]
struct UpdateCollection {
    hnsw_config: HnswConfigDiff,
}

#[derive(Debug, Serialize)]
struct UpsertPoints<'a> {
    points: Vec<Point<'a>>,
}

#[derive(Debug, Serialize)]
struct Point<'a> {
    id: u64,
    vector: VectorRow<'a>,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: VectorRow<'a>,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    #[serde(default)]
    status: String,
    #[serde(default)]
    points_count: Option<u64>,
    #[serde(default)]
    indexed_vectors_count: Option<u64>,
}

fn create_body(spec: &CollectionSpec) -> CreateCollection<'_> {
    CreateCollection {
        vectors: VectorParams {
            size: spec.vector_size,
            distance: "Cosine",
            on_disk: spec.storage.vectors_on_disk,
            datatype: spec.encoding.service_datatype(),
        },
        hnsw_config: HnswConfigDiff {
            on_disk: Some(spec.storage.hnsw_on_disk),
            ..HnswConfigDiff::default()
        },
        on_disk_payload: spec.storage.payload_on_disk,
    }
}

fn update_body(params: &IndexingParams) -> UpdateCollection {
    UpdateCollection {
        hnsw_config: HnswConfigDiff {
            m: Some(params.hnsw_m),
            ef_construct: params.ef_construct,
            on_disk: None,
        },
    }
}

// ============================================================================
// Client
// ============================================================================

/// [`ServiceClient`] speaking Qdrant's REST API
#[derive(Debug, Clone)]
pub struct QdrantClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl QdrantClient {
    /// Create a client for the service at `base_url` (e.g. `http://localhost:6333`)
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: config.build_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: config.request_timeout,
        })
    }

    /// Base URL of the service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, name: &str) -> String {
        format!("{}/collections/{}", self.base_url, name)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, ServiceError> {
        let response = request
            .send()
            .await
            .map_err(|e| classify_error(e, self.timeout))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(body));
        }
        Err(ServiceError::Status {
            status: status.as_u16(),
            message: body,
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ServiceError> {
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))?;
        Ok(envelope.result)
    }
}

#[async_trait]
impl ServiceClient for QdrantClient {
    fn service_name(&self) -> &str {
        "qdrant"
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, ServiceError> {
        match self.send(self.client.get(self.collection_url(name))).await {
            Ok(_) => Ok(true),
            Err(ServiceError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), ServiceError> {
        let request = self
            .client
            .put(self.collection_url(&spec.name))
            .json(&create_body(spec));
        self.send(request).await?;
        tracing::debug!(collection = %spec.name, "Collection created");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), ServiceError> {
        self.send(self.client.delete(self.collection_url(name)))
            .await?;
        Ok(())
    }

    async fn configure_indexing(
        &self,
        collection: &str,
        params: &IndexingParams,
    ) -> Result<(), ServiceError> {
        let request = self
            .client
            .patch(self.collection_url(collection))
            .json(&update_body(params));
        self.send(request).await?;
        tracing::debug!(
            collection,
            hnsw_m = params.hnsw_m,
            ef_construct = ?params.ef_construct,
            "Indexing parameters updated"
        );
        Ok(())
    }

    async fn upload(&self, collection: &str, batch: &VectorBatch) -> Result<(), ServiceError> {
        let body = UpsertPoints {
            points: batch
                .points()
                .map(|(id, vector)| Point { id, vector })
                .collect(),
        };
        let request = self
            .client
            .put(format!("{}/points", self.collection_url(collection)))
            .query(&[("wait", "true")])
            .json(&body);
        self.send(request).await?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &QueryVector,
        limit: usize,
    ) -> Result<usize, ServiceError> {
        let request = self
            .client
            .post(format!("{}/points/search", self.collection_url(collection)))
            .json(&SearchRequest {
                vector: vector.row(),
                limit,
            });
        let response = self.send(request).await?;
        let hits: Vec<serde_json::Value> = self.decode(response).await?;
        Ok(hits.len())
    }

    async fn collection_stats(&self, collection: &str) -> Result<CollectionStats, ServiceError> {
        let response = self
            .send(self.client.get(self.collection_url(collection)))
            .await?;
        let info: CollectionInfo = self.decode(response).await?;
        Ok(CollectionStats {
            points_count: info.points_count.unwrap_or(0),
            indexed_vectors_count: info.indexed_vectors_count,
            status: info.status,
        })
    }
}

// ============================================================================
// Health probe
// ============================================================================

/// Readiness probe: `GET /collections` answering 200
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: Client,
    url: String,
}

impl HttpHealthProbe {
    /// Probe the service at `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: config.build_client()?,
            url: format!("{}/collections", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn probe(&self) -> ProbeOutcome {
        match self.client.get(&self.url).send().await {
            Ok(response) if response.status() == StatusCode::OK => ProbeOutcome::Ready,
            Ok(response) => ProbeOutcome::NotReady(format!("status {}", response.status())),
            Err(e) if e.is_connect() => ProbeOutcome::ConnectionFailed(e.to_string()),
            Err(e) => ProbeOutcome::Error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, post, put};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use vecbench_core::{StorageOptions, VectorData, VectorEncoding};

    // ========================================================================
    // Test server
    // ========================================================================

    #[derive(Default)]
    struct Recorded {
        collections: HashMap<String, Value>,
        patches: Vec<Value>,
        points: usize,
        last_search: Option<Value>,
    }

    type Shared = Arc<Mutex<Recorded>>;

    async fn list() -> Json<Value> {
        Json(json!({"result": {"collections": []}, "status": "ok"}))
    }

    async fn info(Path(name): Path<String>, State(state): State<Shared>) -> (AxumStatus, Json<Value>) {
        let state = state.lock().unwrap();
        if state.collections.contains_key(&name) {
            (
                AxumStatus::OK,
                Json(json!({"result": {
                    "status": "green",
                    "points_count": state.points,
                    "indexed_vectors_count": 0
                }})),
            )
        } else {
            (
                AxumStatus::NOT_FOUND,
                Json(json!({"status": {"error": "Not found"}})),
            )
        }
    }

    async fn create(
        Path(name): Path<String>,
        State(state): State<Shared>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        state.lock().unwrap().collections.insert(name, body);
        Json(json!({"result": true}))
    }

    async fn remove(Path(name): Path<String>, State(state): State<Shared>) -> Json<Value> {
        state.lock().unwrap().collections.remove(&name);
        Json(json!({"result": true}))
    }

    async fn patch(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
        state.lock().unwrap().patches.push(body);
        Json(json!({"result": true}))
    }

    async fn upsert(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
        let count = body["points"].as_array().map_or(0, Vec::len);
        state.lock().unwrap().points += count;
        Json(json!({"result": {"status": "completed"}}))
    }

    async fn search(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
        let limit = body["limit"].as_u64().unwrap_or(0) as usize;
        state.lock().unwrap().last_search = Some(body);
        let hits: Vec<Value> = (0..limit).map(|i| json!({"id": i, "score": 0.5})).collect();
        Json(json!({"result": hits}))
    }

    async fn spawn_server() -> (String, Shared) {
        let state: Shared = Arc::default();
        let app = Router::new()
            .route("/collections", get(list))
            .route(
                "/collections/:name",
                get(info).put(create).delete(remove).patch(patch),
            )
            .route("/collections/:name/points", put(upsert))
            .route("/collections/:name/points/search", post(search))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), state)
    }

    async fn failing_server(status: AxumStatus) -> String {
        let app = Router::new().fallback(move || async move { (status, "overloaded") });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn closed_port() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    fn spec(encoding: VectorEncoding) -> CollectionSpec {
        CollectionSpec {
            name: "bench".into(),
            vector_size: 3,
            encoding,
            storage: StorageOptions {
                vectors_on_disk: true,
                hnsw_on_disk: false,
                payload_on_disk: true,
            },
        }
    }

    // ========================================================================
    // Tests
    // ========================================================================

    #[test]
    fn test_create_body_shape() {
        let body = serde_json::to_value(create_body(&spec(VectorEncoding::Uint8))).unwrap();
        assert_eq!(
            body,
            json!({
                "vectors": {"size": 3, "distance": "Cosine", "on_disk": true, "datatype": "uint8"},
                "hnsw_config": {"on_disk": false},
                "on_disk_payload": true
            })
        );
    }

    #[test]
    fn test_update_body_shapes() {
        let deferred = serde_json::to_value(update_body(&IndexingParams::deferred())).unwrap();
        assert_eq!(deferred, json!({"hnsw_config": {"m": 0}}));

        let restored = serde_json::to_value(update_body(&IndexingParams::restored())).unwrap();
        assert_eq!(restored, json!({"hnsw_config": {"m": 16, "ef_construct": 100}}));

        // Every section and field the deferral touches is set again on restore
        for (section, fields) in deferred.as_object().unwrap() {
            for field in fields.as_object().unwrap().keys() {
                assert!(restored[section].get(field).is_some(), "{section}.{field} not restored");
            }
        }
    }

    #[tokio::test]
    async fn test_collection_lifecycle() {
        let (url, state) = spawn_server().await;
        let client = QdrantClient::new(&url, &HttpConfig::default()).unwrap();

        assert!(!client.collection_exists("bench").await.unwrap());
        client
            .create_collection(&spec(VectorEncoding::Float32))
            .await
            .unwrap();
        assert!(client.collection_exists("bench").await.unwrap());
        assert_eq!(
            state.lock().unwrap().collections["bench"]["vectors"]["datatype"],
            "float32"
        );

        client.delete_collection("bench").await.unwrap();
        assert!(!client.collection_exists("bench").await.unwrap());
    }

    #[tokio::test]
    async fn test_upload_search_and_stats() {
        let (url, state) = spawn_server().await;
        let client = QdrantClient::new(&url, &HttpConfig::default()).unwrap();
        client
            .create_collection(&spec(VectorEncoding::Float32))
            .await
            .unwrap();

        let batch = VectorBatch {
            index: 0,
            first_id: 0,
            dimension: 3,
            data: VectorData::Float32(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]),
        };
        client.upload("bench", &batch).await.unwrap();

        let query = QueryVector {
            data: VectorData::Float32(vec![0.5, 0.5, 0.5]),
        };
        assert_eq!(client.search("bench", &query, 10).await.unwrap(), 10);
        assert_eq!(
            state.lock().unwrap().last_search.as_ref().unwrap()["vector"]
                .as_array()
                .unwrap()
                .len(),
            3
        );

        let stats = client.collection_stats("bench").await.unwrap();
        assert_eq!(stats.points_count, 2);
        assert_eq!(stats.status, "green");
    }

    #[tokio::test]
    async fn test_configure_indexing_sends_patch() {
        let (url, state) = spawn_server().await;
        let client = QdrantClient::new(&url, &HttpConfig::default()).unwrap();

        client
            .configure_indexing("bench", &IndexingParams::deferred())
            .await
            .unwrap();

        let patches = &state.lock().unwrap().patches;
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0]["hnsw_config"]["m"], 0);
    }

    #[tokio::test]
    async fn test_server_error_maps_to_status() {
        let url = failing_server(AxumStatus::SERVICE_UNAVAILABLE).await;
        let client = QdrantClient::new(&url, &HttpConfig::default()).unwrap();

        let err = client.delete_collection("bench").await.unwrap_err();
        match err {
            ServiceError::Status { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refused_connection_maps_to_connection_error() {
        let url = closed_port().await;
        let client = QdrantClient::new(&url, &HttpConfig::default()).unwrap();

        let err = client.collection_exists("bench").await.unwrap_err();
        assert!(err.is_connection(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_probe_outcomes() {
        let (url, _state) = spawn_server().await;
        let probe = HttpHealthProbe::new(&url, &HttpConfig::default()).unwrap();
        assert_eq!(probe.endpoint(), format!("{url}/collections"));
        assert_eq!(probe.probe().await, ProbeOutcome::Ready);

        let url = failing_server(AxumStatus::SERVICE_UNAVAILABLE).await;
        let probe = HttpHealthProbe::new(&url, &HttpConfig::default()).unwrap();
        assert!(matches!(probe.probe().await, ProbeOutcome::NotReady(_)));

        let url = closed_port().await;
        let probe = HttpHealthProbe::new(&url, &HttpConfig::default()).unwrap();
        assert!(matches!(probe.probe().await, ProbeOutcome::ConnectionFailed(_)));
    }
}
