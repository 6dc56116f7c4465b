//! CouchDB HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use url::Url;

use common::{AppError, AppResult, CouchConfig};
use domain::{
    decode_attributes, identifier, is_valid_field_name, view_name, ProfileAttributes, COUCH_ID,
    COUCH_REV, DESIGN_DOC_ID,
};

use super::{DocumentStore, ViewRow};

/// Error body returned by CouchDB on non-2xx responses
#[derive(Debug, Deserialize)]
struct CouchErrorBody {
    error: String,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct ViewResponse {
    rows: Vec<RawViewRow>,
}

#[derive(Debug, Deserialize)]
struct RawViewRow {
    id: Option<String>,
    #[serde(default)]
    key: Value,
    #[serde(default)]
    value: Value,
}

impl From<RawViewRow> for ViewRow {
    fn from(row: RawViewRow) -> Self {
        // Views that emit a JSON string hand back its text unquoted.
        let value = match row.value {
            Value::String(text) => text,
            other => other.to_string(),
        };
        ViewRow {
            id: row.id,
            key: row.key,
            value,
        }
    }
}

/// Document store backed by a CouchDB database.
pub struct CouchClient {
    http: reqwest::Client,
    base_url: Url,
    database: String,
    username: Option<String>,
    password: Option<String>,
}

impl CouchClient {
    /// Create a client for the configured server and database.
    pub fn new(config: &CouchConfig) -> AppResult<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| AppError::validation(format!("invalid CouchDB url {}: {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::validation(format!(
                "CouchDB url {} cannot carry a path",
                config.url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            http,
            base_url,
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Name of the database this client writes to.
    pub fn database(&self) -> &str {
        &self.database
    }

    fn url_for(&self, segments: &[&str]) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::validation("CouchDB url cannot carry a path"))?
            .pop_if_empty()
            .push(&self.database)
            .extend(segments);
        Ok(url)
    }

    /// URL of a document; design documents keep their `_design/` segment.
    fn document_url(&self, id: &str) -> AppResult<Url> {
        match id.strip_prefix("_design/") {
            Some(name) => self.url_for(&["_design", name]),
            None => self.url_for(&[id]),
        }
    }

    fn view_url(&self, design_doc_id: &str, view: &str, key: &str) -> AppResult<Url> {
        let mut url = self.document_url(design_doc_id)?;
        url.path_segments_mut()
            .map_err(|_| AppError::validation("CouchDB url cannot carry a path"))?
            .extend(["_view", view]);
        url.query_pairs_mut()
            .append_pair("key", &serde_json::to_string(key)?);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_ref()),
            None => builder,
        }
    }

    /// Map CouchDB status codes onto the store error taxonomy.
    async fn check(response: Response) -> AppResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                debug!("Cannot read CouchDB error body for {}: {}", status, e);
                String::new()
            }
        };
        let reason = match serde_json::from_str::<CouchErrorBody>(&text) {
            Ok(body) if body.reason.is_empty() => body.error,
            Ok(body) => format!("{}: {}", body.error, body.reason),
            Err(_) if text.is_empty() => status.canonical_reason().unwrap_or_default().to_string(),
            Err(_) => text,
        };

        Err(match status {
            StatusCode::NOT_FOUND => AppError::NotFound,
            StatusCode::CONFLICT => AppError::conflict(reason),
            _ => AppError::store(status.as_u16(), reason),
        })
    }

    async fn put_document(&self, id: &str, document: &ProfileAttributes) -> AppResult<()> {
        let url = self.document_url(id)?;
        debug!("PUT {}", url);
        let response = self.request(Method::PUT, url).json(document).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Create the database if it does not exist yet.
    pub async fn ensure_database(&self) -> AppResult<()> {
        let url = self.url_for(&[])?;
        let response = self.request(Method::PUT, url).send().await?;
        if response.status() == StatusCode::PRECONDITION_FAILED {
            debug!("Database {} already exists", self.database);
            return Ok(());
        }
        Self::check(response).await?;
        info!("Created database {}", self.database);
        Ok(())
    }

    /// Create or extend the profile design document with one
    /// `by_<field>` view per field.
    pub async fn ensure_design_document(&self, fields: &[String]) -> AppResult<()> {
        let views = design_views(fields)?;

        let mut design = match self.get_as_stream(DESIGN_DOC_ID).await {
            Ok(body) => decode_attributes(&body)?,
            Err(AppError::NotFound) => {
                let mut fresh = Map::new();
                fresh.insert(COUCH_ID.to_string(), Value::String(DESIGN_DOC_ID.to_string()));
                fresh
            }
            Err(e) => return Err(e),
        };

        let mut merged = match design.remove("views") {
            Some(Value::Object(existing)) => existing,
            _ => Map::new(),
        };
        merged.extend(views);
        design.insert("language".to_string(), Value::String("javascript".to_string()));
        design.insert("views".to_string(), Value::Object(merged));

        self.put_document(DESIGN_DOC_ID, &design).await?;
        info!("Design document {} has views for {:?}", DESIGN_DOC_ID, fields);
        Ok(())
    }
}

/// View definitions indexing whole documents by each field.
pub fn design_views(fields: &[String]) -> AppResult<Map<String, Value>> {
    let mut views = Map::new();
    for field in fields {
        if !is_valid_field_name(field) {
            return Err(AppError::validation(format!(
                "{} cannot be used as a view key",
                field
            )));
        }
        let map = format!(
            "function(doc) {{ if (doc.{0} !== undefined) {{ emit(doc.{0}, doc); }} }}",
            field
        );
        views.insert(view_name(field), json!({ "map": map }));
    }
    Ok(views)
}

#[async_trait]
impl DocumentStore for CouchClient {
    async fn create(&self, document: &ProfileAttributes) -> AppResult<()> {
        let url = self.url_for(&[])?;
        debug!("POST {}", url);
        let response = self.request(Method::POST, url).json(document).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get_as_stream(&self, id: &str) -> AppResult<Vec<u8>> {
        let url = self.document_url(id)?;
        debug!("GET {}", url);
        let response = Self::check(self.request(Method::GET, url).send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn update(&self, document: &ProfileAttributes) -> AppResult<()> {
        let id = identifier(document)
            .ok_or_else(|| AppError::validation("document has no string _id"))?;
        if !document.contains_key(COUCH_REV) {
            return Err(AppError::validation(format!("document {} has no _rev", id)));
        }
        self.put_document(id, document).await
    }

    async fn delete(&self, id: &str, rev: &str) -> AppResult<()> {
        let mut url = self.document_url(id)?;
        url.query_pairs_mut().append_pair("rev", rev);
        debug!("DELETE {}", url);
        let response = self.request(Method::DELETE, url).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn query_view(
        &self,
        design_doc_id: &str,
        view_name: &str,
        key: &str,
    ) -> AppResult<Vec<ViewRow>> {
        let url = self.view_url(design_doc_id, view_name, key)?;
        debug!("GET {}", url);
        let response = Self::check(self.request(Method::GET, url).send().await?).await?;
        let body: ViewResponse = response.json().await?;
        Ok(body.rows.into_iter().map(ViewRow::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use httpmock::{
        Method::{DELETE, GET, POST, PUT},
        MockServer,
    };

    use super::*;

    fn client(url: &str) -> CouchClient {
        CouchClient::new(&CouchConfig {
            url: url.to_string(),
            ..CouchConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn document_urls_escape_ids() {
        let couch = client("http://localhost:5984/");
        assert_eq!(
            couch.document_url("alice").unwrap().as_str(),
            "http://localhost:5984/profiles/alice"
        );
        assert_eq!(
            couch.document_url("a/b c").unwrap().as_str(),
            "http://localhost:5984/profiles/a%2Fb%20c"
        );
    }

    #[test]
    fn design_document_keeps_its_prefix() {
        let couch = client("http://localhost:5984");
        assert_eq!(
            couch.document_url(DESIGN_DOC_ID).unwrap().as_str(),
            "http://localhost:5984/profiles/_design/pac4j"
        );
    }

    #[test]
    fn view_url_json_encodes_the_key() {
        let couch = client("http://couch.internal:5984/prefix");
        let url = couch.view_url(DESIGN_DOC_ID, "by_username", "bob").unwrap();
        assert_eq!(url.path(), "/prefix/profiles/_design/pac4j/_view/by_username");
        let (name, value) = url.query_pairs().next().unwrap();
        assert_eq!(name, "key");
        assert_eq!(value, "\"bob\"");
    }

    #[test]
    fn rejects_unusable_urls() {
        let config = CouchConfig {
            url: "mailto:admin@example.com".to_string(),
            ..CouchConfig::default()
        };
        assert!(matches!(CouchClient::new(&config), Err(AppError::Validation(_))));
    }

    #[test]
    fn view_rows_unwrap_string_values() {
        let object = RawViewRow {
            id: Some("1".to_string()),
            key: json!("bob"),
            value: json!({"_id": "1"}),
        };
        assert_eq!(ViewRow::from(object).value, r#"{"_id":"1"}"#);

        let text = RawViewRow {
            id: None,
            key: json!("bob"),
            value: json!(r#"{"_id":"2"}"#),
        };
        assert_eq!(ViewRow::from(text).value, r#"{"_id":"2"}"#);
    }

    #[test]
    fn design_views_emit_whole_documents() {
        let views = design_views(&["username".to_string()]).unwrap();
        let map = views["by_username"]["map"].as_str().unwrap();
        assert!(map.contains("emit(doc.username, doc)"));

        let bad = design_views(&["user name".to_string()]);
        assert!(matches!(bad, Err(AppError::Validation(_))));
    }

    fn profile(value: Value) -> ProfileAttributes {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {}", other),
        }
    }

    #[tokio::test]
    async fn create_posts_to_the_database() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/profiles")
                    .json_body(json!({"_id": "alice", "username": "alice"}));
                then.status(201)
                    .header("content-type", "application/json")
                    .json_body(json!({"ok": true, "id": "alice", "rev": "1-a"}));
            })
            .await;

        let couch = client(&server.base_url());
        let result = couch
            .create(&profile(json!({"_id": "alice", "username": "alice"})))
            .await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_conflict_carries_the_couch_reason() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/profiles");
                then.status(409)
                    .header("content-type", "application/json")
                    .json_body(json!({"error": "conflict", "reason": "Document update conflict."}));
            })
            .await;

        let couch = client(&server.base_url());
        let result = couch.create(&profile(json!({"_id": "alice"}))).await;

        assert!(matches!(
            result,
            Err(AppError::Conflict(reason)) if reason == "conflict: Document update conflict."
        ));
    }

    #[tokio::test]
    async fn get_returns_the_raw_document() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/profiles/alice");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"_id":"alice","_rev":"1-a"}"#);
            })
            .await;

        let couch = client(&server.base_url());
        let body = couch.get_as_stream("alice").await.unwrap();

        assert_eq!(body, br#"{"_id":"alice","_rev":"1-a"}"#.to_vec());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_documents_are_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/profiles/ghost");
                then.status(404)
                    .header("content-type", "application/json")
                    .json_body(json!({"error": "not_found", "reason": "missing"}));
            })
            .await;

        let couch = client(&server.base_url());
        let result = couch.get_as_stream("ghost").await;

        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn other_statuses_become_store_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/profiles/alice");
                then.status(500)
                    .header("content-type", "application/json")
                    .json_body(json!({"error": "internal_server_error", "reason": "boom"}));
            })
            .await;

        let couch = client(&server.base_url());
        let result = couch.get_as_stream("alice").await;

        assert!(matches!(
            result,
            Err(AppError::Store { status: 500, reason }) if reason == "internal_server_error: boom"
        ));
    }

    #[tokio::test]
    async fn store_errors_without_a_body_use_the_status_text() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/profiles/alice");
                then.status(503);
            })
            .await;

        let couch = client(&server.base_url());
        let result = couch.get_as_stream("alice").await;

        assert!(matches!(
            result,
            Err(AppError::Store { status: 503, reason }) if reason == "Service Unavailable"
        ));
    }

    #[tokio::test]
    async fn update_puts_to_the_document_url() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/profiles/alice")
                    .json_body(json!({"_id": "alice", "_rev": "1-a", "email": "a@x"}));
                then.status(201)
                    .header("content-type", "application/json")
                    .json_body(json!({"ok": true, "id": "alice", "rev": "2-b"}));
            })
            .await;

        let couch = client(&server.base_url());
        let result = couch
            .update(&profile(json!({"_id": "alice", "_rev": "1-a", "email": "a@x"})))
            .await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn update_without_a_revision_never_reaches_the_server() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT).path("/profiles/alice");
                then.status(201);
            })
            .await;

        let couch = client(&server.base_url());
        let result = couch.update(&profile(json!({"_id": "alice"}))).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn delete_sends_the_revision() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(DELETE)
                    .path("/profiles/alice")
                    .query_param("rev", "3-a");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({"ok": true, "id": "alice", "rev": "4-b"}));
            })
            .await;

        let couch = client(&server.base_url());
        couch.delete("alice", "3-a").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn query_view_parses_rows() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/profiles/_design/pac4j/_view/by_username")
                    .query_param("key", "\"bob\"");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({
                        "total_rows": 2,
                        "offset": 0,
                        "rows": [
                            {"id": "1", "key": "bob", "value": {"_id": "1", "username": "bob"}},
                            {"id": "2", "key": "bob", "value": {"_id": "2", "username": "bob"}}
                        ]
                    }));
            })
            .await;

        let couch = client(&server.base_url());
        let rows = couch
            .query_view(DESIGN_DOC_ID, "by_username", "bob")
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id.as_deref(), Some("1"));
        assert_eq!(rows[0].key, json!("bob"));
        assert_eq!(
            serde_json::from_str::<Value>(&rows[1].value).unwrap(),
            json!({"_id": "2", "username": "bob"})
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn ensure_database_accepts_an_existing_database() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT).path("/profiles");
                then.status(412)
                    .header("content-type", "application/json")
                    .json_body(json!({"error": "file_exists", "reason": "The database could not be created, the file already exists."}));
            })
            .await;

        let couch = client(&server.base_url());
        assert!(couch.ensure_database().await.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn ensure_database_reports_refusals() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/profiles");
                then.status(401)
                    .header("content-type", "application/json")
                    .json_body(json!({"error": "unauthorized", "reason": "You are not a server admin."}));
            })
            .await;

        let couch = client(&server.base_url());
        let result = couch.ensure_database().await;

        assert!(matches!(result, Err(AppError::Store { status: 401, .. })));
    }

    #[tokio::test]
    async fn ensure_design_document_merges_into_the_existing_views() {
        let server = MockServer::start_async().await;
        let existing = server
            .mock_async(|when, then| {
                when.method(GET).path("/profiles/_design/pac4j");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({
                        "_id": "_design/pac4j",
                        "_rev": "1-d",
                        "views": {"by_username": {"map": "existing"}}
                    }));
            })
            .await;
        let saved = server
            .mock_async(|when, then| {
                when.method(PUT).path("/profiles/_design/pac4j").json_body(json!({
                    "_id": "_design/pac4j",
                    "_rev": "1-d",
                    "language": "javascript",
                    "views": {
                        "by_username": {"map": "existing"},
                        "by_email": {"map": "function(doc) { if (doc.email !== undefined) { emit(doc.email, doc); } }"}
                    }
                }));
                then.status(201)
                    .header("content-type", "application/json")
                    .json_body(json!({"ok": true, "id": "_design/pac4j", "rev": "2-d"}));
            })
            .await;

        let couch = client(&server.base_url());
        couch
            .ensure_design_document(&["email".to_string()])
            .await
            .unwrap();

        existing.assert_async().await;
        saved.assert_async().await;
    }

    #[tokio::test]
    async fn ensure_design_document_creates_a_missing_one() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/profiles/_design/pac4j");
                then.status(404)
                    .header("content-type", "application/json")
                    .json_body(json!({"error": "not_found", "reason": "missing"}));
            })
            .await;
        let saved = server
            .mock_async(|when, then| {
                when.method(PUT).path("/profiles/_design/pac4j").json_body(json!({
                    "_id": "_design/pac4j",
                    "language": "javascript",
                    "views": {
                        "by_username": {"map": "function(doc) { if (doc.username !== undefined) { emit(doc.username, doc); } }"}
                    }
                }));
                then.status(201);
            })
            .await;

        let couch = client(&server.base_url());
        couch
            .ensure_design_document(&["username".to_string()])
            .await
            .unwrap();

        saved.assert_async().await;
    }

    #[tokio::test]
    async fn credentials_are_sent_as_basic_auth() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/profiles/alice")
                    .header("authorization", "Basic YWRtaW46c2VjcmV0");
                then.status(200).body(r#"{"_id":"alice"}"#);
            })
            .await;

        let couch = CouchClient::new(&CouchConfig {
            url: server.base_url(),
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
            ..CouchConfig::default()
        })
        .unwrap();
        couch.get_as_stream("alice").await.unwrap();

        mock.assert_async().await;
    }
}
