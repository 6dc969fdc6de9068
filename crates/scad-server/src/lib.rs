use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path as UrlPath, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use http::{Method, StatusCode};
use scad_ai::error::Error as PipelineError;
use scad_ai::providers::CompletionClient;
use scad_ai::{GenerationResult, MeshGenerator};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    generator: Arc<MeshGenerator<Box<dyn CompletionClient>>>,
    output_dir: PathBuf,
}

impl AppState {
    pub fn new(
        generator: MeshGenerator<Box<dyn CompletionClient>>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            generator: Arc::new(generator),
            output_dir: output_dir.into(),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/generate", post(generate))
        .route("/download/{filename}", get(download))
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    description: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GenerateResponse {
    success: bool,
    job_id: String,
    message: String,
    files: Vec<FileInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileInfo {
    filename: String,
    url: String,
    kind: String,
    description: String,
    size_bytes: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    fn from_pipeline(err: PipelineError) -> Self {
        let status = match err {
            PipelineError::Service { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Authentication { .. } | PipelineError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn generate(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<GenerateResponse>, ApiError> {
    let request: GenerateRequest = parse_json(&body)?;

    tokio::fs::create_dir_all(&state.output_dir)
        .await
        .map_err(|err| ApiError::internal(format!("failed to create output directory: {err}")))?;

    // Each request gets its own basename so concurrent generations never
    // collide in the shared output directory.
    let job_id = new_job_id();
    let mesh_path = state.output_dir.join(format!("{job_id}.stl"));

    let result = state
        .generator
        .generate(&request.description, &mesh_path)
        .await
        .map_err(ApiError::from_pipeline)?;

    let message = match &result.warning {
        None => "Generation completed successfully!".to_string(),
        Some(warning) => format!(
            "Generation completed with warnings. STL conversion failed, but the SCAD file is available: {warning}"
        ),
    };

    Ok(Json(GenerateResponse {
        success: result.mesh_compiled(),
        job_id,
        message,
        files: collect_files(&result).await,
    }))
}

async fn download(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> Result<Response, ApiError> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
    {
        return Err(ApiError::bad_request(
            "filename must not contain path separators",
        ));
    }

    let path = state.output_dir.join(&filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found("file not found"));
        }
        Err(err) => {
            return Err(ApiError::internal(format!("failed to read file: {err}")));
        }
    };

    let mut response = Response::new(Body::from(bytes));
    response.headers_mut().insert(
        CONTENT_TYPE,
        media_type_for(&filename)
            .parse()
            .expect("valid content type"),
    );
    let disposition = format!("attachment; filename=\"{filename}\"")
        .parse()
        .map_err(|_| ApiError::bad_request("filename contains invalid characters"))?;
    response
        .headers_mut()
        .insert(CONTENT_DISPOSITION, disposition);
    Ok(response)
}

fn new_job_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

async fn collect_files(result: &GenerationResult) -> Vec<FileInfo> {
    let mut files = Vec::with_capacity(2);
    if let Some(info) = file_info(
        &result.script_path,
        "scad",
        "OpenSCAD source code (editable)",
    )
    .await
    {
        files.push(info);
    }
    if let Some(mesh_path) = &result.mesh_path {
        if let Some(info) = file_info(mesh_path, "stl", "STL file (ready for 3D printing)").await {
            files.push(info);
        }
    }
    files
}

async fn file_info(path: &Path, kind: &str, description: &str) -> Option<FileInfo> {
    let filename = path.file_name()?.to_str()?.to_string();
    let metadata = tokio::fs::metadata(path).await.ok()?;
    Some(FileInfo {
        url: format!("/download/{filename}"),
        filename,
        kind: kind.to_string(),
        description: description.to_string(),
        size_bytes: metadata.len(),
    })
}

fn media_type_for(filename: &str) -> &'static str {
    if filename.ends_with(".stl") {
        "application/sla"
    } else if filename.ends_with(".scad") {
        "text/plain"
    } else {
        "application/octet-stream"
    }
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("request body is required"));
    }

    serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("invalid JSON body: {err}")))
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::Router;
    use axum::body::Body;
    use axum::response::Response;
    use http::header::{CONTENT_TYPE, ORIGIN};
    use http::{Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use scad_ai::MeshGenerator;
    use scad_ai::compiler::OpenScadCompiler;
    use scad_ai::config::CompilerSettings;
    use scad_ai::error::{Error, Result as PipelineResult};
    use scad_ai::providers::{CompletionClient, CompletionRequest};
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::{AppState, GenerateResponse, app};

    const FENCED_COMPLETION: &str = "```openscad\ncube([10, 10, 10]);\n```";

    struct ScriptedClient {
        response: String,
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, _request: CompletionRequest<'_>) -> PipelineResult<String> {
            Ok(self.response.clone())
        }
    }

    struct FailingClient;

    #[async_trait]
    impl CompletionClient for FailingClient {
        async fn complete(&self, _request: CompletionRequest<'_>) -> PipelineResult<String> {
            Err(Error::Service {
                message: "provider unreachable".to_string(),
            })
        }
    }

    fn state_with(client: Box<dyn CompletionClient>, binary: PathBuf, dir: &TempDir) -> AppState {
        let compiler = OpenScadCompiler::new(&CompilerSettings {
            binary,
            timeout: Duration::from_secs(5),
        });
        AppState::new(
            MeshGenerator::new(client, compiler),
            dir.path().join("generated"),
        )
    }

    fn scripted_state(dir: &TempDir, binary: PathBuf) -> AppState {
        state_with(
            Box::new(ScriptedClient {
                response: FENCED_COMPLETION.to_string(),
            }),
            binary,
            dir,
        )
    }

    #[cfg(unix)]
    fn write_stub(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("openscad-stub");
        std::fs::write(
            &path,
            format!("#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo stub; exit 0; fi\n{body}\n"),
        )
        .expect("stub should write");
        let mut perms = std::fs::metadata(&path)
            .expect("stub metadata should read")
            .permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("stub should become executable");
        path
    }

    async fn send_json(
        router: Router,
        method: Method,
        uri: &str,
        value: serde_json::Value,
    ) -> Response {
        let body = serde_json::to_vec(&value).expect("json encoding should succeed");
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .expect("request should build");

        router
            .oneshot(request)
            .await
            .expect("request should complete")
    }

    async fn get(router: Router, uri: &str) -> Response {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("request should build");
        router
            .oneshot(request)
            .await
            .expect("request should complete")
    }

    async fn parse_json_response<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = read_body_bytes(response).await;
        serde_json::from_slice(&bytes).expect("response should decode as JSON")
    }

    async fn parse_json_value(response: Response) -> serde_json::Value {
        let bytes = read_body_bytes(response).await;
        serde_json::from_slice(&bytes).expect("response should decode as JSON")
    }

    async fn read_body_bytes(response: Response) -> axum::body::Bytes {
        response
            .into_body()
            .collect()
            .await
            .expect("response body should collect")
            .to_bytes()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let dir = TempDir::new().expect("temp dir should create");
        let state = scripted_state(&dir, PathBuf::from("no-such-compiler"));

        let response = get(app(state), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = parse_json_value(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn generate_reports_both_files_when_the_compiler_works() {
        let dir = TempDir::new().expect("temp dir should create");
        let stub = write_stub(dir.path(), "printf 'solid stub\\nendsolid stub\\n' > \"$2\"");
        let state = scripted_state(&dir, stub);

        let response = send_json(
            app(state),
            Method::POST,
            "/generate",
            json!({"description": "a 10mm cube"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let payload: GenerateResponse = parse_json_response(response).await;
        assert!(payload.success);
        assert_eq!(payload.job_id.len(), 8);
        assert_eq!(payload.files.len(), 2);
        assert_eq!(payload.files[0].kind, "scad");
        assert_eq!(payload.files[1].kind, "stl");
        for file in &payload.files {
            assert!(file.size_bytes > 0);
            assert!(file.url.starts_with("/download/"));
            assert!(file.filename.starts_with(&payload.job_id));
        }
    }

    #[tokio::test]
    async fn generate_falls_back_to_script_only_without_a_compiler() {
        let dir = TempDir::new().expect("temp dir should create");
        let state = scripted_state(&dir, PathBuf::from("no-such-compiler"));

        let response = send_json(
            app(state),
            Method::POST,
            "/generate",
            json!({"description": "a 10mm cube"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let payload: GenerateResponse = parse_json_response(response).await;
        assert!(!payload.success);
        assert_eq!(payload.files.len(), 1);
        assert_eq!(payload.files[0].kind, "scad");
        assert!(payload.files[0].size_bytes > 0);
        assert!(payload.message.contains("warnings"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn generate_surfaces_compiler_stderr_in_the_message() {
        let dir = TempDir::new().expect("temp dir should create");
        let stub = write_stub(dir.path(), "echo 'ERROR: syntax error' 1>&2; exit 1");
        let state = scripted_state(&dir, stub);

        let response = send_json(
            app(state),
            Method::POST,
            "/generate",
            json!({"description": "a 10mm cube"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let payload: GenerateResponse = parse_json_response(response).await;
        assert!(!payload.success);
        assert!(payload.message.contains("syntax error"));
    }

    #[tokio::test]
    async fn generate_maps_service_errors_to_bad_gateway() {
        let dir = TempDir::new().expect("temp dir should create");
        let state = state_with(
            Box::new(FailingClient),
            PathBuf::from("no-such-compiler"),
            &dir,
        );

        let response = send_json(
            app(state),
            Method::POST,
            "/generate",
            json!({"description": "a 10mm cube"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = parse_json_value(response).await;
        assert!(
            body["error"]
                .as_str()
                .unwrap_or_default()
                .contains("provider unreachable")
        );
    }

    #[tokio::test]
    async fn generate_empty_body_returns_400() {
        let dir = TempDir::new().expect("temp dir should create");
        let state = scripted_state(&dir, PathBuf::from("no-such-compiler"));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/generate")
            .body(Body::empty())
            .expect("request should build");
        let response = app(state)
            .oneshot(request)
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = parse_json_value(response).await;
        assert!(
            body["error"]
                .as_str()
                .unwrap_or_default()
                .contains("request body")
        );
    }

    #[tokio::test]
    async fn download_serves_the_generated_script() {
        let dir = TempDir::new().expect("temp dir should create");
        let state = scripted_state(&dir, PathBuf::from("no-such-compiler"));
        let router = app(state);

        let response = send_json(
            router.clone(),
            Method::POST,
            "/generate",
            json!({"description": "a 10mm cube"}),
        )
        .await;
        let payload: GenerateResponse = parse_json_response(response).await;
        let url = payload.files[0].url.clone();

        let response = get(router, &url).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some("text/plain")
        );
        let bytes = read_body_bytes(response).await;
        assert_eq!(bytes.as_ref(), b"cube([10, 10, 10]);");
    }

    #[tokio::test]
    async fn download_returns_404_for_missing_files() {
        let dir = TempDir::new().expect("temp dir should create");
        let state = scripted_state(&dir, PathBuf::from("no-such-compiler"));

        let response = get(app(state), "/download/missing.stl").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn download_rejects_path_escapes() {
        let dir = TempDir::new().expect("temp dir should create");
        let state = scripted_state(&dir, PathBuf::from("no-such-compiler"));

        let response = get(app(state), "/download/..%2F..%2Fetc%2Fpasswd").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cors_headers_are_present() {
        let dir = TempDir::new().expect("temp dir should create");
        let state = scripted_state(&dir, PathBuf::from("no-such-compiler"));

        let request = Request::builder()
            .method(Method::GET)
            .uri("/health")
            .header(ORIGIN, "https://example.com")
            .body(Body::empty())
            .expect("request should build");
        let response = app(state)
            .oneshot(request)
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::OK);
        let allow_origin = response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert_eq!(allow_origin, "*");
    }
}
