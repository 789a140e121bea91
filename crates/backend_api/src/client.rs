use async_trait::async_trait;
use map_session::{backend::Backend, BackendResult};
use model::{
    path::{PathQuery, PathResponse},
    shape::{EditShapeRequest, PersistedShape, SavedShape, ShapeRecord, ShapeRequest},
    vehicle::VehiclePosition,
};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use utility::id::Id;

use crate::{ApiConfig, ApiError};

/// REST client of the tracking server.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    config: ApiConfig,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = config.http_client()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.config.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ApiError::InvalidConfig(format!("{} cannot be a base url", self.config.api_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        let url = self.endpoint(segments)?;
        log::debug!("Requesting {method} '{url}'.");
        let request = self.client.request(method, url);
        Ok(match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        let status_code = response.status();
        if status_code.is_success() {
            return Ok(response);
        }
        let url = response.url().to_string();
        Err(ApiError::InvalidResponse {
            status_code,
            url,
            response: response.text().await.ok(),
        })
    }

    /// Parses a JSON body, an empty body yields `None`.
    async fn body<T: DeserializeOwned>(response: Response) -> Result<Option<T>, ApiError> {
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    pub async fn get_live_vehicles(&self) -> Result<Vec<VehiclePosition>, ApiError> {
        let response = Self::send(self.request(Method::GET, &["vehicles", "live"])?).await?;
        Ok(Self::body(response).await?.unwrap_or_default())
    }

    pub async fn get_vehicle_path(
        &self,
        query: &PathQuery,
    ) -> Result<Option<PathResponse>, ApiError> {
        let request = self.request(Method::GET, &["vehicles", "path"])?.query(query);
        Self::body(Self::send(request).await?).await
    }

    pub async fn post_shape(&self, shape: &ShapeRequest) -> Result<SavedShape, ApiError> {
        let request = self.request(Method::POST, &["features", "save"])?.json(shape);
        Ok(Self::body(Self::send(request).await?)
            .await?
            .unwrap_or_default())
    }

    pub async fn put_shape(
        &self,
        id: &Id<PersistedShape>,
        edit: &EditShapeRequest,
    ) -> Result<(), ApiError> {
        let request = self
            .request(Method::PUT, &["features", "edit", id.as_str()])?
            .json(edit);
        Self::send(request).await?;
        Ok(())
    }

    pub async fn get_shapes(&self) -> Result<Vec<ShapeRecord>, ApiError> {
        let response = Self::send(self.request(Method::GET, &["features", "get"])?).await?;
        Ok(Self::body(response).await?.unwrap_or_default())
    }

    pub async fn delete_shape_by_id(&self, id: &Id<PersistedShape>) -> Result<(), ApiError> {
        let request = self.request(Method::DELETE, &["features", "delete", id.as_str()])?;
        Self::send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn live_vehicles(&self) -> BackendResult<Vec<VehiclePosition>> {
        Ok(self.get_live_vehicles().await?)
    }

    async fn vehicle_path(&self, query: &PathQuery) -> BackendResult<Option<PathResponse>> {
        Ok(self.get_vehicle_path(query).await?)
    }

    async fn save_shape(&self, request: &ShapeRequest) -> BackendResult<SavedShape> {
        Ok(self.post_shape(request).await?)
    }

    async fn edit_shape(
        &self,
        id: &Id<PersistedShape>,
        request: &EditShapeRequest,
    ) -> BackendResult<()> {
        Ok(self.put_shape(id, request).await?)
    }

    async fn all_shapes(&self) -> BackendResult<Vec<ShapeRecord>> {
        Ok(self.get_shapes().await?)
    }

    async fn delete_shape(&self, id: &Id<PersistedShape>) -> BackendResult<()> {
        Ok(self.delete_shape_by_id(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode},
        routing::{delete, get, post, put},
        Json, Router,
    };
    use chrono::NaiveDate;
    use map_session::{codec, BackendError};
    use model::{geometry::GeometryKind, ExampleData};
    use serde::Deserialize;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    use super::*;

    type Requests = Arc<Mutex<Vec<String>>>;

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct PathParams {
        vehicle_number: String,
        from: String,
        to: String,
    }

    async fn live(headers: HeaderMap, State(requests): State<Requests>) -> Json<Value> {
        let auth = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned();
        requests.lock().unwrap().push(format!("live {auth}"));
        Json(json!([VehiclePosition::example_data()]))
    }

    async fn path(Query(params): Query<PathParams>, State(requests): State<Requests>) -> String {
        requests
            .lock()
            .unwrap()
            .push(format!("path {} {} {}", params.vehicle_number, params.from, params.to));
        match params.vehicle_number.as_str() {
            "BA 2 KHA 1234" => json!({"coordinates": [{"x": 85.3, "y": 27.7}, {"x": 85.4, "y": 27.8}]})
                .to_string(),
            _ => String::new(),
        }
    }

    async fn save(State(requests): State<Requests>, Json(body): Json<Value>) -> Json<Value> {
        requests.lock().unwrap().push(format!("save {body}"));
        Json(json!({"id": 7, "featureType": body["featureType"]}))
    }

    async fn edit(
        Path(id): Path<String>,
        State(requests): State<Requests>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        requests.lock().unwrap().push(format!("edit {id} {body}"));
        StatusCode::OK
    }

    async fn shapes() -> Json<Value> {
        Json(json!([
            {"id": 7, "geometry": {"type": "Point", "coordinates": [85.3, 27.7, 1300.0]}},
            {"id": 8, "geometry": null}
        ]))
    }

    async fn remove(Path(id): Path<String>) -> (StatusCode, String) {
        match id.as_str() {
            "7" => (StatusCode::OK, String::new()),
            _ => (StatusCode::NOT_FOUND, format!("no feature {id}")),
        }
    }

    async fn serve(auth_token: Option<&str>) -> (HttpBackend, Requests) {
        let requests = Requests::default();
        let router = Router::new()
            .route("/api/vehicles/live", get(live))
            .route("/api/vehicles/path", get(path))
            .route("/api/features/save", post(save))
            .route("/api/features/edit/:id", put(edit))
            .route("/api/features/get", get(shapes))
            .route("/api/features/delete/:id", delete(remove))
            .with_state(requests.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router.into_make_service())
                .await
                .unwrap();
        });

        let config = ApiConfig {
            api_url: Url::parse(&format!("http://{address}/api")).unwrap(),
            auth_token: auth_token.map(str::to_owned),
            ..ApiConfig::default()
        };
        (HttpBackend::new(config).unwrap(), requests)
    }

    #[tokio::test]
    async fn loads_live_vehicles_with_bearer_token() {
        let (backend, requests) = serve(Some("secret")).await;
        let vehicles = backend.live_vehicles().await.unwrap();
        assert_eq!(vehicles, vec![VehiclePosition::example_data()]);
        assert_eq!(*requests.lock().unwrap(), vec!["live Bearer secret"]);
    }

    #[tokio::test]
    async fn path_query_and_empty_answer() {
        let (backend, requests) = serve(None).await;
        let day = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();

        let path = backend
            .vehicle_path(&PathQuery::for_days("BA 2 KHA 1234", day, day))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(path.coordinates.len(), 2);
        assert_eq!(
            requests.lock().unwrap()[0],
            "path BA 2 KHA 1234 2024-01-05T00:00:00 2024-01-05T23:59:59"
        );

        let unknown = backend
            .vehicle_path(&PathQuery::for_days("unknown", day, day))
            .await
            .unwrap();
        assert_eq!(unknown, None);
    }

    #[tokio::test]
    async fn shape_endpoints() {
        let (backend, requests) = serve(None).await;

        let saved = backend
            .save_shape(&ShapeRequest::Point { point: [85.3, 27.7] })
            .await
            .unwrap();
        assert_eq!(saved.id.as_deref(), Some("7"));

        backend
            .edit_shape(
                &Id::from("7"),
                &EditShapeRequest {
                    geometry: ShapeRequest::Point { point: [85.4, 27.8] },
                },
            )
            .await
            .unwrap();
        {
            let requests = requests.lock().unwrap();
            assert!(requests[0].starts_with("save "));
            assert!(requests[0].contains(r#""featureType":"Point""#));
            assert!(requests[1].starts_with("edit 7 "));
            assert!(requests[1].contains(r#""geometry""#));
        }

        let records = backend.all_shapes().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "7");
        let point = codec::from_response(records[0].geometry.as_ref().unwrap()).unwrap();
        assert_eq!(point.kind(), GeometryKind::Point);
        assert!(records[1].geometry.is_none());

        backend.delete_shape(&Id::from("7")).await.unwrap();
        let missing = backend.delete_shape(&Id::from("9")).await;
        assert!(matches!(missing, Err(BackendError::NotFound)));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_request_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let backend = HttpBackend::new(ApiConfig {
            api_url: Url::parse(&format!("http://{address}/api")).unwrap(),
            ..ApiConfig::default()
        })
        .unwrap();
        let error = backend.get_shapes().await.unwrap_err();
        assert!(matches!(error, ApiError::RequestError(_)));
    }
}
