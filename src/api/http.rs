use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, Url};

use super::{ApiError, ChapterBackend, ChapterMeta, ObjectUpload, Partition, UploadTarget};

/// 基于 reqwest 的章节后端客户端
pub struct HttpChapterApi {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpChapterApi {
    /// # 参数
    /// - `base_url`: 后端 API 根地址，例如 `https://api.example.com/api`
    /// - `token`: 可选的 Bearer token，只用于后端接口，不用于对象存储
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self {
            client: Client::new(),
            base_url,
            token,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// 非 2xx 视为失败，带上响应正文便于排查
async fn ensure_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ChapterBackend for HttpChapterApi {
    async fn register_chapters(&self, book_slug: &str, batch: &[ChapterMeta]) -> Result<(), ApiError> {
        let url = self.url(&["chapters", book_slug])?;
        tracing::debug!(%url, count = batch.len(), "注册章节元数据");

        let response = self.authorized(self.client.post(url).json(batch)).send().await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn upload_target(&self, book_slug: &str, partition: Partition) -> Result<UploadTarget, ApiError> {
        let mut url = self.url(&["chapters", book_slug, "upload"])?;
        if partition == Partition::Free {
            url.query_pairs_mut().append_pair("free", "true");
        }
        tracing::debug!(%url, %partition, "获取上传凭证");

        let response = self.authorized(self.client.get(url)).send().await?;
        let body = ensure_success(response).await?.text().await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn upload_object(&self, target: &UploadTarget, object: ObjectUpload) -> Result<(), ApiError> {
        let size = object.body.len();
        let mut form = Form::new();
        for (name, value) in object.fields {
            form = form.text(name, value);
        }
        let file = Part::bytes(object.body)
            .file_name(object.file_name.clone())
            .mime_str(object.content_type)?;
        form = form.part("file", file);

        let response = self.client.post(&target.endpoint).multipart(form).send().await?;
        ensure_success(response).await?;
        tracing::debug!(file_name = %object.file_name, size, "对象上传完成");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn metas(range: std::ops::RangeInclusive<u32>) -> Vec<ChapterMeta> {
        range
            .map(|n| ChapterMeta {
                chapter_number: n,
                title: format!("Chương {}", n),
            })
            .collect()
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpChapterApi::new("not a url", None),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_url_joins_segments() {
        let api = HttpChapterApi::new("http://localhost:8080/api/", None).unwrap();
        let url = api.url(&["chapters", "tien nghich"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/chapters/tien%20nghich");
    }

    #[tokio::test]
    async fn test_register_chapters_posts_json_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chapters/tien-nghich"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(serde_json::json!([
                {"chapterNumber": 1, "title": "Chương 1"},
                {"chapterNumber": 2, "title": "Chương 2"}
            ])))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpChapterApi::new(&format!("{}/api", server.uri()), Some("secret".to_string())).unwrap();
        api.register_chapters("tien-nghich", &metas(1..=2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_register_chapters_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("db down"))
            .mount(&server)
            .await;

        let api = HttpChapterApi::new(&server.uri(), None).unwrap();
        let err = api.register_chapters("b", &metas(1..=1)).await.unwrap_err();
        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "db down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_upload_target_free_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chapters/b/upload"))
            .and(query_param("free", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"endpoint":"https://bucket","fields":{"policy":"p","key":"k"}}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpChapterApi::new(&server.uri(), None).unwrap();
        let target = api.upload_target("b", Partition::Free).await.unwrap();
        assert_eq!(target.endpoint, "https://bucket");
        assert_eq!(target.fields[0], ("policy".to_string(), "p".to_string()));
    }

    #[tokio::test]
    async fn test_upload_target_restricted_has_no_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chapters/b/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"endpoint":"https://bucket","fields":{}}"#,
            ))
            .mount(&server)
            .await;

        let api = HttpChapterApi::new(&server.uri(), None).unwrap();
        api.upload_target("b", Partition::Restricted).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.query(), None);
    }

    #[tokio::test]
    async fn test_upload_target_bad_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("oops"))
            .mount(&server)
            .await;

        let api = HttpChapterApi::new(&server.uri(), None).unwrap();
        let err = api.upload_target("b", Partition::Free).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn test_upload_object_sends_fields_then_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bucket"))
            .and(body_string_contains("name=\"key\""))
            .and(body_string_contains("free/b/chuong-1.txt"))
            .and(body_string_contains("filename=\"chuong-1.txt\""))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpChapterApi::new("http://unused.invalid", None).unwrap();
        let target = UploadTarget {
            endpoint: format!("{}/bucket", server.uri()),
            fields: vec![("policy".to_string(), "p".to_string())],
        };
        let object = ObjectUpload {
            fields: target.form_fields("free/b/chuong-1.txt", Partition::Free),
            file_name: "chuong-1.txt".to_string(),
            content_type: "application/octet-stream",
            body: b"payload".to_vec(),
        };
        api.upload_object(&target, object).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body).to_string();
        let policy = body.find("name=\"policy\"").unwrap();
        let key = body.find("name=\"key\"").unwrap();
        let file = body.find("name=\"file\"").unwrap();
        assert!(policy < key && key < file);
    }

    #[tokio::test]
    async fn test_upload_object_non_2xx_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("AccessDenied"))
            .mount(&server)
            .await;

        let api = HttpChapterApi::new("http://unused.invalid", None).unwrap();
        let target = UploadTarget {
            endpoint: server.uri(),
            fields: vec![],
        };
        let object = ObjectUpload {
            fields: target.form_fields("b/chuong-60.txt", Partition::Restricted),
            file_name: "chuong-60.txt".to_string(),
            content_type: "application/octet-stream",
            body: vec![1, 2, 3],
        };
        let err = api.upload_object(&target, object).await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 403, .. }));
    }
}
