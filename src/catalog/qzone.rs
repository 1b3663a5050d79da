//! HTTP catalog client for the Qzone group-album service
//!
//! The album listing endpoint replies with JSONP wrapped in a fixed callback
//! and the photo listing endpoint with plain JSON; both carry a `code` field
//! where zero means success. Permission failures arrive as an HTML apology
//! page rather than a status code, so the body is sniffed for the marker
//! before any parsing is attempted.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::{AlbumSummary, CatalogClient, MediaVariant, RawMediaItem};
use crate::auth::AuthContext;
use crate::error::{CatalogError, Error, Result};

const DEFAULT_BASE_URL: &str = "https://h5.qzone.qq.com";
const ALBUM_LIST_PATH: &str = "/proxy/domain/u.photo.qzone.qq.com/cgi-bin/upp/qun_list_album_v2";
const PHOTO_LIST_PATH: &str = "/groupphoto/inqq";

/// Marker the service embeds in its "no access" apology page
const PERMISSION_MARKER: &str = "对不起，您";

/// Catalog client backed by the Qzone HTTP API
#[derive(Clone, Debug)]
pub struct QzoneCatalogClient {
    http: reqwest::Client,
    auth: AuthContext,
    base_url: Url,
    album_list_limit: usize,
}

impl QzoneCatalogClient {
    /// Build a client for the production endpoints
    pub fn new(auth: AuthContext, timeout: Duration, album_list_limit: usize) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        #[allow(clippy::expect_used)]
        let base_url = Url::parse(DEFAULT_BASE_URL).expect("static URL parses");
        Ok(Self {
            http,
            auth,
            base_url,
            album_list_limit,
        })
    }

    /// Point the client at a different host (used by tests)
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| CatalogError::Malformed(format!("bad endpoint {path}: {e}")).into())
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        self.auth
            .headers()
            .into_iter()
            .fold(builder, |builder, (name, value)| builder.header(name, value))
    }
}

#[async_trait]
impl CatalogClient for QzoneCatalogClient {
    async fn list_albums(&self, collection_id: &str) -> Result<Vec<AlbumSummary>> {
        let url = self.endpoint(ALBUM_LIST_PATH)?;
        let g_tk = self.auth.g_tk().to_string();
        let num = self.album_list_limit.to_string();
        let request = self.authed(self.http.get(url)).query(&[
            ("g_tk", g_tk.as_str()),
            ("qunId", collection_id),
            ("uin", self.auth.uin()),
            ("start", "0"),
            ("num", num.as_str()),
            ("getMemberRole", "1"),
            ("inCharset", "utf-8"),
            ("outCharset", "utf-8"),
            ("source", "qzone"),
            ("platform", "qzone"),
            ("callback", "shine2_Callback"),
            ("callbackFun", "shine2"),
        ]);

        let body = request.send().await?.error_for_status()?.text().await?;
        if body.contains(PERMISSION_MARKER) {
            return Err(CatalogError::PermissionDenied {
                collection_id: collection_id.to_string(),
            }
            .into());
        }

        let response: AlbumListResponse = serde_json::from_str(strip_jsonp(&body)?)
            .map_err(|e| CatalogError::Malformed(format!("album list: {e}")))?;
        if response.code != 0 {
            return Err(CatalogError::Status {
                code: response.code,
                message: response.message,
            }
            .into());
        }

        Ok(response
            .data
            .unwrap_or_default()
            .album
            .into_iter()
            .map(|album| AlbumSummary {
                id: album.id,
                title: album.title,
                item_count: album.photocnt.max(0) as usize,
            })
            .collect())
    }

    async fn list_items_page(
        &self,
        collection_id: &str,
        album_id: &str,
        offset: usize,
        page_size: usize,
    ) -> Result<Vec<RawMediaItem>> {
        let mut url = self.endpoint(PHOTO_LIST_PATH)?;
        url.query_pairs_mut()
            .append_pair("g_tk", &self.auth.g_tk().to_string());

        let uin = self.auth.uin();
        let attach_info = urlencoding::encode(&format!("start_count={offset}")).into_owned();
        let body = format!(
            "qunId={collection_id}&albumId={album_id}&uin={uin}&start={offset}&num={page_size}\
             &getCommentCnt=0&getMemberRole=0&hostUin={uin}&getalbum=0&platform=qzone\
             &inCharset=utf-8&outCharset=utf-8&source=qzone&cmd=qunGetPhotoList\
             &qunid={collection_id}&albumid={album_id}&attach_info={attach_info}"
        );

        let request = self
            .authed(self.http.post(url))
            .header(
                "Content-Type",
                "application/x-www-form-urlencoded; charset=UTF-8",
            )
            .header("X-Requested-With", "XMLHttpRequest")
            .body(body);

        let response: PhotoListResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| CatalogError::Malformed(format!("photo list: {e}")))?;
        if response.code != 0 {
            return Err(CatalogError::Status {
                code: response.code,
                message: response.message,
            }
            .into());
        }

        Ok(response
            .data
            .unwrap_or_default()
            .photolist
            .into_iter()
            .map(|photo| {
                let video_url = photo
                    .videodata
                    .map(|v| v.actionurl)
                    .filter(|u| !u.is_empty());
                RawMediaItem {
                    name: photo.sloc,
                    upload_time: photo.uploadtime,
                    variants: photo
                        .photourl
                        .into_values()
                        .map(|v| MediaVariant {
                            url: v.url,
                            width: v.width,
                            height: v.height,
                            enlarge_rate: v.enlarge_rate,
                        })
                        .collect(),
                    video_url,
                }
            })
            .collect())
    }
}

/// Extract the JSON payload from a JSONP-wrapped body
fn strip_jsonp(body: &str) -> Result<&str> {
    let start = body
        .find('(')
        .ok_or_else(|| CatalogError::Malformed("no JSONP opening parenthesis".into()))?;
    let end = body
        .rfind(')')
        .filter(|end| *end > start)
        .ok_or_else(|| CatalogError::Malformed("no JSONP closing parenthesis".into()))?;
    Ok(&body[start + 1..end])
}

#[derive(Debug, Deserialize)]
struct AlbumListResponse {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<AlbumListData>,
}

#[derive(Debug, Default, Deserialize)]
struct AlbumListData {
    #[serde(default)]
    album: Vec<RawAlbum>,
}

#[derive(Debug, Deserialize)]
struct RawAlbum {
    id: String,
    title: String,
    #[serde(default)]
    photocnt: i64,
}

#[derive(Debug, Deserialize)]
struct PhotoListResponse {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<PhotoListData>,
}

#[derive(Debug, Default, Deserialize)]
struct PhotoListData {
    #[serde(default)]
    photolist: Vec<RawPhoto>,
}

#[derive(Debug, Deserialize)]
struct RawPhoto {
    #[serde(default)]
    sloc: String,
    #[serde(default)]
    uploadtime: i64,
    #[serde(default)]
    photourl: BTreeMap<String, RawVariant>,
    #[serde(default)]
    videodata: Option<RawVideoData>,
}

#[derive(Debug, Deserialize)]
struct RawVariant {
    #[serde(default)]
    url: String,
    #[serde(default)]
    width: i64,
    #[serde(default)]
    height: i64,
    #[serde(default)]
    enlarge_rate: i64,
}

#[derive(Debug, Deserialize)]
struct RawVideoData {
    #[serde(default)]
    actionurl: String,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> QzoneCatalogClient {
        let auth = AuthContext::new("uin=o10001", "p-skey-value", "10001").unwrap();
        QzoneCatalogClient::new(auth, Duration::from_secs(5), 1000)
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap())
    }

    #[test]
    fn strip_jsonp_extracts_payload() {
        let body = r#"shine2_Callback({"code":0,"data":{}});"#;
        assert_eq!(strip_jsonp(body).unwrap(), r#"{"code":0,"data":{}}"#);
    }

    #[test]
    fn strip_jsonp_rejects_bare_html() {
        assert!(strip_jsonp("<html>error</html>").is_err());
    }

    #[tokio::test]
    async fn list_albums_parses_jsonp_response() {
        let server = MockServer::start().await;
        let body = r#"shine2_Callback({"code":0,"data":{"album":[
            {"id":"a1","title":"Summer","photocnt":12},
            {"id":"a2","title":"Empty","photocnt":0}
        ]}});"#;
        Mock::given(method("GET"))
            .and(path(ALBUM_LIST_PATH))
            .and(query_param("qunId", "123456"))
            .and(query_param("uin", "10001"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let albums = test_client(&server).list_albums("123456").await.unwrap();
        assert_eq!(albums.len(), 2);
        assert_eq!(albums[0].id, "a1");
        assert_eq!(albums[0].item_count, 12);
        assert_eq!(albums[1].item_count, 0);
    }

    #[tokio::test]
    async fn list_albums_detects_permission_denied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ALBUM_LIST_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html>对不起，您无权访问</html>"),
            )
            .mount(&server)
            .await;

        let err = test_client(&server).list_albums("123456").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Catalog(CatalogError::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn list_albums_surfaces_nonzero_code() {
        let server = MockServer::start().await;
        let body = r#"shine2_Callback({"code":-4001,"message":"login required"});"#;
        Mock::given(method("GET"))
            .and(path(ALBUM_LIST_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let err = test_client(&server).list_albums("123456").await.unwrap_err();
        match err {
            Error::Catalog(CatalogError::Status { code, message }) => {
                assert_eq!(code, -4001);
                assert_eq!(message, "login required");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_items_page_maps_photos_and_videos() {
        let server = MockServer::start().await;
        let body = r#"{"code":0,"data":{"photolist":[
            {"sloc":"NpS1","uploadtime":1700000000,"photourl":{
                "0":{"url":"https://cdn/orig","width":0,"height":0,"enlarge_rate":0},
                "1":{"url":"https://cdn/small","width":640,"height":480,"enlarge_rate":1}
            },"videodata":{"actionurl":"https://cdn/video.mp4"}},
            {"sloc":"NpS2","uploadtime":1700000100,"photourl":{
                "1":{"url":"https://cdn/only","width":800,"height":600,"enlarge_rate":0}
            },"videodata":{"actionurl":""}}
        ]}}"#;
        Mock::given(method("POST"))
            .and(path(PHOTO_LIST_PATH))
            .and(body_string_contains("cmd=qunGetPhotoList"))
            .and(body_string_contains("start=0"))
            .and(body_string_contains("num=36"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let items = test_client(&server)
            .list_items_page("123456", "a1", 0, 36)
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "NpS1");
        assert_eq!(items[0].variants.len(), 2);
        assert_eq!(items[0].video_url.as_deref(), Some("https://cdn/video.mp4"));
        // Empty action URLs mean no video
        assert_eq!(items[1].video_url, None);
    }

    #[tokio::test]
    async fn list_items_page_rejects_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PHOTO_LIST_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = test_client(&server)
            .list_items_page("123456", "a1", 0, 36)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }
}
