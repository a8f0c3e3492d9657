use super::{FsEntry, PendingTask, RemoteFs};
use crate::core::path::{normalize, normalize_base_url};
use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::Method;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error};

const API_FS_LIST: &str = "/api/fs/list";
const API_FS_MKDIR: &str = "/api/fs/mkdir";
const API_FS_COPY: &str = "/api/fs/copy";
const API_COPY_UNDONE: &str = "/api/admin/task/copy/undone";

/// 解码失败时响应体最多保留的字节数
const BODY_PREVIEW_LEN: usize = 300;

/// OpenList 标准响应 `{"code":..., "message":..., "data":...}`
#[derive(Debug, Deserialize)]
struct ApiResp {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct FsListData {
    #[serde(default)]
    content: Option<Vec<FsEntry>>,
    #[serde(default)]
    total: i64,
}

#[derive(Debug, Serialize)]
struct ListReq<'a> {
    path: &'a str,
    page: u32,
    per_page: u32,
}

#[derive(Debug, Serialize)]
struct MkdirReq<'a> {
    path: &'a str,
}

#[derive(Debug, Serialize)]
struct CopyReq<'a> {
    src_dir: String,
    dst_dir: String,
    names: [&'a str; 1],
    overwrite: bool,
    skip_existing: bool,
    merge: bool,
}

/// OpenList HTTP 客户端
pub struct OpenListClient {
    base_url: String,
    token: String,
    per_page: u32,
    http: reqwest::Client,
}

impl OpenListClient {
    pub fn new(
        base_url: &str,
        token: &str,
        per_page: u32,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: normalize_base_url(base_url),
            token: token.trim().to_string(),
            per_page,
            http,
        })
    }

    /// 发送请求并解包标准响应，code 非 200 一律按错误处理
    async fn request_json<P, T>(
        &self,
        method: Method,
        api_path: &str,
        payload: Option<&P>,
    ) -> Result<Option<T>, ApiError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("request {} {}", method, api_path);

        let mut req = self
            .http
            .request(method, format!("{}{}", self.base_url, api_path))
            .header(reqwest::header::AUTHORIZATION, &self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/json;charset=UTF-8");
        if let Some(payload) = payload {
            let body = serde_json::to_vec(payload).map_err(ApiError::Encode)?;
            req = req.body(body);
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;

        let result = decode_envelope(api_path, status, &body);
        if let Err(ApiError::Status { code, message, .. }) = &result {
            error!("api {} failed: code={} message={}", api_path, code, message);
        }
        result
    }
}

/// 解析响应包，`data` 缺失或为 null 时返回 `None`
pub(crate) fn decode_envelope<T: DeserializeOwned>(
    api_path: &str,
    status: u16,
    body: &[u8],
) -> Result<Option<T>, ApiError> {
    let envelope: ApiResp = serde_json::from_slice(body).map_err(|_| ApiError::Envelope {
        status,
        body: truncate_bytes(body, BODY_PREVIEW_LEN),
    })?;

    if envelope.code != 200 {
        return Err(ApiError::Status {
            api: api_path.to_string(),
            code: envelope.code,
            message: envelope.message,
        });
    }

    match envelope.data {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(data) => serde_json::from_value(data)
            .map(Some)
            .map_err(|source| ApiError::Data {
                api: api_path.to_string(),
                source,
            }),
    }
}

fn truncate_bytes(b: &[u8], n: usize) -> String {
    if b.len() <= n {
        return String::from_utf8_lossy(b).into_owned();
    }
    format!("{}...", String::from_utf8_lossy(&b[..n]))
}

/// 从第 1 页开始翻页，直到累计条目数达到 total 或遇到空页
///
/// total 可能在翻页过程中变化，空页同样视为结束。
async fn collect_pages<F, Fut>(mut fetch: F) -> Result<Vec<FsEntry>, ApiError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<FsListData, ApiError>>,
{
    let mut all = Vec::new();
    let mut page = 1;
    loop {
        let data = fetch(page).await?;
        let content = data.content.unwrap_or_default();
        let fetched = content.len();
        all.extend(content);

        if fetched == 0 || all.len() as i64 >= data.total {
            break;
        }
        page += 1;
    }
    Ok(all)
}

#[async_trait]
impl RemoteFs for OpenListClient {
    async fn list_all(&self, path: &str) -> Result<Vec<FsEntry>, ApiError> {
        let path = normalize(path);
        collect_pages(|page| {
            let path = &path;
            async move {
                let req = ListReq {
                    path,
                    page,
                    per_page: self.per_page,
                };
                let data = self
                    .request_json::<_, FsListData>(Method::POST, API_FS_LIST, Some(&req))
                    .await?;
                Ok(data.unwrap_or_default())
            }
        })
        .await
    }

    async fn mkdir(&self, path: &str) -> Result<(), ApiError> {
        let path = normalize(path);
        self.request_json::<_, IgnoredAny>(Method::POST, API_FS_MKDIR, Some(&MkdirReq { path: &path }))
            .await?;
        Ok(())
    }

    async fn copy_file(
        &self,
        src_dir: &str,
        dst_dir: &str,
        name: &str,
        overwrite: bool,
    ) -> Result<(), ApiError> {
        let req = CopyReq {
            src_dir: normalize(src_dir),
            dst_dir: normalize(dst_dir),
            names: [name],
            overwrite,
            skip_existing: false,
            merge: false,
        };
        self.request_json::<_, IgnoredAny>(Method::POST, API_FS_COPY, Some(&req))
            .await?;
        Ok(())
    }

    async fn list_undone_copy_tasks(&self) -> Result<Vec<PendingTask>, ApiError> {
        let tasks: Option<Vec<PendingTask>> = self
            .request_json::<(), _>(Method::GET, API_COPY_UNDONE, None)
            .await?;
        Ok(tasks.unwrap_or_default())
    }

    fn name(&self) -> &str {
        &self.base_url
    }
}
