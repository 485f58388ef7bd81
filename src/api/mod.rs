use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub mod http;

pub use http::HttpChapterApi;

/// 免费章节上限：章节号 <= 50 为免费，其余为 VIP
pub const FREE_CHAPTER_LIMIT: u32 = 50;

/// 存储分区
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Partition {
    /// 免费内容，对象 key 带 `free/` 前缀
    Free,
    /// VIP 内容，对象 key 位于根目录，访问受限
    Restricted,
}

impl Partition {
    /// 章节所属分区
    pub fn of(chapter_number: u32) -> Self {
        if chapter_number <= FREE_CHAPTER_LIMIT {
            Partition::Free
        } else {
            Partition::Restricted
        }
    }

    /// 对象 key 前缀
    pub fn key_prefix(&self) -> Option<&'static str> {
        match self {
            Partition::Free => Some("free"),
            Partition::Restricted => None,
        }
    }

    /// 对象 key：`free/{book}/{file}` 或 `{book}/{file}`
    pub fn object_key(&self, book_slug: &str, file_name: &str) -> String {
        match self.key_prefix() {
            Some(prefix) => format!("{}/{}/{}", prefix, book_slug, file_name),
            None => format!("{}/{}", book_slug, file_name),
        }
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Partition::Free => write!(f, "free"),
            Partition::Restricted => write!(f, "vip"),
        }
    }
}

/// 注册到后端的章节元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterMeta {
    pub chapter_number: u32,
    pub title: String,
}

/// 短期有效的上传凭证
///
/// `fields` 保持后端返回的顺序，必须原样写入 multipart 表单
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadTarget {
    pub endpoint: String,
    #[serde(deserialize_with = "ordered_fields")]
    pub fields: Vec<(String, String)>,
}

/// VIP 对象的访问控制
const PRIVATE_ACL: &str = "private";

impl UploadTarget {
    /// 生成某个对象的表单字段
    ///
    /// 先按顺序复制后端字段，再设置 `key`（已存在则原位替换）；
    /// VIP 分区在后端未提供 `acl` 时追加 `acl=private`。
    pub fn form_fields(&self, key: &str, partition: Partition) -> Vec<(String, String)> {
        let mut fields = self.fields.clone();

        match fields.iter().position(|(name, _)| name == "key") {
            Some(index) => {
                fields[index].1 = key.to_string();
                let mut seen = 0;
                fields.retain(|(name, _)| {
                    if name != "key" {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => fields.push(("key".to_string(), key.to_string())),
        }

        if partition == Partition::Restricted && !fields.iter().any(|(name, _)| name == "acl") {
            fields.push(("acl".to_string(), PRIVATE_ACL.to_string()));
        }

        fields
    }
}

/// 按文档顺序读取 `fields` 对象，非字符串值转为 JSON 文本
fn ordered_fields<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(map
        .into_iter()
        .map(|(name, value)| match value {
            serde_json::Value::String(s) => (name, s),
            other => (name, other.to_string()),
        })
        .collect())
}

/// 一次对象上传
#[derive(Debug, Clone)]
pub struct ObjectUpload {
    /// 表单字段（已包含 key / acl）
    pub fields: Vec<(String, String)>,
    /// `file` 字段声明的文件名
    pub file_name: String,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("网络请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("服务器返回 {status}: {body}")]
    Status { status: u16, body: String },
    #[error("响应解析失败: {0}")]
    Decode(String),
    #[error("地址无效: {0}")]
    InvalidUrl(String),
}

/// 章节后端
///
/// 管道只依赖这三个调用：注册元数据、获取上传凭证、上传对象
#[async_trait]
pub trait ChapterBackend: Send + Sync {
    /// `POST /chapters/{book}`，一次注册一批
    async fn register_chapters(&self, book_slug: &str, batch: &[ChapterMeta]) -> Result<(), ApiError>;

    /// `GET /chapters/{book}/upload[?free=true]`
    async fn upload_target(&self, book_slug: &str, partition: Partition) -> Result<UploadTarget, ApiError>;

    /// `POST <endpoint>` multipart 上传
    async fn upload_object(&self, target: &UploadTarget, object: ObjectUpload) -> Result<(), ApiError>;
}
