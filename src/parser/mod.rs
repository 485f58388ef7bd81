use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

// 子模块声明
pub mod encoding;
pub mod filename;
pub mod title;

use filename::FilenameParser;
use title::{fallback_title, TitleDetector};

/// 章节内容类型
///
/// 文本章节压缩后上传；音频章节原样上传
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContentKind {
    Text,
    Audio,
}

impl ContentKind {
    /// 上传时 `file` 字段的 Content-Type
    pub fn content_type(&self) -> &'static str {
        match self {
            ContentKind::Text => "application/octet-stream",
            ContentKind::Audio => "audio/ogg",
        }
    }
}

/// 解析后的章节
///
/// 一个用户选择的文件对应一个章节。文件内容不会预先读入内存，
/// 只保存路径，上传时才读取。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedChapter {
    /// 章节号（正整数，同一批次内唯一）
    pub chapter_number: u32,
    /// 章节标题
    pub title: String,
    /// 原始文件名，用作对象存储 key 的后缀
    pub file_name: String,
    /// 本地文件路径
    pub path: PathBuf,
    /// 内容类型
    pub kind: ContentKind,
}

/// 解析用户选择的章节文件
///
/// 文件名不符合模式、无法读取的文件会被静默跳过，不会中断整批解析。
/// 结果按章节号升序排列；章节号重复时保留第一个（按文件名排序），其余丢弃。
///
/// # 参数
/// - `paths`: 用户选择的文件
/// - `kind`: 文本或音频
pub async fn parse_chapter_files(paths: &[PathBuf], kind: ContentKind) -> Vec<ParsedChapter> {
    let filenames = FilenameParser::new();
    let titles = TitleDetector::new();
    let mut chapters = Vec::with_capacity(paths.len());

    for path in paths {
        let Some(file_name) = path.file_name().and_then(|s| s.to_str()) else {
            tracing::debug!(path = %path.display(), "跳过：文件名无法识别");
            continue;
        };

        let Some(chapter_number) = filenames.chapter_number(file_name, kind) else {
            tracing::debug!(file_name, "跳过：文件名不符合章节模式");
            continue;
        };

        let title = match kind {
            ContentKind::Text => match read_first_line(path).await {
                Ok(line) => titles.detect(&line, chapter_number),
                Err(e) => {
                    tracing::debug!(file_name, error = %e, "跳过：读取文件失败");
                    continue;
                }
            },
            ContentKind::Audio => fallback_title(chapter_number),
        };

        chapters.push(ParsedChapter {
            chapter_number,
            title,
            file_name: file_name.to_string(),
            path: path.clone(),
            kind,
        });
    }

    chapters.sort_by(|a, b| {
        a.chapter_number
            .cmp(&b.chapter_number)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });

    let before = chapters.len();
    chapters.dedup_by(|later, kept| {
        let duplicate = later.chapter_number == kept.chapter_number;
        if duplicate {
            tracing::warn!(
                chapter_number = later.chapter_number,
                kept = %kept.file_name,
                dropped = %later.file_name,
                "章节号重复，已丢弃"
            );
        }
        duplicate
    });

    tracing::info!(
        selected = paths.len(),
        parsed = chapters.len(),
        duplicates = before - chapters.len(),
        "章节文件解析完成"
    );

    chapters
}

/// 读取标题时只看文件开头这么多字节
const TITLE_PREFIX_BYTES: u64 = 4096;

/// 只读取文件第一行
///
/// 先按检测到的编码解码文件开头，再取第一行，UTF-16 的换行也能正确切分。
/// 空文件返回空字符串
async fn read_first_line(path: &Path) -> std::io::Result<String> {
    let file = tokio::fs::File::open(path).await?;
    let mut prefix = Vec::new();
    file.take(TITLE_PREFIX_BYTES).read_to_end(&mut prefix).await?;

    let text = encoding::decode_text(without_truncated_char(&prefix));
    Ok(text.lines().next().unwrap_or_default().to_string())
}

/// 去掉截断处不完整的 UTF-8 字符，避免整段被误判为旧编码
fn without_truncated_char(bytes: &[u8]) -> &[u8] {
    match std::str::from_utf8(bytes) {
        Err(e) if e.error_len().is_none() => &bytes[..e.valid_up_to()],
        _ => bytes,
    }
}
