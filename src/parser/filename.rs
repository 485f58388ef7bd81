use regex::Regex;

use super::ContentKind;

/// 文件名解析器
///
/// 从文件名中提取章节号：
/// - 文本章节：`chuong-<N>`，扩展名只能是 `.txt` 或没有（例如 `chuong-12.txt`）
/// - 音频章节：`chuong-<N>.opus`
pub struct FilenameParser {
    text_pattern: Regex,
    audio_pattern: Regex,
}

impl FilenameParser {
    pub fn new() -> Self {
        Self {
            text_pattern: Regex::new(r"(?i)chuong-(\d+)[^.]*(?:\.txt)?$").expect("文本章节文件名模式"),
            audio_pattern: Regex::new(r"(?i)chuong-(\d+)\.opus$").expect("音频章节文件名模式"),
        }
    }

    /// 提取章节号
    ///
    /// 章节号必须是正整数；`0`、溢出或不匹配都返回 None。
    /// 前导零按十进制处理（`chuong-007` → 7）。
    pub fn chapter_number(&self, file_name: &str, kind: ContentKind) -> Option<u32> {
        let pattern = match kind {
            ContentKind::Text => &self.text_pattern,
            ContentKind::Audio => &self.audio_pattern,
        };

        let digits = pattern.captures(file_name)?.get(1)?.as_str();
        match digits.parse::<u32>() {
            Ok(0) | Err(_) => None,
            Ok(n) => Some(n),
        }
    }
}

impl Default for FilenameParser {
    fn default() -> Self {
        Self::new()
    }
}
