use regex::Regex;

/// 章节标题检测器
///
/// 读取章节文件第一行，匹配 `Chương <n>: <标题>`（分隔符可以是 `:`、`-` 或 `–`）。
/// 匹配失败时回退为 `Chương <N>`，N 为文件名中解析出的章节号。
pub struct TitleDetector {
    pattern: Regex,
}

impl TitleDetector {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"(?i)^\s*chương\s+\d+\s*[:\-–]\s*(.+)$").expect("章节标题模式"),
        }
    }

    /// 从第一行提取标题
    ///
    /// # 参数
    /// - `first_line`: 文件第一行（可带 BOM 或换行符）
    /// - `chapter_number`: 文件名中的章节号，用于回退标题
    pub fn detect(&self, first_line: &str, chapter_number: u32) -> String {
        let line = first_line.trim_start_matches('\u{feff}').trim_end();

        self.pattern
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .filter(|title| !title.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| fallback_title(chapter_number))
    }
}

impl Default for TitleDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// 回退标题
pub fn fallback_title(chapter_number: u32) -> String {
    format!("Chương {}", chapter_number)
}
