use encoding_rs::*;

/// 检测章节文件编码
///
/// 检测顺序：
/// 1. BOM (Byte Order Mark)
/// 2. 合法的 UTF-8
/// 3. 看起来像越南语旧编码（Windows-1258）
/// 4. 默认 UTF-8
///
/// # 参数
/// - `bytes`: 文件字节数据
pub fn detect_encoding(bytes: &[u8]) -> &'static Encoding {
    if let Some((encoding, _bom_length)) = Encoding::for_bom(bytes) {
        return encoding;
    }

    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }

    if looks_like_windows_1258(bytes) {
        return WINDOWS_1258;
    }

    UTF_8
}

/// 检测字节序列是否像 Windows-1258
///
/// 不是合法 UTF-8，且高位字节大多是单独出现（不成 UTF-8 多字节序列）
fn looks_like_windows_1258(bytes: &[u8]) -> bool {
    let mut high = 0usize;
    let mut isolated = 0usize;

    for (i, &b) in bytes.iter().enumerate() {
        if b < 0x80 {
            continue;
        }
        high += 1;

        let next_is_continuation = bytes
            .get(i + 1)
            .map(|n| (0x80..=0xBF).contains(n))
            .unwrap_or(false);
        if !next_is_continuation {
            isolated += 1;
        }
    }

    high > 0 && (isolated as f32 / high as f32) > 0.5
}

/// 解码章节文本
///
/// 自动检测编码；解码出现替换字符时只记录警告
pub fn decode_text(bytes: &[u8]) -> String {
    let encoding = detect_encoding(bytes);
    let (content, encoding_used, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::warn!(
            encoding = encoding_used.name(),
            "章节解码时出现错误，可能存在乱码"
        );
    }
    content.into_owned()
}
