use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("解压失败: {0}")]
    DecompressionFailed(#[from] std::io::Error),
}

/// 压缩章节正文
///
/// zlib (DEFLATE) 最高压缩级别，结果就是上传时 `file` 字段的全部内容，
/// 不附加任何章节相关的头部。相同输入总是得到相同输出。
pub fn compress(text: &str) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(text.as_bytes())?;
    encoder.finish()
}

/// 解压章节正文
pub fn decompress(bytes: &[u8]) -> Result<String, CompressionError> {
    let mut decoder = ZlibDecoder::new(bytes);
    let mut text = String::new();
    decoder.read_to_string(&mut text)?;
    Ok(text)
}
