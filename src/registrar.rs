use crate::api::{ApiError, ChapterBackend, ChapterMeta};
use crate::cancel::CancelSignal;
use thiserror::Error;

/// 默认每批注册的章节数
pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("第 {batch} 批章节注册失败（章节 {first}-{last}）: {source}")]
    Batch {
        batch: usize,
        first: u32,
        last: u32,
        #[source]
        source: ApiError,
    },
    #[error("章节注册已取消")]
    Aborted,
}

/// 分批注册章节元数据
///
/// 每批一次后端调用，严格按顺序执行（后端依赖注册顺序统计章节数）。
/// 任意一批失败即中止，已注册的批次不会回滚。
///
/// # 参数
/// - `chapters`: 已按章节号升序排列的元数据
/// - `batch_size`: 每批数量，0 按 1 处理
///
/// # 返回
/// 成功注册的批次数
pub async fn register_in_batches(
    backend: &dyn ChapterBackend,
    book_slug: &str,
    chapters: &[ChapterMeta],
    batch_size: usize,
    cancel: &CancelSignal,
) -> Result<usize, RegistrationError> {
    let batch_size = batch_size.max(1);
    let mut registered = 0;

    for (index, batch) in chapters.chunks(batch_size).enumerate() {
        if cancel.is_cancelled() {
            return Err(RegistrationError::Aborted);
        }

        let first = batch.first().map(|c| c.chapter_number).unwrap_or_default();
        let last = batch.last().map(|c| c.chapter_number).unwrap_or_default();
        tracing::info!(book = book_slug, batch = index + 1, first, last, "注册章节批次");

        match cancel.run(backend.register_chapters(book_slug, batch)).await {
            None => return Err(RegistrationError::Aborted),
            Some(Err(source)) => {
                tracing::error!(book = book_slug, batch = index + 1, error = %source, "章节注册失败");
                return Err(RegistrationError::Batch {
                    batch: index + 1,
                    first,
                    last,
                    source,
                });
            }
            Some(Ok(())) => registered += 1,
        }
    }

    Ok(registered)
}
